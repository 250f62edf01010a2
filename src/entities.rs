pub(crate) mod connection;
pub(crate) mod link;
pub(crate) mod workload;
