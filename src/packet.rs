use typed_builder::TypedBuilder;

use crate::{entities::connection::ConnId, queue::QIndex, seq::SeqNum, time::Time, units::Bytes};

/// An application-level message.
#[derive(Debug, Clone, PartialEq, Eq, Hash, derive_new::new)]
pub struct Message {
    pub data: Vec<u8>,
    /// Marks the last message of a stream.
    pub is_end: bool,
}

/// A packet on the wire.
#[derive(Debug, Clone, PartialEq, TypedBuilder)]
pub struct Packet {
    #[builder(default)]
    pub data: Vec<u8>,
    #[builder(default)]
    pub is_end: bool,
    #[builder(default, setter(strip_option))]
    pub seq_num: Option<SeqNum>,
    #[builder(default, setter(strip_option))]
    pub ack_num: Option<SeqNum>,
    /// Send time, echoed back unchanged by the receiver in its ACK.
    #[builder(default, setter(strip_option))]
    pub timestamp: Option<Time>,
    /// The connection this packet belongs to. Set by the connection on the way out.
    #[builder(default)]
    pub label: ConnId,
    /// Queue class used by multi-class buffers.
    #[builder(default)]
    pub class: QIndex,

    // Stamped by the link on enqueue
    #[builder(default, setter(skip))]
    pub(crate) dest: Option<Dest>,
}

impl Packet {
    /// Fixed per-packet header overhead.
    pub const SZ_HDR: Bytes = Bytes::new(8);

    pub fn size(&self) -> Bytes {
        Bytes::from(self.data.len()) + Self::SZ_HDR
    }

    pub fn is_ack(&self) -> bool {
        self.ack_num.is_some()
    }

    pub fn to_message(&self) -> Message {
        Message::new(self.data.clone(), self.is_end)
    }

    /// An acknowledgment for `ack_num` that echoes the timestamp of `trigger`.
    pub fn ack_for(trigger: &Packet, ack_num: SeqNum) -> Self {
        Packet {
            data: Vec::new(),
            is_end: false,
            seq_num: None,
            ack_num: Some(ack_num),
            timestamp: trigger.timestamp,
            label: trigger.label,
            class: trigger.class,
            dest: None,
        }
    }
}

/// Which end of a connection a packet is travelling to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub enum Side {
    Sender,
    Receiver,
}

/// Where a link hands a packet once it arrives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, derive_new::new)]
pub(crate) struct Dest {
    pub(crate) conn: ConnId,
    pub(crate) side: Side,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn size_includes_header() {
        let pkt = Packet::builder().data(b"hello".to_vec()).build();
        assert_eq!(pkt.size(), Bytes::new(13));
        let empty = Packet::builder().build();
        assert_eq!(empty.size(), Packet::SZ_HDR);
    }

    #[test]
    fn ack_echoes_timestamp() {
        let data = Packet::builder()
            .data(vec![1, 2, 3])
            .seq_num(SeqNum::new(4))
            .timestamp(Time::new(77))
            .label(ConnId::new(3))
            .build();
        let ack = Packet::ack_for(&data, SeqNum::new(4));
        assert!(ack.is_ack());
        assert_eq!(ack.timestamp, Some(Time::new(77)));
        assert_eq!(ack.label, ConnId::new(3));
        assert!(ack.data.is_empty());
    }

    #[test]
    fn clones_are_independent() {
        let original = Packet::builder().data(vec![1]).build();
        let mut copy = original.clone();
        copy.data.push(2);
        copy.seq_num = Some(SeqNum::ONE);
        assert_eq!(original.data, vec![1]);
        assert_eq!(original.seq_num, None);
    }
}
