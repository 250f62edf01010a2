use std::{error::Error, path::PathBuf};

use arqsim::{
    queue::{DropTailQ, PriorityQ, QDisc, QIndex, WfqQ},
    transport::{Mode, TransportConfig},
    units::Bandwidth,
    Config, ConnId, ConnectionDesc, LinkDesc, LinkId, Report, Workload,
};
use clap::{Parser, ValueEnum};
use tracing_subscriber::EnvFilter;

const FORWARD: LinkId = LinkId::ZERO;
const BACKWARD: LinkId = LinkId::ONE;

/// Runs a set of connections over one forward and one backward link and prints a summary.
#[derive(Debug, Parser)]
#[command(name = "arqsim")]
#[command(about = "Simulate ARQ transport over lossy, delayed links")]
#[command(version)]
struct Cli {
    /// Transport protocol
    #[arg(long, value_enum, default_value_t = Mode::SlidingWindow)]
    mode: Mode,

    /// Sender window, in frames
    #[arg(long, default_value_t = 5)]
    window: u64,

    /// Largest sequence number before wraparound
    #[arg(long, default_value_t = 1_000_000)]
    max_seq: u64,

    #[arg(long, default_value_t = 100)]
    max_window: u64,

    /// Retransmission timeout used until the first RTT sample
    #[arg(long, default_value_t = 100.0)]
    timeout: f64,

    /// Retransmissions per frame before giving up (default: never)
    #[arg(long)]
    max_retries: Option<u32>,

    /// Bandwidth of both links (default: unlimited)
    #[arg(long)]
    bandwidth: Option<f64>,

    #[arg(long)]
    bandwidth_forward: Option<f64>,

    #[arg(long)]
    bandwidth_backward: Option<f64>,

    #[arg(long, value_enum, default_value_t = BandwidthUnit::Packets)]
    bandwidth_unit: BandwidthUnit,

    /// Propagation delay of both links
    #[arg(long, default_value_t = 1.0)]
    delay: f64,

    /// Mean of the exponential extra delay per packet
    #[arg(long, default_value_t = 0.0)]
    jitter: f64,

    /// Loss probability of both links
    #[arg(long, default_value_t = 0.0)]
    drop: f64,

    #[arg(long)]
    drop_forward: Option<f64>,

    #[arg(long)]
    drop_backward: Option<f64>,

    /// Buffer capacity of each link, in packets
    #[arg(long, default_value_t = 100)]
    buffer_size: usize,

    #[arg(long, value_enum, default_value_t = BufferClass::DropTail)]
    buffer_class: BufferClass,

    /// Per-class weights for the WFQ buffer
    #[arg(long, value_delimiter = ',', default_values_t = [1.0, 1.0])]
    weights: Vec<f64>,

    /// Number of connections sharing the links
    #[arg(long, default_value_t = 1)]
    connections: usize,

    #[arg(long, value_enum, default_value_t = WorkloadKind::Poisson)]
    workload: WorkloadKind,

    /// Messages per time unit for paced workloads
    #[arg(long, default_value_t = 1.0)]
    rate: f64,

    /// Message size
    #[arg(long, default_value_t = 0)]
    size: usize,

    /// Messages per connection (default: unbounded)
    #[arg(long)]
    count: Option<u64>,

    /// JSON list of connections, replacing the generated ones
    #[arg(long)]
    connections_file: Option<PathBuf>,

    /// JSON list of scheduled link changes
    #[arg(long)]
    updates_file: Option<PathBuf>,

    /// Simulated time to stop at
    #[arg(long, default_value_t = 5000.0)]
    time_limit: f64,

    #[arg(long, default_value_t = arqsim::driver::DEFAULT_SEED)]
    seed: u64,

    /// Print the report as JSON
    #[arg(long)]
    json: bool,

    /// More logging; repeat for more
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum BandwidthUnit {
    Packets,
    Bytes,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum BufferClass {
    DropTail,
    Priority,
    Wfq,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum WorkloadKind {
    Poisson,
    Periodic,
    Batch,
}

impl Cli {
    fn bandwidth(&self, direction: Option<f64>) -> Bandwidth {
        match (direction.or(self.bandwidth), self.bandwidth_unit) {
            (None, _) => Bandwidth::Unlimited,
            (Some(rate), BandwidthUnit::Packets) => Bandwidth::Packets(rate),
            (Some(rate), BandwidthUnit::Bytes) => Bandwidth::Bytes(rate),
        }
    }

    fn transport(&self) -> TransportConfig {
        TransportConfig {
            mode: self.mode,
            window: self.window,
            max_seq: self.max_seq,
            max_window: self.max_window,
            initial_timeout: self.timeout,
            max_retries: self.max_retries,
        }
    }

    fn workload(&self) -> Result<Workload, Box<dyn Error>> {
        Ok(match self.workload {
            WorkloadKind::Poisson => Workload::Poisson {
                rate: self.rate,
                count: self.count,
                size: self.size,
            },
            WorkloadKind::Periodic => Workload::Periodic {
                interval: 1.0 / self.rate,
                count: self.count,
                size: self.size,
            },
            WorkloadKind::Batch => Workload::Batch {
                count: self.count.ok_or("a batch workload needs --count")?,
                size: self.size,
            },
        })
    }

    fn connection_descs(&self) -> Result<Vec<ConnectionDesc>, Box<dyn Error>> {
        if let Some(path) = &self.connections_file {
            return Ok(arqsim::read_connections(path)?);
        }
        let workload = self.workload()?;
        Ok((0..self.connections)
            .map(|i| {
                ConnectionDesc::builder()
                    .id(ConnId::new(i))
                    .forward(FORWARD)
                    .backward(BACKWARD)
                    .workload(workload)
                    .class(QIndex::new(i))
                    .build()
            })
            .collect())
    }

    fn simulate<Q: QDisc>(&self, mk_queue: impl Fn() -> Q) -> Result<Report, Box<dyn Error>> {
        let links = vec![
            LinkDesc::builder()
                .id(FORWARD)
                .bandwidth(self.bandwidth(self.bandwidth_forward))
                .delay(self.delay)
                .jitter(self.jitter)
                .drop_rate(self.drop_forward.unwrap_or(self.drop))
                .queue(mk_queue())
                .build(),
            LinkDesc::builder()
                .id(BACKWARD)
                .bandwidth(self.bandwidth(self.bandwidth_backward))
                .delay(self.delay)
                .jitter(self.jitter)
                .drop_rate(self.drop_backward.unwrap_or(self.drop))
                .queue(mk_queue())
                .build(),
        ];
        let updates = match &self.updates_file {
            Some(path) => arqsim::read_updates(path)?,
            None => Vec::new(),
        };
        let cfg = Config::builder()
            .transport(self.transport())
            .links(links)
            .connections(self.connection_descs()?)
            .updates(updates)
            .seed(self.seed)
            .time_limit(self.time_limit)
            .build();
        Ok(arqsim::run(cfg)?)
    }
}

fn init_tracing(verbose: u8) {
    let level = match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn main() -> Result<(), Box<dyn Error>> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let report = match cli.buffer_class {
        BufferClass::DropTail => cli.simulate(|| DropTailQ::new(cli.buffer_size))?,
        BufferClass::Priority => cli.simulate(|| PriorityQ::new(cli.buffer_size))?,
        BufferClass::Wfq => {
            if cli.weights.is_empty() || cli.weights.iter().any(|w| !w.is_finite() || *w <= 0.0) {
                return Err("WFQ weights must be positive numbers".into());
            }
            cli.simulate(|| WfqQ::new(cli.buffer_size, &cli.weights))?
        }
    };
    if cli.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print!("{report}");
    }
    Ok(())
}
