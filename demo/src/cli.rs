use clap::Parser;

/// Bounded buffer demo
///
/// Spawns producers and consumers against one semaphore-guarded buffer and
/// returns once the poison pill has reached every consumer.
#[derive(Debug, Parser)]
pub struct Args {
    /// Number of consumer threads
    #[arg(default_value_t = 2)]
    pub consumers: usize,

    /// Number of producer threads
    #[arg(default_value_t = 3)]
    pub producers: usize,

    /// Buffer capacity
    #[arg(long, default_value_t = 10)]
    pub capacity: usize,

    /// Characters produced by each producer
    #[arg(long, default_value_t = 30)]
    pub items: usize,

    /// Seed for the random workload (a random one is drawn and printed
    /// when omitted)
    #[arg(long)]
    pub seed: Option<u64>,

    /// Only print the final summary
    #[arg(long)]
    pub quiet: bool,
}
