use core::{
    net::SocketAddr,
    num::{NonZeroU32, NonZeroUsize},
};
use std::path::PathBuf;

use clap::{ArgAction, Parser};

/// Rate-controlled load generator.
#[derive(Debug, Clone, Parser)]
#[command(version, about)]
#[command(flatten_help = true)]
pub struct Cmd {
    #[clap(subcommand)]
    pub mode: ModeCmd,
    /// Be verbose in terms of logging.
    #[clap(short, action = ArgAction::Count, global = true)]
    pub verbose: u8,
    /// Be quiet in terms of logging.
    #[clap(short, action = ArgAction::Count, global = true)]
    pub quiet: u8,
}

#[derive(Debug, Clone, Parser)]
pub enum ModeCmd {
    /// Generate load against the arithmetic TCP server.
    Run(RunCmd),
    /// Run the arithmetic TCP server.
    Serve(ServeCmd),
}

#[derive(Debug, Clone, Parser)]
pub struct RunCmd {
    /// Target endpoint.
    #[clap(required_unless_present = "config")]
    pub addr: Option<SocketAddr>,
    /// Loads per second.
    ///
    /// Zero disables throttling, in which case "--concurrency" is required.
    #[clap(long, default_value_t = 1000)]
    pub lps: u32,
    /// Per-call timeout, in milliseconds.
    #[clap(long, default_value_t = 50)]
    pub timeout: u64,
    /// Total run duration, in seconds.
    #[clap(long, default_value_t = 10)]
    pub duration: u64,
    /// Maximum number of calls in flight.
    ///
    /// By default it is derived from the rate and the timeout.
    #[clap(short, long)]
    pub concurrency: Option<NonZeroU32>,
    /// Result channel capacity.
    ///
    /// Results that do not fit are dropped and logged.
    #[clap(long, default_value_t = NonZeroUsize::new(1000).unwrap_or(NonZeroUsize::MIN))]
    pub buffer: NonZeroUsize,
    /// Path to the YAML run configuration, which takes precedence over the
    /// command line flags.
    #[clap(long, value_name = "PATH")]
    pub config: Option<PathBuf>,
}

#[derive(Debug, Clone, Parser)]
pub struct ServeCmd {
    /// Endpoint to listen on.
    #[clap(required = true)]
    pub addr: SocketAddr,
}
