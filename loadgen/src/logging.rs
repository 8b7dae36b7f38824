use log::{LevelFilter, SetLoggerError};
use simple_logger::SimpleLogger;

/// Levels from the quietest to the noisiest, with `Info` as the default.
const LEVELS: [LevelFilter; 6] = [
    LevelFilter::Off,
    LevelFilter::Error,
    LevelFilter::Warn,
    LevelFilter::Info,
    LevelFilter::Debug,
    LevelFilter::Trace,
];
const DEFAULT_LEVEL: usize = 3;

/// Maps `-v` and `-q` counters to a level filter.
///
/// Each `-v` moves one level towards `Trace` and each `-q` one level towards
/// `Off`, saturating at both ends. `-q` hides the lifecycle messages and
/// `-qq` also hides the per-result drop warnings, keeping only call faults.
pub fn level(verbose: u8, quiet: u8) -> LevelFilter {
    let idx = (DEFAULT_LEVEL + verbose as usize).saturating_sub(quiet as usize);

    LEVELS[idx.min(LEVELS.len() - 1)]
}

/// Installs the process-wide logger.
///
/// Library components only log through the `log` facade, so this is meant to
/// be called once by the binary. Foreign crates stay silent.
pub fn init(level: LevelFilter) -> Result<(), SetLoggerError> {
    SimpleLogger::new()
        .with_level(LevelFilter::Off)
        .with_module_level(env!("CARGO_CRATE_NAME"), level)
        .with_utc_timestamps()
        .init()
}
