use core::{
    error::Error,
    sync::atomic::{AtomicUsize, Ordering},
};
use std::{io, process::ExitCode};

use clap::Parser;
use loadgen::{cfg::Config, cmd::Cmd, logging, runtime::Runtime};
use tokio::runtime::{self, Builder};

pub fn main() -> ExitCode {
    let cmd = Cmd::parse();
    if let Err(err) = logging::init(logging::level(cmd.verbose, cmd.quiet)) {
        eprintln!("ERROR: failed to initialize logging: {err}");
        return ExitCode::FAILURE;
    }

    match run(cmd) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("ERROR: {err}");
            ExitCode::FAILURE
        }
    }
}

fn run(cmd: Cmd) -> Result<(), Box<dyn Error>> {
    let cfg: Config = cmd.try_into()?;

    // Config errors are reported before any worker thread is spawned.
    build_runtime()?.block_on(Runtime::new(cfg).run())?;

    Ok(())
}

/// Calls are spread over worker threads, numbered for log readability.
fn build_runtime() -> io::Result<runtime::Runtime> {
    static NEXT_WORKER: AtomicUsize = AtomicUsize::new(0);

    Builder::new_multi_thread()
        .enable_io()
        .enable_time()
        .thread_name_fn(|| format!("loadgen-{}", NEXT_WORKER.fetch_add(1, Ordering::Relaxed)))
        .build()
}
