use core::future;

use anyhow::{bail, Error};
use tokio::{signal, sync::mpsc};

use crate::{
    cfg::{Config, ModeConfig, RunConfig, ServeConfig},
    generator::Generator,
    report::Report,
    tcp::{TcpComm, TcpServer},
};

#[derive(Debug)]
pub struct Runtime {
    cfg: Config,
}

impl Runtime {
    pub fn new(cfg: Config) -> Self {
        Self { cfg }
    }

    pub async fn run(self) -> Result<(), Error> {
        match self.cfg.mode {
            ModeConfig::Run(cfg) => {
                run_load(cfg).await?;
            }
            ModeConfig::Serve(cfg) => {
                run_server(cfg).await?;
            }
        };

        Ok(())
    }
}

/// Drives the generator against the arithmetic server until either the
/// configured duration elapses or the process is interrupted.
pub async fn run_load(cfg: RunConfig) -> Result<Report, Error> {
    let (tx, rx) = mpsc::channel(cfg.buffer.get());
    let gen = Generator::new(cfg.params(TcpComm::new(cfg.addr), tx))?;
    let mut collector = tokio::spawn(Report::collect(rx));

    if !gen.start() {
        bail!("failed to start load generator in {:?} state", gen.status());
    }

    let report = tokio::select! {
        report = &mut collector => report?,
        rc = signal::ctrl_c() => {
            rc?;
            log::info!("interrupted, stopping load generator ...");
            gen.stop().await;
            collector.await?
        }
    };

    log::info!("summary:\n{}", report.summary());
    log::info!(
        "call count: {}, received: {}, dropped: {}",
        gen.call_count(),
        report.total(),
        (gen.call_count() as u64).saturating_sub(report.total()),
    );

    Ok(report)
}

async fn run_server(cfg: ServeConfig) -> Result<(), Error> {
    let server = TcpServer::bind(cfg.addr).await?;

    server
        .run(async {
            if let Err(err) = signal::ctrl_c().await {
                log::error!("failed to listen for interruption: {err}");
                future::pending::<()>().await;
            }
        })
        .await
}
