use core::{
    error::Error,
    net::SocketAddr,
    num::{NonZeroU32, NonZeroUsize},
    time::Duration,
};
use std::{fs, path::Path};

use serde::Deserialize;
use tokio::sync::mpsc::Sender;

use crate::{
    caller::CallResult,
    cmd::{Cmd, ModeCmd, RunCmd, ServeCmd},
    generator::ParamSet,
};

#[derive(Debug, Clone)]
pub struct Config {
    pub mode: ModeConfig,
}

impl TryFrom<Cmd> for Config {
    type Error = Box<dyn Error>;

    fn try_from(v: Cmd) -> Result<Self, Self::Error> {
        let mode = v.mode.try_into()?;

        Ok(Self { mode })
    }
}

#[derive(Debug, Clone)]
pub enum ModeConfig {
    Run(RunConfig),
    Serve(ServeConfig),
}

impl TryFrom<ModeCmd> for ModeConfig {
    type Error = Box<dyn Error>;

    fn try_from(v: ModeCmd) -> Result<Self, Self::Error> {
        let m = match v {
            ModeCmd::Run(v) => Self::Run(v.try_into()?),
            ModeCmd::Serve(v) => Self::Serve(v.into()),
        };

        Ok(m)
    }
}

/// Load run config.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunConfig {
    /// Target endpoint.
    pub addr: SocketAddr,
    /// Loads per second, zero means no throttling.
    pub lps: u32,
    /// Per-call timeout.
    pub timeout: Duration,
    /// Total run duration.
    pub duration: Duration,
    /// Explicit concurrency cap.
    pub concurrency: Option<NonZeroU32>,
    /// Result channel capacity.
    pub buffer: NonZeroUsize,
}

impl RunConfig {
    /// Builds generator parameters for the given caller.
    pub fn params<C>(&self, caller: C, result_tx: Sender<CallResult>) -> ParamSet<C> {
        ParamSet {
            caller,
            timeout: self.timeout,
            lps: self.lps,
            duration: self.duration,
            concurrency: self.concurrency,
            result_tx,
        }
    }
}

impl TryFrom<RunCmd> for RunConfig {
    type Error = Box<dyn Error>;

    fn try_from(cmd: RunCmd) -> Result<Self, Self::Error> {
        let RunCmd {
            addr,
            lps,
            timeout,
            duration,
            concurrency,
            buffer,
            config,
        } = cmd;

        if let Some(path) = config {
            return load(path);
        }

        let m = Self {
            addr: addr.ok_or("target endpoint is required")?,
            lps,
            timeout: Duration::from_millis(timeout),
            duration: Duration::from_secs(duration),
            concurrency,
            buffer,
        };

        Ok(m)
    }
}

/// Load run config, as written in a YAML file.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RunConfigFile {
    addr: SocketAddr,
    #[serde(default = "RunConfigFile::default_lps")]
    lps: u32,
    timeout_ms: u64,
    duration_s: u64,
    #[serde(default)]
    concurrency: Option<NonZeroU32>,
    #[serde(default = "RunConfigFile::default_buffer")]
    buffer: NonZeroUsize,
}

impl RunConfigFile {
    const fn default_lps() -> u32 {
        1000
    }

    const fn default_buffer() -> NonZeroUsize {
        match NonZeroUsize::new(1000) {
            Some(v) => v,
            None => NonZeroUsize::MIN,
        }
    }
}

impl From<RunConfigFile> for RunConfig {
    fn from(v: RunConfigFile) -> Self {
        Self {
            addr: v.addr,
            lps: v.lps,
            timeout: Duration::from_millis(v.timeout_ms),
            duration: Duration::from_secs(v.duration_s),
            concurrency: v.concurrency,
            buffer: v.buffer,
        }
    }
}

/// Parses the run config from YAML.
pub fn parse(data: &[u8]) -> Result<RunConfig, serde_yaml::Error> {
    let cfg: RunConfigFile = serde_yaml::from_slice(data)?;

    Ok(cfg.into())
}

/// Loads the run config from the given YAML file.
pub fn load<P: AsRef<Path>>(path: P) -> Result<RunConfig, Box<dyn Error>> {
    log::debug!("loading run config from '{}' ...", path.as_ref().display());
    let data = fs::read(path)?;

    Ok(parse(&data)?)
}

/// Arithmetic server config.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServeConfig {
    /// Endpoint to listen on.
    pub addr: SocketAddr,
}

impl From<ServeCmd> for ServeConfig {
    fn from(v: ServeCmd) -> Self {
        Self { addr: v.addr }
    }
}
