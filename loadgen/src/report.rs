use core::{
    fmt::{self, Display, Formatter},
    time::Duration,
};
use std::collections::HashMap;

use tokio::sync::mpsc::Receiver;

use crate::{
    caller::{CallResult, RetCode},
    histogram::LatencyHistogram,
};

/// Call results accumulated by the consumer side.
#[derive(Debug, Clone, Default)]
pub struct Report {
    total: u64,
    counts: HashMap<RetCode, u64>,
    latency: LatencyHistogram,
}

impl Report {
    /// Drains the given channel until the generator closes it.
    pub async fn collect(mut rx: Receiver<CallResult>) -> Self {
        let mut report = Self::default();

        while let Some(result) = rx.recv().await {
            log::trace!(
                "result: ID={}, Code={}, Msg={}, Elapse={:?}",
                result.id,
                result.code,
                result.msg,
                result.elapsed
            );
            report.record(&result);
        }

        report
    }

    pub fn record(&mut self, result: &CallResult) {
        self.total += 1;
        *self.counts.entry(result.code).or_default() += 1;
        self.latency.record(result.elapsed);
    }

    #[inline]
    pub fn total(&self) -> u64 {
        self.total
    }

    #[inline]
    pub fn count(&self, code: RetCode) -> u64 {
        self.counts.get(&code).copied().unwrap_or(0)
    }

    /// Returns the share of successful calls, within `[0; 1]`.
    pub fn success_ratio(&self) -> f64 {
        match self.total {
            0 => 0.0,
            total => self.count(RetCode::Success) as f64 / total as f64,
        }
    }

    #[inline]
    pub fn quantile(&self, q: f64) -> Duration {
        self.latency.quantile(q)
    }

    #[inline]
    pub fn summary(&self) -> Summary<'_> {
        Summary { report: self }
    }
}

/// Human-readable report table.
#[derive(Debug)]
pub struct Summary<'a> {
    report: &'a Report,
}

impl Display for Summary<'_> {
    fn fmt(&self, fmt: &mut Formatter) -> Result<(), fmt::Error> {
        let report = self.report;

        writeln!(fmt, "received results: {}", report.total())?;
        for code in RetCode::ALL {
            writeln!(fmt, "  {:>4} {:<16} {}", code.as_u32(), code.name(), report.count(code))?;
        }
        writeln!(fmt, "success ratio: {:.2}%", report.success_ratio() * 100.0)?;
        write!(
            fmt,
            "latency: p50 < {:?}, p90 < {:?}, p99 < {:?}",
            report.quantile(0.5),
            report.quantile(0.9),
            report.quantile(0.99),
        )
    }
}
