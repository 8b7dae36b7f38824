use core::{
    fmt::{self, Display, Formatter},
    num::NonZeroU32,
    time::Duration,
};

use tokio::sync::mpsc::Sender;

use crate::{caller::CallResult, error::ParamError};

const NANOS_PER_SEC: u64 = 1_000_000_000;

/// Load generator parameters.
#[derive(Debug, Clone)]
pub struct ParamSet<C> {
    /// The load target.
    pub caller: C,
    /// Per-call timeout.
    pub timeout: Duration,
    /// Loads per second, zero means no throttling.
    pub lps: u32,
    /// Total run duration.
    pub duration: Duration,
    /// Explicit concurrency cap.
    ///
    /// Mandatory when `lps` is zero, otherwise it further bounds the
    /// computed concurrency.
    pub concurrency: Option<NonZeroU32>,
    /// Where call results are delivered.
    pub result_tx: Sender<CallResult>,
}

impl<C> ParamSet<C> {
    /// Validates these parameters.
    pub fn check(&self) -> Result<(), ParamError> {
        log::info!("checking the parameters: {self}");

        if self.timeout.is_zero() {
            return Err(ParamError::InvalidTimeout(self.timeout));
        }
        if self.duration.is_zero() {
            return Err(ParamError::InvalidDuration(self.duration));
        }
        if self.result_tx.is_closed() {
            return Err(ParamError::ClosedResultChannel);
        }
        if self.lps == 0 && self.concurrency.is_none() {
            return Err(ParamError::MissingConcurrency);
        }

        Ok(())
    }

    /// Returns the pacing interval, if throttling is enabled.
    #[inline]
    pub fn interval(&self) -> Option<Duration> {
        interval(self.lps)
    }

    /// Returns the number of calls allowed to be in flight simultaneously.
    pub fn concurrency(&self) -> Result<u32, ParamError> {
        match (self.lps, self.concurrency) {
            (0, None) => Err(ParamError::MissingConcurrency),
            (0, Some(cap)) => Ok(cap.get()),
            (lps, cap) => {
                let total = concurrency(self.timeout, lps);
                Ok(cap.map_or(total, |cap| total.min(cap.get())))
            }
        }
    }
}

impl<C> Display for ParamSet<C> {
    fn fmt(&self, fmt: &mut Formatter) -> Result<(), fmt::Error> {
        write!(
            fmt,
            "timeout={:?}, lps={}, duration={:?}, concurrency={:?}, result channel capacity={}",
            self.timeout,
            self.lps,
            self.duration,
            self.concurrency,
            self.result_tx.max_capacity(),
        )
    }
}

/// Returns the pacing interval for the given rate.
///
/// Rates above one load per nanosecond are paced at one nanosecond.
pub fn interval(lps: u32) -> Option<Duration> {
    match lps {
        0 => None,
        lps => Some(Duration::from_nanos((NANOS_PER_SEC / lps as u64).max(1))),
    }
}

/// Calculates how many calls may be in flight at the same time, assuming
/// each call takes up to `timeout` and a new one is admitted every `1/lps`
/// seconds.
///
/// The result is capped at `i32::MAX`.
pub fn concurrency(timeout: Duration, lps: u32) -> u32 {
    let interval = match interval(lps) {
        Some(interval) => interval.as_nanos(),
        None => return i32::MAX as u32,
    };
    let total = timeout.as_nanos() / interval + 1;

    total.min(i32::MAX as u128) as u32
}
