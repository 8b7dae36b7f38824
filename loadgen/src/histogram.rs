use core::time::Duration;

/// Latency histogram with logarithmic buckets.
///
/// Bucket `i` counts values within `[f^(i-1); f^i)` microseconds, the last
/// one is open-ended.
#[derive(Debug, Clone)]
pub struct LatencyHistogram {
    buckets: Vec<u64>,
    factor: f64,
    size: u64,
}

impl Default for LatencyHistogram {
    fn default() -> Self {
        // 60s, in microseconds.
        Self::new(1.5, 60_000_000.0)
    }
}

impl LatencyHistogram {
    fn new(factor: f64, max: f64) -> Self {
        let num = max.log(factor).ceil() as usize + 1;

        Self { buckets: vec![0; num], factor, size: 0 }
    }

    #[inline]
    pub fn size(&self) -> u64 {
        self.size
    }

    pub fn record(&mut self, elapsed: Duration) {
        let us = elapsed.as_micros().max(1) as f64;
        let idx = (us.log(self.factor).ceil() as usize).min(self.buckets.len() - 1);

        self.buckets[idx] += 1;
        self.size += 1;
    }

    /// Returns the upper bound of the bucket where the given quantile falls.
    ///
    /// Returns zero for an empty histogram.
    pub fn quantile(&self, q: f64) -> Duration {
        assert!((0.0..=1.0).contains(&q));

        if self.size == 0 {
            return Duration::ZERO;
        }

        let rank = (q * self.size as f64).ceil().max(1.0) as u64;
        let mut sum = 0;
        for (idx, &b) in self.buckets.iter().enumerate() {
            sum += b;
            if sum >= rank {
                return Duration::from_micros(self.factor.powi(idx as i32) as u64);
            }
        }

        Duration::MAX
    }
}
