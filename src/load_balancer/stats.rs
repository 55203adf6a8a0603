//! Aggregate request statistics.
//!
//! Counters are lock-free; the rolling average and the requests-per-second
//! window share one small mutex.

use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::{Duration, Instant};

/// Minimum time between requests-per-second recomputations.
pub const RPS_WINDOW: Duration = Duration::from_secs(5);

#[derive(Debug)]
struct Rolling {
    avg_response_time_us: u64,
    requests_per_second: f64,
    window_start: Instant,
    window_base: u64,
}

/// Request counters for one load balancer.
#[derive(Debug)]
pub struct LoadStats {
    total: AtomicU64,
    successful: AtomicU64,
    failed: AtomicU64,
    rolling: Mutex<Rolling>,
}

/// Point-in-time copy of [`LoadStats`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LoadStatsSnapshot {
    pub total_requests: u64,
    pub successful_requests: u64,
    pub failed_requests: u64,
    pub avg_response_time_us: u64,
    pub requests_per_second: f64,
}

impl LoadStats {
    pub fn new() -> Self {
        Self {
            total: AtomicU64::new(0),
            successful: AtomicU64::new(0),
            failed: AtomicU64::new(0),
            rolling: Mutex::new(Rolling {
                avg_response_time_us: 0,
                requests_per_second: 0.0,
                window_start: Instant::now(),
                window_base: 0,
            }),
        }
    }

    /// Fold one completed request into the statistics.
    pub fn record(&self, elapsed: Duration, success: bool) {
        let mut rolling = self.rolling.lock().expect("load stats lock poisoned");
        // counted under the lock so the mean divides by the samples it holds
        let completed_before = self.total.fetch_add(1, Ordering::Relaxed);
        if success {
            self.successful.fetch_add(1, Ordering::Relaxed);
        } else {
            self.failed.fetch_add(1, Ordering::Relaxed);
        }

        let sample = elapsed.as_micros() as u128;
        let n = completed_before as u128;
        rolling.avg_response_time_us =
            ((rolling.avg_response_time_us as u128 * n + sample) / (n + 1)) as u64;

        let window = rolling.window_start.elapsed();
        if window > RPS_WINDOW {
            let total = completed_before + 1;
            rolling.requests_per_second =
                (total - rolling.window_base) as f64 / window.as_secs_f64();
            rolling.window_start = Instant::now();
            rolling.window_base = total;
        }
    }

    pub fn snapshot(&self) -> LoadStatsSnapshot {
        let rolling = self.rolling.lock().expect("load stats lock poisoned");
        LoadStatsSnapshot {
            total_requests: self.total.load(Ordering::Relaxed),
            successful_requests: self.successful.load(Ordering::Relaxed),
            failed_requests: self.failed.load(Ordering::Relaxed),
            avg_response_time_us: rolling.avg_response_time_us,
            requests_per_second: rolling.requests_per_second,
        }
    }
}

impl Default for LoadStats {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counters_and_average() {
        let stats = LoadStats::new();
        stats.record(Duration::from_micros(100), true);
        stats.record(Duration::from_micros(300), false);
        stats.record(Duration::from_micros(200), true);

        let snap = stats.snapshot();
        assert_eq!(snap.total_requests, 3);
        assert_eq!(snap.successful_requests, 2);
        assert_eq!(snap.failed_requests, 1);
        assert_eq!(snap.avg_response_time_us, 200);
        // window has not elapsed yet
        assert_eq!(snap.requests_per_second, 0.0);
    }

    #[test]
    fn test_concurrent_records_keep_exact_mean() {
        let stats = std::sync::Arc::new(LoadStats::new());
        let workers: Vec<_> = (0..8)
            .map(|i| {
                let stats = stats.clone();
                // four threads record 100us, four record 300us
                let sample = if i % 2 == 0 { 100 } else { 300 };
                std::thread::spawn(move || {
                    for _ in 0..500 {
                        stats.record(Duration::from_micros(sample), true);
                    }
                })
            })
            .collect();
        for worker in workers {
            worker.join().unwrap();
        }

        let snap = stats.snapshot();
        assert_eq!(snap.total_requests, 4_000);
        assert_eq!(snap.successful_requests, 4_000);
        // integer truncation of the running mean loses at most one micro
        assert!((198..=200).contains(&snap.avg_response_time_us), "{}", snap.avg_response_time_us);
    }
}
