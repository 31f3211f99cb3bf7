//! Per-thread statistics accumulators and their cross-thread merge.
//!
//! Each worker fills one [`ThreadStatistics`] while it runs; after all
//! workers finish, the run coordinator folds them into one aggregate. The
//! merge is associative and commutative: partial accumulators merged in any
//! order equal the accumulator of a single-threaded run over the union of
//! all events (modulo floating-point summation order). That property is
//! what makes share-nothing parallelism safe, and it is covered by tests.

use serde::{Deserialize, Serialize};

/// Waiting-time and throughput accumulator for one worker.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ThreadStatistics {
    /// Clients whose waiting time was recorded.
    pub clients: u64,
    /// Sum of recorded waiting times.
    pub waiting_sum: f64,
    /// Sum of squared waiting times (for the standard deviation).
    pub waiting_sq_sum: f64,
    /// Smallest recorded waiting time.
    pub waiting_min: Option<f64>,
    /// Largest recorded waiting time.
    pub waiting_max: Option<f64>,
    /// Events this worker executed.
    pub events_executed: u64,
    /// Simulated days this worker completed.
    pub days_completed: u64,
}

impl ThreadStatistics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one client's waiting time.
    pub fn record_waiting_time(&mut self, waiting: f64) {
        self.clients += 1;
        self.waiting_sum += waiting;
        self.waiting_sq_sum += waiting * waiting;
        self.waiting_min = Some(match self.waiting_min {
            Some(min) => min.min(waiting),
            None => waiting,
        });
        self.waiting_max = Some(match self.waiting_max {
            Some(max) => max.max(waiting),
            None => waiting,
        });
    }

    /// Mean waiting time, `None` before the first recording.
    pub fn mean_waiting_time(&self) -> Option<f64> {
        if self.clients == 0 {
            None
        } else {
            Some(self.waiting_sum / self.clients as f64)
        }
    }

    /// Sample standard deviation of waiting times, `None` below two
    /// recordings.
    pub fn waiting_std_dev(&self) -> Option<f64> {
        if self.clients < 2 {
            return None;
        }
        let n = self.clients as f64;
        let variance = (self.waiting_sq_sum - self.waiting_sum * self.waiting_sum / n) / (n - 1.0);
        Some(variance.max(0.0).sqrt())
    }

    /// Fold another accumulator into this one. Associative, commutative.
    pub fn merge(&mut self, other: &ThreadStatistics) {
        self.clients += other.clients;
        self.waiting_sum += other.waiting_sum;
        self.waiting_sq_sum += other.waiting_sq_sum;
        self.waiting_min = match (self.waiting_min, other.waiting_min) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        };
        self.waiting_max = match (self.waiting_max, other.waiting_max) {
            (Some(a), Some(b)) => Some(a.max(b)),
            (a, b) => a.or(b),
        };
        self.events_executed += other.events_executed;
        self.days_completed += other.days_completed;
    }
}

/// Confidence interval over the per-thread waiting-time means.
///
/// Each thread's final mean is treated as one independent sample and a
/// normal-approximation interval is computed over those N samples. With N
/// equal to the thread count (often 2-8) this is a coarse, best-effort
/// robustness diagnostic, not a rigorous interval; the full statistical
/// engine of the surrounding application is the authoritative source.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ConfidenceInterval {
    /// Confidence level, e.g. `0.95`.
    pub level: f64,
    pub lower: f64,
    pub upper: f64,
}

/// Normal quantiles for the standard reporting levels.
const LEVELS: [(f64, f64); 3] = [(0.90, 1.6449), (0.95, 1.9600), (0.99, 2.5758)];

/// Thread-partition confidence intervals from per-thread means.
///
/// Returns an empty vector below two samples: a single thread carries no
/// between-thread variance to estimate.
pub fn thread_confidence_intervals(thread_means: &[f64]) -> Vec<ConfidenceInterval> {
    let n = thread_means.len();
    if n < 2 {
        return Vec::new();
    }
    let nf = n as f64;
    let mean = thread_means.iter().sum::<f64>() / nf;
    let variance = thread_means
        .iter()
        .map(|m| (m - mean) * (m - mean))
        .sum::<f64>()
        / (nf - 1.0);
    let std_err = (variance.max(0.0) / nf).sqrt();
    LEVELS
        .iter()
        .map(|&(level, z)| ConfidenceInterval {
            level,
            lower: mean - z * std_err,
            upper: mean + z * std_err,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn filled(values: &[f64]) -> ThreadStatistics {
        let mut stats = ThreadStatistics::new();
        for &v in values {
            stats.record_waiting_time(v);
        }
        stats
    }

    #[test]
    fn mean_and_std_dev() {
        let stats = filled(&[2.0, 4.0, 6.0]);
        assert_eq!(stats.clients, 3);
        assert_eq!(stats.mean_waiting_time(), Some(4.0));
        assert!((stats.waiting_std_dev().unwrap() - 2.0).abs() < 1e-12);
        assert_eq!(stats.waiting_min, Some(2.0));
        assert_eq!(stats.waiting_max, Some(6.0));
    }

    #[test]
    fn merge_matches_single_accumulator() {
        let whole = filled(&[1.0, 2.0, 3.0, 4.0]);
        let mut left = filled(&[1.0, 2.0]);
        let right = filled(&[3.0, 4.0]);
        left.merge(&right);
        assert_eq!(left, whole);
    }

    #[test]
    fn merge_is_commutative() {
        let mut ab = filled(&[1.0, 5.0]);
        ab.merge(&filled(&[2.0]));
        let mut ba = filled(&[2.0]);
        ba.merge(&filled(&[1.0, 5.0]));
        assert_eq!(ab.clients, ba.clients);
        assert!((ab.waiting_sum - ba.waiting_sum).abs() < 1e-12);
        assert_eq!(ab.waiting_min, ba.waiting_min);
        assert_eq!(ab.waiting_max, ba.waiting_max);
    }

    #[test]
    fn merge_with_empty_is_identity() {
        let mut stats = filled(&[3.0]);
        stats.merge(&ThreadStatistics::new());
        assert_eq!(stats, filled(&[3.0]));
    }

    #[test]
    fn intervals_need_two_threads() {
        assert!(thread_confidence_intervals(&[]).is_empty());
        assert!(thread_confidence_intervals(&[5.0]).is_empty());
        let intervals = thread_confidence_intervals(&[4.0, 6.0]);
        assert_eq!(intervals.len(), 3);
        for ci in &intervals {
            assert!(ci.lower <= 5.0 && 5.0 <= ci.upper);
        }
        // Wider level, wider interval.
        assert!(intervals[2].upper - intervals[2].lower > intervals[0].upper - intervals[0].lower);
    }

    #[test]
    fn zero_variance_collapses_the_interval() {
        let intervals = thread_confidence_intervals(&[3.0, 3.0, 3.0]);
        for ci in intervals {
            assert!((ci.lower - 3.0).abs() < 1e-12);
            assert!((ci.upper - 3.0).abs() < 1e-12);
        }
    }
}
