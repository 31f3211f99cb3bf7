//! Workload pre-splitting across threads.
//!
//! Load balancing here means dividing a fixed total of client arrivals
//! unevenly across worker threads *before* the run starts, to equalize
//! expected finish times, not runtime work-stealing. The concrete
//! balancing strategy is an external collaborator; this module carries the
//! consumed contract, a trivial proportional implementation, and the skew
//! diagnostic the coordinator reports.

/// Proposes how many clients each thread should generate.
pub trait LoadBalancer: Send + Sync {
    /// Split `total_clients` over `thread_count` threads. The returned
    /// vector must have `thread_count` entries summing to `total_clients`.
    fn propose_split(&self, total_clients: u64, thread_count: usize) -> Vec<u64>;
}

/// Even split with the remainder spread over the first threads.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProportionalBalancer;

impl LoadBalancer for ProportionalBalancer {
    fn propose_split(&self, total_clients: u64, thread_count: usize) -> Vec<u64> {
        if thread_count == 0 {
            return Vec::new();
        }
        let threads = thread_count as u64;
        let share = total_clients / threads;
        let remainder = total_clients % threads;
        (0..threads)
            .map(|i| if i < remainder { share + 1 } else { share })
            .collect()
    }
}

/// Diagnostic imbalance metric: `(max - min) * threads / total`.
///
/// Zero means a perfectly even split; `None` when the split is empty or
/// carries no clients.
pub fn balance_skew(split: &[u64]) -> Option<f64> {
    let total: u64 = split.iter().sum();
    if split.is_empty() || total == 0 {
        return None;
    }
    let max = *split.iter().max()?;
    let min = *split.iter().min()?;
    Some((max - min) as f64 * split.len() as f64 / total as f64)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn proportional_split_sums_to_total() {
        let split = ProportionalBalancer.propose_split(10, 4);
        assert_eq!(split, vec![3, 3, 2, 2]);
        assert_eq!(split.iter().sum::<u64>(), 10);
    }

    #[test]
    fn even_split_has_zero_skew() {
        let split = ProportionalBalancer.propose_split(8, 4);
        assert_eq!(balance_skew(&split), Some(0.0));
    }

    #[test]
    fn uneven_split_reports_positive_skew() {
        let skew = balance_skew(&[6, 2]).unwrap();
        // (6 - 2) * 2 / 8
        assert!((skew - 1.0).abs() < 1e-12);
    }

    #[test]
    fn degenerate_splits_have_no_skew() {
        assert_eq!(balance_skew(&[]), None);
        assert_eq!(balance_skew(&[0, 0]), None);
    }
}
