//! Multi-thread run lifecycle.
//!
//! [`SimulatorBase`] spawns one [`Worker`] per resolved thread, broadcasts
//! pause/resume/step/abort to all of them, and combines their live counters
//! into aggregate progress queries. It knows nothing about models or
//! statistics merging; that is the run coordinator's job
//! ([`Simulator`](crate::coordinator::Simulator)).

use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::coordinator::statistics::ThreadStatistics;
use crate::runner::worker::{ContextFactory, Worker, WorkerPhase};

/// Assumed minimum per-thread footprint. Keeps the engine from
/// oversubscribing threads on memory-constrained hosts.
pub const MIN_THREAD_MEMORY_MB: u64 = 100;

/// Interval for polling observed worker state in the `_and_wait` and
/// cancellation paths. Workers may be at arbitrary points of independent
/// runs, so polling replaces a shared barrier.
const STATE_POLL: Duration = Duration::from_millis(1);

/// Configuration error: detected at construction, the run never starts.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("thread cap must be at least 1")]
    ZeroThreadCap,

    #[error("memory budget of {0} MB cannot host one worker (minimum {MIN_THREAD_MEMORY_MB} MB)")]
    MemoryBudgetTooSmall(u64),

    #[error("join timeout must be positive")]
    ZeroJoinTimeout,

    #[error("repeat count must be at least 1")]
    ZeroRepeatCount,
}

/// Advisory scheduling priority for worker threads.
///
/// Recorded and queryable; no OS-level priority call is made (safe std
/// offers none), so this only signals intent to embedders.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunPriority {
    Low,
    #[default]
    Normal,
    High,
}

/// Thread-count and lifecycle configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// User cap on worker threads.
    pub max_threads: usize,

    /// Spawn one worker more than there are cores. Useful when workers
    /// block on paging; off by default.
    #[serde(default)]
    pub use_extra_thread: bool,

    /// Memory the whole run may assume, in MB. Bounds the thread count at
    /// `memory_budget_mb / 100`.
    pub memory_budget_mb: u64,

    /// How long `cancel()` waits for each worker before giving up on it.
    pub join_timeout_ms: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_threads: usize::MAX,
            use_extra_thread: false,
            memory_budget_mb: 4096,
            join_timeout_ms: 10_000,
        }
    }
}

impl EngineConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_threads == 0 {
            return Err(ConfigError::ZeroThreadCap);
        }
        if self.memory_budget_mb < MIN_THREAD_MEMORY_MB {
            return Err(ConfigError::MemoryBudgetTooSmall(self.memory_budget_mb));
        }
        if self.join_timeout_ms == 0 {
            return Err(ConfigError::ZeroJoinTimeout);
        }
        Ok(())
    }

    /// Worker threads this host gets: `min(user cap, cores (+1 optional),
    /// memory budget cores)`, computed once at construction.
    pub fn resolve_thread_count(&self) -> Result<usize, ConfigError> {
        self.validate()?;
        let cores = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1);
        let cores = if self.use_extra_thread { cores + 1 } else { cores };
        let memory_cores = (self.memory_budget_mb / MIN_THREAD_MEMORY_MB) as usize;
        Ok(self.max_threads.min(cores).min(memory_cores).max(1))
    }
}

/// Outcome of one worker, harvested after it finished.
#[derive(Debug, Clone)]
pub struct WorkerResult {
    pub thread_nr: usize,
    pub statistics: ThreadStatistics,
    /// `false` when the worker terminated degraded (runtime fault).
    pub clean: bool,
    pub failure: Option<String>,
}

/// Spawns, controls and observes the worker pool.
pub struct SimulatorBase {
    config: EngineConfig,
    thread_count: usize,
    factory: ContextFactory,
    workers: Vec<Worker>,
    priority: RunPriority,
    started: bool,
    cancelled: bool,
    join_timeout_hit: bool,
    start_instant: Option<Instant>,
    run_time: Option<Duration>,
}

impl SimulatorBase {
    /// Validate the configuration and resolve the thread count. No thread
    /// is spawned yet.
    pub fn new(config: EngineConfig, factory: ContextFactory) -> Result<Self, ConfigError> {
        let thread_count = config.resolve_thread_count()?;
        Ok(Self {
            config,
            thread_count,
            factory,
            workers: Vec::new(),
            priority: RunPriority::Normal,
            started: false,
            cancelled: false,
            join_timeout_hit: false,
            start_instant: None,
            run_time: None,
        })
    }

    pub fn thread_count(&self) -> usize {
        self.thread_count
    }

    pub fn priority(&self) -> RunPriority {
        self.priority
    }

    /// Spawn the workers. Idempotent: a second call only re-records the
    /// advisory priority. With `start_paused` every worker parks before
    /// executing its first event.
    pub fn start(&mut self, priority: RunPriority, start_paused: bool) -> std::io::Result<()> {
        self.priority = priority;
        if self.started {
            return Ok(());
        }
        self.started = true;
        self.start_instant = Some(Instant::now());
        for thread_nr in 0..self.thread_count {
            let worker = Worker::spawn(
                thread_nr,
                self.thread_count,
                Arc::clone(&self.factory),
                start_paused,
            )?;
            self.workers.push(worker);
        }
        Ok(())
    }

    /// Request pause on every worker and return immediately.
    pub fn pause_execution(&self) {
        for worker in &self.workers {
            worker.request_pause();
        }
    }

    /// Request pause and block until every worker actually parked (or
    /// finished). Distinguishes observed from requested state, which is
    /// what deterministic UI snapshotting needs.
    pub fn pause_execution_and_wait(&self) {
        self.pause_execution();
        for worker in &self.workers {
            loop {
                match worker.phase() {
                    WorkerPhase::Paused | WorkerPhase::Finished => break,
                    _ => std::thread::sleep(STATE_POLL),
                }
            }
        }
    }

    /// Clear the pause request on every worker.
    pub fn resume_execution(&self) {
        for worker in &self.workers {
            worker.resume();
        }
    }

    /// Let every paused worker process exactly one more event. Workers
    /// observed running or finished get no credit. With `wait`, blocks
    /// until each stepped worker made progress: it executed its event,
    /// crossed a day boundary (the credit drained an empty day), or
    /// finished its run.
    pub fn step_execution(&self, wait: bool) {
        let mut stepped = Vec::new();
        for worker in &self.workers {
            if worker.phase() != WorkerPhase::Paused {
                continue;
            }
            let shared = worker.shared();
            stepped.push((worker, shared.events_executed(), shared.days_completed()));
            worker.grant_step();
        }
        if !wait {
            return;
        }
        for (worker, events, days) in stepped {
            loop {
                let shared = worker.shared();
                if shared.events_executed() > events
                    || shared.days_completed() > days
                    || worker.phase() == WorkerPhase::Finished
                {
                    break;
                }
                std::thread::sleep(STATE_POLL);
            }
        }
    }

    /// Cooperative cancellation: request abort everywhere, then join each
    /// worker within the configured timeout. Returns `false` if some
    /// worker overran the timeout: degraded but non-fatal, the thread is
    /// left to finish on its own.
    pub fn cancel(&mut self) -> bool {
        self.cancelled = true;
        for worker in &self.workers {
            worker.request_abort();
        }
        let timeout = Duration::from_millis(self.config.join_timeout_ms);
        let mut all_terminated = true;
        for worker in &mut self.workers {
            if !worker.join_within(timeout) {
                all_terminated = false;
            }
        }
        if !all_terminated {
            self.join_timeout_hit = true;
        }
        all_terminated
    }

    /// Block until every worker finished and record the total run time.
    /// Idempotent: later calls return the recorded time without
    /// recomputing it.
    pub fn finalize_run(&mut self) -> Duration {
        if let Some(run_time) = self.run_time {
            return run_time;
        }
        for worker in &mut self.workers {
            worker.join();
        }
        // Joins return at the latest worker completion; elapsed-since-start
        // at this point is the total run time.
        let run_time = self
            .start_instant
            .map(|start| start.elapsed())
            .unwrap_or_default();
        self.run_time = Some(run_time);
        run_time
    }

    /// Per-worker results. Meaningful after `finalize_run`.
    pub fn harvest(&mut self) -> Vec<WorkerResult> {
        self.workers
            .iter()
            .map(|worker| WorkerResult {
                thread_nr: worker.thread_nr(),
                statistics: worker.shared().take_result().unwrap_or_default(),
                clean: worker.shared().is_clean(),
                failure: worker.shared().failure(),
            })
            .collect()
    }

    // ------------------------------------------------------------------
    // Aggregate progress queries
    //
    // Safe to call concurrently with running workers: lock-free reads of
    // monotonically updated per-worker counters. Exact cross-counter
    // consistency is not guaranteed and not needed.
    // ------------------------------------------------------------------

    /// Total events executed across all workers.
    pub fn events_executed(&self) -> u64 {
        self.workers
            .iter()
            .map(|w| w.shared().events_executed())
            .sum()
    }

    /// Rough throughput over the whole run so far.
    pub fn events_per_second(&self) -> f64 {
        let elapsed = match (self.run_time, self.start_instant) {
            (Some(run_time), _) => run_time,
            (None, Some(start)) => start.elapsed(),
            (None, None) => return 0.0,
        };
        let secs = elapsed.as_secs_f64();
        if secs <= 0.0 {
            0.0
        } else {
            self.events_executed() as f64 / secs
        }
    }

    /// Sum of the workers' last-reported queue lengths.
    pub fn queue_len(&self) -> u64 {
        self.workers.iter().map(|w| w.shared().queue_len()).sum()
    }

    /// Simulated days completed across all workers.
    pub fn days_completed(&self) -> u64 {
        self.workers
            .iter()
            .map(|w| w.shared().days_completed())
            .sum()
    }

    /// Started and not yet fully finished.
    pub fn is_running(&self) -> bool {
        self.started && self.workers.iter().any(|w| !w.is_finished())
    }

    /// Every live worker is parked (and at least one is).
    pub fn is_paused(&self) -> bool {
        let mut any_paused = false;
        for worker in &self.workers {
            match worker.phase() {
                WorkerPhase::Paused => any_paused = true,
                WorkerPhase::Finished => {}
                _ => return false,
            }
        }
        any_paused
    }

    /// All workers finished without runtime faults.
    pub fn all_finished_clean(&self) -> bool {
        !self.workers.is_empty()
            && self
                .workers
                .iter()
                .all(|w| w.is_finished() && w.shared().is_clean())
    }

    /// Indices of workers that terminated degraded.
    pub fn degraded_threads(&self) -> Vec<usize> {
        self.workers
            .iter()
            .filter(|w| !w.shared().is_clean())
            .map(|w| w.thread_nr())
            .collect()
    }

    /// A `cancel()` was issued for this run.
    pub fn was_cancelled(&self) -> bool {
        self.cancelled
    }

    /// Some worker failed to terminate within the cancel timeout.
    pub fn join_timeout_hit(&self) -> bool {
        self.join_timeout_hit
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        assert_eq!(EngineConfig::default().validate(), Ok(()));
    }

    #[test]
    fn zero_thread_cap_is_rejected() {
        let config = EngineConfig {
            max_threads: 0,
            ..Default::default()
        };
        assert_eq!(config.validate(), Err(ConfigError::ZeroThreadCap));
    }

    #[test]
    fn tiny_memory_budget_is_rejected() {
        let config = EngineConfig {
            memory_budget_mb: 64,
            ..Default::default()
        };
        assert_eq!(
            config.resolve_thread_count(),
            Err(ConfigError::MemoryBudgetTooSmall(64))
        );
    }

    #[test]
    fn memory_budget_bounds_thread_count() {
        let config = EngineConfig {
            max_threads: usize::MAX,
            memory_budget_mb: 250, // room for two workers at 100 MB each
            ..Default::default()
        };
        assert!(config.resolve_thread_count().unwrap() <= 2);
    }

    #[test]
    fn user_cap_bounds_thread_count() {
        let config = EngineConfig {
            max_threads: 1,
            ..Default::default()
        };
        assert_eq!(config.resolve_thread_count(), Ok(1));
    }
}
