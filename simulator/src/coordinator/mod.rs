//! Run coordinator: model replicas, workload splitting, statistics merge.
//!
//! [`Simulator`] sits on top of the thread-lifecycle machinery in
//! [`runner`](crate::runner): it prepares one immutable model, decides how
//! each worker thread gets its replica (shared read-only or deep-cloned),
//! optionally pre-splits the client workload through a
//! [`LoadBalancer`](balancer::LoadBalancer), and after the run merges every
//! worker's statistics into a single [`RunReport`], including the
//! thread-partition confidence intervals and the run-length stability
//! check.
//!
//! # Components
//!
//! - **statistics**: per-thread accumulators and their associative merge
//! - **balancer**: workload pre-splitting contract and skew diagnostic

pub mod balancer;
pub mod statistics;

use std::ops::{Deref, DerefMut};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::core::context::SimData;
use crate::core::logging::{LogEntry, LogSink, Severity};
use crate::core::random::{RandomMode, RandomModeRegistry};
use crate::events::cache::{
    AssociativeCache, CachePolicy, EventCache, ListCache, NoOpCache, SharedListCache,
};
use crate::events::queue::{EventManager, PriorityEventQueue};
use crate::model::{PrepareError, RunModel};
use crate::runner::base::{ConfigError, EngineConfig, RunPriority, SimulatorBase};
use crate::runner::worker::{ContextFactory, ThreadInit};

use balancer::{balance_skew, LoadBalancer};
use statistics::{thread_confidence_intervals, ConfidenceInterval, ThreadStatistics};

/// Relative first-half/second-half discrepancy above which the run-length
/// stability warning fires.
const STABILITY_WARNING_THRESHOLD: f64 = 0.10;

/// Setup failure: either the configuration or the model preparation.
/// Either way, no thread was spawned and there is nothing to unwind.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum SimulatorError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Prepare(#[from] PrepareError),
}

/// Complete run configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunConfig {
    /// Thread-count and lifecycle settings.
    pub engine: EngineConfig,

    /// Simulated days (independent repetitions) per worker.
    pub repeat_count: usize,

    /// Event recycling variant.
    #[serde(default)]
    pub cache_policy: CachePolicy,

    /// Random-number mode, threaded explicitly through setup.
    #[serde(default)]
    pub random_mode: RandomMode,

    /// Deep-clone the model per thread (NUMA-local data) instead of
    /// sharing one read-only instance.
    #[serde(default)]
    pub clone_model_per_thread: bool,

    /// The model carries an explicit termination condition. Suppresses the
    /// run-length stability warning.
    #[serde(default)]
    pub termination_condition_configured: bool,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            engine: EngineConfig::default(),
            repeat_count: 1,
            cache_policy: CachePolicy::default(),
            random_mode: RandomMode::default(),
            clone_model_per_thread: false,
            termination_condition_configured: false,
        }
    }
}

impl RunConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.engine.validate()?;
        if self.repeat_count == 0 {
            return Err(ConfigError::ZeroRepeatCount);
        }
        Ok(())
    }
}

/// Final merged result of one run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunReport {
    pub run_id: Uuid,
    pub threads: usize,
    pub repeat_count: usize,
    /// All workers' accumulators merged into one.
    pub statistics: ThreadStatistics,
    /// Final mean waiting time of each thread that served clients.
    pub thread_means: Vec<f64>,
    /// Thread-partition confidence intervals (90/95/99 %). Empty for
    /// single-thread runs; a coarse diagnostic either way.
    pub confidence: Vec<ConfidenceInterval>,
    /// Workload imbalance diagnostic, when a balancer pre-split the run.
    pub balance_skew: Option<f64>,
    pub run_time_ms: u64,
    /// The run ended through `cancel()` rather than natural completion.
    pub cancelled: bool,
    /// Every worker finished without runtime faults.
    pub all_clean: bool,
    pub degraded_threads: Vec<usize>,
    /// Non-fatal observations, e.g. the run-length stability warning.
    pub warnings: Vec<String>,
}

impl RunReport {
    /// Hand-off format for external consumers (editor, exporters, remote
    /// front ends).
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}

enum CacheBuilder {
    Fresh(CachePolicy),
    Shared(SharedListCache),
}

impl CacheBuilder {
    fn build(&self) -> Box<dyn EventCache> {
        match self {
            CacheBuilder::Fresh(CachePolicy::NoOp) => Box::new(NoOpCache),
            CacheBuilder::Fresh(CachePolicy::PerTypeList { capacity_per_type }) => {
                Box::new(ListCache::new(*capacity_per_type))
            }
            CacheBuilder::Fresh(CachePolicy::Associative(config)) => {
                Box::new(AssociativeCache::new(*config))
            }
            // SharedList is pre-built so every worker gets the same pool.
            CacheBuilder::Fresh(CachePolicy::SharedList { capacity_per_type }) => {
                Box::new(SharedListCache::new(*capacity_per_type))
            }
            CacheBuilder::Shared(cache) => Box::new(cache.clone()),
        }
    }
}

/// Domain-level simulator: one prepared model, N independent replica runs,
/// one merged report.
///
/// Dereferences to [`SimulatorBase`] for the lifecycle and progress API
/// (`start`, `pause_execution_and_wait`, `cancel`, `events_per_second`,
/// ...).
///
/// # Example
///
/// ```rust,ignore
/// let model = Arc::new(MyQueueModel::from_definition(def));
/// let mut sim = Simulator::new(model, RunConfig::default())?;
/// sim.start(RunPriority::Normal, false)?;
/// let report = sim.finalize();
/// println!("{} events, mean wait {:?}",
///          report.statistics.events_executed,
///          report.statistics.mean_waiting_time());
/// ```
pub struct Simulator {
    base: SimulatorBase,
    config: RunConfig,
    run_id: Uuid,
    random: Arc<RandomModeRegistry>,
    split: Option<Vec<u64>>,
    skew: Option<f64>,
    log: Option<Arc<dyn LogSink>>,
    report: Option<RunReport>,
}

impl Simulator {
    /// Prepare a run without a load balancer or log sink.
    pub fn new(model: Arc<dyn RunModel>, config: RunConfig) -> Result<Self, SimulatorError> {
        Self::new_with(model, config, None, None)
    }

    /// Prepare a run.
    ///
    /// Validates the configuration, prepares the model (both synchronous,
    /// before any thread exists), resolves the thread count and, for
    /// single-repeat multi-thread runs over a known client total, asks
    /// the balancer to pre-split the workload.
    pub fn new_with(
        model: Arc<dyn RunModel>,
        config: RunConfig,
        balancer: Option<&dyn LoadBalancer>,
        log: Option<Arc<dyn LogSink>>,
    ) -> Result<Self, SimulatorError> {
        config.validate()?;
        model.prepare()?;
        let thread_count = config.engine.resolve_thread_count()?;

        let mut split = None;
        let mut skew = None;
        if let Some(balancer) = balancer {
            let total_clients = model.total_clients();
            if config.repeat_count == 1 && thread_count > 1 && total_clients > 0 {
                let proposal = balancer.propose_split(total_clients, thread_count);
                skew = balance_skew(&proposal);
                split = Some(proposal);
            }
        }

        let random = RandomModeRegistry::new(config.random_mode);
        let cache_builder = match &config.cache_policy {
            CachePolicy::SharedList { capacity_per_type } => {
                CacheBuilder::Shared(SharedListCache::new(*capacity_per_type))
            }
            policy => CacheBuilder::Fresh(policy.clone()),
        };

        let factory = Self::context_factory(
            Arc::clone(&model),
            &config,
            cache_builder,
            split.clone(),
            Arc::clone(&random),
            log.clone(),
        );
        let base = SimulatorBase::new(config.engine.clone(), factory)?;

        Ok(Self {
            base,
            config,
            run_id: Uuid::new_v4(),
            random,
            split,
            skew,
            log,
            report: None,
        })
    }

    fn context_factory(
        model: Arc<dyn RunModel>,
        config: &RunConfig,
        cache_builder: CacheBuilder,
        split: Option<Vec<u64>>,
        random: Arc<RandomModeRegistry>,
        log: Option<Arc<dyn LogSink>>,
    ) -> ContextFactory {
        let repeat_count = config.repeat_count;
        let clone_per_thread = config.clone_model_per_thread;
        Arc::new(move |init: ThreadInit| {
            // Runs inside the worker thread: replicas and queues allocate
            // local to the thread that will use them.
            let replica = if clone_per_thread {
                model.deep_clone()
            } else {
                Arc::clone(&model)
            };
            let events: Box<dyn EventManager> =
                Box::new(PriorityEventQueue::new(Arc::clone(&init.signals)));
            let budget = split
                .as_ref()
                .and_then(|s| s.get(init.thread_nr).copied());
            let mut sim = SimData::new(
                init.thread_nr,
                init.thread_count,
                repeat_count,
                events,
                cache_builder.build(),
                replica,
            )
            .with_client_budget(budget)
            .with_random_lease(random.acquire());
            if let Some(sink) = &log {
                sim = sim.with_log(Arc::clone(sink));
            }
            sim
        })
    }

    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    pub fn config(&self) -> &RunConfig {
        &self.config
    }

    /// Per-thread client split proposed by the balancer, if any.
    pub fn client_split(&self) -> Option<&[u64]> {
        self.split.as_deref()
    }

    /// Workload imbalance diagnostic from the balancer split.
    pub fn balance_skew(&self) -> Option<f64> {
        self.skew
    }

    /// Contexts currently holding the configured random mode.
    pub fn random_mode_in_use(&self) -> usize {
        self.random.in_use()
    }

    /// Start and block to completion, returning the merged report.
    pub fn run_to_completion(&mut self) -> std::io::Result<&RunReport> {
        self.base.start(RunPriority::Normal, false)?;
        Ok(self.finalize())
    }

    /// Block until all workers finished and merge their statistics.
    /// Idempotent: later calls return the same report.
    pub fn finalize(&mut self) -> &RunReport {
        if self.report.is_none() {
            let report = self.build_report();
            self.report = Some(report);
        }
        match &self.report {
            Some(report) => report,
            None => unreachable!("report was just built"),
        }
    }

    fn build_report(&mut self) -> RunReport {
        let run_time = self.base.finalize_run();
        let results = self.base.harvest();

        let thread_means: Vec<f64> = results
            .iter()
            .filter_map(|r| r.statistics.mean_waiting_time())
            .collect();

        // Single thread: take the accumulator as-is, no merge overhead.
        let statistics = if results.len() == 1 {
            results[0].statistics.clone()
        } else {
            let mut merged = ThreadStatistics::new();
            for result in &results {
                merged.merge(&result.statistics);
            }
            merged
        };

        let confidence = if results.len() > 1 {
            thread_confidence_intervals(&thread_means)
        } else {
            Vec::new()
        };

        let mut warnings = Vec::new();
        if !self.config.termination_condition_configured {
            if let Some(discrepancy) = half_split_discrepancy(&thread_means) {
                if discrepancy > STABILITY_WARNING_THRESHOLD {
                    let warning = format!(
                        "mean waiting time differs by {:.1}% between the first and second \
                         half of the threads; the run may be too short for statistical stability",
                        discrepancy * 100.0
                    );
                    if let Some(sink) = &self.log {
                        sink.log(LogEntry {
                            time: 0,
                            severity: Severity::Warning,
                            source: "coordinator".to_string(),
                            station: None,
                            message: warning.clone(),
                        });
                    }
                    warnings.push(warning);
                }
            }
        }

        RunReport {
            run_id: self.run_id,
            threads: self.base.thread_count(),
            repeat_count: self.config.repeat_count,
            statistics,
            thread_means,
            confidence,
            balance_skew: self.skew,
            run_time_ms: run_time.as_millis() as u64,
            cancelled: self.base.was_cancelled(),
            all_clean: self.base.all_finished_clean(),
            degraded_threads: self.base.degraded_threads(),
            warnings,
        }
    }
}

impl Deref for Simulator {
    type Target = SimulatorBase;

    fn deref(&self) -> &SimulatorBase {
        &self.base
    }
}

impl DerefMut for Simulator {
    fn deref_mut(&mut self) -> &mut SimulatorBase {
        &mut self.base
    }
}

/// Relative discrepancy between the mean of the first and second half of
/// the per-thread means; `None` below two samples or around zero means.
fn half_split_discrepancy(thread_means: &[f64]) -> Option<f64> {
    if thread_means.len() < 2 {
        return None;
    }
    let mid = thread_means.len() / 2;
    let first = &thread_means[..mid];
    let second = &thread_means[mid..];
    let mean = |s: &[f64]| s.iter().sum::<f64>() / s.len() as f64;
    let (a, b) = (mean(first), mean(second));
    let scale = a.abs().max(b.abs());
    if !scale.is_finite() || scale == 0.0 {
        return None;
    }
    Some((a - b).abs() / scale)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn half_split_discrepancy_detects_imbalance() {
        assert_eq!(half_split_discrepancy(&[1.0]), None);
        let d = half_split_discrepancy(&[1.0, 1.0, 2.0, 2.0]).unwrap();
        assert!((d - 0.5).abs() < 1e-12);
        let d = half_split_discrepancy(&[3.0, 3.0]).unwrap();
        assert_eq!(d, 0.0);
    }

    #[test]
    fn run_config_validates_repeat_count() {
        let config = RunConfig {
            repeat_count: 0,
            ..Default::default()
        };
        assert_eq!(config.validate(), Err(ConfigError::ZeroRepeatCount));
    }
}
