//! Queue Simulator Core - Rust Engine
//!
//! High-performance discrete-event simulation core: a logical clock driven
//! by an ordered event queue, recycled event objects on the hot path, one
//! independent replica run per CPU core, and a merged statistics report at
//! the end.
//!
//! # Architecture
//!
//! - **events**: schedulable events, the ordered event store, recycling caches
//! - **core**: per-thread simulation state, logging hook, random-mode setup
//! - **runner**: worker threads and the multi-thread run lifecycle
//! - **coordinator**: model replicas, workload splitting, statistics merge
//! - **model**: the runnable-model boundary consumed by the engine
//! - **expression**: the numeric expression-evaluation contract
//!
//! # Critical Invariants
//!
//! 1. Within one worker, events execute in non-decreasing logical time
//! 2. Workers share nothing mutable except their control flags
//! 3. Statistics merging is associative and commutative
//!
//! # Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use queue_simulator_core_rs::{RunConfig, RunPriority, Simulator};
//!
//! let mut sim = Simulator::new(Arc::new(model), RunConfig::default())?;
//! sim.start(RunPriority::Normal, false)?;
//! let report = sim.finalize();
//! println!("{}", report.to_json()?);
//! ```

// Module declarations
pub mod coordinator;
pub mod core;
pub mod events;
pub mod expression;
pub mod model;
pub mod runner;

// Re-exports for convenience
pub use coordinator::balancer::{balance_skew, LoadBalancer, ProportionalBalancer};
pub use coordinator::statistics::{
    thread_confidence_intervals, ConfidenceInterval, ThreadStatistics,
};
pub use coordinator::{RunConfig, RunReport, Simulator, SimulatorError};
pub use crate::core::context::SimData;
pub use crate::core::logging::{LogEntry, LogSink, MemorySink, Severity};
pub use crate::core::random::{RandomMode, RandomModeRegistry};
pub use events::cache::{
    AssociativeCache, AssociativeCacheConfig, CachePolicy, EventCache, ListCache, NoOpCache,
    SharedListCache,
};
pub use events::event::{CacheTag, Event, EventBase};
pub use events::queue::{EventHandle, EventManager, PriorityEventQueue, RunSignals};
pub use expression::{ConstantExpression, EvalContext, EvalError, ExpressionEvaluator};
pub use model::{PrepareError, RunModel};
pub use runner::base::{ConfigError, EngineConfig, RunPriority, SimulatorBase, WorkerResult};
pub use runner::worker::{ContextFactory, ThreadInit, WorkerPhase};
