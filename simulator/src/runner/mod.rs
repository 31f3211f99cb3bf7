//! Worker threads and the multi-thread run lifecycle.
//!
//! # Components
//!
//! - **worker**: one OS thread running the event-execution day loop
//! - **base**: [`SimulatorBase`], the orchestrator spawning and controlling
//!   the worker pool

pub mod base;
pub mod worker;

// Re-exports for convenience
pub use base::{
    ConfigError, EngineConfig, RunPriority, SimulatorBase, WorkerResult, MIN_THREAD_MEMORY_MB,
};
pub use worker::{ContextFactory, ThreadInit, Worker, WorkerPhase, WorkerShared};
