//! Per-thread simulation state and cross-cutting run services.
//!
//! # Components
//!
//! - **context**: [`SimData`], the state one worker owns exclusively
//! - **logging**: best-effort log hook
//! - **random**: explicit random-number mode, reference-counted in use

pub mod context;
pub mod logging;
pub mod random;

// Re-exports for convenience
pub use context::SimData;
pub use logging::{LogEntry, LogSink, MemorySink, Severity};
pub use random::{RandomMode, RandomModeLease, RandomModeRegistry};
