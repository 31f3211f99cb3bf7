//! Runnable-model boundary.
//!
//! The concrete queueing layout (stations, resources, client types) lives
//! outside this core. The engine only needs a [`RunModel`]: something that
//! can validate itself before any thread spawns and seed the initial
//! events of each simulated day into a per-thread context.

use std::any::Any;
use std::sync::Arc;

use thiserror::Error;

use crate::core::context::SimData;
use crate::expression::EvalError;

/// Model cannot be turned into a runnable replica.
///
/// Surfaced synchronously from [`RunModel::prepare`] before any worker is
/// spawned, so there is no partial state to unwind.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum PrepareError {
    /// Structural problem in the model definition.
    #[error("invalid model: {0}")]
    InvalidModel(String),

    /// A model expression failed to evaluate during preparation.
    #[error("expression error during preparation: {0}")]
    Evaluation(#[from] EvalError),
}

/// An immutable, runnable model definition.
///
/// Prepared once by the run coordinator and then either shared read-only
/// across workers (`Arc`) or deep-cloned per thread for NUMA-local data.
/// No worker may mutate the model after preparation.
pub trait RunModel: Send + Sync + 'static {
    /// Validate the model. Called once before any worker starts.
    fn prepare(&self) -> Result<(), PrepareError>;

    /// Schedule the initial events of the current simulated day.
    ///
    /// Called once per day per worker, after the event queue has been
    /// reset. `sim.current_day` identifies the repetition;
    /// `sim.client_budget` carries this thread's share of the workload
    /// when a load balancer pre-split it.
    fn seed_day(&self, sim: &mut SimData);

    /// Total client arrivals one full run generates, across all threads.
    /// Zero opts out of load balancing.
    fn total_clients(&self) -> u64 {
        0
    }

    /// Independent copy for per-thread replication.
    fn deep_clone(&self) -> Arc<dyn RunModel>;

    /// Downcast access for model-specific event implementations.
    fn as_any(&self) -> &dyn Any;
}
