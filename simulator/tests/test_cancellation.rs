//! Cooperative cancellation semantics.

mod common;

use std::sync::Arc;
use std::time::{Duration, Instant};

use common::TickModel;
use queue_simulator_core_rs::{EngineConfig, RunConfig, RunPriority, Simulator};

fn endless_model() -> Arc<TickModel> {
    // Effectively endless: the chain would run for years.
    Arc::new(TickModel::chain(u64::MAX))
}

fn config(max_threads: usize) -> RunConfig {
    RunConfig {
        engine: EngineConfig {
            max_threads,
            join_timeout_ms: 5_000,
            ..Default::default()
        },
        ..Default::default()
    }
}

#[test]
fn cancel_terminates_a_busy_run_within_the_timeout() {
    let mut sim = Simulator::new(endless_model(), config(2)).unwrap();
    sim.start(RunPriority::Normal, false).unwrap();
    std::thread::sleep(Duration::from_millis(30));
    assert!(sim.is_running());

    let started = Instant::now();
    let all_terminated = sim.cancel();
    assert!(all_terminated);
    assert!(started.elapsed() < Duration::from_secs(5));
    assert!(!sim.join_timeout_hit());

    let report = sim.finalize();
    assert!(report.cancelled);
    // Cancellation is a normal terminal state, not a fault.
    assert!(report.all_clean);
    assert!(report.statistics.events_executed > 0);
    assert!(!sim.is_running());
}

#[test]
fn cancel_wakes_a_paused_worker() {
    let mut sim = Simulator::new(endless_model(), config(1)).unwrap();
    sim.start(RunPriority::Normal, false).unwrap();
    sim.pause_execution_and_wait();
    assert!(sim.is_paused());

    // The parked worker must not hang inside its pause wait.
    assert!(sim.cancel());
    let report = sim.finalize();
    assert!(report.cancelled);
    assert!(report.all_clean);
}

#[test]
fn cancel_before_any_progress_still_terminates() {
    let mut sim = Simulator::new(endless_model(), config(2)).unwrap();
    sim.start(RunPriority::Normal, true).unwrap();
    sim.pause_execution_and_wait();
    assert_eq!(sim.events_executed(), 0);
    assert!(sim.cancel());
    let report = sim.finalize();
    assert!(report.cancelled);
    assert_eq!(report.statistics.events_executed, 0);
}
