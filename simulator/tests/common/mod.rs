//! Shared test model: a self-perpetuating tick chain.
//!
//! Each simulated day seeds one `TickEvent`; every tick records a waiting
//! time and schedules its successor until the chain budget runs out. The
//! tick spacing comes through the expression-evaluator contract, so the
//! consumed interfaces are exercised end to end.

#![allow(dead_code)]

use std::any::Any;
use std::sync::Arc;

use queue_simulator_core_rs::{
    ConstantExpression, EvalContext, Event, EventBase, ExpressionEvaluator, PrepareError,
    RunModel, SimData,
};

/// Deterministic chain-of-ticks model.
#[derive(Clone)]
pub struct TickModel {
    /// Ticks per thread per day (overridden by a balancer client budget).
    pub ticks_per_day: u64,
    /// Spacing between ticks, evaluated per event.
    pub spacing: ConstantExpression,
    /// Advertised workload for the load balancer.
    pub total_clients: u64,
    /// Waiting time recorded per tick: `base + thread_nr * offset`.
    pub waiting_base: f64,
    pub per_thread_offset: f64,
    /// Inject a fault: this thread panics on its n-th tick.
    pub fail_thread: Option<(usize, u64)>,
}

impl TickModel {
    pub fn chain(ticks_per_day: u64) -> Self {
        Self {
            ticks_per_day,
            spacing: ConstantExpression(1.0),
            total_clients: 0,
            waiting_base: 1.0,
            per_thread_offset: 0.0,
            fail_thread: None,
        }
    }
}

impl RunModel for TickModel {
    fn prepare(&self) -> Result<(), PrepareError> {
        if self.ticks_per_day == 0 {
            return Err(PrepareError::InvalidModel(
                "tick chain needs at least one tick per day".to_string(),
            ));
        }
        Ok(())
    }

    fn seed_day(&self, sim: &mut SimData) {
        let budget = sim.client_budget.unwrap_or(self.ticks_per_day);
        if budget == 0 {
            return;
        }
        let mut first = sim.create_event::<TickEvent>();
        first.remaining = budget;
        sim.schedule(first, 0);
    }

    fn total_clients(&self) -> u64 {
        self.total_clients
    }

    fn deep_clone(&self) -> Arc<dyn RunModel> {
        Arc::new(self.clone())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

#[derive(Default)]
pub struct TickEvent {
    base: EventBase,
    pub remaining: u64,
}

impl Event for TickEvent {
    fn execute(&mut self, sim: &mut SimData) {
        let model = sim
            .model
            .as_any()
            .downcast_ref::<TickModel>()
            .expect("tick events only run inside a TickModel");
        let waiting = model.waiting_base + sim.thread_nr as f64 * model.per_thread_offset;
        let fail_thread = model.fail_thread;
        let spacing = model
            .spacing
            .evaluate(&EvalContext::at(sim.current_time, sim.thread_nr))
            .expect("constant spacing evaluates") as i64;

        sim.stats.record_waiting_time(waiting);
        if let Some((thread_nr, at_tick)) = fail_thread {
            if sim.thread_nr == thread_nr && sim.stats.events_executed + 1 >= at_tick {
                panic!("injected fault");
            }
        }
        if self.remaining > 1 {
            let remaining = self.remaining - 1;
            let next_time = sim.current_time + spacing.max(1);
            let mut next = sim.create_event::<TickEvent>();
            next.remaining = remaining;
            sim.schedule(next, next_time);
        }
    }

    fn base(&self) -> &EventBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut EventBase {
        &mut self.base
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn into_any(self: Box<Self>) -> Box<dyn Any> {
        self
    }

    fn label(&self) -> &'static str {
        "tick"
    }
}

/// Model that records one visit per fixed timestamp, in the order given.
#[derive(Clone)]
pub struct VisitModel {
    pub times: Vec<i64>,
}

impl RunModel for VisitModel {
    fn prepare(&self) -> Result<(), PrepareError> {
        Ok(())
    }

    fn seed_day(&self, sim: &mut SimData) {
        for &time in &self.times {
            let visit = sim.create_event::<VisitEvent>();
            sim.schedule(visit, time);
        }
    }

    fn deep_clone(&self) -> Arc<dyn RunModel> {
        Arc::new(self.clone())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Records the visit by logging the current logical time as waiting time.
#[derive(Default)]
pub struct VisitEvent {
    base: EventBase,
}

impl Event for VisitEvent {
    fn execute(&mut self, sim: &mut SimData) {
        // The worker must have advanced the clock before the effect runs.
        assert_eq!(sim.current_time, self.base.time);
        sim.stats.record_waiting_time(sim.current_time as f64);
    }

    fn base(&self) -> &EventBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut EventBase {
        &mut self.base
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn into_any(self: Box<Self>) -> Box<dyn Any> {
        self
    }

    fn label(&self) -> &'static str {
        "record visit"
    }
}
