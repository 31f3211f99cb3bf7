//! Per-thread simulation state.
//!
//! One [`SimData`] belongs to exactly one worker: it owns that thread's
//! event queue, event cache and statistics accumulator, plus the logical
//! clock and day counters. Nothing in here is shared; the design is
//! share-nothing, with results merged only after workers finish.

use std::sync::Arc;

use crate::coordinator::statistics::ThreadStatistics;
use crate::core::logging::{LogEntry, LogSink, Severity};
use crate::core::random::{RandomMode, RandomModeLease};
use crate::events::cache::EventCache;
use crate::events::event::Event;
use crate::events::queue::{EventHandle, EventManager};
use crate::model::RunModel;

/// Simulation state owned by one worker thread.
///
/// Mutated only by its own worker and by the code running inside the
/// currently executing event; dropped after statistics are harvested.
pub struct SimData {
    /// Index of the owning worker, `0..thread_count`.
    pub thread_nr: usize,
    /// Total number of workers in this run.
    pub thread_count: usize,
    /// Logical clock, milliseconds. Advanced to each event's scheduled
    /// time just before the event executes.
    pub current_time: i64,
    /// Day (repetition) currently simulated, 0-based.
    pub current_day: usize,
    /// Total days this worker simulates.
    pub total_days: usize,
    /// This thread's share of the client workload, when a load balancer
    /// pre-split the run.
    pub client_budget: Option<u64>,
    /// Ordered event store, owned exclusively.
    pub events: Box<dyn EventManager>,
    /// Event recycling pool, owned exclusively (or an opt-in shared handle).
    pub cache: Box<dyn EventCache>,
    /// The immutable model definition (shared or per-thread replica).
    pub model: Arc<dyn RunModel>,
    /// This worker's statistics accumulator.
    pub stats: ThreadStatistics,
    /// Optional best-effort log sink.
    pub log: Option<Arc<dyn LogSink>>,
    random: Option<RandomModeLease>,
}

impl SimData {
    pub fn new(
        thread_nr: usize,
        thread_count: usize,
        total_days: usize,
        events: Box<dyn EventManager>,
        cache: Box<dyn EventCache>,
        model: Arc<dyn RunModel>,
    ) -> Self {
        Self {
            thread_nr,
            thread_count,
            current_time: 0,
            current_day: 0,
            total_days,
            client_budget: None,
            events,
            cache,
            model,
            stats: ThreadStatistics::new(),
            log: None,
            random: None,
        }
    }

    pub fn with_log(mut self, log: Arc<dyn LogSink>) -> Self {
        self.log = Some(log);
        self
    }

    pub fn with_client_budget(mut self, budget: Option<u64>) -> Self {
        self.client_budget = budget;
        self
    }

    pub fn with_random_lease(mut self, lease: RandomModeLease) -> Self {
        self.random = Some(lease);
        self
    }

    /// Configured random mode, if a lease was attached.
    pub fn random_mode(&self) -> Option<RandomMode> {
        self.random.as_ref().map(|lease| lease.mode())
    }

    /// Seed for this thread's random stream (`None`: seed from entropy).
    pub fn thread_seed(&self) -> Option<u64> {
        self.random_mode()
            .and_then(|mode| mode.seed_for_thread(self.thread_nr))
    }

    /// Recycled-or-fresh instance of a concrete event type.
    ///
    /// Pulls from the cache when possible, otherwise constructs via
    /// `Default`, the per-type factory registered at compile time. Never
    /// fails; cache misses are invisible to the caller.
    pub fn create_event<E: Event + Default>(&mut self) -> Box<E> {
        if let Some(recycled) = self.cache.get_or_recycle(std::any::TypeId::of::<E>()) {
            if let Ok(event) = recycled.into_any().downcast::<E>() {
                return event;
            }
        }
        Box::new(E::default())
    }

    /// Initialize and enqueue an event at the given logical time.
    pub fn schedule(&mut self, mut event: Box<dyn Event>, time: i64) -> EventHandle {
        event.base_mut().init(time);
        self.events.insert(event)
    }

    /// Return a finished event to the cache.
    pub fn recycle(&mut self, event: Box<dyn Event>) {
        self.cache.put(event);
    }

    /// Move events the queue skipped as deleted back into the cache.
    pub fn collect_reclaimed(&mut self) {
        let reclaimed = self.events.take_reclaimed();
        for event in reclaimed {
            self.cache.put(event);
        }
    }

    /// End-of-day cleanup: reclaim skipped events, then drop the pools.
    pub fn end_day(&mut self) {
        self.collect_reclaimed();
        self.cache.clear();
    }

    /// Emit a log line; no-op without a sink.
    pub fn log(&self, severity: Severity, message: impl Into<String>) {
        self.log_station(severity, None, message);
    }

    /// Emit a log line tagged with a station id.
    pub fn log_station(&self, severity: Severity, station: Option<u32>, message: impl Into<String>) {
        if let Some(sink) = &self.log {
            sink.log(LogEntry {
                time: self.current_time,
                severity,
                source: format!("worker-{}", self.thread_nr),
                station,
                message: message.into(),
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::logging::MemorySink;
    use crate::events::cache::ListCache;
    use crate::events::event::EventBase;
    use crate::events::queue::PriorityEventQueue;
    use crate::model::PrepareError;
    use std::any::Any;

    struct NullModel;

    impl RunModel for NullModel {
        fn prepare(&self) -> Result<(), PrepareError> {
            Ok(())
        }
        fn seed_day(&self, _sim: &mut SimData) {}
        fn deep_clone(&self) -> Arc<dyn RunModel> {
            Arc::new(NullModel)
        }
        fn as_any(&self) -> &dyn Any {
            self
        }
    }

    #[derive(Default)]
    struct Probe {
        base: EventBase,
        payload: u64,
    }

    impl Event for Probe {
        fn execute(&mut self, _sim: &mut SimData) {}
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
    }

    fn context() -> SimData {
        SimData::new(
            0,
            1,
            1,
            Box::new(PriorityEventQueue::new_detached()),
            Box::new(ListCache::new(16)),
            Arc::new(NullModel),
        )
    }

    #[test]
    fn create_event_reuses_recycled_instances() {
        let mut sim = context();
        let mut probe = sim.create_event::<Probe>();
        probe.payload = 99;
        sim.recycle(probe);
        let probe = sim.create_event::<Probe>();
        // Same instance back, payload intact until init.
        assert_eq!(probe.payload, 99);
        let fresh = sim.create_event::<Probe>();
        assert_eq!(fresh.payload, 0);
    }

    #[test]
    fn schedule_initializes_the_event() {
        let mut sim = context();
        let mut probe = sim.create_event::<Probe>();
        probe.base_mut().deleted = true;
        sim.schedule(probe, 42);
        let popped = sim.events.pop_next().expect("scheduled event");
        assert_eq!(popped.base().time, 42);
        assert!(!popped.base().deleted);
    }

    #[test]
    fn end_day_reclaims_skipped_events() {
        let mut sim = context();
        let probe = sim.create_event::<Probe>();
        let handle = sim.schedule(probe, 5);
        sim.events.cancel(handle);
        assert!(sim.events.pop_next().is_none());
        sim.collect_reclaimed();
        // The cancelled instance is pooled again.
        assert!(sim
            .cache
            .get_or_recycle(std::any::TypeId::of::<Probe>())
            .is_some());
        sim.end_day();
    }

    #[test]
    fn log_lines_carry_worker_identity() {
        let sink = Arc::new(MemorySink::new());
        let mut sim = context().with_log(sink.clone());
        sim.current_time = 77;
        sim.log(Severity::Info, "checkpoint");
        let entries = sink.drain();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].time, 77);
        assert_eq!(entries[0].source, "worker-0");
    }
}
