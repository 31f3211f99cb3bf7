//! Per-thread event execution.
//!
//! A [`Worker`] owns one OS thread and one [`SimData`]. The thread runs the
//! day loop: pop the next event, advance the logical clock, execute, recycle,
//! repeat until the queue is empty, then move to the next simulated day.
//!
//! Control is cooperative. The orchestrator writes pause/abort flags
//! ([`RunSignals`]) and step credits; the worker polls them between event
//! executions (never mid-event) and parks on a condvar while paused. A
//! panic inside an event degrades only its own worker: the day loop catches
//! it, records the diagnostic, and the worker still reaches `Finished` with
//! its partial statistics intact.

use std::any::Any;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use crate::coordinator::statistics::ThreadStatistics;
use crate::core::context::SimData;
use crate::core::logging::Severity;
use crate::events::queue::RunSignals;

/// How often the worker refreshes the externally visible queue length and
/// clock (in executed events). Event counts update per event; each counter
/// has a single writer, so there is nothing to contend on.
const PROGRESS_REFRESH_EVENTS: u64 = 1024;

/// Parked workers re-check their flags at least this often, so a missed
/// wakeup only costs one interval.
const PARK_RECHECK: Duration = Duration::from_millis(10);

/// Worker lifecycle state.
///
/// `Created -> Running -> {Paused <-> Running} -> Finished`, with
/// `Aborting` reachable from any non-terminal state. The orchestrator
/// detects abnormal termination via [`WorkerShared::is_clean`], never via a
/// propagating panic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerPhase {
    Created,
    Running,
    Paused,
    Aborting,
    Finished,
}

/// State a worker shares with the orchestrator.
///
/// The phase is the *observed* state (what the worker actually reached);
/// the pause/abort flags in [`RunSignals`] are the *requested* state. The
/// `_and_wait` orchestrator operations poll the former.
pub struct WorkerShared {
    phase: Mutex<WorkerPhase>,
    phase_changed: Condvar,
    events_executed: AtomicU64,
    queue_len: AtomicU64,
    current_time: AtomicI64,
    days_completed: AtomicU64,
    step_credits: AtomicU32,
    clean: AtomicBool,
    failure: Mutex<Option<String>>,
    result: Mutex<Option<ThreadStatistics>>,
}

impl WorkerShared {
    fn new() -> Self {
        Self {
            phase: Mutex::new(WorkerPhase::Created),
            phase_changed: Condvar::new(),
            events_executed: AtomicU64::new(0),
            queue_len: AtomicU64::new(0),
            current_time: AtomicI64::new(0),
            days_completed: AtomicU64::new(0),
            step_credits: AtomicU32::new(0),
            clean: AtomicBool::new(true),
            failure: Mutex::new(None),
            result: Mutex::new(None),
        }
    }

    fn lock_phase(&self) -> MutexGuard<'_, WorkerPhase> {
        // A poisoned phase lock would mean a panic escaped the worker's
        // catch_unwind; recover the guard rather than cascade.
        self.phase.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn phase(&self) -> WorkerPhase {
        *self.lock_phase()
    }

    fn set_phase(&self, phase: WorkerPhase) {
        *self.lock_phase() = phase;
        self.phase_changed.notify_all();
    }

    pub fn events_executed(&self) -> u64 {
        self.events_executed.load(Ordering::Relaxed)
    }

    pub fn queue_len(&self) -> u64 {
        self.queue_len.load(Ordering::Relaxed)
    }

    pub fn current_time(&self) -> i64 {
        self.current_time.load(Ordering::Relaxed)
    }

    pub fn days_completed(&self) -> u64 {
        self.days_completed.load(Ordering::Relaxed)
    }

    /// `false` once the worker hit a runtime fault.
    pub fn is_clean(&self) -> bool {
        self.clean.load(Ordering::Acquire)
    }

    pub fn failure(&self) -> Option<String> {
        self.failure
            .lock()
            .map(|f| f.clone())
            .unwrap_or(None)
    }

    fn record_failure(&self, message: String) {
        self.clean.store(false, Ordering::Release);
        if let Ok(mut failure) = self.failure.lock() {
            failure.get_or_insert(message);
        }
    }

    fn grant_step(&self) {
        self.step_credits.fetch_add(1, Ordering::AcqRel);
    }

    /// Discard unconsumed step credits so a resumed worker does not take a
    /// spurious extra step on its next pause.
    fn clear_steps(&self) {
        self.step_credits.store(0, Ordering::Release);
    }

    fn try_take_step(&self) -> bool {
        self.step_credits
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |credits| {
                credits.checked_sub(1)
            })
            .is_ok()
    }

    fn refresh_progress(&self, sim: &SimData) {
        self.queue_len.store(sim.events.len() as u64, Ordering::Relaxed);
        self.current_time.store(sim.current_time, Ordering::Relaxed);
    }

    fn store_result(&self, stats: ThreadStatistics) {
        if let Ok(mut result) = self.result.lock() {
            *result = Some(stats);
        }
    }

    /// Harvested once by the orchestrator after the worker finished.
    pub fn take_result(&self) -> Option<ThreadStatistics> {
        self.result.lock().ok().and_then(|mut r| r.take())
    }
}

enum ParkOutcome {
    Resume,
    StepOne,
    Abort,
}

enum DayOutcome {
    Completed,
    Aborted,
}

/// Thread-startup parameters handed to the context factory.
///
/// Contexts are built *inside* their worker thread so their allocations
/// land NUMA-local to the thread that uses them.
pub struct ThreadInit {
    pub thread_nr: usize,
    pub thread_count: usize,
    pub signals: Arc<RunSignals>,
}

/// Builds one worker's [`SimData`]; called once, inside the worker thread.
pub type ContextFactory = Arc<dyn Fn(ThreadInit) -> SimData + Send + Sync>;

/// Handle to one simulation thread.
pub struct Worker {
    thread_nr: usize,
    shared: Arc<WorkerShared>,
    signals: Arc<RunSignals>,
    handle: Option<JoinHandle<()>>,
}

impl Worker {
    /// Spawn the worker thread. With `start_paused` the pause flag is set
    /// before the thread starts, so it parks before executing any event.
    pub(crate) fn spawn(
        thread_nr: usize,
        thread_count: usize,
        factory: ContextFactory,
        start_paused: bool,
    ) -> std::io::Result<Worker> {
        let signals = Arc::new(RunSignals::new());
        if start_paused {
            signals.request_pause();
        }
        let shared = Arc::new(WorkerShared::new());
        let thread_shared = Arc::clone(&shared);
        let thread_signals = Arc::clone(&signals);
        let handle = std::thread::Builder::new()
            .name(format!("sim-worker-{thread_nr}"))
            .spawn(move || {
                worker_main(thread_nr, thread_count, factory, thread_shared, thread_signals);
            })?;
        Ok(Worker {
            thread_nr,
            shared,
            signals,
            handle: Some(handle),
        })
    }

    pub fn thread_nr(&self) -> usize {
        self.thread_nr
    }

    pub fn shared(&self) -> &WorkerShared {
        &self.shared
    }

    pub fn phase(&self) -> WorkerPhase {
        self.shared.phase()
    }

    pub fn request_pause(&self) {
        self.signals.request_pause();
        self.shared.phase_changed.notify_all();
    }

    pub fn resume(&self) {
        self.signals.clear_pause();
        self.shared.clear_steps();
        self.shared.phase_changed.notify_all();
    }

    pub fn request_abort(&self) {
        self.signals.request_abort();
        self.shared.phase_changed.notify_all();
    }

    /// Allow one more event while paused.
    pub fn grant_step(&self) {
        self.shared.grant_step();
        self.shared.phase_changed.notify_all();
    }

    /// Worker reached a terminal phase.
    pub fn is_finished(&self) -> bool {
        self.phase() == WorkerPhase::Finished
    }

    /// Block until the thread exits.
    pub fn join(&mut self) {
        if let Some(handle) = self.handle.take() {
            // A worker panic is already recorded via the failure slot.
            let _ = handle.join();
        }
    }

    /// Poll for termination up to `timeout`; joins and returns `true` on
    /// success, leaves the thread running and returns `false` otherwise
    /// (cooperative cancellation only, no force-kill).
    pub fn join_within(&mut self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        while self.phase() != WorkerPhase::Finished {
            if Instant::now() >= deadline {
                return false;
            }
            std::thread::sleep(Duration::from_millis(1));
        }
        self.join();
        true
    }
}

fn worker_main(
    thread_nr: usize,
    thread_count: usize,
    factory: ContextFactory,
    shared: Arc<WorkerShared>,
    signals: Arc<RunSignals>,
) {
    let mut sim = factory(ThreadInit {
        thread_nr,
        thread_count,
        signals: Arc::clone(&signals),
    });
    shared.set_phase(WorkerPhase::Running);

    for day in 0..sim.total_days {
        sim.current_day = day;
        if day > 0 {
            sim.events.reset_time();
            sim.collect_reclaimed();
        }
        sim.current_time = 0;
        let model = Arc::clone(&sim.model);
        model.seed_day(&mut sim);

        let outcome = catch_unwind(AssertUnwindSafe(|| run_day(&mut sim, &shared, &signals)));
        sim.end_day();
        shared.refresh_progress(&sim);

        match outcome {
            Ok(DayOutcome::Completed) => {
                sim.stats.days_completed += 1;
                shared.days_completed.fetch_add(1, Ordering::Relaxed);
            }
            Ok(DayOutcome::Aborted) => break,
            Err(payload) => {
                let message = format!(
                    "worker {} failed on day {}: {}",
                    thread_nr,
                    day,
                    panic_message(payload)
                );
                sim.log(Severity::Error, message.clone());
                shared.record_failure(message);
                break;
            }
        }
    }

    shared.store_result(std::mem::take(&mut sim.stats));
    drop(sim); // releases the random-mode lease before Finished is visible
    shared.set_phase(WorkerPhase::Finished);
}

fn run_day(sim: &mut SimData, shared: &WorkerShared, signals: &RunSignals) -> DayOutcome {
    loop {
        if signals.abort_requested() {
            shared.set_phase(WorkerPhase::Aborting);
            return DayOutcome::Aborted;
        }
        if signals.pause_requested() {
            shared.refresh_progress(sim);
            match park(shared, signals) {
                ParkOutcome::Abort => return DayOutcome::Aborted,
                ParkOutcome::Resume => {}
                ParkOutcome::StepOne => {
                    if !execute_one(sim, shared) {
                        return DayOutcome::Completed;
                    }
                    continue;
                }
            }
        }
        if !execute_one(sim, shared) {
            return DayOutcome::Completed;
        }
    }
}

/// Execute the next event; `false` when the day's queue is exhausted.
fn execute_one(sim: &mut SimData, shared: &WorkerShared) -> bool {
    let Some(mut event) = sim.events.pop_next() else {
        return false;
    };
    // The clock moves first: the effect must see its own time as "now".
    sim.current_time = event.base().time;
    event.execute(sim);
    if let Some(chained) = event.base_mut().chained.take() {
        if chained.base().deleted {
            sim.recycle(chained);
        } else {
            sim.events.insert(chained);
        }
    }
    sim.recycle(event);
    sim.stats.events_executed += 1;
    shared.events_executed.fetch_add(1, Ordering::Relaxed);
    if sim.stats.events_executed % PROGRESS_REFRESH_EVENTS == 0 {
        shared.refresh_progress(sim);
    }
    true
}

/// Block between events until resume, a step credit, or abort.
fn park(shared: &WorkerShared, signals: &RunSignals) -> ParkOutcome {
    let mut phase = shared.lock_phase();
    *phase = WorkerPhase::Paused;
    shared.phase_changed.notify_all();
    loop {
        if signals.abort_requested() {
            *phase = WorkerPhase::Aborting;
            return ParkOutcome::Abort;
        }
        if !signals.pause_requested() {
            *phase = WorkerPhase::Running;
            return ParkOutcome::Resume;
        }
        if shared.try_take_step() {
            // Phase stays Paused: a stepping worker is still logically
            // paused and re-parks right after the one event.
            return ParkOutcome::StepOne;
        }
        let (guard, _) = shared
            .phase_changed
            .wait_timeout(phase, PARK_RECHECK)
            .unwrap_or_else(|e| e.into_inner());
        phase = guard;
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unidentified panic payload".to_string()
    }
}
