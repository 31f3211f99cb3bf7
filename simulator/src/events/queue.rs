//! Ordered event store and run-control signals.
//!
//! [`EventManager`] is the contract the rest of the core consumes: insert,
//! cancel, pop-next, peek-time, day reset, plus the thread-safe pause/abort
//! flags a worker polls between event executions.
//!
//! [`PriorityEventQueue`] is the default implementation: a binary min-heap
//! keyed by `(time, insertion sequence)`. Ties on time therefore pop in
//! stable insertion order, and popping from an empty queue is the normal
//! "day is over" signal, never an error.

use std::cmp::{Ordering, Reverse};
use std::collections::{BinaryHeap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering as AtomicOrdering};
use std::sync::Arc;

use super::event::Event;

/// Handle to a queued event, used for soft-removal without list surgery.
pub type EventHandle = u64;

/// Pause/abort request flags shared between the orchestrator (writer) and
/// one worker (reader).
///
/// These are plain atomics: requesting is instant, the worker observes the
/// request at its next polling point between events.
#[derive(Debug, Default)]
pub struct RunSignals {
    pause: AtomicBool,
    abort: AtomicBool,
}

impl RunSignals {
    pub fn new() -> Self {
        Self::default()
    }

    /// Ask the worker to park at its next checkpoint.
    pub fn request_pause(&self) {
        self.pause.store(true, AtomicOrdering::Release);
    }

    /// Clear a pending pause request (resume).
    pub fn clear_pause(&self) {
        self.pause.store(false, AtomicOrdering::Release);
    }

    /// Ask the worker to abort the run cooperatively.
    pub fn request_abort(&self) {
        self.abort.store(true, AtomicOrdering::Release);
    }

    pub fn pause_requested(&self) -> bool {
        self.pause.load(AtomicOrdering::Acquire)
    }

    pub fn abort_requested(&self) -> bool {
        self.abort.load(AtomicOrdering::Acquire)
    }
}

/// Ordered event store consumed by the simulation core.
///
/// Implementations must accept duplicate timestamps and must hand events
/// back in non-decreasing time order. Soft-deleted entries (via
/// [`EventManager::cancel`] or the `deleted` flag) are never executed; they
/// are diverted to a reclaim list so the caller can return them to its
/// event cache.
pub trait EventManager {
    /// Insert a live event. O(log n). Returns a handle usable with
    /// [`EventManager::cancel`].
    fn insert(&mut self, event: Box<dyn Event>) -> EventHandle;

    /// Soft-remove a previously inserted event. Returns `false` if the
    /// handle is unknown, already cancelled, or the event already popped.
    fn cancel(&mut self, handle: EventHandle) -> bool;

    /// Remove and return the earliest non-deleted event, or `None` when no
    /// work remains this day.
    fn pop_next(&mut self) -> Option<Box<dyn Event>>;

    /// Scheduled time of the earliest entry, if any. May report a
    /// soft-deleted entry; only `pop_next` filters those.
    fn peek_time(&self) -> Option<i64>;

    /// Number of queued entries, including not-yet-filtered deleted ones.
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Clear the queue for a fresh simulated day. Still-queued events move
    /// to the reclaim list; logical time restarts at zero (the context
    /// owns the clock itself).
    fn reset_time(&mut self);

    /// Drain events that were skipped as deleted/cancelled (or cleared by
    /// `reset_time`) so they can be recycled.
    fn take_reclaimed(&mut self) -> Vec<Box<dyn Event>>;

    /// The pause/abort flag pair shared with the orchestrator.
    fn signals(&self) -> &Arc<RunSignals>;

    fn request_pause(&self) {
        self.signals().request_pause();
    }

    fn request_abort(&self) {
        self.signals().request_abort();
    }

    fn pause_requested(&self) -> bool {
        self.signals().pause_requested()
    }

    fn abort_requested(&self) -> bool {
        self.signals().abort_requested()
    }
}

struct QueueEntry {
    time: i64,
    seq: u64,
    event: Box<dyn Event>,
}

impl PartialEq for QueueEntry {
    fn eq(&self, other: &Self) -> bool {
        self.time == other.time && self.seq == other.seq
    }
}

impl Eq for QueueEntry {}

impl PartialOrd for QueueEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for QueueEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        self.time
            .cmp(&other.time)
            .then_with(|| self.seq.cmp(&other.seq))
    }
}

/// Binary-heap event store with stable FIFO tie-breaking.
///
/// # Example
///
/// ```
/// use queue_simulator_core_rs::events::{EventManager, PriorityEventQueue};
/// # use queue_simulator_core_rs::events::{Event, EventBase};
/// # use queue_simulator_core_rs::SimData;
/// # use std::any::Any;
/// # #[derive(Default)]
/// # struct Noop { base: EventBase }
/// # impl Event for Noop {
/// #     fn execute(&mut self, _sim: &mut SimData) {}
/// #     fn base(&self) -> &EventBase { &self.base }
/// #     fn base_mut(&mut self) -> &mut EventBase { &mut self.base }
/// #     fn as_any(&self) -> &dyn Any { self }
/// #     fn into_any(self: Box<Self>) -> Box<dyn Any> { self }
/// # }
/// # fn at(time: i64) -> Box<dyn Event> {
/// #     let mut e = Box::new(Noop::default());
/// #     e.base_mut().init(time);
/// #     e
/// # }
/// let mut queue = PriorityEventQueue::new_detached();
/// queue.insert(at(5));
/// queue.insert(at(3));
/// assert_eq!(queue.peek_time(), Some(3));
/// assert_eq!(queue.pop_next().unwrap().base().time, 3);
/// assert_eq!(queue.pop_next().unwrap().base().time, 5);
/// assert!(queue.pop_next().is_none());
/// ```
pub struct PriorityEventQueue {
    heap: BinaryHeap<Reverse<QueueEntry>>,
    /// Handles of entries still in the heap; keeps `cancel` honest about
    /// already-popped events.
    live: HashSet<EventHandle>,
    cancelled: HashSet<EventHandle>,
    reclaimed: Vec<Box<dyn Event>>,
    next_seq: u64,
    signals: Arc<RunSignals>,
}

impl PriorityEventQueue {
    /// Create a queue wired to the given control signals.
    pub fn new(signals: Arc<RunSignals>) -> Self {
        Self {
            heap: BinaryHeap::new(),
            live: HashSet::new(),
            cancelled: HashSet::new(),
            reclaimed: Vec::new(),
            next_seq: 0,
            signals,
        }
    }

    /// Create a queue with its own private signal pair. Useful for tests
    /// and single-threaded embedding.
    pub fn new_detached() -> Self {
        Self::new(Arc::new(RunSignals::new()))
    }
}

impl EventManager for PriorityEventQueue {
    fn insert(&mut self, event: Box<dyn Event>) -> EventHandle {
        let seq = self.next_seq;
        self.next_seq += 1;
        self.live.insert(seq);
        self.heap.push(Reverse(QueueEntry {
            time: event.base().time,
            seq,
            event,
        }));
        seq
    }

    fn cancel(&mut self, handle: EventHandle) -> bool {
        if !self.live.remove(&handle) {
            return false;
        }
        self.cancelled.insert(handle);
        true
    }

    fn pop_next(&mut self) -> Option<Box<dyn Event>> {
        while let Some(Reverse(entry)) = self.heap.pop() {
            self.live.remove(&entry.seq);
            let mut event = entry.event;
            if self.cancelled.remove(&entry.seq) || event.base().deleted {
                event.base_mut().deleted = true;
                self.reclaimed.push(event);
                continue;
            }
            return Some(event);
        }
        None
    }

    fn peek_time(&self) -> Option<i64> {
        self.heap.peek().map(|Reverse(entry)| entry.time)
    }

    fn len(&self) -> usize {
        self.heap.len()
    }

    fn reset_time(&mut self) {
        for Reverse(entry) in self.heap.drain() {
            self.reclaimed.push(entry.event);
        }
        self.live.clear();
        self.cancelled.clear();
    }

    fn take_reclaimed(&mut self) -> Vec<Box<dyn Event>> {
        std::mem::take(&mut self.reclaimed)
    }

    fn signals(&self) -> &Arc<RunSignals> {
        &self.signals
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::context::SimData;
    use crate::events::event::EventBase;
    use std::any::Any;

    #[derive(Default)]
    struct Noop {
        base: EventBase,
    }

    impl Event for Noop {
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

    fn at(time: i64) -> Box<dyn Event> {
        let mut e = Box::new(Noop::default());
        e.base_mut().init(time);
        e
    }

    #[test]
    fn pop_order_is_non_decreasing() {
        let mut q = PriorityEventQueue::new_detached();
        for t in [9, 1, 4, 4, 7, 0, 12, 4] {
            q.insert(at(t));
        }
        let mut last = i64::MIN;
        while let Some(e) = q.pop_next() {
            assert!(e.base().time >= last);
            last = e.base().time;
        }
    }

    #[test]
    fn ties_pop_in_insertion_order() {
        let mut q = PriorityEventQueue::new_detached();
        let h1 = q.insert(at(3));
        let h2 = q.insert(at(3));
        assert!(h1 < h2);
        // Both at time 3: first inserted pops first.
        assert_eq!(q.pop_next().unwrap().base().time, 3);
        assert_eq!(q.pop_next().unwrap().base().time, 3);
    }

    #[test]
    fn cancelled_events_are_reclaimed_not_returned() {
        let mut q = PriorityEventQueue::new_detached();
        let h = q.insert(at(1));
        q.insert(at(2));
        assert!(q.cancel(h));
        assert!(!q.cancel(99));
        let popped = q.pop_next().unwrap();
        assert_eq!(popped.base().time, 2);
        let reclaimed = q.take_reclaimed();
        assert_eq!(reclaimed.len(), 1);
        assert!(reclaimed[0].base().deleted);
    }

    #[test]
    fn cancel_after_pop_reports_failure() {
        let mut q = PriorityEventQueue::new_detached();
        let h = q.insert(at(1));
        let popped = q.pop_next().unwrap();
        // The handle died with the pop; cancelling it is a no-op.
        assert!(!q.cancel(h));
        assert!(!popped.base().deleted);
        assert!(q.take_reclaimed().is_empty());
    }

    #[test]
    fn double_cancel_reports_failure() {
        let mut q = PriorityEventQueue::new_detached();
        let h = q.insert(at(4));
        assert!(q.cancel(h));
        assert!(!q.cancel(h));
        assert!(q.pop_next().is_none());
        assert_eq!(q.take_reclaimed().len(), 1);
    }

    #[test]
    fn reset_time_drains_into_reclaim_list() {
        let mut q = PriorityEventQueue::new_detached();
        q.insert(at(5));
        q.insert(at(8));
        q.reset_time();
        assert!(q.is_empty());
        assert_eq!(q.take_reclaimed().len(), 2);
        assert!(q.pop_next().is_none());
    }

    #[test]
    fn empty_pop_is_none_not_error() {
        let mut q = PriorityEventQueue::new_detached();
        assert!(q.pop_next().is_none());
        assert_eq!(q.peek_time(), None);
    }
}
