//! Schedulable events and their recycling metadata.
//!
//! An event is a unit of work with a logical execution time. Events are
//! trait objects so the engine can run arbitrary model behavior; the
//! [`EventBase`] struct carries the bookkeeping every event needs:
//!
//! - `time`: the logical timestamp the event fires at (milliseconds)
//! - `deleted`: soft-delete marker, lets an already-linked event be skipped
//!   without surgery on the queue
//! - `chained`: an optional second event enqueued automatically when this
//!   one executes
//! - `cache_tag`: type-classification key stamped by the cache on first
//!   `put`, reused on later puts
//!
//! # Ownership
//!
//! An event is always in exactly one of three states: *free* (owned by an
//! [`EventCache`](crate::events::cache::EventCache)), *live* (owned by one
//! [`EventManager`](crate::events::queue::EventManager)) or *executing*
//! (briefly owned by the worker's call stack). `Box<dyn Event>` moves make
//! double ownership unrepresentable.

use std::any::{Any, TypeId};
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

use crate::core::context::SimData;

/// Type-classification key used only by event caches, never by ordering.
///
/// The hash is precomputed once (first `put`) so repeated recycling of the
/// same instance does not re-hash its `TypeId` every time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheTag {
    /// Concrete type identity of the event.
    pub type_id: TypeId,
    /// Stable hash of `type_id`; caches derive their bucket from it.
    pub type_hash: u64,
}

impl CacheTag {
    /// Build a tag from a concrete type id.
    pub fn of(type_id: TypeId) -> Self {
        let mut hasher = DefaultHasher::new();
        type_id.hash(&mut hasher);
        Self {
            type_id,
            type_hash: hasher.finish(),
        }
    }
}

/// Bookkeeping shared by every event implementation.
///
/// Not `Debug`: the chained event is an opaque trait object.
#[derive(Default)]
pub struct EventBase {
    /// Logical execution time in milliseconds.
    pub time: i64,
    /// Soft-delete marker: a deleted event is skipped and recycled instead
    /// of executed.
    pub deleted: bool,
    /// Optional event enqueued automatically after this one executes.
    pub chained: Option<Box<dyn Event>>,
    /// Cache classification key, stamped on first `put`.
    pub cache_tag: Option<CacheTag>,
}

impl EventBase {
    /// Re-initialize for (re-)scheduling.
    ///
    /// Recycled instances come out of the cache with stale fields, so
    /// initialization is an explicit step separate from construction.
    /// The cache tag survives: it identifies the type, not the scheduling.
    pub fn init(&mut self, time: i64) {
        self.time = time;
        self.deleted = false;
        self.chained = None;
    }
}

/// A schedulable unit of work.
///
/// Implementations hold their model-specific payload and mutate the
/// per-thread [`SimData`] when executed. `Default` doubles as the
/// per-type constructor the cache falls back to on a miss, replacing the
/// reflective construction of classic pooled-event designs. Events are
/// `Send`: the opt-in shared cache may hand an instance to a different
/// worker than the one that recycled it.
///
/// # Example
///
/// ```
/// use queue_simulator_core_rs::events::{Event, EventBase};
/// use queue_simulator_core_rs::SimData;
/// use std::any::Any;
///
/// #[derive(Default)]
/// struct Arrival {
///     base: EventBase,
/// }
///
/// impl Event for Arrival {
///     fn execute(&mut self, sim: &mut SimData) {
///         sim.stats.record_waiting_time(0.0);
///     }
///     fn base(&self) -> &EventBase { &self.base }
///     fn base_mut(&mut self) -> &mut EventBase { &mut self.base }
///     fn as_any(&self) -> &dyn Any { self }
///     fn into_any(self: Box<Self>) -> Box<dyn Any> { self }
/// }
/// ```
pub trait Event: Any + Send {
    /// Execute the event's effect.
    ///
    /// The worker advances `sim.current_time` to this event's scheduled
    /// time *before* calling this, so the effect always sees the correct
    /// "now". Runs at most once per scheduling.
    fn execute(&mut self, sim: &mut SimData);

    /// Shared bookkeeping (time, deletion, chaining, cache tag).
    fn base(&self) -> &EventBase;

    /// Mutable access to the shared bookkeeping.
    fn base_mut(&mut self) -> &mut EventBase;

    /// Upcast for concrete-type identification.
    fn as_any(&self) -> &dyn Any;

    /// Upcast for recycling: lets the cache hand a pooled instance back to
    /// its concrete type.
    fn into_any(self: Box<Self>) -> Box<dyn Any>;

    /// Short human-readable name for diagnostics and log lines.
    fn label(&self) -> &'static str {
        "event"
    }
}

/// Concrete type id of a boxed event, resolved through the vtable.
pub fn event_type_id(event: &dyn Event) -> TypeId {
    event.as_any().type_id()
}

/// Resolve (or stamp) the cache tag of an event.
///
/// The first call computes type identity and hash and stores them on the
/// event; later calls reuse the stored tag.
pub fn tag_for(event: &mut dyn Event) -> CacheTag {
    if let Some(tag) = event.base().cache_tag {
        return tag;
    }
    let tag = CacheTag::of(event.as_any().type_id());
    event.base_mut().cache_tag = Some(tag);
    tag
}
