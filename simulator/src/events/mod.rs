//! Event layer: schedulable events, the ordered event store, and the
//! recycling caches.
//!
//! # Components
//!
//! - **event**: the [`Event`] trait and per-event bookkeeping
//! - **queue**: the [`EventManager`] contract and the binary-heap default
//! - **cache**: the [`EventCache`] pool family

pub mod cache;
pub mod event;
pub mod queue;

// Re-exports for convenience
pub use cache::{
    AssociativeCache, AssociativeCacheConfig, CachePolicy, EventCache, ListCache, NoOpCache,
    SharedListCache,
};
pub use event::{event_type_id, CacheTag, Event, EventBase};
pub use queue::{EventHandle, EventManager, PriorityEventQueue, RunSignals};
