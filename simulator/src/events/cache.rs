//! Event recycling pools.
//!
//! Executed events are returned to a cache and handed out again instead of
//! being reallocated, keeping the hot loop allocation-free. Several
//! implementations trade lookup cost against memory and thread-safety:
//!
//! - [`NoOpCache`]: never caches; correctness baseline and the right choice
//!   for single-shot, low-volume runs
//! - [`ListCache`]: linear scan over (type, pool) pairs; simplest structure,
//!   good while the number of distinct event types stays in the tens
//! - [`AssociativeCache`]: fixed two-level hash (buckets x type slots) with
//!   hit/miss diagnostics; O(1) expected lookup, bounded memory
//! - [`SharedListCache`]: a `ListCache` behind a mutex so one instance can
//!   be shared across workers; opt-in only, the default design is
//!   share-nothing
//!
//! Cache exhaustion is never an error: a full pool silently drops the
//! returned instance, an empty pool reports a miss and the caller
//! constructs fresh (see [`SimData::create_event`](crate::SimData::create_event)).

use std::any::TypeId;
use std::sync::{Arc, Mutex};

use serde::{Deserialize, Serialize};

use super::event::{tag_for, CacheTag, Event};

/// Object pool for free events, keyed by concrete event type.
///
/// `put` transfers ownership into the pool; `get_or_recycle` transfers it
/// back out. An instance is never simultaneously pooled and live.
pub trait EventCache {
    /// Take a pooled instance of the given type, if one is available.
    /// Cache-only: returns `None` on a miss, never constructs.
    fn get_or_recycle(&mut self, type_id: TypeId) -> Option<Box<dyn Event>>;

    /// Return a finished event to the pool. Pools at capacity silently
    /// drop the instance. Stamps the event's cache tag on first contact
    /// and reuses it afterwards.
    fn put(&mut self, event: Box<dyn Event>);

    /// Drop all pooled instances (end of day / end of run).
    fn clear(&mut self);

    /// Diagnostic: successful `get_or_recycle` calls.
    fn hits(&self) -> u64 {
        0
    }

    /// Diagnostic: `get_or_recycle` calls that came back empty.
    fn misses(&self) -> u64 {
        0
    }
}

/// Cache variant selection, part of the run configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CachePolicy {
    /// Always construct fresh.
    NoOp,
    /// Per-type list pools with a shared per-type capacity.
    PerTypeList { capacity_per_type: usize },
    /// Two-level associative pool.
    Associative(AssociativeCacheConfig),
    /// One mutex-guarded list cache shared by all workers. Opt-in: this
    /// reintroduces contention the rest of the design avoids.
    SharedList { capacity_per_type: usize },
}

impl Default for CachePolicy {
    fn default() -> Self {
        CachePolicy::Associative(AssociativeCacheConfig::default())
    }
}

/// Cache that never pools anything.
#[derive(Debug, Default)]
pub struct NoOpCache;

impl EventCache for NoOpCache {
    fn get_or_recycle(&mut self, _type_id: TypeId) -> Option<Box<dyn Event>> {
        None
    }

    fn put(&mut self, _event: Box<dyn Event>) {
        // Dropped; the allocator is the pool.
    }

    fn clear(&mut self) {}
}

/// Linear-scan cache: a small list of (type, pool) pairs.
pub struct ListCache {
    pools: Vec<(TypeId, Vec<Box<dyn Event>>)>,
    capacity_per_type: usize,
    hits: u64,
    misses: u64,
}

impl ListCache {
    pub fn new(capacity_per_type: usize) -> Self {
        Self {
            pools: Vec::new(),
            capacity_per_type,
            hits: 0,
            misses: 0,
        }
    }

    /// Pooled instance count for one type (diagnostics and tests).
    pub fn pooled(&self, type_id: TypeId) -> usize {
        self.pools
            .iter()
            .find(|(id, _)| *id == type_id)
            .map(|(_, pool)| pool.len())
            .unwrap_or(0)
    }
}

impl EventCache for ListCache {
    fn get_or_recycle(&mut self, type_id: TypeId) -> Option<Box<dyn Event>> {
        for (id, pool) in &mut self.pools {
            if *id == type_id {
                return match pool.pop() {
                    Some(event) => {
                        self.hits += 1;
                        Some(event)
                    }
                    None => {
                        self.misses += 1;
                        None
                    }
                };
            }
        }
        self.misses += 1;
        None
    }

    fn put(&mut self, mut event: Box<dyn Event>) {
        let tag = tag_for(event.as_mut());
        for (id, pool) in &mut self.pools {
            if *id == tag.type_id {
                if pool.len() < self.capacity_per_type {
                    pool.push(event);
                }
                return;
            }
        }
        if self.capacity_per_type > 0 {
            self.pools.push((tag.type_id, vec![event]));
        }
    }

    fn clear(&mut self) {
        self.pools.clear();
    }

    fn hits(&self) -> u64 {
        self.hits
    }

    fn misses(&self) -> u64 {
        self.misses
    }
}

/// Sizing of the associative cache.
///
/// The source system hard-coded roughly 2,000 distinct types and a
/// 1,000,000-deep pool per type; here all three bounds are configurable.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct AssociativeCacheConfig {
    /// First-level hash buckets.
    pub buckets: usize,
    /// Distinct event types per bucket before the cache refuses further
    /// types (silently).
    pub slots_per_bucket: usize,
    /// Maximum pooled instances per type.
    pub max_pool_per_type: usize,
}

impl Default for AssociativeCacheConfig {
    fn default() -> Self {
        Self {
            buckets: 256,
            slots_per_bucket: 8,
            max_pool_per_type: 1_000_000,
        }
    }
}

struct TypeSlot {
    type_id: TypeId,
    pool: Vec<Box<dyn Event>>,
}

/// Fixed two-level hash cache: bucket by type hash, then a short slot scan.
///
/// Trades memory for O(1) expected lookup. On bucket exhaustion it refuses
/// to cache further instances of new types rather than erroring; hit/miss
/// counters make that visible.
pub struct AssociativeCache {
    buckets: Vec<Vec<TypeSlot>>,
    config: AssociativeCacheConfig,
    hits: u64,
    misses: u64,
}

impl AssociativeCache {
    pub fn new(config: AssociativeCacheConfig) -> Self {
        let buckets = config.buckets.max(1);
        Self {
            buckets: (0..buckets).map(|_| Vec::new()).collect(),
            config: AssociativeCacheConfig { buckets, ..config },
            hits: 0,
            misses: 0,
        }
    }

    fn bucket_index(&self, tag: CacheTag) -> usize {
        (tag.type_hash % self.buckets.len() as u64) as usize
    }
}

impl EventCache for AssociativeCache {
    fn get_or_recycle(&mut self, type_id: TypeId) -> Option<Box<dyn Event>> {
        let idx = self.bucket_index(CacheTag::of(type_id));
        for slot in &mut self.buckets[idx] {
            if slot.type_id == type_id {
                return match slot.pool.pop() {
                    Some(event) => {
                        self.hits += 1;
                        Some(event)
                    }
                    None => {
                        self.misses += 1;
                        None
                    }
                };
            }
        }
        self.misses += 1;
        None
    }

    fn put(&mut self, mut event: Box<dyn Event>) {
        let tag = tag_for(event.as_mut());
        let idx = self.bucket_index(tag);
        let max_pool = self.config.max_pool_per_type;
        let bucket = &mut self.buckets[idx];
        for slot in bucket.iter_mut() {
            if slot.type_id == tag.type_id {
                if slot.pool.len() < max_pool {
                    slot.pool.push(event);
                }
                return;
            }
        }
        if bucket.len() < self.config.slots_per_bucket && max_pool > 0 {
            bucket.push(TypeSlot {
                type_id: tag.type_id,
                pool: vec![event],
            });
        }
        // Bucket full of other types: silently refuse to cache this type.
    }

    fn clear(&mut self) {
        for bucket in &mut self.buckets {
            bucket.clear();
        }
    }

    fn hits(&self) -> u64 {
        self.hits
    }

    fn misses(&self) -> u64 {
        self.misses
    }
}

/// Mutex-guarded [`ListCache`] clone-shareable across workers.
///
/// A poisoned lock degrades to "always miss / drop on put", which matches
/// the cache-exhaustion policy: caching is an optimization, never a
/// correctness requirement.
#[derive(Clone)]
pub struct SharedListCache {
    inner: Arc<Mutex<ListCache>>,
}

impl SharedListCache {
    pub fn new(capacity_per_type: usize) -> Self {
        Self {
            inner: Arc::new(Mutex::new(ListCache::new(capacity_per_type))),
        }
    }
}

impl EventCache for SharedListCache {
    fn get_or_recycle(&mut self, type_id: TypeId) -> Option<Box<dyn Event>> {
        match self.inner.lock() {
            Ok(mut cache) => cache.get_or_recycle(type_id),
            Err(_) => None,
        }
    }

    fn put(&mut self, event: Box<dyn Event>) {
        if let Ok(mut cache) = self.inner.lock() {
            cache.put(event);
        }
    }

    fn clear(&mut self) {
        if let Ok(mut cache) = self.inner.lock() {
            cache.clear();
        }
    }

    fn hits(&self) -> u64 {
        self.inner.lock().map(|cache| cache.hits()).unwrap_or(0)
    }

    fn misses(&self) -> u64 {
        self.inner.lock().map(|cache| cache.misses()).unwrap_or(0)
    }
}
