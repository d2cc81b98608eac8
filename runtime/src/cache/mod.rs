//! Keyed fetch cache with single-flight semantics.
//!
//! ## Single flight
//!
//! The first caller to miss a key stores a shared in-flight future under it;
//! every concurrent caller for the same key awaits that same future, so the
//! compute function runs at most once per key at a time. Insertion goes
//! through `DashMap::entry`, which locks the key's shard, so two concurrent
//! misses can never both start a computation.
//!
//! ## Failures
//!
//! A failed computation is never cached. Its entry is removed and every
//! caller attached to it receives the same `Arc`'d error.
//!
//! ## Eviction
//!
//! When the cache is full, expired entries are dropped first; otherwise the
//! least-recently-accessed ready entry goes. In-flight entries are never
//! evicted.

pub mod key;

pub use key::CacheKey;

use crate::config::CacheConfig;
use crate::error::FetchError;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use futures::future::{BoxFuture, FutureExt, Shared};
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

type SharedCompute<V, E> = Shared<BoxFuture<'static, Result<V, Arc<E>>>>;

enum Slot<V, E> {
    Pending(SharedCompute<V, E>),
    Ready(V),
}

/// Cache entry with metadata.
struct CacheEntry<V, E> {
    slot: Slot<V, E>,
    /// Distinguishes this computation from later ones under the same key.
    generation: u64,
    /// Meaningful once the slot is ready.
    expires_at: Instant,
    /// When the entry was last accessed (for LRU).
    last_accessed: Instant,
}

impl<V, E> CacheEntry<V, E> {
    fn is_expired(&self, now: Instant) -> bool {
        matches!(self.slot, Slot::Ready(_)) && now >= self.expires_at
    }

    fn is_pending(&self) -> bool {
        matches!(self.slot, Slot::Pending(_))
    }
}

/// Cache statistics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheStats {
    /// Entries stored, including in-flight and expired ones.
    pub entries: usize,
    pub pending: usize,
    /// Expired entries not yet evicted.
    pub expired: usize,
    pub hits: u64,
    pub misses: u64,
    /// Compute functions started.
    pub computations: u64,
}

/// In-memory, process-wide cache of computed values keyed by string.
pub struct KeyedCache<V, E = FetchError> {
    entries: DashMap<String, CacheEntry<V, E>>,
    ttl: Duration,
    max_entries: usize,
    refresh_on_hit: bool,
    next_generation: AtomicU64,
    hits: AtomicU64,
    misses: AtomicU64,
    computations: AtomicU64,
}

impl<V, E> KeyedCache<V, E>
where
    V: Clone + Send + Sync + 'static,
    E: Send + Sync + 'static,
{
    pub fn new(config: &CacheConfig) -> Self {
        Self {
            entries: DashMap::new(),
            ttl: config.ttl(),
            max_entries: config.max_entries.max(1),
            refresh_on_hit: config.refresh_on_hit,
            next_generation: AtomicU64::new(0),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            computations: AtomicU64::new(0),
        }
    }

    /// Return the live value for `key`, or compute it exactly once.
    ///
    /// `compute` is called at most once, and only when no live or in-flight
    /// entry exists. It runs on the first poll of the shared future, after the
    /// map entry is released, so it may itself use this cache.
    pub async fn get_or_compute<F, Fut>(&self, key: &str, compute: F) -> Result<V, Arc<E>>
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<V, E>> + Send + 'static,
    {
        if !self.entries.contains_key(key) && self.entries.len() >= self.max_entries {
            self.evict_one();
        }

        let now = Instant::now();
        let (shared, generation) = match self.entries.entry(key.to_string()) {
            Entry::Occupied(mut occupied) => {
                let attached = match &occupied.get().slot {
                    Slot::Ready(value) if !occupied.get().is_expired(now) => {
                        let value = value.clone();
                        let entry = occupied.get_mut();
                        entry.last_accessed = now;
                        if self.refresh_on_hit {
                            entry.expires_at = now + self.ttl;
                        }
                        self.hits.fetch_add(1, Ordering::Relaxed);
                        return Ok(value);
                    }
                    Slot::Pending(shared) => Some((shared.clone(), occupied.get().generation)),
                    Slot::Ready(_) => None,
                };
                match attached {
                    Some(attached) => {
                        self.hits.fetch_add(1, Ordering::Relaxed);
                        attached
                    }
                    None => {
                        tracing::debug!(key, "cache entry expired, recomputing");
                        let (entry, started) = self.start(compute, now);
                        occupied.insert(entry);
                        started
                    }
                }
            }
            Entry::Vacant(vacant) => {
                let (entry, started) = self.start(compute, now);
                vacant.insert(entry);
                started
            }
        };

        let result = shared.await;
        self.settle(key, generation, &result);
        result
    }

    fn start<F, Fut>(&self, compute: F, now: Instant) -> (CacheEntry<V, E>, (SharedCompute<V, E>, u64))
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<V, E>> + Send + 'static,
    {
        self.misses.fetch_add(1, Ordering::Relaxed);
        self.computations.fetch_add(1, Ordering::Relaxed);
        let generation = self.next_generation.fetch_add(1, Ordering::Relaxed);

        // Deferred to the first poll: the shard lock is held here.
        let shared = async move { compute().await.map_err(Arc::new) }
            .boxed()
            .shared();

        let entry = CacheEntry {
            slot: Slot::Pending(shared.clone()),
            generation,
            expires_at: now + self.ttl,
            last_accessed: now,
        };
        (entry, (shared, generation))
    }

    /// Store a success with its TTL, or drop the entry on failure.
    ///
    /// Only the computation that created the entry may settle it.
    fn settle(&self, key: &str, generation: u64, result: &Result<V, Arc<E>>) {
        match result {
            Ok(value) => {
                if let Some(mut entry) = self.entries.get_mut(key) {
                    if entry.generation == generation && entry.is_pending() {
                        let now = Instant::now();
                        entry.slot = Slot::Ready(value.clone());
                        entry.expires_at = now + self.ttl;
                        entry.last_accessed = now;
                    }
                }
            }
            Err(_) => {
                let removed = self
                    .entries
                    .remove_if(key, |_, entry| entry.generation == generation);
                if removed.is_some() {
                    tracing::debug!(key, "computation failed, entry dropped");
                }
            }
        }
    }

    /// Live value for `key`, without computing.
    pub fn get(&self, key: &str) -> Option<V> {
        let entry = self.entries.get(key)?;
        match &entry.slot {
            Slot::Ready(value) if !entry.is_expired(Instant::now()) => Some(value.clone()),
            _ => None,
        }
    }

    /// Remove a key, ready or in flight.
    ///
    /// Callers already attached to an in-flight computation still receive
    /// its result; it is just not stored.
    pub fn invalidate(&self, key: &str) {
        self.entries.remove(key);
    }

    /// Remove all expired entries.
    pub fn cleanup_expired(&self) {
        let now = Instant::now();
        self.entries.retain(|_, entry| !entry.is_expired(now));
    }

    /// Evict expired entries if there are any, else the least-recently-used one.
    fn evict_one(&self) {
        let now = Instant::now();
        let before = self.entries.len();
        self.entries.retain(|_, entry| !entry.is_expired(now));
        if self.entries.len() < before {
            return;
        }

        let lru = self
            .entries
            .iter()
            .filter(|entry| !entry.is_pending())
            .min_by_key(|entry| entry.last_accessed)
            .map(|entry| entry.key().clone());

        if let Some(key) = lru {
            tracing::info!("evicting LRU cache entry: {key}");
            self.entries
                .remove_if(&key, |_, entry| !entry.is_pending());
        }
    }

    /// Number of stored entries (including in-flight and expired).
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn stats(&self) -> CacheStats {
        let now = Instant::now();
        let mut pending = 0;
        let mut expired = 0;
        for entry in self.entries.iter() {
            if entry.is_pending() {
                pending += 1;
            } else if entry.is_expired(now) {
                expired += 1;
            }
        }
        CacheStats {
            entries: self.entries.len(),
            pending,
            expired,
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            computations: self.computations.load(Ordering::Relaxed),
        }
    }
}
