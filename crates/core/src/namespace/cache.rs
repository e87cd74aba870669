//! Shared listing cache
//!
//! Maps (bucket, prefix, delimiter) to a complete merged listing. Reads take
//! a shared lock; invalidation replaces or drops whole entries. Every
//! invalidation advances a generation counter, and a fetch only stores its
//! listing if its (bucket, prefix) was not invalidated after the fetch began,
//! so a fetch racing with a mutation never reinstates pre-mutation data.
//! Invalidation records are kept only while an older fetch is in flight.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::{Duration, Instant};

use tracing::debug;

use super::Listing;

/// Cache key for one listing
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ListingKey {
    /// `None` for the bucket list
    pub bucket: Option<String>,
    pub prefix: String,
    pub delimiter: String,
}

impl ListingKey {
    pub fn new(bucket: &str, prefix: &str, delimiter: &str) -> Self {
        Self {
            bucket: Some(bucket.to_string()),
            prefix: prefix.to_string(),
            delimiter: delimiter.to_string(),
        }
    }

    /// Key of the bucket list view
    pub fn buckets() -> Self {
        Self {
            bucket: None,
            prefix: String::new(),
            delimiter: String::new(),
        }
    }

    fn scope(&self) -> Scope {
        (self.bucket.clone(), self.prefix.clone())
    }
}

type Scope = (Option<String>, String);

#[derive(Debug)]
struct CachedListing {
    listing: Arc<Listing>,
    stored_at: Instant,
}

#[derive(Debug, Default)]
struct CacheState {
    entries: HashMap<ListingKey, CachedListing>,
    generation: u64,
    /// Generation of the latest invalidation per scope
    invalidated: HashMap<Scope, u64>,
    /// Start generation of each running fetch, with a count
    in_flight: BTreeMap<u64, usize>,
}

impl CacheState {
    fn invalidated_since(&self, scope: &Scope, started: u64) -> bool {
        self.invalidated.get(scope).is_some_and(|g| *g > started)
    }

    fn record_invalidation(&mut self, scope: Scope) {
        self.generation += 1;
        if !self.in_flight.is_empty() {
            self.invalidated.insert(scope, self.generation);
        }
    }

    fn finish_fetch(&mut self, started: u64) {
        if let Some(count) = self.in_flight.get_mut(&started) {
            *count -= 1;
            if *count == 0 {
                self.in_flight.remove(&started);
            }
        }
        match self.in_flight.keys().next().copied() {
            None => self.invalidated.clear(),
            Some(oldest) => self.invalidated.retain(|_, g| *g > oldest),
        }
    }
}

/// Hit/miss counters
#[derive(Debug, Default)]
struct CacheCounters {
    hits: AtomicU64,
    misses: AtomicU64,
    invalidations: AtomicU64,
}

/// Point-in-time view of the cache counters
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub invalidations: u64,
    pub entries: usize,
}

/// A listing fetch in progress, from [`ListingCache::begin_fetch`]
///
/// Dropping it, stored or not, ends the fetch.
#[derive(Debug)]
pub struct Fetch {
    cache: ListingCache,
    started: u64,
}

impl Drop for Fetch {
    fn drop(&mut self) {
        self.cache.write().finish_fetch(self.started);
    }
}

/// Cloneable handle to the listing cache shared by panes and the transfer engine
#[derive(Debug, Clone)]
pub struct ListingCache {
    state: Arc<RwLock<CacheState>>,
    counters: Arc<CacheCounters>,
    ttl: Option<Duration>,
}

impl Default for ListingCache {
    fn default() -> Self {
        Self::new(None)
    }
}

impl ListingCache {
    /// Create a cache; without a TTL entries stay valid until invalidated
    pub fn new(ttl: Option<Duration>) -> Self {
        Self {
            state: Arc::new(RwLock::new(CacheState::default())),
            counters: Arc::new(CacheCounters::default()),
            ttl,
        }
    }

    pub fn ttl(&self) -> Option<Duration> {
        self.ttl
    }

    fn read(&self) -> RwLockReadGuard<'_, CacheState> {
        self.state.read().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, CacheState> {
        self.state.write().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Cached listing, if present and not expired
    pub fn get(&self, key: &ListingKey) -> Option<Arc<Listing>> {
        let state = self.read();
        let fresh = state.entries.get(key).filter(|entry| match self.ttl {
            Some(ttl) => entry.stored_at.elapsed() < ttl,
            None => true,
        });
        match fresh {
            Some(entry) => {
                self.counters.hits.fetch_add(1, Ordering::Relaxed);
                debug!(?key, "Listing cache hit");
                Some(Arc::clone(&entry.listing))
            }
            None => {
                self.counters.misses.fetch_add(1, Ordering::Relaxed);
                debug!(?key, "Listing cache miss");
                None
            }
        }
    }

    /// Mark the start of a fetch; call before asking the backend
    pub fn begin_fetch(&self) -> Fetch {
        let mut state = self.write();
        let started = state.generation;
        *state.in_flight.entry(started).or_insert(0) += 1;
        Fetch {
            cache: self.clone(),
            started,
        }
    }

    /// Store a listing unless its scope was invalidated since `fetch` began
    pub fn insert_if_current(&self, key: ListingKey, listing: Arc<Listing>, fetch: &Fetch) -> bool {
        let mut state = self.write();
        if state.invalidated_since(&key.scope(), fetch.started) {
            debug!(?key, "Discarding listing fetched before invalidation");
            return false;
        }
        state.entries.insert(
            key,
            CachedListing {
                listing,
                stored_at: Instant::now(),
            },
        );
        true
    }

    /// Drop the listing of one prefix (every delimiter), not its descendants
    pub fn invalidate(&self, bucket: &str, prefix: &str) {
        self.invalidate_scope((Some(bucket.to_string()), prefix.to_string()));
    }

    /// Drop the bucket list
    pub fn invalidate_buckets(&self) {
        self.invalidate_scope((None, String::new()));
    }

    fn invalidate_scope(&self, scope: Scope) {
        let mut state = self.write();
        state
            .entries
            .retain(|k, _| !(k.bucket == scope.0 && k.prefix == scope.1));
        debug!(bucket = ?scope.0, prefix = %scope.1, "Invalidated listing");
        state.record_invalidation(scope);
        self.counters.invalidations.fetch_add(1, Ordering::Relaxed);
    }

    /// Drop every listing of a bucket (used when the bucket itself goes away)
    pub fn invalidate_bucket(&self, bucket: &str) {
        let mut state = self.write();
        let scopes: Vec<Scope> = state
            .entries
            .keys()
            .filter(|k| k.bucket.as_deref() == Some(bucket))
            .map(ListingKey::scope)
            .collect();
        state
            .entries
            .retain(|k, _| k.bucket.as_deref() != Some(bucket));
        for scope in scopes {
            state.record_invalidation(scope);
        }
        self.counters.invalidations.fetch_add(1, Ordering::Relaxed);
    }

    pub fn clear(&self) {
        let mut state = self.write();
        let scopes: Vec<Scope> = state.entries.keys().map(ListingKey::scope).collect();
        state.entries.clear();
        for scope in scopes {
            state.record_invalidation(scope);
        }
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.counters.hits.load(Ordering::Relaxed),
            misses: self.counters.misses.load(Ordering::Relaxed),
            invalidations: self.counters.invalidations.load(Ordering::Relaxed),
            entries: self.read().entries.len(),
        }
    }
}
