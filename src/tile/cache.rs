//! Two-tier tile cache.
//!
//! The memory tier holds decoded, ready-to-draw handles in an LRU map
//! bounded by entry count. The disk tier holds the raw bytes of every tile
//! ever fetched and is unbounded; the memory tier can always be rebuilt
//! from it without touching the network.
//!
//! # Locking
//!
//! The LRU map and the in-flight set form one consistency domain guarded
//! by a single reader/writer lock. Lookups that do not reorder the LRU
//! (`is_cached`, `is_in_flight`) take the shared side; everything that
//! mutates, including the recency touch on a hit, takes the exclusive side.
//! The lock is never held across disk or network I/O, and evicted handles
//! are dropped after the lock is released.
//!
//! # In-flight claims
//!
//! [`TileCache::claim`] marks a coordinate as being fetched and returns an
//! [`InFlightClaim`] guard. Dropping the guard clears the mark, whichever
//! way the fetch ends: success, early return, error or panic.

use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use bytes::Bytes;
use lru::LruCache;
use tracing::{debug, trace};

use crate::error::TileError;
use crate::io::DiskCache;

use super::coord::TileCoordinate;

/// Default number of decoded tiles kept in memory.
pub const DEFAULT_MEMORY_CAPACITY: usize = 1024;

struct CacheState<H> {
    /// Decoded handles, most recently used first.
    entries: LruCache<TileCoordinate, H>,

    /// Coordinates some task is currently fetching.
    in_flight: HashSet<TileCoordinate>,
}

/// Memory + disk tile cache keyed by [`TileCoordinate`].
///
/// `H` is the displayable handle type produced by a
/// [`TileDecoder`](super::TileDecoder). The cache owns one reference to
/// each handle; eviction drops it.
///
/// # Example
///
/// ```
/// use slippy_cache::io::DiskCache;
/// use slippy_cache::tile::{TileCache, TileCoordinate};
///
/// let cache: TileCache<&'static str> = TileCache::with_capacity(DiskCache::new("tiles"), 2);
/// let coord = TileCoordinate::new(1, 0, 1).unwrap();
///
/// assert!(cache.mark_in_flight(coord));
/// assert!(!cache.mark_in_flight(coord));
/// cache.put(coord, "decoded");
/// cache.clear_in_flight(coord);
///
/// assert_eq!(cache.try_get(&coord), Some("decoded"));
/// ```
pub struct TileCache<H> {
    state: RwLock<CacheState<H>>,

    /// Maximum number of memory-tier entries
    capacity: usize,

    disk: DiskCache,
}

impl<H: Clone> TileCache<H> {
    /// Create a cache with the default memory capacity.
    pub fn new(disk: DiskCache) -> Self {
        Self::with_capacity(disk, DEFAULT_MEMORY_CAPACITY)
    }

    /// Create a cache holding at most `capacity` decoded tiles (minimum 1).
    pub fn with_capacity(disk: DiskCache, capacity: usize) -> Self {
        Self {
            state: RwLock::new(CacheState {
                entries: LruCache::unbounded(),
                in_flight: HashSet::new(),
            }),
            capacity: capacity.max(1),
            disk,
        }
    }

    // =========================================================================
    // Memory tier
    // =========================================================================

    /// Get a decoded tile, promoting it to most-recently-used.
    ///
    /// Never blocks on I/O. The presence check runs under the shared lock so
    /// the common miss path does not serialize concurrent readers.
    pub fn try_get(&self, coord: &TileCoordinate) -> Option<H> {
        if !self.read_state().entries.contains(coord) {
            return None;
        }
        // The entry may have been evicted between the two locks.
        self.write_state().entries.get(coord).cloned()
    }

    /// Whether a decoded tile is in memory. Does not touch LRU order.
    pub fn is_cached(&self, coord: &TileCoordinate) -> bool {
        self.read_state().entries.contains(coord)
    }

    /// Get a decoded tile without touching LRU order.
    pub fn peek(&self, coord: &TileCoordinate) -> Option<H> {
        self.read_state().entries.peek(coord).cloned()
    }

    /// Insert or replace a decoded tile, mark it most-recently-used, then
    /// evict down to capacity.
    pub fn put(&self, coord: TileCoordinate, handle: H) {
        let (replaced, evicted) = {
            let mut state = self.write_state();
            let replaced = state.entries.put(coord, handle);
            (replaced, self.evict_locked(&mut state))
        };
        drop(replaced);
        release(evicted);
    }

    /// Evict least-recently-used entries until the memory tier is within
    /// capacity. Returns the number of entries evicted.
    pub fn evict_if_needed(&self) -> usize {
        let evicted = {
            let mut state = self.write_state();
            self.evict_locked(&mut state)
        };
        let count = evicted.len();
        release(evicted);
        count
    }

    /// Remove a decoded tile from memory. The disk copy is untouched.
    pub fn remove(&self, coord: &TileCoordinate) -> Option<H> {
        self.write_state().entries.pop(coord)
    }

    /// Drop every decoded tile. In-flight marks and the disk tier are untouched.
    pub fn clear(&self) {
        let drained: Vec<H> = {
            let mut state = self.write_state();
            let mut drained = Vec::with_capacity(state.entries.len());
            while let Some((_, handle)) = state.entries.pop_lru() {
                drained.push(handle);
            }
            drained
        };
        debug!(count = drained.len(), "Cleared memory tile cache");
        drop(drained);
    }

    /// Number of decoded tiles in memory.
    pub fn len(&self) -> usize {
        self.read_state().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.read_state().entries.is_empty()
    }

    /// Maximum number of decoded tiles kept in memory.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Memory-tier coordinates, most recently used first.
    pub fn lru_order(&self) -> Vec<TileCoordinate> {
        self.read_state().entries.iter().map(|(k, _)| *k).collect()
    }

    fn evict_locked(&self, state: &mut CacheState<H>) -> Vec<(TileCoordinate, H)> {
        let mut evicted = Vec::new();
        while state.entries.len() > self.capacity {
            match state.entries.pop_lru() {
                Some(entry) => evicted.push(entry),
                None => break,
            }
        }
        evicted
    }

    // =========================================================================
    // In-flight set
    // =========================================================================

    /// Atomically mark `coord` as being fetched.
    ///
    /// Returns `false` if another task already holds the mark; that caller
    /// must not fetch. Prefer [`claim`](Self::claim), which clears the mark
    /// automatically.
    pub fn mark_in_flight(&self, coord: TileCoordinate) -> bool {
        self.write_state().in_flight.insert(coord)
    }

    /// Clear the in-flight mark for `coord`.
    pub fn clear_in_flight(&self, coord: TileCoordinate) {
        self.write_state().in_flight.remove(&coord);
    }

    /// Whether some task currently holds the in-flight mark for `coord`.
    pub fn is_in_flight(&self, coord: &TileCoordinate) -> bool {
        self.read_state().in_flight.contains(coord)
    }

    /// Number of coordinates currently being fetched.
    pub fn in_flight_count(&self) -> usize {
        self.read_state().in_flight.len()
    }

    // =========================================================================
    // Disk tier
    // =========================================================================

    pub fn disk(&self) -> &DiskCache {
        &self.disk
    }

    /// Deterministic disk location of a tile.
    pub fn disk_path(&self, coord: &TileCoordinate) -> PathBuf {
        self.disk.path_for(coord)
    }

    pub async fn exists_on_disk(&self, coord: &TileCoordinate) -> bool {
        self.disk.exists(coord).await
    }

    pub async fn read_from_disk(&self, coord: &TileCoordinate) -> Result<Option<Bytes>, TileError> {
        self.disk.read(coord).await
    }

    /// Persist raw tile bytes via temp file + atomic rename.
    pub async fn write_to_disk(
        &self,
        coord: &TileCoordinate,
        data: &[u8],
    ) -> Result<PathBuf, TileError> {
        self.disk.write(coord, data).await
    }

    pub async fn remove_from_disk(&self, coord: &TileCoordinate) -> Result<(), TileError> {
        self.disk.remove(coord).await
    }

    // =========================================================================
    // Locking
    // =========================================================================

    // A panic while holding the lock cannot leave the LRU map or the set
    // half-updated (each mutation is a single call), so poisoning is ignored.
    fn read_state(&self) -> RwLockReadGuard<'_, CacheState<H>> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write_state(&self) -> RwLockWriteGuard<'_, CacheState<H>> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }
}

impl<H: Clone> TileCache<H> {
    /// Mark `coord` in flight and return a guard that clears the mark on drop.
    ///
    /// Returns `None` if the coordinate is already being fetched.
    pub fn claim(self: &Arc<Self>, coord: TileCoordinate) -> Option<InFlightClaim<H>> {
        if !self.mark_in_flight(coord) {
            return None;
        }
        trace!(%coord, "Claimed tile");
        Some(InFlightClaim {
            cache: Arc::clone(self),
            coord,
        })
    }
}

fn release<H>(evicted: Vec<(TileCoordinate, H)>) {
    for (coord, handle) in evicted {
        debug!(%coord, "Evicted tile from memory cache");
        drop(handle);
    }
}

/// Scope guard for an in-flight mark.
///
/// Clears the mark exactly once, when dropped.
pub struct InFlightClaim<H: Clone> {
    cache: Arc<TileCache<H>>,
    coord: TileCoordinate,
}

impl<H: Clone> InFlightClaim<H> {
    pub fn coord(&self) -> TileCoordinate {
        self.coord
    }
}

impl<H: Clone> Drop for InFlightClaim<H> {
    fn drop(&mut self) {
        self.cache.clear_in_flight(self.coord);
        trace!(coord = %self.coord, "Released tile claim");
    }
}

// =============================================================================
// Tests
// =============================================================================
