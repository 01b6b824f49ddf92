//! Tile fetch pipeline.
//!
//! Resolves one coordinate to a ready-to-draw handle, cheapest source first:
//!
//! ```text
//!   claim ──► memory ──► disk ──► network ──► persist + decode ──► populate
//!     │         │          │ corrupt: delete,      │
//!     │         ▼          │ fall through ─────────┘
//!     │       Ready        ▼
//!     ▼                  Ready
//!  AlreadyInFlight
//! ```
//!
//! Each call holds an [`InFlightClaim`](super::InFlightClaim) for its whole
//! duration, so the in-flight mark is released exactly once however the
//! call ends. Network and decode failures are returned to the caller and
//! never retried here; retrying is the renderer's decision.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::error::TileError;
use crate::io::TileClient;
use crate::work::{TaskHandle, WorkQueue};

use super::cache::TileCache;
use super::coord::TileCoordinate;
use super::decoder::TileDecoder;

/// Default tile source.
pub const DEFAULT_TILE_URL: &str = "https://tile.openstreetmap.org";

/// Default pause after each network fetch, honoring the tile source's
/// fair-use policy.
pub const DEFAULT_FETCH_DELAY: Duration = Duration::from_millis(100);

/// Pipeline settings.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Base URL; tiles are requested from `{tile_url}/{zoom}/{x}/{y}.png`
    pub tile_url: String,

    /// Pause after a network fetch before the claim is released
    pub fetch_delay: Duration,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            tile_url: DEFAULT_TILE_URL.to_string(),
            fetch_delay: DEFAULT_FETCH_DELAY,
        }
    }
}

/// Where a resolved tile came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TileOrigin {
    Memory,
    Disk,
    Network,
}

impl fmt::Display for TileOrigin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TileOrigin::Memory => "memory",
            TileOrigin::Disk => "disk",
            TileOrigin::Network => "network",
        };
        f.write_str(name)
    }
}

/// Successful result of a fetch request.
#[derive(Debug, Clone, PartialEq)]
pub enum FetchOutcome<H> {
    /// The tile is ready and in the memory cache.
    Ready { handle: H, origin: TileOrigin },

    /// Another task is already fetching this tile; it will populate the
    /// cache. This call did nothing.
    AlreadyInFlight,
}

impl<H> FetchOutcome<H> {
    pub fn is_ready(&self) -> bool {
        matches!(self, FetchOutcome::Ready { .. })
    }

    pub fn handle(&self) -> Option<&H> {
        match self {
            FetchOutcome::Ready { handle, .. } => Some(handle),
            FetchOutcome::AlreadyInFlight => None,
        }
    }

    pub fn origin(&self) -> Option<TileOrigin> {
        match self {
            FetchOutcome::Ready { origin, .. } => Some(*origin),
            FetchOutcome::AlreadyInFlight => None,
        }
    }

    pub fn into_handle(self) -> Option<H> {
        match self {
            FetchOutcome::Ready { handle, .. } => Some(handle),
            FetchOutcome::AlreadyInFlight => None,
        }
    }
}

/// The per-tile fetch state machine.
///
/// Cheap to clone; clones share the cache, client and decoder.
pub struct TileFetchPipeline<D: TileDecoder> {
    inner: Arc<PipelineInner<D>>,
}

struct PipelineInner<D: TileDecoder> {
    cache: Arc<TileCache<D::Handle>>,
    client: Arc<dyn TileClient>,
    decoder: D,
    config: PipelineConfig,
}

impl<D: TileDecoder> Clone for TileFetchPipeline<D> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<D: TileDecoder> TileFetchPipeline<D> {
    pub fn new(
        cache: Arc<TileCache<D::Handle>>,
        client: Arc<dyn TileClient>,
        decoder: D,
        config: PipelineConfig,
    ) -> Self {
        Self {
            inner: Arc::new(PipelineInner {
                cache,
                client,
                decoder,
                config,
            }),
        }
    }

    pub fn cache(&self) -> &Arc<TileCache<D::Handle>> {
        &self.inner.cache
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.inner.config
    }

    /// Request URL for a tile: `{base}/{zoom}/{x}/{y}.png`.
    pub fn tile_url(&self, coord: &TileCoordinate) -> String {
        tile_url(&self.inner.config.tile_url, coord)
    }

    /// Run [`fetch`](Self::fetch) as one task on the work queue.
    pub fn submit_fetch(
        &self,
        queue: &WorkQueue,
        coord: TileCoordinate,
    ) -> TaskHandle<FetchOutcome<D::Handle>> {
        let pipeline = self.clone();
        queue.submit_fallible(async move { pipeline.fetch(coord).await })
    }

    /// Resolve one tile, trying memory, then disk, then the network.
    pub async fn fetch(
        &self,
        coord: TileCoordinate,
    ) -> Result<FetchOutcome<D::Handle>, TileError> {
        let cache = &self.inner.cache;

        let Some(_claim) = cache.claim(coord) else {
            debug!(%coord, "Tile already in flight");
            return Ok(FetchOutcome::AlreadyInFlight);
        };

        if let Some(handle) = cache.try_get(&coord) {
            debug!(%coord, "Memory cache hit");
            return Ok(FetchOutcome::Ready {
                handle,
                origin: TileOrigin::Memory,
            });
        }

        if let Some(handle) = self.load_from_disk(&coord).await {
            debug!(%coord, "Disk cache hit");
            cache.put(coord, handle.clone());
            return Ok(FetchOutcome::Ready {
                handle,
                origin: TileOrigin::Disk,
            });
        }

        let handle = self.fetch_from_network(&coord).await?;
        cache.put(coord, handle.clone());

        let delay = self.inner.config.fetch_delay;
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        Ok(FetchOutcome::Ready {
            handle,
            origin: TileOrigin::Network,
        })
    }

    /// Decode the disk copy, deleting it if it is corrupt.
    async fn load_from_disk(&self, coord: &TileCoordinate) -> Option<D::Handle> {
        let cache = &self.inner.cache;
        let bytes = match cache.read_from_disk(coord).await {
            Ok(Some(bytes)) => bytes,
            Ok(None) => return None,
            Err(e) => {
                warn!(%coord, error = %e, "Failed to read cached tile, refetching");
                return None;
            }
        };

        match self.inner.decoder.decode(&bytes) {
            Ok(handle) => Some(handle),
            Err(e) => {
                warn!(
                    %coord,
                    path = %cache.disk_path(coord).display(),
                    error = %e,
                    "Corrupt cached tile, removing"
                );
                if let Err(e) = cache.remove_from_disk(coord).await {
                    warn!(%coord, error = %e, "Failed to remove corrupt tile");
                }
                None
            }
        }
    }

    /// GET, persist and decode a tile.
    ///
    /// The disk write and the decode are independent: a failed write still
    /// yields a handle, and a failed decode still leaves the bytes on disk.
    async fn fetch_from_network(&self, coord: &TileCoordinate) -> Result<D::Handle, TileError> {
        let url = self.tile_url(coord);
        let bytes = match self.inner.client.get(&url).await {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!(%coord, %url, error = %e, "Tile fetch failed");
                return Err(e);
            }
        };

        if let Err(e) = self.inner.cache.write_to_disk(coord, &bytes).await {
            warn!(%coord, error = %e, "Failed to persist tile");
        }

        let handle = self.inner.decoder.decode(&bytes).map_err(|e| {
            warn!(%coord, %url, error = %e, "Fetched tile is not a valid image");
            e
        })?;

        info!(%coord, bytes = bytes.len(), "Fetched tile");
        Ok(handle)
    }
}

/// Build `{base}/{zoom}/{x}/{y}.png`, tolerating a trailing slash on `base`.
pub fn tile_url(base: &str, coord: &TileCoordinate) -> String {
    format!(
        "{}/{}/{}/{}.png",
        base.trim_end_matches('/'),
        coord.zoom,
        coord.x,
        coord.y
    )
}

// =============================================================================
// Tests
// =============================================================================
