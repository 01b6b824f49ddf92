//! Per-frame tile orchestration.
//!
//! Each frame the renderer walks the precomputed slots for its viewport:
//! tiles already in memory are drawn; missing tiles get a fetch submitted
//! to the work queue and are drawn as the matching quadrant of their parent
//! tile, or as a placeholder when the parent is not cached either.
//!
//! Slot states:
//!
//! ```text
//!   missing ──submit──► pending ──Ready──► available
//!      ▲                   │
//!      │                   ├──AlreadyInFlight──► watching ──claim released──┐
//!      │                   │                                                │
//!      │                   └──Err──► failed ──retry delay elapsed───────────┤
//!      └────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! The render thread never blocks: outstanding fetches are polled with
//! [`TaskHandle::try_take`].

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::Serialize;
use tracing::{debug, warn};

use crate::error::TileError;
use crate::tile::{FetchOutcome, TileCache, TileCoordinate, TileDecoder, TileFetchPipeline};
use crate::work::{TaskHandle, WorkQueue, DEFAULT_WORKERS};

use super::canvas::TileCanvas;
use super::slots::{compute_tile_slots, TileSlot};
use super::viewport::Viewport;

/// Default back-off before a failed tile is requested again.
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_millis(1000);

/// Renderer settings.
#[derive(Debug, Clone)]
pub struct RendererConfig {
    /// Worker threads for the fetch queue
    pub workers: usize,

    /// Minimum wait before resubmitting a tile whose fetch failed
    pub retry_delay: Duration,
}

impl Default for RendererConfig {
    fn default() -> Self {
        Self {
            workers: DEFAULT_WORKERS,
            retry_delay: DEFAULT_RETRY_DELAY,
        }
    }
}

/// What one call to [`TileRenderer::render`] drew.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct FrameStats {
    /// Slots drawn with their own tile
    pub tiles: usize,

    /// Slots drawn with a scaled parent quadrant
    pub fallbacks: usize,

    /// Slots filled with the placeholder
    pub placeholders: usize,

    /// Fetches submitted during this frame
    pub submitted: usize,
}

impl FrameStats {
    /// Whether every slot showed its own tile.
    pub fn is_complete(&self) -> bool {
        self.fallbacks == 0 && self.placeholders == 0
    }
}

type PendingFetch<D> = TaskHandle<FetchOutcome<<D as TileDecoder>::Handle>>;

/// A tile whose last fetch ended without a tile.
#[derive(Debug, Clone, Copy)]
struct FailedFetch {
    at: Instant,

    /// The back-off has expired and a redraw was already requested for it.
    retry_announced: bool,
}

impl FailedFetch {
    fn new(at: Instant) -> Self {
        Self {
            at,
            retry_announced: false,
        }
    }
}

/// Draws the tiles for a viewport, fetching what is missing in the background.
pub struct TileRenderer<D: TileDecoder> {
    pipeline: TileFetchPipeline<D>,
    viewport: Viewport,
    slots: Vec<TileSlot>,
    pending: HashMap<TileCoordinate, PendingFetch<D>>,
    /// Tiles being fetched by a task this renderer does not own.
    watching: HashSet<TileCoordinate>,
    failed: HashMap<TileCoordinate, FailedFetch>,
    retry_delay: Duration,
    needs_redraw: bool,
    queue: WorkQueue,
}

impl<D: TileDecoder> TileRenderer<D> {
    /// Create a renderer with its own work queue.
    pub fn new(
        pipeline: TileFetchPipeline<D>,
        viewport: Viewport,
        config: &RendererConfig,
    ) -> Result<Self, TileError> {
        let queue = WorkQueue::new(config.workers)?;
        Ok(Self::with_queue(pipeline, queue, viewport, config))
    }

    /// Create a renderer that submits fetches to `queue`.
    pub fn with_queue(
        pipeline: TileFetchPipeline<D>,
        queue: WorkQueue,
        viewport: Viewport,
        config: &RendererConfig,
    ) -> Self {
        Self {
            slots: compute_tile_slots(&viewport),
            pipeline,
            viewport,
            pending: HashMap::new(),
            watching: HashSet::new(),
            failed: HashMap::new(),
            retry_delay: config.retry_delay,
            needs_redraw: true,
            queue,
        }
    }

    pub fn viewport(&self) -> &Viewport {
        &self.viewport
    }

    /// Slots for the current viewport.
    pub fn slots(&self) -> &[TileSlot] {
        &self.slots
    }

    pub fn pipeline(&self) -> &TileFetchPipeline<D> {
        &self.pipeline
    }

    pub fn cache(&self) -> &Arc<TileCache<D::Handle>> {
        self.pipeline.cache()
    }

    /// Fetches submitted by this renderer that have not been polled to completion.
    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    /// No fetch this renderer knows about is outstanding.
    pub fn is_settled(&self) -> bool {
        self.pending.is_empty() && self.watching.is_empty()
    }

    /// Switch to a new viewport.
    ///
    /// Recomputes the slots, abandons outstanding fetch handles for the old
    /// viewport and marks the frame dirty. Abandoned fetches still finish
    /// and populate the cache.
    pub fn set_viewport(&mut self, viewport: Viewport) {
        self.viewport = viewport;
        self.slots = compute_tile_slots(&viewport);
        self.pending.clear();
        self.watching.clear();
        self.needs_redraw = true;
        debug!(
            zoom = viewport.zoom(),
            lat = viewport.center_lat(),
            lon = viewport.center_lon(),
            slots = self.slots.len(),
            "Viewport changed"
        );
    }

    pub fn needs_redraw(&self) -> bool {
        self.needs_redraw
    }

    pub fn reset_redraw_flag(&mut self) {
        self.needs_redraw = false;
    }

    /// Force the next frame to redraw, e.g. after the host drew over the map.
    pub fn set_needs_redraw(&mut self) {
        self.needs_redraw = true;
    }

    /// Poll outstanding fetches without blocking.
    ///
    /// Returns `true`, and marks the frame dirty, if anything happened that
    /// changes what the next frame would draw or request.
    pub fn update(&mut self) -> bool {
        let now = Instant::now();
        let mut changed = false;

        let TileRenderer {
            pipeline,
            slots,
            pending,
            watching,
            failed,
            retry_delay,
            ..
        } = &mut *self;

        pending.retain(|coord, handle| match handle.try_take() {
            None => true,
            Some(Ok(FetchOutcome::Ready { origin, .. })) => {
                debug!(%coord, %origin, "Tile ready");
                failed.remove(coord);
                changed = true;
                false
            }
            Some(Ok(FetchOutcome::AlreadyInFlight)) => {
                watching.insert(*coord);
                false
            }
            Some(Err(e)) => {
                warn!(%coord, error = %e, "Tile fetch failed");
                failed.insert(*coord, FailedFetch::new(now));
                false
            }
        });

        let cache = pipeline.cache();
        watching.retain(|coord| {
            if cache.is_in_flight(coord) {
                return true;
            }
            if cache.is_cached(coord) {
                changed = true;
            } else {
                // The other task released its claim without caching the tile.
                debug!(%coord, "Watched fetch ended without a tile");
                failed.insert(*coord, FailedFetch::new(now));
            }
            false
        });

        let is_visible = |coord: &TileCoordinate| slots.iter().any(|s| s.coord == *coord);
        failed.retain(|coord, failure| {
            is_visible(coord) || now.duration_since(failure.at) < *retry_delay
        });
        for (coord, failure) in failed.iter_mut() {
            if !failure.retry_announced
                && now.duration_since(failure.at) >= *retry_delay
                && is_visible(coord)
            {
                failure.retry_announced = true;
                changed = true;
            }
        }

        if changed {
            self.needs_redraw = true;
        }
        changed
    }

    /// Draw a frame, then submit fetches for every missing tile.
    ///
    /// Draws unconditionally and clears the redraw flag; hosts that only
    /// redraw on change use [`render_if_needed`](Self::render_if_needed).
    pub fn render<C>(&mut self, canvas: &mut C) -> FrameStats
    where
        C: TileCanvas<Handle = D::Handle>,
    {
        self.update();
        canvas.clear();

        let mut stats = FrameStats::default();
        let mut missing = Vec::new();
        let cache = self.pipeline.cache();

        for slot in &self.slots {
            if let Some(handle) = cache.try_get(&slot.coord) {
                canvas.draw_tile(&handle, None, slot.dest);
                stats.tiles += 1;
                continue;
            }

            missing.push(slot.coord);
            let parent = slot
                .parent_fallback()
                .and_then(|(parent, source)| Some((cache.try_get(&parent)?, source)));
            match parent {
                Some((handle, source)) => {
                    canvas.draw_tile(&handle, Some(source), slot.dest);
                    stats.fallbacks += 1;
                }
                None => {
                    canvas.fill_placeholder(slot.dest);
                    stats.placeholders += 1;
                }
            }
        }

        let now = Instant::now();
        for coord in missing {
            if self.schedule(coord, now) {
                stats.submitted += 1;
            }
        }

        self.needs_redraw = false;
        stats
    }

    /// Render only if something changed since the last frame.
    pub fn render_if_needed<C>(&mut self, canvas: &mut C) -> Option<FrameStats>
    where
        C: TileCanvas<Handle = D::Handle>,
    {
        self.update();
        if !self.needs_redraw {
            return None;
        }
        Some(self.render(canvas))
    }

    /// Stop the work queue, waiting up to `timeout` for running fetches.
    pub fn shutdown(self, timeout: Duration) {
        self.queue.shutdown(timeout);
    }

    /// Submit a fetch for a missing tile unless one is already known to be
    /// running or it failed too recently. Returns whether a fetch was submitted.
    fn schedule(&mut self, coord: TileCoordinate, now: Instant) -> bool {
        if self.pending.contains_key(&coord) || self.watching.contains(&coord) {
            return false;
        }
        if let Some(failure) = self.failed.get(&coord) {
            if now.duration_since(failure.at) < self.retry_delay {
                return false;
            }
            self.failed.remove(&coord);
        }
        if self.pipeline.cache().is_in_flight(&coord) {
            self.watching.insert(coord);
            return false;
        }

        let handle = self.pipeline.submit_fetch(&self.queue, coord);
        self.pending.insert(coord, handle);
        true
    }
}
