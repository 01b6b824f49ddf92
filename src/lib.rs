//! # slippy-cache
//!
//! Tile acquisition and caching for slippy-map viewers.
//!
//! This library resolves Web Mercator map tiles from the cheapest source that
//! has them (a bounded in-memory LRU of decoded images, then an on-disk
//! cache, then a remote tile server) on a pool of background workers, and
//! composites the tiles covering a viewport without ever blocking the render
//! thread.
//!
//! ## Features
//!
//! - **Two-tier caching**: decoded handles in a bounded LRU, raw PNGs on disk
//! - **Fetch deduplication**: at most one fetch per tile is ever in flight
//! - **Crash-safe disk writes**: temp file plus atomic rename
//! - **Non-blocking frames**: fetches are polled, never awaited, by the renderer
//! - **Graceful gaps**: missing tiles draw as a scaled parent quadrant or a placeholder
//!
//! ## Architecture
//!
//! - [`tile`] - Coordinates, the tile cache, decoding and the fetch pipeline
//! - [`io`] - Disk cache layout and the HTTP tile client
//! - [`work`] - Background work queue
//! - [`view`] - Viewport projection, slot layout and the frame renderer
//! - [`config`] - CLI and configuration types
//! - [`error`] - Error taxonomy
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use slippy_cache::{
//!     ClientConfig, DiskCache, ImageCanvas, PipelineConfig, RendererConfig, ReqwestTileClient,
//!     RgbaTileDecoder, TileCache, TileFetchPipeline, TileRenderer, Viewport,
//! };
//!
//! let cache = Arc::new(TileCache::new(DiskCache::new("resources/tiles")));
//! let client = Arc::new(ReqwestTileClient::new(&ClientConfig::default()).unwrap());
//! let pipeline = TileFetchPipeline::new(
//!     cache,
//!     client,
//!     RgbaTileDecoder::new(),
//!     PipelineConfig::default(),
//! );
//!
//! let viewport = Viewport::default();
//! let mut renderer =
//!     TileRenderer::new(pipeline, viewport, &RendererConfig::default()).unwrap();
//! let mut canvas = ImageCanvas::new(viewport.width(), viewport.height());
//!
//! loop {
//!     if let Some(stats) = renderer.render_if_needed(&mut canvas) {
//!         if stats.is_complete() {
//!             break;
//!         }
//!     }
//!     std::thread::sleep(std::time::Duration::from_millis(16));
//! }
//! ```

pub mod config;
pub mod error;
pub mod io;
pub mod tile;
pub mod view;
pub mod work;

// Re-export commonly used types
pub use config::{Cli, Command, Config, FetchArgs, LocateArgs, RenderArgs};
pub use error::TileError;
pub use io::{ClientConfig, DiskCache, ReqwestTileClient, TileClient};
pub use tile::{
    DecodedTile, FetchOutcome, InFlightClaim, PipelineConfig, RgbaTileDecoder, TileCache,
    TileCoordinate, TileDecoder, TileFetchPipeline, TileOrigin, TILE_SIZE,
};
pub use view::{
    compute_tile_slots, FrameStats, ImageCanvas, RendererConfig, ScreenRect, SourceRect,
    TileCanvas, TileRenderer, TileSlot, Viewport,
};
pub use work::{TaskHandle, WorkQueue};
