//! Tile acquisition layer.
//!
//! Turns tile coordinates into ready-to-draw handles, from the cheapest
//! source that has them.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────┐
//! │             TileRenderer                │
//! └────────────────────┬────────────────────┘
//!                      │ submit_fetch / try_get
//!                      ▼
//! ┌─────────────────────────────────────────┐
//! │           TileFetchPipeline             │
//! │  ┌──────────────┐  ┌─────────────────┐  │
//! │  │  TileCache   │  │  TileDecoder    │  │
//! │  │  (memory LRU │  │  (PNG bytes →   │  │
//! │  │   + disk)    │  │   handle)       │  │
//! │  └──────────────┘  └─────────────────┘  │
//! └────────────────────┬────────────────────┘
//!                      │
//!                      ▼
//! ┌─────────────────────────────────────────┐
//! │              TileClient                 │
//! └─────────────────────────────────────────┘
//! ```
//!
//! # Components
//!
//! - [`TileCoordinate`]: `(zoom, x, y)` address in the Web Mercator pyramid
//! - [`TileCache`]: memory LRU of handles, disk tier, and the in-flight set
//! - [`TileFetchPipeline`]: memory → disk → network → decode → populate
//! - [`TileDecoder`]: turns encoded bytes into a drawable handle
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use slippy_cache::io::{ClientConfig, DiskCache, ReqwestTileClient};
//! use slippy_cache::tile::{
//!     PipelineConfig, RgbaTileDecoder, TileCache, TileCoordinate, TileFetchPipeline,
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
//! let coord = TileCoordinate::new(5, 28, 12).unwrap();
//! assert_eq!(
//!     pipeline.tile_url(&coord),
//!     "https://tile.openstreetmap.org/5/28/12.png"
//! );
//! ```

mod cache;
mod coord;
mod decoder;
mod pipeline;

pub use cache::{InFlightClaim, TileCache, DEFAULT_MEMORY_CAPACITY};
pub use coord::{tiles_per_axis, TileCoordinate, MAX_TILE_ZOOM, TILE_SIZE};
pub use decoder::{DecodedTile, RgbaTileDecoder, TileDecoder};
pub use pipeline::{
    tile_url, FetchOutcome, PipelineConfig, TileFetchPipeline, TileOrigin, DEFAULT_FETCH_DELAY,
    DEFAULT_TILE_URL,
};
