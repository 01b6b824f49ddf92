//! Viewport-driven tile rendering.
//!
//! - [`Viewport`]: visible region, Web Mercator projection, pan/zoom
//! - [`compute_tile_slots`]: which tiles cover the window, and where
//! - [`TileCanvas`]: drawing capability supplied by the host
//! - [`TileRenderer`]: per-frame polling, fallback drawing and the redraw flag

mod canvas;
mod renderer;
mod slots;
mod viewport;

pub use canvas::{ImageCanvas, TileCanvas, BACKGROUND, PLACEHOLDER};
pub use renderer::{FrameStats, RendererConfig, TileRenderer, DEFAULT_RETRY_DELAY};
pub use slots::{compute_tile_slots, ScreenRect, SourceRect, TileSlot};
pub use viewport::{
    degrees_per_pixel, project, tile_to_lat_lon, Viewport, MAX_LATITUDE, MAX_PAN_DELTA_DEGREES,
    MAX_VIEWPORT_SIZE, MAX_ZOOM, MIN_ZOOM,
};
