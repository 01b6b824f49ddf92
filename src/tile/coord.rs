//! Slippy-map tile addressing.
//!
//! Tiles are addressed by `(zoom, x, y)` in the standard Web Mercator
//! tiling scheme: at zoom `z` the world is a `2^z × 2^z` grid of 256px
//! tiles, `x` growing eastward from the antimeridian and `y` growing
//! southward from the northern Mercator limit.

use std::fmt;

use serde::Serialize;

/// Edge length of a tile in pixels.
pub const TILE_SIZE: u32 = 256;

/// Highest zoom level a coordinate may carry.
///
/// Keeps `2^zoom` comfortably inside `u32` and `i64` arithmetic.
pub const MAX_TILE_ZOOM: u8 = 30;

/// Address of a single map tile.
///
/// Coordinates built through [`TileCoordinate::new`] or
/// [`TileCoordinate::wrap`] always satisfy `x, y < 2^zoom`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct TileCoordinate {
    pub zoom: u8,
    pub x: u32,
    pub y: u32,
}

impl TileCoordinate {
    /// Create a coordinate, returning `None` if it lies outside the grid.
    pub fn new(zoom: u8, x: u32, y: u32) -> Option<Self> {
        if zoom > MAX_TILE_ZOOM {
            return None;
        }
        let n = tiles_per_axis(zoom);
        if x >= n || y >= n {
            return None;
        }
        Some(Self { zoom, x, y })
    }

    /// Normalize raw grid indices into a valid coordinate.
    ///
    /// The world repeats horizontally, so `x` is wrapped modulo `2^zoom`.
    /// Rows outside `[0, 2^zoom)` do not exist (the projection diverges
    /// at the poles) and yield `None`.
    pub fn wrap(zoom: u8, x: i64, y: i64) -> Option<Self> {
        if zoom > MAX_TILE_ZOOM {
            return None;
        }
        let n = tiles_per_axis(zoom) as i64;
        if y < 0 || y >= n {
            return None;
        }
        Some(Self {
            zoom,
            x: x.rem_euclid(n) as u32,
            y: y as u32,
        })
    }

    /// The tile one zoom level up that contains this one.
    pub fn parent(&self) -> Option<Self> {
        if self.zoom == 0 {
            return None;
        }
        Some(Self {
            zoom: self.zoom - 1,
            x: self.x / 2,
            y: self.y / 2,
        })
    }

    /// Which quadrant of its parent this tile covers, as `(column, row)` in `{0, 1}`.
    pub fn quadrant(&self) -> (u32, u32) {
        (self.x % 2, self.y % 2)
    }

    /// Number of tiles along each axis at this coordinate's zoom.
    pub fn grid_size(&self) -> u32 {
        tiles_per_axis(self.zoom)
    }
}

impl fmt::Display for TileCoordinate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.zoom, self.x, self.y)
    }
}

/// `2^zoom`, the number of tiles along each axis.
#[inline]
pub fn tiles_per_axis(zoom: u8) -> u32 {
    1u32 << zoom.min(31)
}
