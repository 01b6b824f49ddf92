//! Viewport → tile slot computation.
//!
//! Pure and synchronous: given a [`Viewport`], lay out the tiles that cover
//! the window and where each one lands on screen. The renderer recomputes
//! slots only when its viewport changes.

use crate::tile::{TileCoordinate, TILE_SIZE};

use super::viewport::Viewport;

/// Destination rectangle in window pixels. May extend past the window edges.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ScreenRect {
    pub x: i32,
    pub y: i32,
    pub width: u32,
    pub height: u32,
}

impl ScreenRect {
    pub fn new(x: i32, y: i32, width: u32, height: u32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// One past the rightmost column.
    pub fn right(&self) -> i64 {
        i64::from(self.x) + i64::from(self.width)
    }

    /// One past the bottom row.
    pub fn bottom(&self) -> i64 {
        i64::from(self.y) + i64::from(self.height)
    }

    pub fn contains(&self, px: i64, py: i64) -> bool {
        px >= i64::from(self.x) && px < self.right() && py >= i64::from(self.y) && py < self.bottom()
    }

    /// Whether any part of the rectangle falls inside a `width × height` window.
    pub fn intersects_window(&self, width: u32, height: u32) -> bool {
        self.right() > 0
            && self.bottom() > 0
            && i64::from(self.x) < i64::from(width)
            && i64::from(self.y) < i64::from(height)
    }
}

/// Region of a source tile image, in tile pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SourceRect {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl SourceRect {
    /// The quadrant of a parent tile covered by `child`.
    pub fn parent_quadrant(child: &TileCoordinate) -> Self {
        let half = TILE_SIZE / 2;
        let (qx, qy) = child.quadrant();
        Self {
            x: qx * half,
            y: qy * half,
            width: half,
            height: half,
        }
    }
}

/// A tile coordinate paired with where it is drawn for the current viewport.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TileSlot {
    pub coord: TileCoordinate,
    pub dest: ScreenRect,
}

impl TileSlot {
    /// Parent tile and the part of it that stands in for this slot's tile.
    pub fn parent_fallback(&self) -> Option<(TileCoordinate, SourceRect)> {
        let parent = self.coord.parent()?;
        Some((parent, SourceRect::parent_quadrant(&self.coord)))
    }
}

/// Lay out the tiles covering `viewport`, in row-major order.
///
/// A grid of `ceil(width/256) + 2` by `ceil(height/256) + 2` tiles is
/// anchored at the tile under the window's top-left corner. Columns wrap
/// around the antimeridian; rows beyond the poles are skipped, as are
/// padding cells that end up entirely outside the window.
pub fn compute_tile_slots(viewport: &Viewport) -> Vec<TileSlot> {
    let tile = f64::from(TILE_SIZE);
    let zoom = viewport.zoom();
    let (width, height) = (viewport.width(), viewport.height());
    let (center_x, center_y) = viewport.center_tile();

    let start_x = center_x - f64::from(width) / 2.0 / tile;
    let start_y = center_y - f64::from(height) / 2.0 / tile;
    let first_col = start_x.floor();
    let first_row = start_y.floor();
    let offset_x = (start_x - first_col) * tile;
    let offset_y = (start_y - first_row) * tile;

    let cols = width.div_ceil(TILE_SIZE) + 2;
    let rows = height.div_ceil(TILE_SIZE) + 2;

    let mut slots = Vec::with_capacity((cols as usize).saturating_mul(rows as usize));
    for dy in 0..rows {
        for dx in 0..cols {
            let Some(coord) = TileCoordinate::wrap(
                zoom,
                first_col as i64 + i64::from(dx),
                first_row as i64 + i64::from(dy),
            ) else {
                continue;
            };

            let dest = ScreenRect::new(
                (f64::from(dx) * tile - offset_x).floor() as i32,
                (f64::from(dy) * tile - offset_y).floor() as i32,
                TILE_SIZE,
                TILE_SIZE,
            );
            if !dest.intersects_window(width, height) {
                continue;
            }
            slots.push(TileSlot { coord, dest });
        }
    }
    slots
}
