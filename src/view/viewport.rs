//! Visible map region and Web Mercator projection.

use std::f64::consts::PI;

use crate::tile::TILE_SIZE;

/// Lowest zoom a viewport may show.
pub const MIN_ZOOM: u8 = 0;

/// Highest zoom a viewport may show (the deepest level public tile servers publish).
pub const MAX_ZOOM: u8 = 19;

/// Latitude limit of the square Web Mercator world, in degrees.
pub const MAX_LATITUDE: f64 = 85.051_128_779_8;

/// Largest change, in degrees per axis, applied by a single pan step.
pub const MAX_PAN_DELTA_DEGREES: f64 = 5.0;

/// Largest window edge, in pixels, a viewport may describe.
pub const MAX_VIEWPORT_SIZE: u32 = 16_384;

/// The visible map region: center, zoom and window size in pixels.
///
/// Construction clamps every field into range, so a `Viewport` always
/// describes a drawable window.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Viewport {
    center_lat: f64,
    center_lon: f64,
    zoom: u8,
    width: u32,
    height: u32,
}

impl Viewport {
    /// Create a viewport.
    ///
    /// Latitude is clamped to ±[`MAX_LATITUDE`], longitude wrapped into
    /// `[-180, 180)`, zoom clamped to `[MIN_ZOOM, MAX_ZOOM]`, and each
    /// dimension clamped to `[1, MAX_VIEWPORT_SIZE]` pixels.
    pub fn new(center_lat: f64, center_lon: f64, zoom: u8, width: u32, height: u32) -> Self {
        Self {
            center_lat: clamp_latitude(center_lat),
            center_lon: normalize_longitude(center_lon),
            zoom: zoom.clamp(MIN_ZOOM, MAX_ZOOM),
            width: width.clamp(1, MAX_VIEWPORT_SIZE),
            height: height.clamp(1, MAX_VIEWPORT_SIZE),
        }
    }

    pub fn center_lat(&self) -> f64 {
        self.center_lat
    }

    pub fn center_lon(&self) -> f64 {
        self.center_lon
    }

    pub fn zoom(&self) -> u8 {
        self.zoom
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    /// Fractional tile position of the center at the current zoom.
    pub fn center_tile(&self) -> (f64, f64) {
        project(self.center_lat, self.center_lon, self.zoom)
    }

    /// Same viewport, recentered.
    pub fn with_center(&self, lat: f64, lon: f64) -> Self {
        Self::new(lat, lon, self.zoom, self.width, self.height)
    }

    /// Same viewport at another zoom.
    pub fn with_zoom(&self, zoom: u8) -> Self {
        Self::new(self.center_lat, self.center_lon, zoom, self.width, self.height)
    }

    /// Same viewport, resized window.
    pub fn with_size(&self, width: u32, height: u32) -> Self {
        Self::new(self.center_lat, self.center_lon, self.zoom, width, height)
    }

    /// Move the map by a pointer drag of `(dx, dy)` pixels.
    ///
    /// Dragging right moves the center west; dragging down moves it north.
    /// Each axis moves at most [`MAX_PAN_DELTA_DEGREES`] per call.
    pub fn panned_by_pixels(&self, dx: f64, dy: f64) -> Self {
        let per_pixel = degrees_per_pixel(self.zoom);
        let delta_lon = (dx * per_pixel).clamp(-MAX_PAN_DELTA_DEGREES, MAX_PAN_DELTA_DEGREES);
        let delta_lat = (dy * per_pixel).clamp(-MAX_PAN_DELTA_DEGREES, MAX_PAN_DELTA_DEGREES);
        self.with_center(self.center_lat + delta_lat, self.center_lon - delta_lon)
    }

    /// Zoom in (positive) or out (negative) by whole levels.
    pub fn zoomed_by(&self, steps: i32) -> Self {
        let zoom = (i32::from(self.zoom) + steps).clamp(i32::from(MIN_ZOOM), i32::from(MAX_ZOOM));
        // The clamp keeps the value inside u8 range.
        self.with_zoom(zoom as u8)
    }
}

impl Default for Viewport {
    /// Tokyo at zoom 5 in an 800×600 window.
    fn default() -> Self {
        Self::new(35.6895, 139.6917, 5, 800, 600)
    }
}

/// Degrees of longitude covered by one screen pixel at `zoom`.
pub fn degrees_per_pixel(zoom: u8) -> f64 {
    360.0 / (f64::from(TILE_SIZE) * 2.0_f64.powi(i32::from(zoom)))
}

/// Project a latitude/longitude to fractional tile coordinates.
///
/// The integer part of each component is the tile index; the fraction is
/// the position inside that tile.
pub fn project(lat: f64, lon: f64, zoom: u8) -> (f64, f64) {
    let n = 2.0_f64.powi(i32::from(zoom));
    let lat_rad = clamp_latitude(lat).to_radians();

    let x = (lon + 180.0) / 360.0 * n;
    let y = (1.0 - (lat_rad.tan() + 1.0 / lat_rad.cos()).ln() / PI) / 2.0 * n;
    (x, y)
}

/// Latitude/longitude of a tile's north-west corner.
pub fn tile_to_lat_lon(x: f64, y: f64, zoom: u8) -> (f64, f64) {
    let n = 2.0_f64.powi(i32::from(zoom));
    let lon = x / n * 360.0 - 180.0;
    let lat_rad = (PI * (1.0 - 2.0 * y / n)).sinh().atan();
    (lat_rad.to_degrees(), lon)
}

fn clamp_latitude(lat: f64) -> f64 {
    if lat.is_nan() {
        return 0.0;
    }
    lat.clamp(-MAX_LATITUDE, MAX_LATITUDE)
}

fn normalize_longitude(lon: f64) -> f64 {
    if !lon.is_finite() {
        return 0.0;
    }
    (lon + 180.0).rem_euclid(360.0) - 180.0
}
