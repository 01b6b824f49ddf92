//! Drawing surface abstraction.
//!
//! The renderer only decides *what* goes where. Putting pixels on screen
//! is the host's job, through [`TileCanvas`]. [`ImageCanvas`] is a software
//! implementation that composites into an in-memory RGBA image, used by the
//! CLI to write frames to PNG and by tests to inspect output.

use std::path::Path;

use image::imageops::{self, FilterType};
use image::{Rgba, RgbaImage};

use crate::error::TileError;
use crate::tile::DecodedTile;

use super::slots::{ScreenRect, SourceRect};

/// Frame background.
pub const BACKGROUND: Rgba<u8> = Rgba([255, 255, 255, 255]);

/// Fill for slots with neither the tile nor its parent available.
pub const PLACEHOLDER: Rgba<u8> = Rgba([200, 200, 200, 255]);

/// Capability to draw tile handles into destination rectangles.
pub trait TileCanvas {
    /// The handle type this canvas can draw.
    type Handle;

    /// Fill the whole frame with the background.
    fn clear(&mut self);

    /// Draw `handle` into `dest`, scaling as needed.
    ///
    /// With `source`, only that region of the tile is drawn (stretched to
    /// fill `dest`); otherwise the whole tile.
    fn draw_tile(&mut self, handle: &Self::Handle, source: Option<SourceRect>, dest: ScreenRect);

    /// Fill `dest` with the neutral placeholder.
    fn fill_placeholder(&mut self, dest: ScreenRect);
}

/// Software canvas compositing into an [`RgbaImage`].
#[derive(Debug, Clone)]
pub struct ImageCanvas {
    frame: RgbaImage,
}

impl ImageCanvas {
    /// Blank canvas of the given size, filled with the background.
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            frame: RgbaImage::from_pixel(width.max(1), height.max(1), BACKGROUND),
        }
    }

    pub fn width(&self) -> u32 {
        self.frame.width()
    }

    pub fn height(&self) -> u32 {
        self.frame.height()
    }

    pub fn frame(&self) -> &RgbaImage {
        &self.frame
    }

    pub fn into_frame(self) -> RgbaImage {
        self.frame
    }

    /// Write the frame as PNG.
    pub fn save_png(&self, path: &Path) -> Result<(), TileError> {
        self.frame
            .save_with_format(path, image::ImageFormat::Png)
            .map_err(|e| TileError::DiskIo {
                path: path.display().to_string(),
                message: e.to_string(),
            })
    }

    fn blit(&mut self, pixels: &RgbaImage, dest: ScreenRect) {
        imageops::replace(&mut self.frame, pixels, i64::from(dest.x), i64::from(dest.y));
    }
}

impl TileCanvas for ImageCanvas {
    type Handle = DecodedTile;

    fn clear(&mut self) {
        for pixel in self.frame.pixels_mut() {
            *pixel = BACKGROUND;
        }
    }

    fn draw_tile(&mut self, handle: &DecodedTile, source: Option<SourceRect>, dest: ScreenRect) {
        if dest.width == 0 || dest.height == 0 || !dest.intersects_window(self.width(), self.height())
        {
            return;
        }

        let image = handle.image();
        let region = match source {
            Some(src) => {
                let x = src.x.min(image.width());
                let y = src.y.min(image.height());
                let width = src.width.min(image.width() - x);
                let height = src.height.min(image.height() - y);
                if width == 0 || height == 0 {
                    return;
                }
                imageops::crop_imm(image, x, y, width, height).to_image()
            }
            None => image.clone(),
        };

        if region.dimensions() == (dest.width, dest.height) {
            self.blit(&region, dest);
        } else {
            let scaled = imageops::resize(&region, dest.width, dest.height, FilterType::Triangle);
            self.blit(&scaled, dest);
        }
    }

    fn fill_placeholder(&mut self, dest: ScreenRect) {
        if dest.width == 0 || dest.height == 0 || !dest.intersects_window(self.width(), self.height())
        {
            return;
        }
        let fill = RgbaImage::from_pixel(dest.width, dest.height, PLACEHOLDER);
        self.blit(&fill, dest);
    }
}
