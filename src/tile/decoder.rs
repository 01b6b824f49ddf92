//! Tile image decoding.
//!
//! The cache and pipeline never touch pixels directly. They hand raw bytes
//! to a [`TileDecoder`], which turns them into whatever handle the drawing
//! backend wants (a GPU texture, a surface, or the software
//! [`DecodedTile`] below).
//!
//! Handles must be cheap to clone: the cache owns one reference and every
//! frame that draws the tile briefly holds another. Dropping the cache's
//! reference on eviction is what releases the resource.

use std::fmt;
use std::io::Cursor;
use std::sync::Arc;

use image::{ImageReader, RgbaImage};

use crate::error::TileError;

/// Capability to turn encoded tile bytes into a displayable handle.
pub trait TileDecoder: Send + Sync + 'static {
    /// The displayable handle produced by this decoder.
    type Handle: Clone + Send + Sync + 'static;

    /// Decode encoded image bytes (PNG for the default tile source).
    fn decode(&self, bytes: &[u8]) -> Result<Self::Handle, TileError>;
}

/// A decoded RGBA tile, shared by reference count.
#[derive(Clone)]
pub struct DecodedTile {
    image: Arc<RgbaImage>,
}

impl DecodedTile {
    /// Wrap an already decoded image.
    pub fn new(image: RgbaImage) -> Self {
        Self {
            image: Arc::new(image),
        }
    }

    /// The pixel data.
    pub fn image(&self) -> &RgbaImage {
        &self.image
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }

    /// Whether both handles point at the same decoded image.
    pub fn ptr_eq(&self, other: &DecodedTile) -> bool {
        Arc::ptr_eq(&self.image, &other.image)
    }
}

impl PartialEq for DecodedTile {
    fn eq(&self, other: &Self) -> bool {
        self.ptr_eq(other) || *self.image == *other.image
    }
}

impl fmt::Debug for DecodedTile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DecodedTile")
            .field("width", &self.width())
            .field("height", &self.height())
            .finish()
    }
}

/// Software decoder producing [`DecodedTile`] handles.
///
/// The format is sniffed from the bytes, so a server answering with
/// something other than PNG is rejected as a decode error rather than
/// producing garbage.
#[derive(Debug, Clone, Default)]
pub struct RgbaTileDecoder {}

impl RgbaTileDecoder {
    pub fn new() -> Self {
        Self {}
    }
}

impl TileDecoder for RgbaTileDecoder {
    type Handle = DecodedTile;

    fn decode(&self, bytes: &[u8]) -> Result<DecodedTile, TileError> {
        if bytes.is_empty() {
            return Err(TileError::decode("empty image data"));
        }

        let reader = ImageReader::new(Cursor::new(bytes))
            .with_guessed_format()
            .map_err(TileError::decode)?;

        if reader.format().is_none() {
            return Err(TileError::decode("unrecognized image format"));
        }

        let img = reader.decode().map_err(TileError::decode)?;
        Ok(DecodedTile::new(img.to_rgba8()))
    }
}
