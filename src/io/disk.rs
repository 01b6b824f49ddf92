//! On-disk tile store.
//!
//! Tiles are stored as the raw bytes the server sent, laid out as
//! `{root}/{zoom}/{x}/{y}.png`. Directories are created on demand.
//!
//! Writes go to a sibling `{y}.png.tmp`, are flushed, and are then renamed
//! over the final path. A rename within one directory is atomic, so a
//! reader sees either no file, the previous file, or the complete new one.

use std::path::{Path, PathBuf};

use bytes::Bytes;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, warn};

use crate::error::TileError;
use crate::tile::TileCoordinate;

/// Extension appended to the final path while a write is in progress.
const TEMP_SUFFIX: &str = "tmp";

/// Durable tile store rooted at a cache directory.
#[derive(Debug, Clone)]
pub struct DiskCache {
    root: PathBuf,
}

impl DiskCache {
    /// Create a store rooted at `root`. Nothing is touched on disk until
    /// the first write.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Deterministic location of a tile: `{root}/{zoom}/{x}/{y}.png`.
    pub fn path_for(&self, coord: &TileCoordinate) -> PathBuf {
        self.root
            .join(coord.zoom.to_string())
            .join(coord.x.to_string())
            .join(format!("{}.png", coord.y))
    }

    /// Sibling path used while writing a tile.
    pub fn temp_path_for(&self, coord: &TileCoordinate) -> PathBuf {
        let mut path = self.path_for(coord);
        let name = format!("{}.png.{}", coord.y, TEMP_SUFFIX);
        path.set_file_name(name);
        path
    }

    /// Whether a committed tile file exists.
    pub async fn exists(&self, coord: &TileCoordinate) -> bool {
        fs::try_exists(self.path_for(coord)).await.unwrap_or(false)
    }

    /// Read a tile's bytes, or `None` if it has never been written.
    pub async fn read(&self, coord: &TileCoordinate) -> Result<Option<Bytes>, TileError> {
        let path = self.path_for(coord);
        match fs::read(&path).await {
            Ok(data) => Ok(Some(Bytes::from(data))),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(TileError::disk_io(&path, e)),
        }
    }

    /// Persist a tile atomically, returning its final path.
    pub async fn write(&self, coord: &TileCoordinate, data: &[u8]) -> Result<PathBuf, TileError> {
        let temp = self.write_temp(coord, data).await?;
        self.commit(coord, &temp).await
    }

    /// Delete a tile file. A missing file is not an error.
    pub async fn remove(&self, coord: &TileCoordinate) -> Result<(), TileError> {
        let path = self.path_for(coord);
        match fs::remove_file(&path).await {
            Ok(()) => {
                debug!(path = %path.display(), "Removed cached tile file");
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(TileError::disk_io(&path, e)),
        }
    }

    /// First half of [`write`](Self::write): fully write and flush the temp file.
    pub(crate) async fn write_temp(
        &self,
        coord: &TileCoordinate,
        data: &[u8],
    ) -> Result<PathBuf, TileError> {
        let temp = self.temp_path_for(coord);
        if let Some(dir) = temp.parent() {
            fs::create_dir_all(dir)
                .await
                .map_err(|e| TileError::disk_io(dir, e))?;
        }

        let result = async {
            let mut file = fs::File::create(&temp).await?;
            file.write_all(data).await?;
            file.sync_all().await
        }
        .await;

        if let Err(e) = result {
            discard_temp(&temp).await;
            return Err(TileError::disk_io(&temp, e));
        }
        Ok(temp)
    }

    /// Second half of [`write`](Self::write): rename the temp file into place.
    pub(crate) async fn commit(
        &self,
        coord: &TileCoordinate,
        temp: &Path,
    ) -> Result<PathBuf, TileError> {
        let path = self.path_for(coord);
        if let Err(e) = fs::rename(temp, &path).await {
            discard_temp(temp).await;
            return Err(TileError::disk_io(&path, e));
        }
        Ok(path)
    }
}

async fn discard_temp(temp: &Path) {
    if let Err(e) = fs::remove_file(temp).await {
        if e.kind() != std::io::ErrorKind::NotFound {
            warn!(path = %temp.display(), error = %e, "Failed to remove temporary tile file");
        }
    }
}
