use std::path::Path;

use thiserror::Error;

/// Errors that can occur while resolving a tile.
///
/// A coordinate that is already being fetched by another task is not an
/// error; see [`FetchOutcome::AlreadyInFlight`](crate::tile::FetchOutcome).
#[derive(Debug, Clone, Error)]
pub enum TileError {
    /// Transport failure: DNS, connect, TLS, timeout or a truncated body
    #[error("Network error fetching {url}: {message}")]
    Network { url: String, message: String },

    /// The tile server answered with a non-2xx status
    #[error("HTTP {status} from {url}")]
    HttpStatus { url: String, status: u16 },

    /// Bytes from disk or network are not a decodable image
    #[error("Decode error: {message}")]
    Decode { message: String },

    /// Creating, writing, renaming or removing a cache file failed
    #[error("Disk I/O error at {path}: {message}")]
    DiskIo { path: String, message: String },

    /// The fetch task panicked or its worker went away before answering
    #[error("Worker fault: {message}")]
    WorkerFault { message: String },

    /// Work was submitted after the queue was shut down
    #[error("Work queue is shut down")]
    QueueClosed,
}

impl TileError {
    /// Build a `DiskIo` error from a path and the underlying I/O error.
    pub fn disk_io(path: &Path, err: std::io::Error) -> Self {
        TileError::DiskIo {
            path: path.display().to_string(),
            message: err.to_string(),
        }
    }

    /// Build a `Decode` error from anything displayable.
    pub fn decode(message: impl ToString) -> Self {
        TileError::Decode {
            message: message.to_string(),
        }
    }

    /// Whether this failure came from the tile server or the network path to it.
    pub fn is_network(&self) -> bool {
        matches!(
            self,
            TileError::Network { .. } | TileError::HttpStatus { .. }
        )
    }
}
