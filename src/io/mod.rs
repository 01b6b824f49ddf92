mod disk;
mod http;

pub use disk::DiskCache;
pub use http::{
    ClientConfig, ReqwestTileClient, TileClient, DEFAULT_CONNECT_TIMEOUT, DEFAULT_REQUEST_TIMEOUT,
    DEFAULT_USER_AGENT,
};
