use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use tracing::trace;

use crate::error::TileError;

/// Default connect timeout.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Default total request timeout.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Default client identifier sent as the User-Agent.
///
/// Public tile servers (OpenStreetMap in particular) refuse anonymous or
/// browser-impersonating clients.
pub const DEFAULT_USER_AGENT: &str = concat!("slippy-cache/", env!("CARGO_PKG_VERSION"));

/// Trait for fetching tile bytes over HTTP.
///
/// This abstraction lets the fetch pipeline run against a real server or
/// against an in-process mock in tests.
#[async_trait]
pub trait TileClient: Send + Sync {
    /// GET `url` and return the body.
    ///
    /// Transport failures map to [`TileError::Network`], non-2xx answers to
    /// [`TileError::HttpStatus`].
    async fn get(&self, url: &str) -> Result<Bytes, TileError>;
}

/// HTTP settings for [`ReqwestTileClient`].
#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub connect_timeout: Duration,
    pub timeout: Duration,
    pub user_agent: String,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            timeout: DEFAULT_REQUEST_TIMEOUT,
            user_agent: DEFAULT_USER_AGENT.to_string(),
        }
    }
}

/// [`TileClient`] backed by a pooled reqwest client.
#[derive(Debug, Clone)]
pub struct ReqwestTileClient {
    client: reqwest::Client,
}

impl ReqwestTileClient {
    /// Build a client with the given timeouts and user agent.
    pub fn new(config: &ClientConfig) -> Result<Self, TileError> {
        let client = reqwest::Client::builder()
            .connect_timeout(config.connect_timeout)
            .timeout(config.timeout)
            .user_agent(config.user_agent.as_str())
            .build()
            .map_err(|e| TileError::Network {
                url: String::new(),
                message: format!("Failed to create HTTP client: {}", e),
            })?;

        Ok(Self { client })
    }
}

#[async_trait]
impl TileClient for ReqwestTileClient {
    async fn get(&self, url: &str) -> Result<Bytes, TileError> {
        trace!(url, "GET");
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| TileError::Network {
                url: url.to_string(),
                message: e.to_string(),
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(TileError::HttpStatus {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        response.bytes().await.map_err(|e| TileError::Network {
            url: url.to_string(),
            message: format!("Failed to read response body: {}", e),
        })
    }
}
