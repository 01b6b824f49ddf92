//! Test utilities for integration tests.
//!
//! This module provides a request-tracking mock tile client, a loopback HTTP
//! tile server built on axum, and helpers for creating PNG tile fixtures.

use async_trait::async_trait;
use axum::extract::{Path, State};
use axum::http::header::{CONTENT_TYPE, USER_AGENT};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::Router;
use bytes::Bytes;
use image::{ImageFormat, Rgba, RgbaImage};
use std::collections::{HashMap, HashSet};
use std::io::Cursor;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::runtime::Runtime;
use tokio::sync::RwLock;

use slippy_cache::io::{DiskCache, TileClient};
use slippy_cache::tile::{
    tile_url, PipelineConfig, RgbaTileDecoder, TileCache, TileCoordinate, TileFetchPipeline,
};
use slippy_cache::TileError;

// =============================================================================
// PNG Fixtures
// =============================================================================

/// Distinct, deterministic color for a tile, so drawn frames can be checked.
pub fn tile_color(coord: &TileCoordinate) -> Rgba<u8> {
    Rgba([
        (coord.x.wrapping_mul(37) % 256) as u8,
        (coord.y.wrapping_mul(59) % 256) as u8,
        coord.zoom.wrapping_mul(11),
        255,
    ])
}

/// Encode a solid 256×256 PNG.
pub fn create_test_png(color: Rgba<u8>) -> Bytes {
    let img = RgbaImage::from_pixel(256, 256, color);
    let mut out = Vec::new();
    img.write_to(&mut Cursor::new(&mut out), ImageFormat::Png)
        .expect("Failed to encode PNG");
    Bytes::from(out)
}

/// PNG fixture for a coordinate, colored with [`tile_color`].
pub fn tile_png(coord: &TileCoordinate) -> Bytes {
    create_test_png(tile_color(coord))
}

pub fn coord(zoom: u8, x: u32, y: u32) -> TileCoordinate {
    TileCoordinate::new(zoom, x, y).expect("Coordinate outside the grid")
}

// =============================================================================
// Mock Tile Client with Request Tracking
// =============================================================================

/// A mock tile client that serves every existing tile and records each request.
///
/// This is useful for verifying deduplication and cache behavior without
/// a network.
#[derive(Clone)]
pub struct TrackingMockClient {
    base: String,
    overrides: Arc<HashMap<String, Bytes>>,
    missing: Arc<HashSet<String>>,
    delay: Duration,
    request_count: Arc<AtomicUsize>,
    requests: Arc<RwLock<Vec<String>>>,
}

impl TrackingMockClient {
    pub const BASE: &'static str = "http://mock.tiles";

    pub fn new() -> Self {
        Self {
            base: Self::BASE.to_string(),
            overrides: Arc::new(HashMap::new()),
            missing: Arc::new(HashSet::new()),
            delay: Duration::ZERO,
            request_count: Arc::new(AtomicUsize::new(0)),
            requests: Arc::new(RwLock::new(Vec::new())),
        }
    }

    /// Delay every response, widening race windows.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Serve `data` instead of the generated fixture for `coord`.
    pub fn with_body(mut self, coord: TileCoordinate, data: Bytes) -> Self {
        Arc::make_mut(&mut self.overrides).insert(tile_url(&self.base, &coord), data);
        self
    }

    /// Answer 404 for `coord`.
    pub fn with_missing(mut self, coord: TileCoordinate) -> Self {
        Arc::make_mut(&mut self.missing).insert(tile_url(&self.base, &coord));
        self
    }

    pub fn request_count(&self) -> usize {
        self.request_count.load(Ordering::SeqCst)
    }

    pub async fn get_requests(&self) -> Vec<String> {
        self.requests.read().await.clone()
    }
}

impl Default for TrackingMockClient {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl TileClient for TrackingMockClient {
    async fn get(&self, url: &str) -> Result<Bytes, TileError> {
        self.request_count.fetch_add(1, Ordering::SeqCst);
        self.requests.write().await.push(url.to_string());

        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }

        if self.missing.contains(url) {
            return Err(TileError::HttpStatus {
                url: url.to_string(),
                status: 404,
            });
        }
        if let Some(data) = self.overrides.get(url) {
            return Ok(data.clone());
        }

        let tile = parse_tile_url(&self.base, url).ok_or_else(|| TileError::HttpStatus {
            url: url.to_string(),
            status: 404,
        })?;
        Ok(tile_png(&tile))
    }
}

fn parse_tile_url(base: &str, url: &str) -> Option<TileCoordinate> {
    let path = url.strip_prefix(base)?.strip_prefix('/')?;
    let path = path.strip_suffix(".png")?;
    let mut parts = path.split('/');
    let zoom = parts.next()?.parse().ok()?;
    let x = parts.next()?.parse().ok()?;
    let y = parts.next()?.parse().ok()?;
    TileCoordinate::new(zoom, x, y)
}

// =============================================================================
// Pipeline Construction
// =============================================================================

/// Pipeline over `client` with a cache rooted at `disk`, without the fair-use pause.
pub fn create_pipeline(
    client: Arc<dyn TileClient>,
    disk: &std::path::Path,
    base: &str,
    capacity: usize,
) -> TileFetchPipeline<RgbaTileDecoder> {
    let cache = Arc::new(TileCache::with_capacity(DiskCache::new(disk), capacity));
    let config = PipelineConfig {
        tile_url: base.to_string(),
        fetch_delay: Duration::ZERO,
    };
    TileFetchPipeline::new(cache, client, RgbaTileDecoder::new(), config)
}

// =============================================================================
// Loopback Tile Server
// =============================================================================

/// Observations made by the loopback server.
#[derive(Default)]
pub struct ServerState {
    requests: AtomicUsize,
    user_agents: Mutex<Vec<String>>,
    missing: Mutex<HashSet<TileCoordinate>>,
}

impl ServerState {
    pub fn request_count(&self) -> usize {
        self.requests.load(Ordering::SeqCst)
    }

    pub fn user_agents(&self) -> Vec<String> {
        self.user_agents.lock().unwrap().clone()
    }

    /// Answer 404 for `coord` from now on.
    pub fn set_missing(&self, coord: TileCoordinate) {
        self.missing.lock().unwrap().insert(coord);
    }
}

/// An axum tile server on an ephemeral loopback port, serving
/// `/{z}/{x}/{y}.png` with [`tile_png`] fixtures.
///
/// Runs on its own runtime so both sync and async tests can use it.
pub struct TestTileServer {
    base_url: String,
    state: Arc<ServerState>,
    runtime: Option<Runtime>,
}

impl TestTileServer {
    pub fn start() -> Self {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(2)
            .enable_all()
            .build()
            .expect("Failed to build server runtime");

        let std_listener =
            std::net::TcpListener::bind("127.0.0.1:0").expect("Failed to bind loopback port");
        std_listener
            .set_nonblocking(true)
            .expect("Failed to set non-blocking");
        let addr = std_listener.local_addr().expect("No local address");

        let state = Arc::new(ServerState::default());
        let app = Router::new()
            .route("/{z}/{x}/{file}", get(serve_tile))
            .with_state(Arc::clone(&state));

        let listener = {
            let _guard = runtime.enter();
            tokio::net::TcpListener::from_std(std_listener).expect("Failed to adopt listener")
        };
        runtime.spawn(async move {
            let _ = axum::serve(listener, app).await;
        });

        Self {
            base_url: format!("http://{}", addr),
            state,
            runtime: Some(runtime),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn state(&self) -> &ServerState {
        &self.state
    }
}

impl Drop for TestTileServer {
    fn drop(&mut self) {
        if let Some(runtime) = self.runtime.take() {
            runtime.shutdown_background();
        }
    }
}

async fn serve_tile(
    State(state): State<Arc<ServerState>>,
    Path((zoom, x, file)): Path<(u8, u32, String)>,
    headers: HeaderMap,
) -> Response {
    state.requests.fetch_add(1, Ordering::SeqCst);
    if let Some(agent) = headers.get(USER_AGENT).and_then(|v| v.to_str().ok()) {
        state.user_agents.lock().unwrap().push(agent.to_string());
    }

    let Some(y) = file
        .strip_suffix(".png")
        .and_then(|y| y.parse::<u32>().ok())
    else {
        return StatusCode::BAD_REQUEST.into_response();
    };
    let Some(tile) = TileCoordinate::new(zoom, x, y) else {
        return StatusCode::NOT_FOUND.into_response();
    };
    if state.missing.lock().unwrap().contains(&tile) {
        return StatusCode::NOT_FOUND.into_response();
    }

    ([(CONTENT_TYPE, "image/png")], tile_png(&tile)).into_response()
}
