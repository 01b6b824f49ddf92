//! Configuration management for slippy-cache.
//!
//! This module provides the CLI surface and the runtime settings shared by
//! every subcommand:
//! - Command-line arguments via clap
//! - Environment variables with `SLIPPY_` prefix
//! - Defaults matching the public OpenStreetMap tile service's usage policy
//!
//! # Example
//!
//! ```ignore
//! use clap::Parser;
//! use slippy_cache::config::{Cli, Command};
//!
//! let cli = Cli::parse();
//! if let Command::Locate(args) = cli.command {
//!     println!("{}", args.config.disk_cache().path_for(&args.tile).display());
//! }
//! ```
//!
//! # Environment Variables
//!
//! - `SLIPPY_TILE_URL` - Tile server base URL (default: https://tile.openstreetmap.org)
//! - `SLIPPY_CACHE_DIR` - Disk cache root (default: resources/tiles)
//! - `SLIPPY_CACHE_TILES` - Max decoded tiles kept in memory (default: 1024)
//! - `SLIPPY_WORKERS` - Fetch worker threads (default: 8)
//! - `SLIPPY_CONNECT_TIMEOUT` - HTTP connect timeout in seconds (default: 10)
//! - `SLIPPY_TIMEOUT` - HTTP total timeout in seconds (default: 30)
//! - `SLIPPY_FETCH_DELAY_MS` - Pause after each network fetch (default: 100)
//! - `SLIPPY_RETRY_DELAY_MS` - Back-off before refetching a failed tile (default: 1000)
//! - `SLIPPY_USER_AGENT` - Client identifier sent to the tile server

use std::path::PathBuf;
use std::time::Duration;

use clap::{Args, Parser, Subcommand};
use url::Url;

use crate::io::{ClientConfig, DiskCache, DEFAULT_USER_AGENT};
use crate::tile::{tile_url, PipelineConfig, TileCoordinate, DEFAULT_MEMORY_CAPACITY, DEFAULT_TILE_URL};
use crate::view::{RendererConfig, Viewport, MAX_VIEWPORT_SIZE};
use crate::work::DEFAULT_WORKERS;

// =============================================================================
// Default Values
// =============================================================================

/// Default disk cache root.
pub const DEFAULT_CACHE_DIR: &str = "resources/tiles";

/// Default HTTP connect timeout in seconds.
pub const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 10;

/// Default HTTP total timeout in seconds.
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Default pause after a network fetch, in milliseconds.
pub const DEFAULT_FETCH_DELAY_MS: u64 = 100;

/// Default renderer back-off for failed tiles, in milliseconds.
pub const DEFAULT_RETRY_DELAY_MS: u64 = 1000;

/// Default output file of the `render` subcommand.
pub const DEFAULT_RENDER_OUTPUT: &str = "frame.png";

/// Default time `render` waits for tiles before writing what it has.
pub const DEFAULT_RENDER_DEADLINE_SECS: u64 = 30;

// =============================================================================
// CLI Arguments
// =============================================================================

/// slippy-cache - Fetch, cache and composite slippy-map tiles.
#[derive(Parser, Debug, Clone)]
#[command(name = "slippy-cache")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Render a viewport to a PNG, fetching the tiles it needs.
    Render(RenderArgs),

    /// Resolve a single tile through memory, disk and network.
    Fetch(FetchArgs),

    /// Print where a tile lives in the disk cache.
    Locate(LocateArgs),
}

impl Command {
    /// Settings shared by every subcommand.
    pub fn config(&self) -> &Config {
        match self {
            Command::Render(args) => &args.config,
            Command::Fetch(args) => &args.config,
            Command::Locate(args) => &args.config,
        }
    }
}

/// Tile source, cache and worker settings.
#[derive(Args, Debug, Clone)]
pub struct Config {
    // =========================================================================
    // Tile Source
    // =========================================================================
    /// Tile server base URL; tiles are requested as `{base}/{z}/{x}/{y}.png`.
    #[arg(long, default_value = DEFAULT_TILE_URL, env = "SLIPPY_TILE_URL")]
    pub tile_url: String,

    /// User-Agent sent with every tile request.
    #[arg(long, default_value = DEFAULT_USER_AGENT, env = "SLIPPY_USER_AGENT")]
    pub user_agent: String,

    /// HTTP connect timeout in seconds.
    #[arg(long, default_value_t = DEFAULT_CONNECT_TIMEOUT_SECS, env = "SLIPPY_CONNECT_TIMEOUT")]
    pub connect_timeout: u64,

    /// HTTP total request timeout in seconds.
    #[arg(long, default_value_t = DEFAULT_TIMEOUT_SECS, env = "SLIPPY_TIMEOUT")]
    pub timeout: u64,

    /// Pause after each network fetch, in milliseconds.
    ///
    /// Public tile servers ask clients not to hammer them.
    #[arg(long, default_value_t = DEFAULT_FETCH_DELAY_MS, env = "SLIPPY_FETCH_DELAY_MS")]
    pub fetch_delay_ms: u64,

    // =========================================================================
    // Cache Configuration
    // =========================================================================
    /// Root directory of the disk cache.
    #[arg(long, default_value = DEFAULT_CACHE_DIR, env = "SLIPPY_CACHE_DIR")]
    pub cache_dir: PathBuf,

    /// Maximum number of decoded tiles kept in memory.
    #[arg(long, default_value_t = DEFAULT_MEMORY_CAPACITY, env = "SLIPPY_CACHE_TILES")]
    pub cache_tiles: usize,

    // =========================================================================
    // Workers
    // =========================================================================
    /// Number of fetch worker threads.
    #[arg(long, default_value_t = DEFAULT_WORKERS, env = "SLIPPY_WORKERS")]
    pub workers: usize,

    /// Wait before requesting a failed tile again, in milliseconds.
    #[arg(long, default_value_t = DEFAULT_RETRY_DELAY_MS, env = "SLIPPY_RETRY_DELAY_MS")]
    pub retry_delay_ms: u64,

    // =========================================================================
    // Logging Configuration
    // =========================================================================
    /// Enable verbose logging (debug level).
    #[arg(short, long, default_value_t = false)]
    pub verbose: bool,
}

/// Arguments of the `render` subcommand.
#[derive(Args, Debug, Clone)]
pub struct RenderArgs {
    #[command(flatten)]
    pub config: Config,

    /// Center latitude in degrees.
    #[arg(long, default_value_t = 35.6895, allow_negative_numbers = true)]
    pub lat: f64,

    /// Center longitude in degrees.
    #[arg(long, default_value_t = 139.6917, allow_negative_numbers = true)]
    pub lon: f64,

    /// Zoom level.
    #[arg(short, long, default_value_t = 5)]
    pub zoom: u8,

    /// Frame width in pixels.
    #[arg(long, default_value_t = 800)]
    pub width: u32,

    /// Frame height in pixels.
    #[arg(long, default_value_t = 600)]
    pub height: u32,

    /// Output PNG file.
    #[arg(short, long, default_value = DEFAULT_RENDER_OUTPUT)]
    pub output: PathBuf,

    /// Seconds to wait for tiles before writing the frame anyway.
    #[arg(long, default_value_t = DEFAULT_RENDER_DEADLINE_SECS)]
    pub deadline: u64,

    /// Print a JSON summary instead of the output path.
    #[arg(long, default_value_t = false)]
    pub json: bool,
}

impl RenderArgs {
    /// Reject frame sizes a viewport cannot describe.
    ///
    /// Shared settings are checked by [`Config::validate`].
    pub fn validate(&self) -> Result<(), String> {
        for (name, value) in [("width", self.width), ("height", self.height)] {
            if value == 0 || value > MAX_VIEWPORT_SIZE {
                return Err(format!(
                    "{} must be between 1 and {} pixels, got {}",
                    name, MAX_VIEWPORT_SIZE, value
                ));
            }
        }
        Ok(())
    }

    /// The viewport to render, clamped into range.
    pub fn viewport(&self) -> Viewport {
        Viewport::new(self.lat, self.lon, self.zoom, self.width, self.height)
    }

    pub fn deadline(&self) -> Duration {
        Duration::from_secs(self.deadline)
    }
}

/// Arguments of the `fetch` subcommand.
#[derive(Args, Debug, Clone)]
pub struct FetchArgs {
    #[command(flatten)]
    pub config: Config,

    /// Tile to fetch, as `z/x/y`.
    #[arg(value_parser = parse_tile_coordinate)]
    pub tile: TileCoordinate,

    /// Print the result as JSON.
    #[arg(long, default_value_t = false)]
    pub json: bool,
}

/// Arguments of the `locate` subcommand.
#[derive(Args, Debug, Clone)]
pub struct LocateArgs {
    #[command(flatten)]
    pub config: Config,

    /// Tile to locate, as `z/x/y`.
    #[arg(value_parser = parse_tile_coordinate)]
    pub tile: TileCoordinate,
}

impl Config {
    /// Validate the configuration and return an error message if invalid.
    pub fn validate(&self) -> Result<(), String> {
        if self.cache_tiles == 0 {
            return Err("cache_tiles must be greater than 0".to_string());
        }
        if self.workers == 0 {
            return Err("workers must be greater than 0".to_string());
        }

        if self.connect_timeout == 0 || self.timeout == 0 {
            return Err("timeouts must be greater than 0".to_string());
        }
        if self.connect_timeout > self.timeout {
            return Err(format!(
                "connect_timeout ({}s) must not exceed timeout ({}s)",
                self.connect_timeout, self.timeout
            ));
        }

        let url = Url::parse(&self.tile_url)
            .map_err(|e| format!("Invalid tile_url '{}': {}", self.tile_url, e))?;
        if url.scheme() != "http" && url.scheme() != "https" {
            return Err(format!(
                "tile_url must be http or https, got '{}'",
                url.scheme()
            ));
        }

        if self.user_agent.trim().is_empty() {
            return Err(
                "user_agent must not be empty. Public tile servers reject anonymous clients"
                    .to_string(),
            );
        }

        Ok(())
    }

    /// Request URL for a tile.
    pub fn tile_url(&self, coord: &TileCoordinate) -> String {
        tile_url(&self.tile_url, coord)
    }

    pub fn disk_cache(&self) -> DiskCache {
        DiskCache::new(&self.cache_dir)
    }

    pub fn client_config(&self) -> ClientConfig {
        ClientConfig {
            connect_timeout: Duration::from_secs(self.connect_timeout),
            timeout: Duration::from_secs(self.timeout),
            user_agent: self.user_agent.clone(),
        }
    }

    pub fn pipeline_config(&self) -> PipelineConfig {
        PipelineConfig {
            tile_url: self.tile_url.clone(),
            fetch_delay: Duration::from_millis(self.fetch_delay_ms),
        }
    }

    pub fn renderer_config(&self) -> RendererConfig {
        RendererConfig {
            workers: self.workers,
            retry_delay: Duration::from_millis(self.retry_delay_ms),
        }
    }
}

/// Parse `z/x/y` into a coordinate that exists in the tile grid.
pub fn parse_tile_coordinate(s: &str) -> Result<TileCoordinate, String> {
    let parts: Vec<&str> = s.trim().trim_end_matches(".png").split('/').collect();
    let [zoom, x, y] = parts.as_slice() else {
        return Err(format!("expected z/x/y, got '{}'", s));
    };

    let zoom: u8 = zoom
        .parse()
        .map_err(|_| format!("invalid zoom '{}'", zoom))?;
    let x: u32 = x.parse().map_err(|_| format!("invalid x '{}'", x))?;
    let y: u32 = y.parse().map_err(|_| format!("invalid y '{}'", y))?;

    TileCoordinate::new(zoom, x, y)
        .ok_or_else(|| format!("tile {}/{}/{} is outside the zoom {} grid", zoom, x, y, zoom))
}

// =============================================================================
// Tests
// =============================================================================
