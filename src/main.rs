//! slippy-cache - Fetch, cache and composite slippy-map tiles.
//!
//! This binary wires the cache, fetch pipeline and renderer together behind
//! three subcommands: `render`, `fetch` and `locate`.

use clap::Parser;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use slippy_cache::{
    config::{Cli, Command, Config, FetchArgs, LocateArgs, RenderArgs},
    FetchOutcome, ImageCanvas, ReqwestTileClient, RgbaTileDecoder, TileCache, TileError,
    TileFetchPipeline, TileRenderer, WorkQueue,
};

/// Pause between frames while waiting for tiles.
const FRAME_INTERVAL: Duration = Duration::from_millis(16);

/// Grace period for running fetches when the binary exits.
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(2);

fn main() -> ExitCode {
    let cli = Cli::parse();
    let config = cli.command.config();

    init_logging(config.verbose);

    if let Err(e) = config.validate() {
        error!("Configuration error: {}", e);
        return ExitCode::FAILURE;
    }

    match cli.command {
        Command::Render(args) => run_render(args),
        Command::Fetch(args) => run_fetch(args),
        Command::Locate(args) => run_locate(args),
    }
}

// =============================================================================
// Render Command
// =============================================================================

fn run_render(args: RenderArgs) -> ExitCode {
    if let Err(e) = args.validate() {
        error!("Configuration error: {}", e);
        return ExitCode::FAILURE;
    }

    let config = &args.config;
    let viewport = args.viewport();

    info!("Configuration:");
    info!("  Tile source: {}", config.tile_url);
    info!("  Disk cache: {}", config.cache_dir.display());
    info!(
        "  Memory cache: {} tiles, {} workers",
        config.cache_tiles, config.workers
    );
    info!(
        "  Viewport: ({:.4}, {:.4}) zoom {} at {}x{}",
        viewport.center_lat(),
        viewport.center_lon(),
        viewport.zoom(),
        viewport.width(),
        viewport.height()
    );

    let pipeline = match build_pipeline(config) {
        Ok(pipeline) => pipeline,
        Err(e) => {
            error!("Failed to set up tile pipeline: {}", e);
            return ExitCode::FAILURE;
        }
    };

    let mut renderer = match TileRenderer::new(pipeline, viewport, &config.renderer_config()) {
        Ok(renderer) => renderer,
        Err(e) => {
            error!("Failed to start renderer: {}", e);
            return ExitCode::FAILURE;
        }
    };

    let mut canvas = ImageCanvas::new(viewport.width(), viewport.height());
    let started = Instant::now();
    let deadline = started + args.deadline();

    let mut stats = renderer.render(&mut canvas);
    let mut frames = 1;
    while !stats.is_complete() && Instant::now() < deadline {
        std::thread::sleep(FRAME_INTERVAL);
        if let Some(frame) = renderer.render_if_needed(&mut canvas) {
            stats = frame;
            frames += 1;
        }
    }

    if stats.is_complete() {
        info!(
            "Rendered {} tiles in {} frames ({:.2?})",
            stats.tiles,
            frames,
            started.elapsed()
        );
    } else {
        warn!(
            "Deadline reached: {} tiles, {} parent fallbacks, {} placeholders",
            stats.tiles, stats.fallbacks, stats.placeholders
        );
    }

    renderer.shutdown(SHUTDOWN_TIMEOUT);

    if let Err(e) = canvas.save_png(&args.output) {
        error!("Failed to write frame: {}", e);
        return ExitCode::FAILURE;
    }
    if args.json {
        let summary = serde_json::json!({
            "output": args.output.display().to_string(),
            "zoom": viewport.zoom(),
            "frames": frames,
            "complete": stats.is_complete(),
            "stats": stats,
        });
        println!("{}", summary);
    } else {
        println!("{}", args.output.display());
    }

    ExitCode::SUCCESS
}

// =============================================================================
// Fetch Command
// =============================================================================

fn run_fetch(args: FetchArgs) -> ExitCode {
    let config = &args.config;
    let tile = args.tile;

    let pipeline = match build_pipeline(config) {
        Ok(pipeline) => pipeline,
        Err(e) => {
            error!("Failed to set up tile pipeline: {}", e);
            return ExitCode::FAILURE;
        }
    };
    let queue = match WorkQueue::new(config.workers) {
        Ok(queue) => queue,
        Err(e) => {
            error!("Failed to start workers: {}", e);
            return ExitCode::FAILURE;
        }
    };

    let result = pipeline.submit_fetch(&queue, tile).wait();
    queue.shutdown(SHUTDOWN_TIMEOUT);

    match result {
        Ok(FetchOutcome::Ready { handle, origin }) => {
            let path = pipeline.cache().disk_path(&tile);
            if args.json {
                let summary = serde_json::json!({
                    "tile": tile,
                    "origin": origin,
                    "width": handle.width(),
                    "height": handle.height(),
                    "path": path.display().to_string(),
                    "url": config.tile_url(&tile),
                });
                println!("{}", summary);
            } else {
                println!(
                    "{} {} {}x{} {}",
                    tile,
                    origin,
                    handle.width(),
                    handle.height(),
                    path.display()
                );
            }
            ExitCode::SUCCESS
        }
        Ok(FetchOutcome::AlreadyInFlight) => {
            warn!("Tile {} is already being fetched", tile);
            ExitCode::FAILURE
        }
        Err(e) => {
            error!("Failed to fetch {}: {}", tile, e);
            ExitCode::FAILURE
        }
    }
}

// =============================================================================
// Locate Command
// =============================================================================

fn run_locate(args: LocateArgs) -> ExitCode {
    let path = args.config.disk_cache().path_for(&args.tile);
    if path.is_file() {
        info!("Tile {} is cached", args.tile);
    } else {
        info!("Tile {} is not cached yet", args.tile);
    }
    println!("{}", path.display());
    ExitCode::SUCCESS
}

// =============================================================================
// Setup
// =============================================================================

/// Build the fetch pipeline described by `config`.
fn build_pipeline(config: &Config) -> Result<TileFetchPipeline<RgbaTileDecoder>, TileError> {
    let client = ReqwestTileClient::new(&config.client_config())?;
    let cache = TileCache::with_capacity(config.disk_cache(), config.cache_tiles);

    Ok(TileFetchPipeline::new(
        Arc::new(cache),
        Arc::new(client),
        RgbaTileDecoder::new(),
        config.pipeline_config(),
    ))
}

/// Initialize the tracing/logging subsystem.
fn init_logging(verbose: bool) {
    let env_filter = if verbose {
        "slippy_cache=debug"
    } else {
        "slippy_cache=info"
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| env_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}
