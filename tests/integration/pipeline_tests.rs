//! Fetch pipeline integration tests.
//!
//! Tests verify:
//! - Concurrent requests for one tile cause exactly one network fetch
//! - The disk tier survives a restart and repopulates memory without refetching
//! - Evicted tiles come back from disk, not the network
//! - Corrupt disk files and failed fetches never leak in-flight claims

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use slippy_cache::tile::{FetchOutcome, TileOrigin};
use slippy_cache::work::WorkQueue;
use slippy_cache::TileError;

use super::test_utils::{coord, create_pipeline, tile_color, tile_png, TrackingMockClient};

const BASE: &str = TrackingMockClient::BASE;

// =============================================================================
// Deduplication
// =============================================================================

#[test]
fn test_concurrent_submissions_fetch_once() {
    let dir = tempfile::tempdir().unwrap();
    let client = Arc::new(TrackingMockClient::new().with_delay(Duration::from_millis(150)));
    let pipeline = create_pipeline(client.clone(), dir.path(), BASE, 64);
    let queue = WorkQueue::new(4).unwrap();
    let tile = coord(5, 28, 12);

    let first = pipeline.submit_fetch(&queue, tile);
    let second = pipeline.submit_fetch(&queue, tile);
    let outcomes = [first.wait().unwrap(), second.wait().unwrap()];

    assert_eq!(client.request_count(), 1);
    assert_eq!(outcomes.iter().filter(|o| o.is_ready()).count(), 1);
    assert!(outcomes.contains(&FetchOutcome::AlreadyInFlight));

    // Both callers now observe the same cached handle.
    let cached = pipeline.cache().try_get(&tile).unwrap();
    let fetched = outcomes.iter().find_map(|o| o.handle()).unwrap();
    assert!(cached.ptr_eq(fetched));
    assert!(!pipeline.cache().is_in_flight(&tile));
}

#[tokio::test]
async fn test_many_concurrent_callers() {
    let dir = tempfile::tempdir().unwrap();
    let client = Arc::new(TrackingMockClient::new().with_delay(Duration::from_millis(50)));
    let pipeline = create_pipeline(client.clone(), dir.path(), BASE, 64);
    let tile = coord(3, 4, 2);

    let mut handles = Vec::new();
    for _ in 0..16 {
        let pipeline = pipeline.clone();
        handles.push(tokio::spawn(async move { pipeline.fetch(tile).await }));
    }

    let mut ready = 0;
    for handle in handles {
        if handle.await.unwrap().unwrap().is_ready() {
            ready += 1;
        }
    }

    assert_eq!(ready, 1);
    assert_eq!(client.request_count(), 1);
    assert_eq!(
        client.get_requests().await,
        vec![format!("{}/3/4/2.png", BASE)]
    );
}

#[tokio::test]
async fn test_distinct_tiles_fetch_in_parallel() {
    let dir = tempfile::tempdir().unwrap();
    let client = Arc::new(TrackingMockClient::new().with_delay(Duration::from_millis(20)));
    let pipeline = create_pipeline(client.clone(), dir.path(), BASE, 64);

    let tiles: Vec<_> = (0..8).map(|x| coord(4, x, 5)).collect();
    let mut handles = Vec::new();
    for tile in &tiles {
        let pipeline = pipeline.clone();
        let tile = *tile;
        handles.push(tokio::spawn(async move { pipeline.fetch(tile).await }));
    }
    for handle in handles {
        assert!(handle.await.unwrap().unwrap().is_ready());
    }

    assert_eq!(client.request_count(), tiles.len());
    let requested: HashSet<String> = client.get_requests().await.into_iter().collect();
    assert_eq!(requested.len(), tiles.len());
    assert_eq!(pipeline.cache().in_flight_count(), 0);
}

// =============================================================================
// Two-Tier Caching
// =============================================================================

#[tokio::test]
async fn test_disk_tier_survives_restart() {
    let dir = tempfile::tempdir().unwrap();
    let tile = coord(6, 56, 25);

    let first_client = Arc::new(TrackingMockClient::new());
    let first = create_pipeline(first_client.clone(), dir.path(), BASE, 64);
    let outcome = first.fetch(tile).await.unwrap();
    assert_eq!(outcome.origin(), Some(TileOrigin::Network));
    drop(first);

    // A fresh process: empty memory tier, same cache directory.
    let second_client = Arc::new(TrackingMockClient::new());
    let second = create_pipeline(second_client.clone(), dir.path(), BASE, 64);
    assert!(!second.cache().is_cached(&tile));

    let outcome = second.fetch(tile).await.unwrap();
    assert_eq!(outcome.origin(), Some(TileOrigin::Disk));
    assert_eq!(second_client.request_count(), 0);
    assert_eq!(
        *outcome.handle().unwrap().image().get_pixel(10, 10),
        tile_color(&tile)
    );

    let outcome = second.fetch(tile).await.unwrap();
    assert_eq!(outcome.origin(), Some(TileOrigin::Memory));
}

#[tokio::test]
async fn test_evicted_tiles_reload_from_disk() {
    let dir = tempfile::tempdir().unwrap();
    let client = Arc::new(TrackingMockClient::new());
    let pipeline = create_pipeline(client.clone(), dir.path(), BASE, 3);

    let tiles: Vec<_> = (0..6).map(|y| coord(3, 1, y)).collect();
    for tile in &tiles {
        pipeline.fetch(*tile).await.unwrap();
        assert!(pipeline.cache().len() <= 3);
    }
    assert_eq!(client.request_count(), 6);
    assert!(!pipeline.cache().is_cached(&tiles[0]));

    let outcome = pipeline.fetch(tiles[0]).await.unwrap();
    assert_eq!(outcome.origin(), Some(TileOrigin::Disk));
    assert_eq!(client.request_count(), 6);
    assert_eq!(pipeline.cache().lru_order()[0], tiles[0]);
}

#[tokio::test]
async fn test_disk_file_matches_served_bytes() {
    let dir = tempfile::tempdir().unwrap();
    let client = Arc::new(TrackingMockClient::new());
    let pipeline = create_pipeline(client, dir.path(), BASE, 8);
    let tile = coord(2, 3, 1);

    pipeline.fetch(tile).await.unwrap();

    let path = pipeline.cache().disk_path(&tile);
    assert_eq!(path, dir.path().join("2").join("3").join("1.png"));
    let on_disk = tokio::fs::read(&path).await.unwrap();
    assert_eq!(Bytes::from(on_disk), tile_png(&tile));
    assert!(!pipeline.cache().disk().temp_path_for(&tile).exists());
}

// =============================================================================
// Failure Containment
// =============================================================================

#[tokio::test]
async fn test_corrupt_disk_file_is_refetched() {
    let dir = tempfile::tempdir().unwrap();
    let tile = coord(4, 9, 9);
    let client = Arc::new(TrackingMockClient::new());
    let pipeline = create_pipeline(client.clone(), dir.path(), BASE, 8);

    let path = pipeline.cache().disk_path(&tile);
    tokio::fs::create_dir_all(path.parent().unwrap()).await.unwrap();
    tokio::fs::write(&path, b"<html>rate limited</html>")
        .await
        .unwrap();

    let outcome = pipeline.fetch(tile).await.unwrap();
    assert_eq!(outcome.origin(), Some(TileOrigin::Network));
    assert_eq!(client.request_count(), 1);

    let repaired = tokio::fs::read(&path).await.unwrap();
    assert_eq!(Bytes::from(repaired), tile_png(&tile));
}

#[tokio::test]
async fn test_failed_fetch_can_be_retried() {
    let dir = tempfile::tempdir().unwrap();
    let tile = coord(5, 1, 1);

    let failing = Arc::new(TrackingMockClient::new().with_missing(tile));
    let pipeline = create_pipeline(failing, dir.path(), BASE, 8);
    let err = pipeline.fetch(tile).await.unwrap_err();
    assert!(err.is_network());
    assert!(!pipeline.cache().is_in_flight(&tile));

    // The claim was released, so a later attempt proceeds normally.
    let healthy = Arc::new(TrackingMockClient::new());
    let retry = create_pipeline(healthy, dir.path(), BASE, 8);
    assert!(retry.fetch(tile).await.unwrap().is_ready());
}

#[tokio::test]
async fn test_undecodable_response_is_decode_error() {
    let dir = tempfile::tempdir().unwrap();
    let tile = coord(1, 0, 0);
    let client = Arc::new(
        TrackingMockClient::new().with_body(tile, Bytes::from_static(b"GIF89a not really")),
    );
    let pipeline = create_pipeline(client, dir.path(), BASE, 8);

    let result = pipeline.fetch(tile).await;
    assert!(matches!(result, Err(TileError::Decode { .. })));
    assert!(!pipeline.cache().is_cached(&tile));
    assert_eq!(pipeline.cache().in_flight_count(), 0);
}
