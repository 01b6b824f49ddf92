//! HTTP client integration tests against a loopback tile server.
//!
//! Tests verify:
//! - The configured User-Agent is sent with every request
//! - 2xx bodies come back verbatim, non-2xx statuses become `HttpStatus`
//! - The full pipeline over real HTTP persists exactly what was served

use std::sync::Arc;
use std::time::Duration;

use slippy_cache::io::{ClientConfig, ReqwestTileClient, TileClient};
use slippy_cache::tile::{tile_url, TileOrigin};
use slippy_cache::TileError;

use super::test_utils::{coord, create_pipeline, tile_png, TestTileServer};

fn client_with_agent(agent: &str) -> ReqwestTileClient {
    let config = ClientConfig {
        connect_timeout: Duration::from_secs(2),
        timeout: Duration::from_secs(5),
        user_agent: agent.to_string(),
    };
    ReqwestTileClient::new(&config).unwrap()
}

#[tokio::test]
async fn test_get_returns_tile_body() {
    let server = TestTileServer::start();
    let client = client_with_agent("slippy-test/1.0");
    let tile = coord(4, 14, 6);

    let body = client
        .get(&tile_url(server.base_url(), &tile))
        .await
        .unwrap();
    assert_eq!(body, tile_png(&tile));
    assert_eq!(server.state().request_count(), 1);
}

#[tokio::test]
async fn test_user_agent_is_sent() {
    let server = TestTileServer::start();
    let client = client_with_agent("slippy-test/2.5 (ops@example.com)");

    for x in 0..3 {
        client
            .get(&tile_url(server.base_url(), &coord(2, x, 0)))
            .await
            .unwrap();
    }

    let agents = server.state().user_agents();
    assert_eq!(agents.len(), 3);
    assert!(agents
        .iter()
        .all(|a| a == "slippy-test/2.5 (ops@example.com)"));
}

#[tokio::test]
async fn test_default_user_agent_identifies_client() {
    let server = TestTileServer::start();
    let client = ReqwestTileClient::new(&ClientConfig::default()).unwrap();

    client
        .get(&tile_url(server.base_url(), &coord(0, 0, 0)))
        .await
        .unwrap();

    let agents = server.state().user_agents();
    assert!(agents[0].starts_with("slippy-cache/"));
}

#[tokio::test]
async fn test_missing_tile_is_http_status() {
    let server = TestTileServer::start();
    let client = client_with_agent("slippy-test/1.0");
    let tile = coord(3, 2, 2);
    server.state().set_missing(tile);

    let url = tile_url(server.base_url(), &tile);
    match client.get(&url).await {
        Err(TileError::HttpStatus { status, url: failed }) => {
            assert_eq!(status, 404);
            assert_eq!(failed, url);
        }
        other => panic!("expected HTTP 404, got {:?}", other),
    }
}

#[tokio::test]
async fn test_malformed_path_is_rejected() {
    let server = TestTileServer::start();
    let client = client_with_agent("slippy-test/1.0");

    let result = client
        .get(&format!("{}/3/2/two.png", server.base_url()))
        .await;
    assert!(matches!(
        result,
        Err(TileError::HttpStatus { status: 400, .. })
    ));
}

#[tokio::test]
async fn test_pipeline_over_http() {
    let server = TestTileServer::start();
    let dir = tempfile::tempdir().unwrap();
    let client = Arc::new(client_with_agent("slippy-test/1.0"));
    let pipeline = create_pipeline(client, dir.path(), server.base_url(), 16);
    let tile = coord(5, 28, 12);

    let outcome = pipeline.fetch(tile).await.unwrap();
    assert_eq!(outcome.origin(), Some(TileOrigin::Network));
    assert_eq!(server.state().request_count(), 1);

    let on_disk = pipeline.cache().read_from_disk(&tile).await.unwrap().unwrap();
    assert_eq!(on_disk, tile_png(&tile));

    let again = pipeline.fetch(tile).await.unwrap();
    assert_eq!(again.origin(), Some(TileOrigin::Memory));
    assert_eq!(server.state().request_count(), 1);
}

#[tokio::test]
async fn test_pipeline_surfaces_server_errors() {
    let server = TestTileServer::start();
    let dir = tempfile::tempdir().unwrap();
    let client = Arc::new(client_with_agent("slippy-test/1.0"));
    let pipeline = create_pipeline(client, dir.path(), server.base_url(), 16);
    let tile = coord(1, 1, 1);
    server.state().set_missing(tile);

    let err = pipeline.fetch(tile).await.unwrap_err();
    assert!(err.is_network());
    assert!(!pipeline.cache().is_in_flight(&tile));
    assert!(!pipeline.cache().exists_on_disk(&tile).await);
}
