use std::time::Duration;

use async_trait::async_trait;
use axum::Router;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use bytes::Bytes;
use http_body_util::BodyExt;
use pretty_assertions::{assert_eq, assert_ne};
use serde_json::Value;
use stash::CacheConfig;
use stash_backend::{CacheKey, MemoryStore, Store, StoreError, StoreResult};
use stash_server::routes::cache_routes;
use stash_tower::Cache;
use tokio::time::Instant;
use tower::ServiceExt;

const PROCESSING_TIME: Duration = Duration::from_secs(2);

struct Reply {
    status: StatusCode,
    cache_status: String,
    ttl: Option<u64>,
    body: Value,
    elapsed: Duration,
}

async fn get_test(app: &Router) -> Reply {
    let start = Instant::now();
    let response = app
        .clone()
        .oneshot(Request::get("/test").body(Body::empty()).unwrap())
        .await
        .unwrap();
    let elapsed = start.elapsed();

    let status = response.status();
    let headers = response.headers().clone();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    Reply {
        status,
        cache_status: headers["x-cache-status"].to_str().unwrap().to_owned(),
        ttl: headers
            .get("redis-ttl")
            .map(|value| value.to_str().unwrap().parse().unwrap()),
        body: serde_json::from_slice(&bytes).unwrap(),
        elapsed,
    }
}

fn cached_app<St: Store + 'static>(store: St) -> (Router, Cache<St>) {
    let cache = Cache::builder()
        .store(store)
        .config(CacheConfig::builder().ttl(Duration::from_secs(10)).build())
        .build();
    (cache_routes(cache.clone(), PROCESSING_TIME), cache)
}

#[tokio::test(start_paused = true)]
async fn second_request_is_served_from_cache() {
    let store = MemoryStore::new();
    let (app, cache) = cached_app(store.clone());

    let first = get_test(&app).await;
    cache.write_behind().wait_all().await;
    assert_eq!(first.status, StatusCode::OK);
    assert_eq!(first.cache_status, "MISS");
    assert_eq!(first.ttl, Some(10));
    assert_eq!(first.body["comment"], "I'm an expensive result");
    assert!(first.body["value"].is_f64());
    assert!(first.elapsed >= PROCESSING_TIME);

    let second = get_test(&app).await;
    assert_eq!(second.status, StatusCode::OK);
    assert_eq!(second.cache_status, "HIT");
    assert_eq!(second.body, first.body);
    assert!(second.ttl.unwrap() <= 10);
    assert!(second.elapsed < PROCESSING_TIME);

    assert_eq!(store.counters().set_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn remaining_ttl_decreases_between_hits() {
    let (app, cache) = cached_app(MemoryStore::new());
    get_test(&app).await;
    cache.write_behind().wait_all().await;

    let fresh = get_test(&app).await;
    assert_eq!(fresh.ttl, Some(10));

    tokio::time::advance(Duration::from_secs(3)).await;
    let later = get_test(&app).await;
    assert_eq!(later.cache_status, "HIT");
    assert_eq!(later.ttl, Some(7));
}

#[tokio::test(start_paused = true)]
async fn expired_entry_is_recomputed() {
    let store = MemoryStore::new();
    let (app, cache) = cached_app(store.clone());

    let first = get_test(&app).await;
    cache.write_behind().wait_all().await;

    tokio::time::advance(Duration::from_secs(10)).await;
    let second = get_test(&app).await;
    cache.write_behind().wait_all().await;

    assert_eq!(second.cache_status, "MISS");
    assert_eq!(second.ttl, Some(10));
    assert_ne!(second.body["value"], first.body["value"]);
    assert!(second.elapsed >= PROCESSING_TIME);
    assert_eq!(store.counters().set_count(), 2);

    let stored: Value = serde_json::from_slice(
        &store.get(&CacheKey::new("cache:/test")).await.unwrap(),
    )
    .unwrap();
    assert_eq!(stored, second.body);
}

/// Store behaving like a Redis server that is down.
struct DownStore;

#[async_trait]
impl Store for DownStore {
    async fn exists(&self, _key: &CacheKey) -> StoreResult<bool> {
        Err(StoreError::unavailable("connection refused"))
    }

    async fn get(&self, _key: &CacheKey) -> StoreResult<Bytes> {
        Err(StoreError::unavailable("connection refused"))
    }

    async fn set(&self, _key: &CacheKey, _value: Bytes, _ttl: Duration) -> StoreResult<()> {
        Err(StoreError::unavailable("connection refused"))
    }

    async fn ttl(&self, _key: &CacheKey) -> StoreResult<Option<u64>> {
        Err(StoreError::unavailable("connection refused"))
    }
}

#[tokio::test(start_paused = true)]
async fn store_outage_degrades_to_uncached_responses() {
    let (app, cache) = cached_app(DownStore);

    let first = get_test(&app).await;
    let second = get_test(&app).await;
    cache.write_behind().wait_all().await;

    for reply in [&first, &second] {
        assert_eq!(reply.status, StatusCode::OK);
        assert_eq!(reply.cache_status, "MISS");
        assert!(reply.elapsed >= PROCESSING_TIME);
    }
    assert_ne!(first.body["value"], second.body["value"]);
    assert_eq!(cache.write_behind().failed_writes(), 2);
}

#[tokio::test(start_paused = true)]
async fn unknown_routes_bypass_the_cache() {
    let (app, _cache) = cached_app(MemoryStore::new());
    let response = app
        .oneshot(Request::get("/nope").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert!(response.headers().get("x-cache-status").is_none());
}

#[tokio::test]
async fn chat_route_requires_websocket_upgrade() {
    use stash_redis::{Fanout, Relay};
    use stash_server::{Chat, app};

    let chat = Chat {
        relay: Relay::new("redis://127.0.0.1/", "chat").unwrap(),
        fanout: Fanout::default(),
    };
    let cache = Cache::new(MemoryStore::new());
    let router = app(cache, PROCESSING_TIME, chat);

    let response = router
        .oneshot(Request::get("/ws").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert!(response.status().is_client_error());
    assert!(response.headers().get("x-cache-status").is_none());
}
