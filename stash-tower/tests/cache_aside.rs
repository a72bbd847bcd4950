use std::convert::Infallible;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use http::{Request, Response, StatusCode, header::CONTENT_TYPE};
use http_body_util::{BodyExt, Full};
use pretty_assertions::assert_eq;
use stash::CacheConfig;
use stash_backend::{CacheKey, MemoryStore, Store, StoreError, StoreResult};
use stash_tower::{Cache, CacheBody};
use tower::{Layer, Service, ServiceExt, service_fn};

type Handler = tower::util::BoxCloneService<Request<Full<Bytes>>, Response<Full<Bytes>>, Infallible>;

/// Handler answering `{"call": n}` after `delay`, counting its invocations.
fn handler(calls: Arc<AtomicUsize>, delay: Duration) -> Handler {
    tower::util::BoxCloneService::new(service_fn(move |_req: Request<Full<Bytes>>| {
        let calls = calls.clone();
        async move {
            tokio::time::sleep(delay).await;
            let call = calls.fetch_add(1, Ordering::SeqCst) + 1;
            let body = format!(r#"{{"call":{call}}}"#);
            Ok::<_, Infallible>(
                Response::builder()
                    .header(CONTENT_TYPE, "application/json")
                    .body(Full::new(Bytes::from(body)))
                    .unwrap(),
            )
        }
    }))
}

fn get(path: &str) -> Request<Full<Bytes>> {
    Request::get(path).body(Full::default()).unwrap()
}

async fn body(response: Response<CacheBody<Full<Bytes>>>) -> String {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    String::from_utf8(bytes.to_vec()).unwrap()
}

fn header<'a>(response: &'a Response<CacheBody<Full<Bytes>>>, name: &str) -> Option<&'a str> {
    response
        .headers()
        .get(name)
        .map(|value| value.to_str().unwrap())
}

struct Harness<St: Store + 'static> {
    cache: Cache<St>,
    calls: Arc<AtomicUsize>,
    upstream: Handler,
}

impl<St: Store + 'static> Harness<St> {
    fn new(store: St) -> Self {
        Self::with_delay(store, Duration::ZERO)
    }

    fn with_delay(store: St, delay: Duration) -> Self {
        let calls = Arc::new(AtomicUsize::new(0));
        Harness {
            cache: Cache::builder().store(store).config(CacheConfig::default()).build(),
            upstream: handler(calls.clone(), delay),
            calls,
        }
    }

    async fn call(&self, request: Request<Full<Bytes>>) -> Response<CacheBody<Full<Bytes>>> {
        let response = self
            .cache
            .layer(self.upstream.clone())
            .oneshot(request)
            .await
            .unwrap();
        self.cache.write_behind().wait_all().await;
        response
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[tokio::test(start_paused = true)]
async fn first_request_misses_and_second_hits() {
    let store = MemoryStore::new();
    let harness = Harness::new(store.clone());

    let miss = harness.call(get("/test")).await;
    assert_eq!(miss.status(), StatusCode::OK);
    assert_eq!(header(&miss, "x-cache-status"), Some("MISS"));
    assert_eq!(header(&miss, "redis-ttl"), Some("10"));
    assert_eq!(body(miss).await, r#"{"call":1}"#);

    let hit = harness.call(get("/test")).await;
    assert_eq!(hit.status(), StatusCode::OK);
    assert_eq!(header(&hit, "x-cache-status"), Some("HIT"));
    assert_eq!(header(&hit, "redis-ttl"), Some("10"));
    assert_eq!(header(&hit, "content-type"), Some("application/json"));
    assert_eq!(body(hit).await, r#"{"call":1}"#);

    assert_eq!(harness.calls(), 1);
    assert_eq!(store.counters().set_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn hits_report_remaining_lifetime() {
    let harness = Harness::new(MemoryStore::new());
    harness.call(get("/test")).await;

    tokio::time::advance(Duration::from_secs(4)).await;
    let hit = harness.call(get("/test")).await;
    assert_eq!(header(&hit, "x-cache-status"), Some("HIT"));
    assert_eq!(header(&hit, "redis-ttl"), Some("6"));
}

#[tokio::test(start_paused = true)]
async fn entry_expires_and_handler_runs_again() {
    let store = MemoryStore::new();
    let harness = Harness::new(store.clone());

    let first = harness.call(get("/test")).await;
    assert_eq!(body(first).await, r#"{"call":1}"#);

    tokio::time::advance(Duration::from_secs(10)).await;
    let second = harness.call(get("/test")).await;
    assert_eq!(header(&second, "x-cache-status"), Some("MISS"));
    assert_eq!(body(second).await, r#"{"call":2}"#);
    assert_eq!(harness.calls(), 2);
    assert_eq!(store.counters().set_count(), 2);
}

#[tokio::test(start_paused = true)]
async fn hits_do_not_extend_lifetime() {
    let store = MemoryStore::new();
    let harness = Harness::new(store.clone());
    harness.call(get("/test")).await;

    for _ in 0..3 {
        tokio::time::advance(Duration::from_secs(3)).await;
        let hit = harness.call(get("/test")).await;
        assert_eq!(header(&hit, "x-cache-status"), Some("HIT"));
    }
    assert_eq!(store.counters().set_count(), 1);

    tokio::time::advance(Duration::from_secs(1)).await;
    let expired = harness.call(get("/test")).await;
    assert_eq!(header(&expired, "x-cache-status"), Some("MISS"));
}

#[tokio::test(start_paused = true)]
async fn concurrent_misses_each_run_the_handler() {
    let store = MemoryStore::new();
    let harness = Harness::with_delay(store.clone(), Duration::from_secs(2));

    let (a, b) = tokio::join!(harness.call(get("/test")), harness.call(get("/test")));
    assert_eq!(header(&a, "x-cache-status"), Some("MISS"));
    assert_eq!(header(&b, "x-cache-status"), Some("MISS"));
    assert_eq!(harness.calls(), 2);
    assert_eq!(store.counters().set_count(), 2);

    let hit = harness.call(get("/test")).await;
    assert_eq!(header(&hit, "x-cache-status"), Some("HIT"));
}

#[tokio::test(start_paused = true)]
async fn paths_are_cached_separately_and_query_is_ignored() {
    let store = MemoryStore::new();
    let harness = Harness::new(store.clone());

    harness.call(get("/test")).await;
    let other = harness.call(get("/other")).await;
    assert_eq!(header(&other, "x-cache-status"), Some("MISS"));

    let with_query = harness.call(get("/test?page=2")).await;
    assert_eq!(header(&with_query, "x-cache-status"), Some("HIT"));
    assert_eq!(body(with_query).await, r#"{"call":1}"#);

    assert!(store.exists(&CacheKey::new("cache:/test")).await.unwrap());
    assert!(store.exists(&CacheKey::new("cache:/other")).await.unwrap());
}

#[tokio::test(start_paused = true)]
async fn configured_ttl_is_applied() {
    let store = MemoryStore::new();
    let calls = Arc::new(AtomicUsize::new(0));
    let cache = Cache::builder()
        .store(store.clone())
        .config(CacheConfig::builder().ttl(Duration::from_secs(30)).build())
        .build();

    let response = cache
        .layer(handler(calls, Duration::ZERO))
        .oneshot(get("/test"))
        .await
        .unwrap();
    cache.write_behind().wait_all().await;

    assert_eq!(header(&response, "redis-ttl"), Some("30"));
    assert_eq!(
        store.ttl(&CacheKey::new("cache:/test")).await.unwrap(),
        Some(30)
    );
}

#[tokio::test(start_paused = true)]
async fn error_responses_are_not_cached() {
    let store = MemoryStore::new();
    let cache = Cache::new(store.clone());
    let calls = Arc::new(AtomicUsize::new(0));
    let upstream = {
        let calls = calls.clone();
        service_fn(move |_req: Request<Full<Bytes>>| {
            calls.fetch_add(1, Ordering::SeqCst);
            async {
                Ok::<_, Infallible>(
                    Response::builder()
                        .status(StatusCode::NOT_FOUND)
                        .body(Full::new(Bytes::from_static(br#"{"error":"nope"}"#)))
                        .unwrap(),
                )
            }
        })
    };

    for _ in 0..2 {
        let response = cache.layer(upstream.clone()).oneshot(get("/missing")).await.unwrap();
        cache.write_behind().wait_all().await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(header(&response, "x-cache-status"), Some("MISS"));
        assert_eq!(header(&response, "redis-ttl"), None);
    }
    assert_eq!(calls.load(Ordering::SeqCst), 2);
    assert_eq!(store.counters().set_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn no_content_response_is_passed_through() {
    let store = MemoryStore::new();
    let cache = Cache::new(store.clone());
    let upstream = service_fn(|_req: Request<Full<Bytes>>| async {
        Ok::<_, Infallible>(
            Response::builder()
                .status(StatusCode::NO_CONTENT)
                .body(Full::default())
                .unwrap(),
        )
    });

    let response = cache.layer(upstream).oneshot(get("/test")).await.unwrap();
    cache.write_behind().wait_all().await;

    assert_eq!(response.status(), StatusCode::NO_CONTENT);
    assert_eq!(header(&response, "x-cache-status"), Some("MISS"));
    assert_eq!(header(&response, "redis-ttl"), None);
    assert_eq!(body(response).await, "");
    assert_eq!(store.counters().set_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn non_json_response_fails_the_request() {
    let store = MemoryStore::new();
    let cache = Cache::new(store.clone());
    let upstream = service_fn(|_req: Request<Full<Bytes>>| async {
        Ok::<_, Infallible>(Response::new(Full::new(Bytes::from_static(b"plain text"))))
    });

    let response = cache.layer(upstream).oneshot(get("/test")).await.unwrap();
    cache.write_behind().wait_all().await;

    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let error: serde_json::Value = serde_json::from_str(&body(response).await).unwrap();
    assert!(error["error"].as_str().unwrap().contains("not valid JSON"));
    assert_eq!(store.counters().set_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn corrupted_entry_fails_the_request() {
    let store = MemoryStore::new();
    store
        .set(
            &CacheKey::new("cache:/test"),
            Bytes::from_static(b"{broken"),
            Duration::from_secs(10),
        )
        .await
        .unwrap();
    let harness = Harness::new(store);

    let response = harness.call(get("/test")).await;
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(harness.calls(), 0);
}

#[tokio::test]
async fn upstream_errors_are_propagated() {
    let cache = Cache::new(MemoryStore::new());
    let upstream = service_fn(|_req: Request<Full<Bytes>>| async {
        Err::<Response<Full<Bytes>>, _>("upstream failed")
    });

    let result = cache.layer(upstream).oneshot(get("/test")).await;
    assert_eq!(result.unwrap_err(), "upstream failed");
}

/// Store that refuses every operation, like a Redis server that is down.
struct UnreachableStore;

#[async_trait]
impl Store for UnreachableStore {
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
async fn unreachable_store_serves_every_request_from_the_handler() {
    let harness = Harness::new(UnreachableStore);

    for call in 1..=2 {
        let response = harness.call(get("/test")).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(header(&response, "x-cache-status"), Some("MISS"));
        assert_eq!(body(response).await, format!(r#"{{"call":{call}}}"#));
    }
    assert_eq!(harness.calls(), 2);
    assert_eq!(harness.cache.write_behind().failed_writes(), 2);
}

/// Store whose entries vanish between `exists` and `get`.
struct VanishingStore(MemoryStore);

#[async_trait]
impl Store for VanishingStore {
    async fn exists(&self, _key: &CacheKey) -> StoreResult<bool> {
        Ok(true)
    }

    async fn get(&self, key: &CacheKey) -> StoreResult<Bytes> {
        Err(StoreError::key_not_found(key))
    }

    async fn set(&self, key: &CacheKey, value: Bytes, ttl: Duration) -> StoreResult<()> {
        self.0.set(key, value, ttl).await
    }

    async fn ttl(&self, key: &CacheKey) -> StoreResult<Option<u64>> {
        self.0.ttl(key).await
    }
}

#[tokio::test(start_paused = true)]
async fn entry_vanishing_after_exists_is_a_miss() {
    let memory = MemoryStore::new();
    let harness = Harness::new(VanishingStore(memory.clone()));

    let response = harness.call(get("/test")).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(header(&response, "x-cache-status"), Some("MISS"));
    assert_eq!(harness.calls(), 1);
    assert_eq!(memory.counters().set_count(), 1);
}

/// Store that can't report lifetimes.
struct NoTtlStore(MemoryStore);

#[async_trait]
impl Store for NoTtlStore {
    async fn exists(&self, key: &CacheKey) -> StoreResult<bool> {
        self.0.exists(key).await
    }

    async fn get(&self, key: &CacheKey) -> StoreResult<Bytes> {
        self.0.get(key).await
    }

    async fn set(&self, key: &CacheKey, value: Bytes, ttl: Duration) -> StoreResult<()> {
        self.0.set(key, value, ttl).await
    }

    async fn ttl(&self, _key: &CacheKey) -> StoreResult<Option<u64>> {
        Err(StoreError::unavailable("timed out"))
    }
}

#[tokio::test(start_paused = true)]
async fn hit_without_ttl_omits_the_header() {
    let harness = Harness::new(NoTtlStore(MemoryStore::new()));
    harness.call(get("/test")).await;

    let hit = harness.call(get("/test")).await;
    assert_eq!(header(&hit, "x-cache-status"), Some("HIT"));
    assert_eq!(header(&hit, "redis-ttl"), None);
    assert_eq!(body(hit).await, r#"{"call":1}"#);
}

#[tokio::test(start_paused = true)]
async fn service_is_reusable_across_requests() {
    let harness = Harness::new(MemoryStore::new());
    let mut service = harness.cache.layer(harness.upstream.clone());

    let miss = service.ready().await.unwrap().call(get("/test")).await.unwrap();
    harness.cache.write_behind().wait_all().await;
    let hit = service.ready().await.unwrap().call(get("/test")).await.unwrap();

    assert_eq!(header(&miss, "x-cache-status"), Some("MISS"));
    assert_eq!(header(&hit, "x-cache-status"), Some("HIT"));
}
