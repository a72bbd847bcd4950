//! Demo server for the stash cache layer.
//!
//! - `GET /test` returns an expensive JSON result, cached in Redis.
//! - `GET /ws` is a chat relay: messages go through a Redis pub/sub channel
//!   and reach every connected client of every server instance.

pub mod routes;
pub mod settings;
pub mod telemetry;

use std::time::Duration;

use anyhow::Context;
use axum::Router;
use stash_backend::Store;
use stash_redis::{Fanout, RedisStore, Relay};
use stash_tower::Cache;
use tokio::net::TcpListener;
use tracing::{error, info, warn};

pub use routes::{Chat, ExpensiveResult};
pub use settings::{LoadError, Settings};

/// How long shutdown waits for pending cache writes.
const WRITE_FLUSH_TIMEOUT: Duration = Duration::from_secs(5);

/// The full application router.
pub fn app<St>(cache: Cache<St>, processing_time: Duration, chat: Chat) -> Router
where
    St: Store + 'static,
{
    routes::cache_routes(cache, processing_time).merge(routes::chat_routes(chat))
}

/// Runs the server until Ctrl-C.
pub async fn run(settings: Settings) -> anyhow::Result<()> {
    let store = RedisStore::new(settings.redis_url.as_str()).context("invalid REDIS_URL")?;
    let cache = Cache::builder()
        .store(store)
        .config(settings.cache_config())
        .build();

    let fanout = Fanout::default();
    let relay = Relay::new(settings.redis_url.as_str(), settings.chat_channel.as_str())
        .context("invalid REDIS_URL")?;
    // Keeps resubscribing while Redis is down; clients connected meanwhile hear nothing.
    let subscription = relay.listen(fanout.clone());

    let app = app(
        cache.clone(),
        settings.processing_time,
        Chat { relay, fanout },
    );

    let addr = settings.listen_addr();
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("can't bind {addr}"))?;
    info!("Server is running on port {}", settings.port);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;
    subscription.abort();

    info!(pending = cache.write_behind().active_count(), "flushing cache writes");
    if !cache.write_behind().wait_all_timeout(WRITE_FLUSH_TIMEOUT).await {
        warn!("cache writes still pending at shutdown");
    }
    Ok(())
}

async fn shutdown_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("shutdown requested"),
        Err(error) => error!(%error, "can't listen for shutdown signal"),
    }
}
