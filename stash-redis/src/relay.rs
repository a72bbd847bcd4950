//! Pub/sub relay between Redis and locally connected clients.
//!
//! One Redis subscription per process feeds a [`Fanout`]; every connected
//! client holds a receiver of that fanout. Client messages are published back
//! to Redis, so they reach every process subscribed to the channel, this one
//! included.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use futures::StreamExt;
use redis::Client;
use redis::aio::{ConnectionManager, PubSub};
use smol_str::SmolStr;
use tokio::sync::{OnceCell, broadcast};
use tokio::task::JoinHandle;
use tracing::{debug, info, trace, warn};

use crate::error::Error;
use crate::store::{DEFAULT_CONNECTION_RETRIES, DEFAULT_CONNECTION_TIMEOUT, manager_config};

/// Default channel name.
pub const DEFAULT_CHANNEL: &str = "chat";

/// Messages a slow receiver may lag behind before it starts losing them.
pub const DEFAULT_FANOUT_CAPACITY: usize = 256;

/// In-process broadcast to every connected client.
#[derive(Clone, Debug)]
pub struct Fanout {
    sender: broadcast::Sender<String>,
}

impl Fanout {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Fanout { sender }
    }

    /// Registers a new client.
    pub fn subscribe(&self) -> broadcast::Receiver<String> {
        self.sender.subscribe()
    }

    /// Delivers `message` to every client connected right now and returns
    /// how many there were. Nobody connected is not an error.
    pub fn emit(&self, message: impl Into<String>) -> usize {
        self.sender.send(message.into()).unwrap_or(0)
    }

    pub fn receiver_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for Fanout {
    fn default() -> Self {
        Self::new(DEFAULT_FANOUT_CAPACITY)
    }
}

/// First wait before subscribing again after a failure.
pub const DEFAULT_RESUBSCRIBE_DELAY: Duration = Duration::from_millis(100);

/// Longest wait between two subscription attempts.
pub const MAX_RESUBSCRIBE_DELAY: Duration = Duration::from_secs(5);

/// Doubling delay between subscription attempts, capped at `max`.
#[derive(Clone, Copy, Debug)]
struct Backoff {
    min: Duration,
    max: Duration,
    current: Duration,
}

impl Backoff {
    fn new(min: Duration, max: Duration) -> Self {
        Backoff {
            min,
            max,
            current: min,
        }
    }

    fn next_delay(&mut self) -> Duration {
        let delay = self.current;
        self.current = (self.current * 2).min(self.max);
        delay
    }

    fn reset(&mut self) {
        self.current = self.min;
    }
}

/// Redis side of the relay: one subscription, one publishing connection.
///
/// Clones share the publishing connection.
#[derive(Clone)]
pub struct Relay {
    client: Client,
    channel: SmolStr,
    publisher: Arc<OnceCell<ConnectionManager>>,
    backoff: Backoff,
    attempts: Arc<AtomicU64>,
}

impl Relay {
    pub fn new(url: impl Into<String>, channel: impl Into<SmolStr>) -> Result<Self, Error> {
        Ok(Relay {
            client: Client::open(url.into())?,
            channel: channel.into(),
            publisher: Arc::new(OnceCell::new()),
            backoff: Backoff::new(DEFAULT_RESUBSCRIBE_DELAY, MAX_RESUBSCRIBE_DELAY),
            attempts: Arc::new(AtomicU64::new(0)),
        })
    }

    /// Bounds of the wait between subscription attempts.
    #[must_use]
    pub fn resubscribe_delay(mut self, min: Duration, max: Duration) -> Self {
        self.backoff = Backoff::new(min, max.max(min));
        self
    }

    pub fn channel(&self) -> &str {
        &self.channel
    }

    /// Subscription attempts made so far, successful or not.
    pub fn subscribe_attempts(&self) -> u64 {
        self.attempts.load(Ordering::Relaxed)
    }

    /// Forwards every payload published on the channel to `fanout`.
    ///
    /// Runs on the returned task until it is aborted. When Redis can't be
    /// reached, or the subscription connection drops, the task subscribes
    /// again after a growing delay.
    pub fn listen(&self, fanout: Fanout) -> JoinHandle<()> {
        let relay = self.clone();
        tokio::spawn(async move { relay.forward(fanout).await })
    }

    async fn forward(self, fanout: Fanout) {
        let mut backoff = self.backoff;
        loop {
            self.attempts.fetch_add(1, Ordering::Relaxed);
            match self.subscribe().await {
                Ok(pubsub) => {
                    info!(channel = %self.channel, "subscribed");
                    backoff.reset();
                    self.forward_messages(pubsub, &fanout).await;
                    warn!(channel = %self.channel, "subscription closed");
                }
                Err(error) => {
                    warn!(channel = %self.channel, %error, "can't subscribe to channel");
                }
            }
            let delay = backoff.next_delay();
            debug!(channel = %self.channel, ?delay, "resubscribing");
            tokio::time::sleep(delay).await;
        }
    }

    async fn subscribe(&self) -> Result<PubSub, Error> {
        let mut pubsub = self.client.get_async_pubsub().await?;
        pubsub.subscribe(self.channel.as_str()).await?;
        Ok(pubsub)
    }

    async fn forward_messages(&self, pubsub: PubSub, fanout: &Fanout) {
        let mut messages = pubsub.into_on_message();
        while let Some(message) = messages.next().await {
            let payload: String = match message.get_payload() {
                Ok(payload) => payload,
                Err(error) => {
                    warn!(channel = %self.channel, %error, "dropping undecodable message");
                    continue;
                }
            };
            let delivered = fanout.emit(payload);
            trace!(channel = %self.channel, delivered, "message fanned out");
        }
    }

    /// Publishes `message` and returns how many subscribers received it.
    pub async fn publish(&self, message: &str) -> Result<u64, Error> {
        let mut con = self
            .publisher
            .get_or_try_init(|| {
                self.client.get_connection_manager_with_config(manager_config(
                    DEFAULT_CONNECTION_TIMEOUT,
                    DEFAULT_CONNECTION_RETRIES,
                ))
            })
            .await?
            .clone();
        let receivers: u64 = redis::cmd("PUBLISH")
            .arg(self.channel.as_str())
            .arg(message)
            .query_async(&mut con)
            .await?;
        debug!(channel = %self.channel, receivers, "published");
        Ok(receivers)
    }
}

impl std::fmt::Debug for Relay {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Relay")
            .field("channel", &self.channel)
            .finish()
    }
}
