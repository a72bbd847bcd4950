use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

use axum::extract::State;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::response::Response;
use axum::routing::get;
use axum::{Json, Router};
use futures::{Sink, SinkExt, Stream, StreamExt};
use serde::Serialize;
use stash_backend::Store;
use stash_redis::{Fanout, Relay};
use stash_tower::Cache;
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::RecvError;
use tracing::{info, warn};

/// Body of `GET /test`.
#[derive(Debug, Serialize)]
pub struct ExpensiveResult {
    pub value: f64,
    pub comment: &'static str,
}

/// Simulates an expensive computation taking `processing_time`.
pub async fn expensive_result(State(processing_time): State<Duration>) -> Json<ExpensiveResult> {
    tokio::time::sleep(processing_time).await;
    Json(ExpensiveResult {
        value: rand::random(),
        comment: "I'm an expensive result",
    })
}

/// `GET /test` behind the cache layer.
pub fn cache_routes<St>(cache: Cache<St>, processing_time: Duration) -> Router
where
    St: Store + 'static,
{
    Router::new()
        .route("/test", get(expensive_result).layer(cache))
        .with_state(processing_time)
}

/// Chat relay shared by every WebSocket connection.
#[derive(Clone, Debug)]
pub struct Chat {
    pub relay: Relay,
    pub fanout: Fanout,
}

/// `GET /ws` chat endpoint.
pub fn chat_routes(chat: Chat) -> Router {
    Router::new().route("/ws", get(chat_socket)).with_state(chat)
}

async fn chat_socket(ws: WebSocketUpgrade, State(chat): State<Chat>) -> Response {
    ws.on_upgrade(move |socket| relay_socket(socket, chat))
}

async fn relay_socket(socket: WebSocket, chat: Chat) {
    info!("A user has connected.");
    let (sender, receiver) = socket.split();
    let relay = chat.relay;
    relay_frames(sender, receiver, chat.fanout.subscribe(), move |text| {
        let relay = relay.clone();
        async move { relay.publish(&text).await.map(|_| ()) }
    })
    .await;
    info!("A user has disconnected.");
}

/// Sends every fanned out message to `sender` and hands every text frame read
/// from `receiver` to `publish`, until either side is done.
///
/// A failed publish is logged and the session goes on.
pub async fn relay_frames<Tx, Rx, P, Fut, E>(
    mut sender: Tx,
    mut receiver: Rx,
    mut messages: broadcast::Receiver<String>,
    publish: P,
) where
    Tx: Sink<Message> + Unpin + Send + 'static,
    Rx: Stream<Item = Result<Message, axum::Error>> + Unpin + Send + 'static,
    P: Fn(String) -> Fut + Send + 'static,
    Fut: Future<Output = Result<(), E>> + Send + 'static,
    E: Display + Send + 'static,
{
    let mut outgoing = tokio::spawn(async move {
        loop {
            match messages.recv().await {
                Ok(message) => {
                    if sender.send(Message::Text(message.into())).await.is_err() {
                        break;
                    }
                }
                Err(RecvError::Lagged(skipped)) => {
                    warn!(skipped, "client is lagging, messages dropped");
                }
                Err(RecvError::Closed) => break,
            }
        }
    });

    let mut incoming = tokio::spawn(async move {
        while let Some(Ok(frame)) = receiver.next().await {
            match frame {
                Message::Text(text) => {
                    info!("User sent message: {}", text.as_str());
                    if let Err(error) = publish(text.as_str().to_owned()).await {
                        warn!(%error, "can't publish chat message");
                    }
                }
                Message::Close(_) => break,
                _ => {}
            }
        }
    });

    tokio::select! {
        _ = &mut outgoing => incoming.abort(),
        _ = &mut incoming => outgoing.abort(),
    }
}
