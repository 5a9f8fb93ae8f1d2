//! Message broker contract (§4.new) plus an in-process implementation.
//!
//! Out of scope as an external engine (§1), but the delivery contract is
//! specified: `publish(exchange, event)` / `subscribe(queue) -> Receiver`,
//! every exchange paired with a `<name>_FAILED` dead-letter sibling, JSON
//! payloads. Generalized from the teacher's provider-enum-plus-trait-object
//! pattern (`DatabaseProvider`, `VectorStoreProvider`) applied to message
//! delivery instead of storage.

use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;
use serde::Serialize;
use tokio::sync::mpsc;

use crate::types::{AppError, Result};

/// Exchange/queue names used by the pipeline, per §6.
pub mod queues {
    pub const RAG: &str = "rag";
    pub const CHUNK_EXCHANGE: &str = "chunk_exchange";
    pub const SEARCH_FEEDBACK: &str = "search-feedback";
    pub const ANALYTICS: &str = "analytics";
    pub const RESOURCE_REALTIME: &str = "resource";
}

/// Suffix every dead-letter sibling carries.
pub const DEAD_LETTER_SUFFIX: &str = "_FAILED";

/// A received message: raw JSON bytes plus the queue it arrived on.
#[derive(Debug, Clone)]
pub struct Delivery {
    pub queue: String,
    pub payload: Vec<u8>,
}

/// Receiving half of a subscription.
pub type Subscription = mpsc::UnboundedReceiver<Delivery>;

/// Delivery contract for the broker. Bounded only by "at-most-once per
/// attempt" (§5) — retries and dead-lettering are the consumer's job, not
/// the broker's.
#[async_trait]
pub trait MessageBroker: Send + Sync {
    /// Serialize `event` as JSON and publish it to `queue`.
    async fn publish_json<T: Serialize + Sync>(&self, queue: &str, event: &T) -> Result<()>
    where
        Self: Sized,
    {
        let bytes = serde_json::to_vec(event)?;
        self.publish_raw(queue, bytes).await
    }

    /// Publish raw bytes to `queue`. Object-safe counterpart of
    /// [`MessageBroker::publish_json`].
    async fn publish_raw(&self, queue: &str, payload: Vec<u8>) -> Result<()>;

    /// Publish `event` to `queue`'s dead-letter sibling (`<queue>_FAILED`).
    async fn publish_failed<T: Serialize + Sync>(&self, queue: &str, event: &T) -> Result<()>
    where
        Self: Sized,
    {
        let dlq = format!("{queue}{DEAD_LETTER_SUFFIX}");
        self.publish_json(&dlq, event).await
    }

    /// Subscribe to `queue`, creating it if it doesn't exist yet. Every
    /// subscriber sees every message published after it subscribes
    /// (broadcast fan-out, not competing-consumers) — callers that want
    /// competing-consumer semantics should subscribe exactly once and share
    /// the receiver behind their own task pool.
    fn subscribe(&self, queue: &str) -> Subscription;
}

/// In-process broker built on `tokio::sync::mpsc`, one channel per queue name
/// created lazily on first publish or subscribe.
#[derive(Default)]
pub struct InMemoryBroker {
    channels: RwLock<std::collections::HashMap<String, mpsc::UnboundedSender<Delivery>>>,
}

impl InMemoryBroker {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    fn sender_for(&self, queue: &str) -> mpsc::UnboundedSender<Delivery> {
        if let Some(tx) = self.channels.read().get(queue) {
            return tx.clone();
        }
        let mut channels = self.channels.write();
        channels
            .entry(queue.to_string())
            .or_insert_with(|| {
                // No receiver exists yet; create a throwaway channel whose
                // receiver is replaced the moment someone subscribes via
                // `subscribe_mut`, so early publishes to an un-subscribed
                // queue are simply dropped (there is no consumer to deliver
                // to, same as a broker with no bound queue).
                let (tx, _rx) = mpsc::unbounded_channel();
                tx
            })
            .clone()
    }
}

#[async_trait]
impl MessageBroker for InMemoryBroker {
    async fn publish_raw(&self, queue: &str, payload: Vec<u8>) -> Result<()> {
        let tx = self.sender_for(queue);
        // A closed receiver (no subscriber) is not an error: the broker
        // contract doesn't guarantee a consumer exists, only that publish
        // succeeds or the backend is reported unavailable.
        let _ = tx.send(Delivery {
            queue: queue.to_string(),
            payload,
        });
        Ok(())
    }

    fn subscribe(&self, queue: &str) -> Subscription {
        let (tx, rx) = mpsc::unbounded_channel();
        self.channels.write().insert(queue.to_string(), tx);
        rx
    }
}

impl InMemoryBroker {
    /// Ergonomic JSON publish for callers holding `Arc<InMemoryBroker>` where
    /// the generic trait method (`Self: Sized`) isn't reachable through a
    /// `dyn MessageBroker`.
    pub async fn publish<T: Serialize + Sync>(&self, queue: &str, event: &T) -> Result<()> {
        let bytes = serde_json::to_vec(event).map_err(AppError::from)?;
        self.publish_raw(queue, bytes).await
    }

    /// Publish to `<queue>_FAILED`.
    pub async fn publish_dead_letter<T: Serialize + Sync>(&self, queue: &str, event: &T) -> Result<()> {
        let dlq = format!("{queue}{DEAD_LETTER_SUFFIX}");
        self.publish(&dlq, event).await
    }
}
