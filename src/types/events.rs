//! Wire types for the message broker: ingest events, persist events, feedback
//! events and analytics events. Every event carries `version` and `event` as a
//! discriminator, per §6.

use serde::{Deserialize, Serialize};

use super::FeedbackAction;

/// Event consumed by the ingestion worker from the `rag` exchange.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestEvent {
    #[serde(default = "default_version")]
    pub version: u32,
    pub event: IngestEventKind,
    pub data: IngestEventData,
}

fn default_version() -> u32 {
    1
}

/// Discriminator for [`IngestEvent`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IngestEventKind {
    Load,
    Chunk,
    Update,
    Delete,
}

/// Payload carried by an [`IngestEvent`]. `url` is only meaningful for `load`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IngestEventData {
    pub resource_id: String,
    pub collection_id: String,
    #[serde(default)]
    pub owner_id: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
}

/// Event published to `chunk_exchange` for each chunk batch (or, when a
/// reranker vector is present, each individual chunk) to be persisted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PersistEvent {
    #[serde(default = "default_version")]
    pub version: u32,
    pub event: PersistEventKind,
    pub data: PersistEventData,
}

/// Discriminator for [`PersistEvent`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PersistEventKind {
    Upsert,
    Delete,
}

/// Payload carried by a [`PersistEvent`].
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PersistEventData {
    pub collection_id: String,
    pub resource_id: String,
    #[serde(default)]
    pub owner_id: String,
    /// Chunks to upsert. Empty for `delete`.
    #[serde(default)]
    pub chunks: Vec<super::Chunk>,
}

/// Event consumed by the feedback worker from `search-feedback`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeedbackEvent {
    pub query: String,
    pub chunk_id: String,
    pub resource_id: String,
    pub action: FeedbackAction,
    pub collection_id: String,
    #[serde(default = "super::default_owner")]
    pub owner_id: String,
}

/// Fire-and-forget analytics event emitted by the query engine (§4.5 step 9).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalyticsEvent {
    pub id: String,
    pub collection_id: String,
    pub owner_id: String,
    pub query: String,
    pub rt_ms: u64,
    pub ts: chrono::DateTime<chrono::Utc>,
}

/// Realtime status message published on the `resource` channel after every
/// ingestion stage (§4.8).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResourceStatusMessage {
    pub resource_id: String,
    pub status: super::ResourceStatus,
    #[serde(default)]
    pub message: Option<String>,
}
