//! # ragd - a retrieval-augmented generation backend
//!
//! Turns arbitrary source documents into a queryable semantic index: register
//! a collection with embedding/chunking settings, submit resources (text,
//! URLs), then issue free-text queries and receive ranked passages.
//!
//! ## Modules
//!
//! - [`api`] - HTTP handlers and routes
//! - [`db`] - document store, vector store and message broker abstractions
//! - [`ingest`] - ingestion and persist consumer loops
//! - [`rag`] - chunking, embedding, search, feedback and adapter training
//! - [`types`] - domain model, wire types and error handling
//! - [`utils`] - configuration and content-addressed id derivation

#![warn(missing_docs)]

/// HTTP API handlers and routes.
pub mod api;
/// Document store, vector store and message broker traits plus in-process implementations.
pub mod db;
/// Ingestion and persist consumer loops.
pub mod ingest;
/// Chunking, embedding, search, feedback and adapter components.
pub mod rag;
/// Domain model, wire types and error handling.
pub mod types;
/// Configuration loading and hashing utilities.
pub mod utils;

use std::sync::Arc;

pub use types::{AppError, Result};

use db::{DocumentStore, InMemoryBroker, VectorStore};
use rag::adapter::AdapterService;
use rag::cache::ShortTtlCache;
use rag::embeddings::EmbeddingClient;
use rag::evaluator::Evaluator;
use rag::search::QueryEngine;
use types::Collection;
use utils::config::Config;

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    /// Key-value document store (collections, resources, feedback docs, eval records).
    pub document_store: Arc<dyn DocumentStore>,
    /// Named-vector store backing dense/sparse/rerank retrieval.
    pub vector_store: Arc<dyn VectorStore>,
    /// HTTP client for the external embedding/rerank model server.
    pub embedding_client: Arc<EmbeddingClient>,
    /// Per-collection linear projection adapter training/lookup.
    pub adapter_service: Arc<AdapterService>,
    /// Embed -> retrieve -> rerank -> feedback-fuse query path.
    pub query_engine: Arc<QueryEngine>,
    /// Offline retrieval-quality evaluator.
    pub evaluator: Arc<Evaluator>,
    /// In-process message broker driving the ingestion/persist/feedback workers.
    pub broker: Arc<InMemoryBroker>,
    /// Process-wide runtime configuration.
    pub config: Arc<Config>,
    /// Short-TTL cache of `Collection` settings, invalidated by `del` on update (§5).
    pub collection_cache: Arc<ShortTtlCache<Collection>>,
    /// Short-TTL (24h) cache mapping an opaque feedback-vote reference id to its payload.
    pub feedback_link_cache: Arc<ShortTtlCache<FeedbackLink>>,
}

/// Payload referenced by a `GET /feedback/vote/:refId/:action` link, minted when a
/// search response annotates a hit with a review link and consumed (read-only) when
/// that link is clicked.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct FeedbackLink {
    /// Original query text the vote applies to.
    pub query: String,
    /// Collection the chunk belongs to.
    pub collection_id: String,
    /// Chunk being voted on.
    pub chunk_id: String,
    /// Resource the chunk belongs to.
    pub resource_id: String,
    /// Owner scope the vote is recorded under.
    pub owner_id: String,
}
