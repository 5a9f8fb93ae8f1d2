//! Domain types shared across the ingestion pipeline, the query engine and the HTTP API.

pub mod api;
pub mod events;

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

// ============= Chunking settings =============

/// Chunking strategy selectable per collection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ChunkingStrategy {
    /// Fixed-size chunking with overlap, no embedding calls required.
    #[default]
    Recursive,
    /// Percentile-breakpoint chunking over sentence embeddings.
    Semantic,
    /// Delegates chunk boundary decisions to an injected planner.
    Agentic,
    /// Delegates chunking entirely to an external HTTP endpoint.
    Custom,
}

impl std::fmt::Display for ChunkingStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Recursive => "recursive",
            Self::Semantic => "semantic",
            Self::Agentic => "agentic",
            Self::Custom => "custom",
        };
        write!(f, "{name}")
    }
}

impl std::str::FromStr for ChunkingStrategy {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "recursive" | "fixed" => Ok(Self::Recursive),
            "semantic" => Ok(Self::Semantic),
            "agentic" => Ok(Self::Agentic),
            "custom" => Ok(Self::Custom),
            other => Err(AppError::Validation(format!(
                "unknown chunking strategy '{other}'; use recursive, semantic, agentic or custom"
            ))),
        }
    }
}

// ============= Collection =============

/// Per-collection indexing settings. Immutable once the collection is created,
/// except for the chunking-related fields which `PUT /collection/:id` may update.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CollectionSettings {
    /// Model id used for dense encoding. Required.
    pub dense_model: String,
    /// Model id used for sparse encoding, if hybrid search is enabled.
    #[serde(default)]
    pub sparse_model: Option<String>,
    /// Model id used for late-interaction reranking, if configured.
    #[serde(default)]
    pub reranker_model: Option<String>,
    /// Target chunk size in characters. Clamped to 4000.
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
    /// Overlap between consecutive chunks, used by the recursive strategy.
    #[serde(default = "default_chunk_overlap")]
    pub chunk_overlap: usize,
    /// Chunking strategy.
    #[serde(default)]
    pub strategy: ChunkingStrategy,
    /// Endpoint used when `strategy == Custom`.
    #[serde(default)]
    pub chunking_url: Option<String>,
    /// When false (the default), chunk ids are content-addressed and re-ingestion
    /// overwrites in place. When true, every chunk gets a random id.
    #[serde(default)]
    pub keep_duplicate: bool,
}

fn default_chunk_size() -> usize {
    512
}

fn default_chunk_overlap() -> usize {
    50
}

impl CollectionSettings {
    /// `chunk_size` clamped to the collection-wide ceiling.
    pub fn clamped_chunk_size(&self) -> usize {
        self.chunk_size.min(4000)
    }
}

/// A named logical grouping of resources sharing embedding and chunking settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Collection {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub metadata: HashMap<String, Value>,
    pub settings: CollectionSettings,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Settings an individual resource may override from its collection's defaults.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ChunkingOverrides {
    #[serde(default)]
    pub chunk_size: Option<usize>,
    #[serde(default)]
    pub chunk_overlap: Option<usize>,
    #[serde(default)]
    pub strategy: Option<ChunkingStrategy>,
}

/// Lifecycle status of a resource, tracked in `Resource::metadata["status"]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResourceStatus {
    Created,
    Loaded,
    Chunked,
    Deleted,
    Error,
}

/// A document belonging to one collection, scoped by `owner_id`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Resource {
    pub id: String,
    pub collection_id: String,
    #[serde(default = "default_owner")]
    pub owner_id: String,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub content: Option<String>,
    /// md5 hex digest of the last content successfully loaded. Used to detect
    /// that a re-`load` found no real change and the pipeline can skip re-chunking.
    #[serde(default)]
    pub content_hash: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub metadata: HashMap<String, Value>,
    #[serde(default)]
    pub chunking_overrides: Option<ChunkingOverrides>,
    pub status: ResourceStatus,
    #[serde(default)]
    pub status_message: Option<String>,
    pub is_deleted: bool,
    pub refreshed_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

/// Default owner scope when a request omits `ownerId`.
pub fn default_owner() -> String {
    "public".to_string()
}

/// A sparse (bag-of-terms) vector, e.g. BM25/SPLADE-style.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SparseVector {
    pub indices: Vec<u32>,
    pub values: Vec<f32>,
}

/// A retrieval-sized passage of a resource.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Chunk {
    /// Stable id. Content-addressed unless the owning collection keeps duplicates.
    pub id: String,
    pub collection_id: String,
    pub owner_id: String,
    pub resource_id: String,
    /// Display text.
    pub data: String,
    /// Text actually embedded, if different from `data`.
    #[serde(default)]
    pub vector_source: Option<String>,
    #[serde(default)]
    pub vector: Option<Vec<f32>>,
    #[serde(default)]
    pub sparse_vector: Option<SparseVector>,
    /// Per-token matrix for late-interaction rerank, row-major `T x D`.
    #[serde(default)]
    pub rerank_vector: Option<Vec<Vec<f32>>>,
    #[serde(default)]
    pub metadata: HashMap<String, Value>,
}

impl Chunk {
    /// The text that embedding calls should encode: `vector_source` if set, else `data`.
    pub fn embeddable_text(&self) -> &str {
        self.vector_source.as_deref().unwrap_or(&self.data)
    }
}

/// Per-chunk upvote/downvote tally recorded against one FeedbackDoc.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeedbackHit {
    pub resource_id: String,
    pub count: i64,
}

/// Content-addressed aggregate of feedback events for a representative query.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeedbackDoc {
    pub id: String,
    pub collection_id: String,
    pub owner_id: String,
    pub query: String,
    /// chunkId -> tally.
    pub hits: HashMap<String, FeedbackHit>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Upvote/downvote direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FeedbackAction {
    Upvote,
    Downvote,
}

/// Persisted state of a per-collection linear projection adapter.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdapterRecord {
    pub collection_id: String,
    /// Row-major `D x D`.
    pub weights: Vec<Vec<f32>>,
    pub bias: Vec<f32>,
    pub input_dim: usize,
    pub output_dim: usize,
    pub training_count: u64,
}

/// `(collectionId, ownerId, query, expectedChunkIds)`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvalTestCase {
    pub id: String,
    pub collection_id: String,
    pub owner_id: String,
    pub query: String,
    pub expected_chunk_ids: Vec<String>,
    pub created_at: DateTime<Utc>,
}

/// Per-case outcome of running a test case through the query engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvalCaseResult {
    pub test_case_id: String,
    pub query: String,
    pub hit: bool,
    pub recall: f64,
    pub reciprocal_rank: f64,
    pub retrieved_chunk_ids: Vec<String>,
}

/// A snapshot of aggregate metrics plus per-case results, produced by one evaluator run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvalRun {
    pub id: String,
    pub collection_id: String,
    pub owner_id: String,
    pub overall_accuracy: f64,
    pub average_recall: f64,
    pub mrr: f64,
    pub hit_count: usize,
    pub total_cases: usize,
    pub failed_cases: Vec<EvalCaseResult>,
    pub ran_at: DateTime<Utc>,
}

// ============= Error types =============

/// Application-wide error type.
///
/// The variant set mirrors the error-kind taxonomy the ingestion pipeline and
/// query engine are built against: each carries exactly the context a caller
/// needs to decide whether to retry, surface to a client, or degrade quietly.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    /// Missing/invalid request fields, unsupported model name, failed chunking-url health probe.
    #[error("validation error: {0}")]
    Validation(String),

    /// Collection/resource/chunk/eval case missing.
    #[error("not found: {0}")]
    NotFound(String),

    /// Embedding server, vector store, document store or broker unreachable after retries.
    #[error("backend unavailable: {0}")]
    BackendUnavailable(String),

    /// Adapter input or training target dimensionality did not match `D`.
    #[error("dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    /// Unhandled exception inside a queue consumer. Never requeued.
    #[error("poison message: {0}")]
    PoisonMessage(String),

    /// Config missing or malformed at startup.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Catch-all for invariants that should be unreachable in practice.
    #[error("internal error: {0}")]
    Internal(String),
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        AppError::Internal(err.to_string())
    }
}

impl From<reqwest::Error> for AppError {
    fn from(err: reqwest::Error) -> Self {
        AppError::BackendUnavailable(err.to_string())
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::Internal(format!("serialization error: {err}"))
    }
}

impl axum::response::IntoResponse for AppError {
    fn into_response(self) -> axum::response::Response {
        let (status, code) = match &self {
            AppError::Validation(_) => (axum::http::StatusCode::BAD_REQUEST, "validation"),
            AppError::NotFound(_) => (axum::http::StatusCode::NOT_FOUND, "not_found"),
            AppError::BackendUnavailable(_) => {
                (axum::http::StatusCode::INTERNAL_SERVER_ERROR, "backend_unavailable")
            }
            AppError::DimensionMismatch { .. } => {
                (axum::http::StatusCode::BAD_REQUEST, "dimension_mismatch")
            }
            AppError::PoisonMessage(_) => {
                (axum::http::StatusCode::INTERNAL_SERVER_ERROR, "poison_message")
            }
            AppError::Configuration(_) => {
                (axum::http::StatusCode::INTERNAL_SERVER_ERROR, "configuration")
            }
            AppError::Internal(_) => (axum::http::StatusCode::INTERNAL_SERVER_ERROR, "internal"),
        };

        let body = serde_json::json!({
            "status": "error",
            "message": self.to_string(),
            "code": code,
        });

        (status, axum::Json(body)).into_response()
    }
}

/// A specialized Result type for ragd operations.
pub type Result<T> = std::result::Result<T, AppError>;
