//! Request/response bodies for the HTTP surface (§6). Kept separate from the
//! domain model in [`super`] so the wire shape can evolve (e.g. flattening,
//! optional fields) without touching persisted types.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::{ChunkingOverrides, ChunkingStrategy, FeedbackAction};

/// `POST /collection` body.
#[derive(Debug, Clone, Deserialize)]
pub struct CreateCollectionRequest {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub metadata: HashMap<String, Value>,
    pub settings: CreateCollectionSettings,
}

/// Settings sub-object of [`CreateCollectionRequest`], mirroring
/// [`super::CollectionSettings`] but with request-time defaults applied.
#[derive(Debug, Clone, Deserialize)]
pub struct CreateCollectionSettings {
    pub dense_model: String,
    #[serde(default)]
    pub sparse_model: Option<String>,
    #[serde(default)]
    pub reranker_model: Option<String>,
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
    #[serde(default = "default_chunk_overlap")]
    pub chunk_overlap: usize,
    #[serde(default)]
    pub strategy: ChunkingStrategy,
    #[serde(default)]
    pub chunking_url: Option<String>,
    #[serde(default)]
    pub keep_duplicate: bool,
}

fn default_chunk_size() -> usize {
    512
}

fn default_chunk_overlap() -> usize {
    50
}

/// `PUT /collection/:id` body — chunking settings only, per §3.
#[derive(Debug, Clone, Deserialize)]
pub struct UpdateCollectionRequest {
    #[serde(default)]
    pub chunk_size: Option<usize>,
    #[serde(default)]
    pub chunk_overlap: Option<usize>,
    #[serde(default)]
    pub strategy: Option<ChunkingStrategy>,
}

/// `GET /collection/:id/resources` query params.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ListResourcesQuery {
    #[serde(default)]
    pub owner_id: Option<String>,
    #[serde(default)]
    pub content: Option<bool>,
}

/// `POST /resource` body.
#[derive(Debug, Clone, Deserialize)]
pub struct CreateResourceRequest {
    pub collection_id: String,
    #[serde(default = "super::default_owner")]
    pub owner_id: String,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub metadata: HashMap<String, Value>,
    #[serde(default)]
    pub chunking_overrides: Option<ChunkingOverrides>,
}

/// `PUT /resource/:id` body.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpdateResourceRequest {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub metadata: Option<HashMap<String, Value>>,
}

/// `POST /search` body.
#[derive(Debug, Clone, Deserialize)]
pub struct SearchRequest {
    pub query: String,
    pub collection_id: String,
    #[serde(default)]
    pub owner_id: Option<String>,
    #[serde(default)]
    pub resource_id: Option<String>,
    #[serde(default)]
    pub is_review: Option<bool>,
    #[serde(default)]
    pub limit: Option<usize>,
    #[serde(default)]
    pub min_score: Option<f32>,
    #[serde(default)]
    pub use_feedback: Option<bool>,
    #[serde(default)]
    pub analytics: Option<bool>,
}

/// One entry of `POST /search`'s `result` array.
#[derive(Debug, Clone, Serialize)]
pub struct SearchResultItem {
    pub id: String,
    pub score: f32,
    pub payload: SearchResultPayload,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub feedback: Option<FeedbackAnnotation>,
    /// Opaque id for `GET /feedback/vote/:refId/:action`, minted only when the
    /// request set `isReview`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub review_reference_id: Option<String>,
}

/// Payload mirror returned with each search hit.
#[derive(Debug, Clone, Serialize)]
pub struct SearchResultPayload {
    pub resource_id: String,
    pub collection_id: String,
    pub owner_id: String,
    pub content: String,
    pub metadata: HashMap<String, Value>,
}

/// Feedback-fusion annotation attached to a hit when `useFeedback` boosted it.
#[derive(Debug, Clone, Serialize)]
pub struct FeedbackAnnotation {
    pub boost: f32,
    pub matched_query: String,
}

/// `POST /search` response envelope.
#[derive(Debug, Clone, Serialize)]
pub struct SearchResponse {
    pub result: Vec<SearchResultItem>,
}

/// `POST /feedback/vote` body.
#[derive(Debug, Clone, Deserialize)]
pub struct FeedbackVoteRequest {
    pub collection_id: String,
    pub query: String,
    pub chunk_id: String,
    pub resource_id: String,
    pub action: FeedbackAction,
    #[serde(default = "super::default_owner")]
    pub owner_id: String,
}

/// `POST /feedback/vote` response.
#[derive(Debug, Clone, Serialize)]
pub struct FeedbackVoteResponse {
    pub success: bool,
    pub message: String,
}

/// `GET /utility/encoding-models` response.
#[derive(Debug, Clone, Serialize)]
pub struct EncodingModelsResponse {
    pub models: EncodingModelLists,
}

/// Grouped model descriptor lists.
#[derive(Debug, Clone, Serialize)]
pub struct EncodingModelLists {
    pub dense_models: Vec<crate::rag::embeddings::ModelDescriptor>,
    pub sparse_models: Vec<crate::rag::embeddings::ModelDescriptor>,
    pub reranker_models: Vec<crate::rag::embeddings::ModelDescriptor>,
}

/// `POST /eval/cases` body.
#[derive(Debug, Clone, Deserialize)]
pub struct CreateEvalTestCaseRequest {
    pub collection_id: String,
    #[serde(default = "super::default_owner")]
    pub owner_id: String,
    pub query: String,
    pub expected_chunk_ids: Vec<String>,
}

/// `GET /eval/cases/:collectionId/:ownerId` response.
#[derive(Debug, Clone, Serialize)]
pub struct ListTestCasesResponse {
    pub test_cases: Vec<super::EvalTestCase>,
    pub metadata: ListMetadata,
}

/// `GET /collection/:id/resources` response.
#[derive(Debug, Clone, Serialize)]
pub struct ListResourcesResponse {
    pub resources: Vec<super::Resource>,
    pub metadata: ListMetadata,
}

/// Shared `{total}` metadata wrapper for list responses.
#[derive(Debug, Clone, Serialize)]
pub struct ListMetadata {
    pub total: usize,
}

/// `GET /resource/:id/chunks` response.
#[derive(Debug, Clone, Serialize)]
pub struct ListChunksResponse {
    pub chunks: Vec<super::Chunk>,
}
