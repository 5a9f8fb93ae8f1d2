//! Utility handlers (§6: `GET /utility/encoding-models`).

use axum::extract::State;
use axum::Json;

use crate::rag::embeddings::{dense_models, reranker_models, sparse_models};
use crate::types::api::{EncodingModelLists, EncodingModelsResponse};
use crate::AppState;

pub async fn encoding_models(State(_state): State<AppState>) -> Json<EncodingModelsResponse> {
    Json(EncodingModelsResponse {
        models: EncodingModelLists {
            dense_models: dense_models(),
            sparse_models: sparse_models(),
            reranker_models: reranker_models(),
        },
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::test_support::test_state;

    #[tokio::test]
    async fn lists_every_static_model_table() {
        let state = test_state("key").await;
        let Json(resp) = encoding_models(State(state)).await;
        assert!(!resp.models.dense_models.is_empty());
        assert!(!resp.models.sparse_models.is_empty());
        assert!(!resp.models.reranker_models.is_empty());
    }
}
