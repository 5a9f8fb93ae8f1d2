//! Search handler (§6: `POST /search`).

use axum::extract::State;
use axum::Json;

use crate::rag::search::SearchOptions;
use crate::types::api::{FeedbackAnnotation, SearchRequest, SearchResponse, SearchResultItem, SearchResultPayload};
use crate::types::{AppError, Result};
use crate::AppState;

pub async fn search(State(state): State<AppState>, Json(req): Json<SearchRequest>) -> Result<Json<SearchResponse>> {
    if req.query.trim().is_empty() {
        return Err(AppError::Validation("query must not be empty".to_string()));
    }
    if req.collection_id.trim().is_empty() {
        return Err(AppError::Validation("collectionId must not be empty".to_string()));
    }

    let opts = SearchOptions {
        owner_id: req.owner_id.clone(),
        resource_id: req.resource_id.clone(),
        top_k: req.limit,
        use_feedback: req.use_feedback.unwrap_or(true),
        analytics: req.analytics.unwrap_or(true),
    };

    let hits = state.query_engine.search(&req.query, &req.collection_id, &opts).await?;
    let min_score = req.min_score.unwrap_or(f32::MIN);
    let is_review = req.is_review.unwrap_or(false);
    let owner_id = req.owner_id.clone().unwrap_or_else(crate::types::default_owner);

    let mut result = Vec::new();
    for hit in hits.into_iter().filter(|h| h.score >= min_score) {
        let feedback = hit
            .feedback_boost
            .as_ref()
            .map(|(boost, matched_query)| FeedbackAnnotation { boost: *boost, matched_query: matched_query.clone() });

        let review_reference_id = if is_review {
            let reference_id = uuid::Uuid::new_v4().to_string();
            let link = crate::FeedbackLink {
                query: req.query.clone(),
                collection_id: hit.collection_id.clone(),
                chunk_id: hit.id.clone(),
                resource_id: hit.resource_id.clone(),
                owner_id: owner_id.clone(),
            };
            state.feedback_link_cache.set(reference_id.clone(), link, None);
            Some(reference_id)
        } else {
            None
        };

        result.push(SearchResultItem {
            id: hit.id,
            score: hit.score,
            payload: SearchResultPayload {
                resource_id: hit.resource_id,
                collection_id: hit.collection_id,
                owner_id: hit.owner_id,
                content: hit.content,
                metadata: hit.metadata,
            },
            feedback,
            review_reference_id,
        });
    }

    Ok(Json(SearchResponse { result }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::test_support::test_state;
    use crate::types::{ChunkingStrategy, Collection, CollectionSettings};
    use chrono::Utc;

    async fn seed_collection(state: &AppState) {
        let collection = Collection {
            id: "c1".to_string(),
            name: "docs".to_string(),
            description: None,
            metadata: Default::default(),
            settings: CollectionSettings {
                dense_model: "bge-small-en-v1.5".to_string(),
                sparse_model: None,
                reranker_model: None,
                chunk_size: 200,
                chunk_overlap: 20,
                strategy: ChunkingStrategy::Recursive,
                chunking_url: None,
                keep_duplicate: false,
            },
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };
        state
            .document_store
            .put_json(&format!("collection:{}", collection.id), &collection)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn rejects_empty_query() {
        let state = test_state("key").await;
        let req = SearchRequest {
            query: String::new(),
            collection_id: "c1".to_string(),
            owner_id: None,
            resource_id: None,
            is_review: None,
            limit: None,
            min_score: None,
            use_feedback: None,
            analytics: None,
        };
        let err = search(State(state), Json(req)).await.unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
    }

    #[tokio::test]
    async fn missing_collection_is_not_found() {
        let state = test_state("key").await;
        let req = SearchRequest {
            query: "hello".to_string(),
            collection_id: "missing".to_string(),
            owner_id: None,
            resource_id: None,
            is_review: None,
            limit: None,
            min_score: None,
            use_feedback: None,
            analytics: None,
        };
        let err = search(State(state), Json(req)).await.unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }

    fn embedding_client_for(base_url: &str) -> crate::rag::embeddings::EmbeddingClient {
        crate::rag::embeddings::EmbeddingClient::new(&crate::utils::config::EmbeddingConfig {
            base_url: base_url.to_string(),
            api_key: None,
            request_timeout_secs: 5,
        })
    }

    #[tokio::test]
    async fn empty_collection_returns_empty_result() {
        let mock_server = wiremock::MockServer::start().await;
        wiremock::Mock::given(wiremock::matchers::path("/embed"))
            .respond_with(wiremock::ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "embeddings": [vec![0.1f32; 384]]
            })))
            .mount(&mock_server)
            .await;

        let mut state = test_state("key").await;
        seed_collection(&state).await;
        state.embedding_client = std::sync::Arc::new(embedding_client_for(&mock_server.uri()));

        let req = SearchRequest {
            query: "hello".to_string(),
            collection_id: "c1".to_string(),
            owner_id: None,
            resource_id: None,
            is_review: Some(true),
            limit: None,
            min_score: None,
            use_feedback: Some(false),
            analytics: Some(false),
        };
        let Json(resp) = search(State(state), Json(req)).await.unwrap();
        assert!(resp.result.is_empty());
    }

    #[tokio::test]
    async fn marks_review_reference_id_on_hits() {
        let mock_server = wiremock::MockServer::start().await;
        wiremock::Mock::given(wiremock::matchers::path("/embed"))
            .respond_with(wiremock::ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "embeddings": [vec![1.0f32, 0.0, 0.0]]
            })))
            .mount(&mock_server)
            .await;

        let mut state = test_state("key").await;
        seed_collection(&state).await;
        state.embedding_client = std::sync::Arc::new(embedding_client_for(&mock_server.uri()));

        let point = crate::db::vector_store::StoredPoint {
            id: "chunk-1".to_string(),
            resource_id: "r1".to_string(),
            collection_id: "c1".to_string(),
            owner_id: crate::types::default_owner(),
            content: "hello world".to_string(),
            metadata: Default::default(),
            dense: Some(vec![1.0, 0.0, 0.0]),
            sparse: None,
            rerank: None,
        };
        state.vector_store.upsert("c1", point).await.unwrap();

        let req = SearchRequest {
            query: "hello".to_string(),
            collection_id: "c1".to_string(),
            owner_id: None,
            resource_id: None,
            is_review: Some(true),
            limit: None,
            min_score: None,
            use_feedback: Some(false),
            analytics: Some(false),
        };
        let Json(resp) = search(State(state.clone()), Json(req)).await.unwrap();
        assert_eq!(resp.result.len(), 1);
        let reference_id = resp.result[0].review_reference_id.clone().unwrap();
        assert!(state.feedback_link_cache.get(&reference_id).is_some());
    }
}
