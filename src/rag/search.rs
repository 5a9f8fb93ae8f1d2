//! Query engine (§4.5): embed -> adapter transform -> filter -> hybrid/dense
//! retrieve -> rerank -> feedback fusion -> truncate -> fire-and-forget
//! analytics.

use std::sync::Arc;

use crate::db::broker::{queues, MessageBroker};
use crate::db::vector_store::{feedback_collection_name, VectorFilter, VectorHit, VectorStore};
use crate::db::{DocumentStoreExt, InMemoryBroker};
use crate::rag::adapter::AdapterService;
use crate::rag::embeddings::EmbeddingClient;
use crate::types::events::AnalyticsEvent;
use crate::types::{AppError, Collection, FeedbackDoc, Result, SparseVector};

/// Candidates pulled before rerank/feedback fusion narrow down to `top_k`.
pub const RETRIEVAL_CANDIDATES: usize = 50;
/// Feedback fusion only looks at the `N` most similar prior queries.
pub const FEEDBACK_LOOKBACK: usize = 5;
/// Minimum similarity for a prior query to contribute feedback boost.
pub const FEEDBACK_SIMILARITY_THRESHOLD: f32 = 0.85;

#[derive(Debug, Clone, Default)]
pub struct SearchOptions {
    pub owner_id: Option<String>,
    pub resource_id: Option<String>,
    pub top_k: Option<usize>,
    pub use_feedback: bool,
    pub analytics: bool,
}

#[derive(Debug, Clone)]
pub struct ScoredHit {
    pub id: String,
    pub score: f32,
    pub resource_id: String,
    pub collection_id: String,
    pub owner_id: String,
    pub content: String,
    pub metadata: std::collections::HashMap<String, serde_json::Value>,
    pub feedback_boost: Option<(f32, String)>,
}

pub struct QueryEngine {
    document_store: Arc<dyn crate::db::DocumentStore>,
    vector_store: Arc<dyn VectorStore>,
    embedding_client: Arc<EmbeddingClient>,
    adapter_service: Arc<AdapterService>,
    broker: Arc<InMemoryBroker>,
}

impl QueryEngine {
    pub fn new(
        document_store: Arc<dyn crate::db::DocumentStore>,
        vector_store: Arc<dyn VectorStore>,
        embedding_client: Arc<EmbeddingClient>,
        adapter_service: Arc<AdapterService>,
        broker: Arc<InMemoryBroker>,
    ) -> Self {
        Self {
            document_store,
            vector_store,
            embedding_client,
            adapter_service,
            broker,
        }
    }

    pub async fn search(&self, query: &str, collection_id: &str, opts: &SearchOptions) -> Result<Vec<ScoredHit>> {
        let started = std::time::Instant::now();
        let collection: Collection = self
            .document_store
            .get_json(&format!("collection:{collection_id}"))
            .await?
            .ok_or_else(|| AppError::NotFound(format!("collection {collection_id} not found")))?;
        let settings = &collection.settings;
        let top_k = opts.top_k.unwrap_or(5);
        let owner_id = opts.owner_id.clone().unwrap_or_else(crate::types::default_owner);

        let dense_texts = vec![query.to_string()];
        let dense_fut = self.embedding_client.encode_dense(&dense_texts, &settings.dense_model);
        let sparse_fut = async {
            match &settings.sparse_model {
                Some(model) => Ok(Some(self.embedding_client.encode_sparse(&dense_texts, model).await?)),
                None => Ok::<_, AppError>(None),
            }
        };
        let rerank_fut = async {
            match &settings.reranker_model {
                Some(model) => Ok(Some(
                    self.embedding_client.encode_late_interaction(&dense_texts, model).await?,
                )),
                None => Ok::<_, AppError>(None),
            }
        };

        let (dense_vecs, sparse_vecs, rerank_vecs) = tokio::try_join!(dense_fut, sparse_fut, rerank_fut)?;
        let dense_raw = dense_vecs.into_iter().next().unwrap_or_default();
        let sparse: Option<SparseVector> = sparse_vecs.and_then(|v| v.into_iter().next());
        let rerank_matrix: Option<Vec<Vec<f32>>> = rerank_vecs.and_then(|v| v.into_iter().next());

        let dense = self.adapter_service.transform_or_identity(collection_id, &dense_raw).await;

        let filter = VectorFilter { owner_id: owner_id.clone(), resource_id: opts.resource_id.clone() };

        let mut hits: Vec<VectorHit> = match &sparse {
            Some(sparse_vec) => {
                self.vector_store
                    .query_hybrid(collection_id, &dense, sparse_vec, RETRIEVAL_CANDIDATES, &filter)
                    .await?
            }
            None => {
                self.vector_store
                    .query_dense(collection_id, &dense, RETRIEVAL_CANDIDATES, &filter)
                    .await?
            }
        };

        if let Some(query_matrix) = &rerank_matrix {
            let candidate_ids: Vec<String> = hits.iter().map(|h| h.id.clone()).collect();
            if !candidate_ids.is_empty() {
                hits = self.vector_store.rerank(collection_id, &candidate_ids, query_matrix).await?;
            }
        }

        let mut scored: Vec<ScoredHit> = hits
            .into_iter()
            .map(|h| ScoredHit {
                id: h.id,
                score: h.score,
                resource_id: h.point.resource_id,
                collection_id: h.point.collection_id,
                owner_id: h.point.owner_id,
                content: h.point.content,
                metadata: h.point.metadata,
                feedback_boost: None,
            })
            .collect();

        if opts.use_feedback {
            if let Err(e) = self.apply_feedback_fusion(collection_id, &owner_id, &dense, &mut scored).await {
                tracing::warn!(error = %e, "feedback fusion failed, returning unfused results");
            }
        }

        scored.truncate(top_k);

        if opts.analytics {
            self.emit_analytics(collection_id, &owner_id, query, started.elapsed());
        }

        Ok(scored)
    }

    async fn apply_feedback_fusion(
        &self,
        collection_id: &str,
        owner_id: &str,
        dense_query: &[f32],
        scored: &mut Vec<ScoredHit>,
    ) -> Result<()> {
        let feedback_collection = feedback_collection_name(collection_id);
        let filter = VectorFilter { owner_id: owner_id.to_string(), resource_id: None };
        let nearby = self
            .vector_store
            .query_dense(&feedback_collection, dense_query, FEEDBACK_LOOKBACK, &filter)
            .await?;

        for hit in nearby.into_iter().filter(|h| h.score > FEEDBACK_SIMILARITY_THRESHOLD) {
            let key = format!("feedback:{}", hit.id);
            let Some(doc) = self.document_store.get_json::<FeedbackDoc>(&key).await? else {
                continue;
            };
            for (chunk_id, tally) in &doc.hits {
                if tally.count <= 0 {
                    continue;
                }
                if let Some(target) = scored.iter_mut().find(|s| &s.id == chunk_id) {
                    let boost = (tally.count as f32).ln() * hit.score;
                    target.score += boost;
                    target.feedback_boost = Some((boost, doc.query.clone()));
                }
            }
        }

        scored.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        Ok(())
    }

    fn emit_analytics(&self, collection_id: &str, owner_id: &str, query: &str, elapsed: std::time::Duration) {
        let event = AnalyticsEvent {
            id: uuid::Uuid::new_v4().to_string(),
            collection_id: collection_id.to_string(),
            owner_id: owner_id.to_string(),
            query: query.to_string(),
            rt_ms: elapsed.as_millis() as u64,
            ts: chrono::Utc::now(),
        };
        let broker = Arc::clone(&self.broker);
        tokio::spawn(async move {
            if let Err(e) = broker.publish(queues::ANALYTICS, &event).await {
                tracing::warn!(error = %e, "failed to emit analytics event");
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn feedback_threshold_matches_spec() {
        assert!((FEEDBACK_SIMILARITY_THRESHOLD - 0.85).abs() < 1e-6);
    }

    #[test]
    fn retrieval_candidate_count_matches_spec() {
        assert_eq!(RETRIEVAL_CANDIDATES, 50);
    }
}
