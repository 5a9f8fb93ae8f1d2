//! Feedback worker (§4.6): turns `{query, chunkId, action, ...}` events into
//! FeedbackDoc updates and, on upvotes, adapter training signal.

use std::sync::Arc;

use crate::db::broker::{queues, Delivery, MessageBroker};
use crate::db::vector_store::{feedback_collection_name, StoredPoint, VectorFilter, VectorStore};
use crate::db::{DocumentStoreExt, InMemoryBroker};
use crate::rag::adapter::AdapterService;
use crate::rag::embeddings::EmbeddingClient;
use crate::types::events::FeedbackEvent;
use crate::types::{AppError, Collection, FeedbackAction, FeedbackDoc, FeedbackHit, Result};
use crate::utils::hashing::feedback_id;

/// Similarity above which a new feedback event is folded into an existing
/// feedback point rather than minting a new one (§4.6 step 4).
pub const FEEDBACK_MERGE_THRESHOLD: f32 = 0.9;

pub struct FeedbackWorker {
    document_store: Arc<dyn crate::db::DocumentStore>,
    vector_store: Arc<dyn VectorStore>,
    embedding_client: Arc<EmbeddingClient>,
    adapter_service: Arc<AdapterService>,
    broker: Arc<InMemoryBroker>,
}

impl FeedbackWorker {
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

    /// Consume `search-feedback` deliveries until the channel closes,
    /// single-threaded with an implicit prefetch of one (§5).
    pub async fn run(self: Arc<Self>) {
        let mut rx = self.broker.subscribe(queues::SEARCH_FEEDBACK);
        while let Some(delivery) = rx.recv().await {
            self.handle_delivery(delivery).await;
        }
    }

    async fn handle_delivery(&self, delivery: Delivery) {
        let event: FeedbackEvent = match serde_json::from_slice(&delivery.payload) {
            Ok(e) => e,
            Err(e) => {
                tracing::error!(error = %e, "dropping unparseable feedback event");
                return;
            }
        };
        if let Err(e) = self.process(&event).await {
            tracing::warn!(error = %e, query = %event.query, "feedback processing failed, dead-lettering");
            let _ = self.broker.publish_dead_letter(queues::SEARCH_FEEDBACK, &event).await;
        }
        // Always ack (there is nothing more to do here; the in-process
        // broker has no explicit ack, so "ack" just means "don't requeue",
        // which dropping the delivery already accomplishes).
    }

    async fn process(&self, event: &FeedbackEvent) -> Result<()> {
        let collection: Collection = self
            .document_store
            .get_json(&format!("collection:{}", event.collection_id))
            .await?
            .ok_or_else(|| AppError::NotFound(format!("collection {} not found", event.collection_id)))?;

        let dense_model = collection.settings.dense_model.clone();
        let query_vec = self
            .embedding_client
            .encode_dense(&[event.query.clone()], &dense_model)
            .await?
            .into_iter()
            .next()
            .unwrap_or_default();

        let feedback_collection = feedback_collection_name(&event.collection_id);
        let filter = VectorFilter { owner_id: event.owner_id.clone(), resource_id: None };
        let nearest = self
            .vector_store
            .query_dense(&feedback_collection, &query_vec, 1, &filter)
            .await?;

        let doc_id = match nearest.first() {
            Some(hit) if hit.score > FEEDBACK_MERGE_THRESHOLD => hit.id.clone(),
            _ => {
                let id = feedback_id(&event.collection_id, &event.owner_id, &event.query);
                self.vector_store
                    .upsert(
                        &feedback_collection,
                        StoredPoint {
                            id: id.clone(),
                            resource_id: event.resource_id.clone(),
                            collection_id: event.collection_id.clone(),
                            owner_id: event.owner_id.clone(),
                            content: event.query.clone(),
                            metadata: Default::default(),
                            dense: Some(query_vec.clone()),
                            sparse: None,
                            rerank: None,
                        },
                    )
                    .await?;
                id
            }
        };

        let key = format!("feedback:{doc_id}");
        let mut doc: FeedbackDoc = self.document_store.get_json(&key).await?.unwrap_or_else(|| FeedbackDoc {
            id: doc_id.clone(),
            collection_id: event.collection_id.clone(),
            owner_id: event.owner_id.clone(),
            query: event.query.clone(),
            hits: Default::default(),
            created_at: chrono::Utc::now(),
            updated_at: chrono::Utc::now(),
        });

        let delta = match event.action {
            FeedbackAction::Upvote => 1,
            FeedbackAction::Downvote => -1,
        };
        let entry = doc.hits.entry(event.chunk_id.clone()).or_insert_with(|| FeedbackHit {
            resource_id: event.resource_id.clone(),
            count: 0,
        });
        entry.count += delta;
        doc.updated_at = chrono::Utc::now();
        self.document_store.put_json(&key, &doc).await?;

        if matches!(event.action, FeedbackAction::Upvote) {
            if let Err(e) = self.train_adapter(event, &collection, &query_vec).await {
                tracing::warn!(error = %e, "adapter training on feedback failed, continuing");
            }
        }

        Ok(())
    }

    async fn train_adapter(&self, event: &FeedbackEvent, collection: &Collection, query_vec: &[f32]) -> Result<()> {
        let chunk_point = self
            .vector_store
            .get_point(&event.collection_id, &event.chunk_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("chunk {} not found", event.chunk_id)))?;
        let chunk_vec = chunk_point
            .dense
            .ok_or_else(|| AppError::Validation("upvoted chunk has no dense vector".to_string()))?;

        self.adapter_service
            .train_with_feedback(&collection.id, query_vec, &chunk_vec)
            .await
    }
}
