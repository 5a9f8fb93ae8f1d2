//! Persist consumer (§4.8, §5): applies `chunk_exchange` events to the vector
//! store. Runs as its own queue subscriber so a slow or failing vector-store
//! write never blocks the ingestion worker from moving on to the next resource.

use std::sync::Arc;

use crate::db::broker::{queues, Delivery, MessageBroker};
use crate::db::vector_store::{StoredPoint, VectorStore};
use crate::db::InMemoryBroker;
use crate::types::events::{PersistEvent, PersistEventKind};
use crate::types::Result;

pub struct PersistWorker {
    vector_store: Arc<dyn VectorStore>,
    broker: Arc<InMemoryBroker>,
}

impl PersistWorker {
    pub fn new(vector_store: Arc<dyn VectorStore>, broker: Arc<InMemoryBroker>) -> Self {
        Self { vector_store, broker }
    }

    pub async fn run(self: Arc<Self>) {
        let mut rx = self.broker.subscribe(queues::CHUNK_EXCHANGE);
        while let Some(delivery) = rx.recv().await {
            self.handle_delivery(delivery).await;
        }
    }

    async fn handle_delivery(&self, delivery: Delivery) {
        let event: PersistEvent = match serde_json::from_slice(&delivery.payload) {
            Ok(e) => e,
            Err(e) => {
                tracing::error!(error = %e, "dropping unparseable persist event");
                let _ = self
                    .broker
                    .publish_dead_letter(
                        queues::CHUNK_EXCHANGE,
                        &serde_json::json!({
                            "error": e.to_string(),
                            "raw": String::from_utf8_lossy(&delivery.payload),
                        }),
                    )
                    .await;
                return;
            }
        };

        if let Err(e) = self.process(&event).await {
            tracing::warn!(error = %e, resource_id = %event.data.resource_id, "persist step failed, dead-lettering");
            let _ = self.broker.publish_dead_letter(queues::CHUNK_EXCHANGE, &event).await;
        }
    }

    async fn process(&self, event: &PersistEvent) -> Result<()> {
        match event.event {
            PersistEventKind::Upsert => self.upsert(event).await,
            PersistEventKind::Delete => self.delete(event).await,
        }
    }

    async fn upsert(&self, event: &PersistEvent) -> Result<()> {
        for chunk in &event.data.chunks {
            let point = StoredPoint::from_chunk(chunk);
            self.vector_store.upsert(&event.data.collection_id, point).await?;
        }
        Ok(())
    }

    async fn delete(&self, event: &PersistEvent) -> Result<()> {
        self.vector_store
            .delete_by_resource(&event.data.collection_id, &event.data.resource_id)
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::vector_store::{AresVectorStore, VectorFilter};
    use crate::types::Chunk;
    use vector_engine::Config as EngineConfig;

    fn test_chunk(id: &str) -> Chunk {
        Chunk {
            id: id.to_string(),
            collection_id: "c1".to_string(),
            owner_id: "alice".to_string(),
            resource_id: "r1".to_string(),
            data: "hello world".to_string(),
            vector_source: None,
            vector: Some(vec![1.0, 0.0, 0.0]),
            sparse_vector: None,
            rerank_vector: None,
            metadata: Default::default(),
        }
    }

    #[tokio::test]
    async fn upsert_event_writes_points_to_the_vector_store() {
        let store: Arc<dyn VectorStore> = Arc::new(AresVectorStore::open(EngineConfig::memory()).await.unwrap());
        let broker = InMemoryBroker::new();
        let worker = PersistWorker::new(Arc::clone(&store), broker);

        let event = PersistEvent {
            version: 1,
            event: PersistEventKind::Upsert,
            data: crate::types::events::PersistEventData {
                collection_id: "c1".to_string(),
                resource_id: "r1".to_string(),
                owner_id: "alice".to_string(),
                chunks: vec![test_chunk("chunk-1")],
            },
        };
        worker.process(&event).await.unwrap();

        let filter = VectorFilter { owner_id: "alice".to_string(), resource_id: None };
        let hits = store.query_dense("c1", &[1.0, 0.0, 0.0], 10, &filter).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].id, "chunk-1");
    }

    #[tokio::test]
    async fn delete_event_removes_every_point_for_the_resource() {
        let store: Arc<dyn VectorStore> = Arc::new(AresVectorStore::open(EngineConfig::memory()).await.unwrap());
        let broker = InMemoryBroker::new();
        let worker = PersistWorker::new(Arc::clone(&store), broker);

        let upsert = PersistEvent {
            version: 1,
            event: PersistEventKind::Upsert,
            data: crate::types::events::PersistEventData {
                collection_id: "c1".to_string(),
                resource_id: "r1".to_string(),
                owner_id: "alice".to_string(),
                chunks: vec![test_chunk("chunk-1")],
            },
        };
        worker.process(&upsert).await.unwrap();

        let delete = PersistEvent {
            version: 1,
            event: PersistEventKind::Delete,
            data: crate::types::events::PersistEventData {
                collection_id: "c1".to_string(),
                resource_id: "r1".to_string(),
                owner_id: "alice".to_string(),
                chunks: vec![],
            },
        };
        worker.process(&delete).await.unwrap();

        assert_eq!(store.count("c1").await.unwrap(), 0);
    }
}
