//! Ingestion consumer (§4.8): drives `load` -> `chunk` -> persist for a
//! resource, single-threaded per message with an implicit prefetch of one.

use std::sync::Arc;

use crate::db::broker::{queues, Delivery, MessageBroker};
use crate::db::{DocumentStore, DocumentStoreExt, InMemoryBroker};
use crate::rag::embeddings::EmbeddingClient;
use crate::rag::loader::DocumentLoader;
use crate::rag::processor::DocumentProcessor;
use crate::types::events::{IngestEvent, IngestEventKind, ResourceStatusMessage};
use crate::types::{AppError, Collection, Resource, ResourceStatus, Result};

pub struct IngestionWorker {
    document_store: Arc<dyn DocumentStore>,
    broker: Arc<InMemoryBroker>,
    loader: DocumentLoader,
    embedding_client: Arc<EmbeddingClient>,
}

impl IngestionWorker {
    pub fn new(
        document_store: Arc<dyn DocumentStore>,
        broker: Arc<InMemoryBroker>,
        embedding_client: Arc<EmbeddingClient>,
    ) -> Self {
        Self {
            document_store,
            broker,
            loader: DocumentLoader::new(),
            embedding_client,
        }
    }

    pub async fn run(self: Arc<Self>) {
        let mut rx = self.broker.subscribe(queues::RAG);
        while let Some(delivery) = rx.recv().await {
            self.handle_delivery(delivery).await;
        }
    }

    async fn handle_delivery(&self, delivery: Delivery) {
        let event: IngestEvent = match serde_json::from_slice(&delivery.payload) {
            Ok(e) => e,
            Err(e) => {
                tracing::error!(error = %e, "dropping unparseable ingest event");
                let _ = self.broker.publish_dead_letter(queues::RAG, &serde_json::json!({
                    "error": e.to_string(),
                    "raw": String::from_utf8_lossy(&delivery.payload),
                })).await;
                return;
            }
        };

        let resource_id = event.data.resource_id.clone();
        if let Err(e) = self.process(&event).await {
            tracing::warn!(error = %e, resource_id = %resource_id, "ingestion step failed, dead-lettering");
            self.mark_error(&resource_id, &e.to_string()).await;
            let _ = self.broker.publish_dead_letter(queues::RAG, &event).await;
        }
        // Always ack: dropping the delivery here is the in-process broker's
        // equivalent of an ack, avoiding poison-message replay loops (§7 S7).
    }

    async fn process(&self, event: &IngestEvent) -> Result<()> {
        match event.event {
            IngestEventKind::Load => self.handle_load(event).await,
            IngestEventKind::Chunk => self.handle_chunk(event).await,
            IngestEventKind::Update => Ok(()),
            IngestEventKind::Delete => self.handle_delete(event).await,
        }
    }

    async fn load_resource(&self, resource_id: &str) -> Result<Resource> {
        self.document_store
            .get_json(&format!("resource:{resource_id}"))
            .await?
            .ok_or_else(|| AppError::NotFound(format!("resource {resource_id} not found")))
    }

    async fn save_resource(&self, resource: &Resource) -> Result<()> {
        self.document_store.put_json(&format!("resource:{}", resource.id), resource).await
    }

    async fn handle_load(&self, event: &IngestEvent) -> Result<()> {
        let mut resource = self.load_resource(&event.data.resource_id).await?;
        let url = event
            .data
            .url
            .clone()
            .or_else(|| resource.url.clone())
            .ok_or_else(|| AppError::Validation("load event has no url to fetch".to_string()))?;

        let loaded = self.loader.load(&url).await?;
        if resource.content_hash.as_deref() == Some(loaded.content_hash.as_str()) {
            resource.status = ResourceStatus::Chunked;
        } else {
            resource.content = Some(loaded.content);
            resource.content_hash = Some(loaded.content_hash);
            resource.status = ResourceStatus::Loaded;
        }
        resource.status_message = None;
        self.save_resource(&resource).await?;
        self.publish_status(&resource, None).await;
        Ok(())
    }

    async fn handle_chunk(&self, event: &IngestEvent) -> Result<()> {
        let mut resource = self.load_resource(&event.data.resource_id).await?;
        let collection: Collection = self
            .document_store
            .get_json(&format!("collection:{}", resource.collection_id))
            .await?
            .ok_or_else(|| AppError::NotFound(format!("collection {} not found", resource.collection_id)))?;

        let processor = DocumentProcessor::new(&self.embedding_client, Arc::clone(&self.broker), &self.loader);
        let mut chunks = processor.chunk(&resource, &collection.settings).await?;
        processor.encode(&mut chunks, &collection.settings).await?;
        processor.store(&resource, chunks).await?;

        resource.status = ResourceStatus::Chunked;
        resource.status_message = None;
        self.save_resource(&resource).await?;
        self.publish_status(&resource, None).await;
        Ok(())
    }

    async fn handle_delete(&self, event: &IngestEvent) -> Result<()> {
        let mut resource = self.load_resource(&event.data.resource_id).await?;

        let processor = DocumentProcessor::new(&self.embedding_client, Arc::clone(&self.broker), &self.loader);
        processor.delete(&resource).await?;

        resource.status = ResourceStatus::Deleted;
        resource.is_deleted = true;
        resource.status_message = None;
        self.save_resource(&resource).await?;
        self.publish_status(&resource, None).await;
        Ok(())
    }

    async fn mark_error(&self, resource_id: &str, message: &str) {
        if let Ok(mut resource) = self.load_resource(resource_id).await {
            resource.status = ResourceStatus::Error;
            resource.status_message = Some(message.to_string());
            if self.save_resource(&resource).await.is_ok() {
                self.publish_status(&resource, Some(message.to_string())).await;
            }
        }
    }

    async fn publish_status(&self, resource: &Resource, message: Option<String>) {
        let status_message = ResourceStatusMessage {
            resource_id: resource.id.clone(),
            status: resource.status,
            message,
        };
        let _ = self.broker.publish(queues::RESOURCE_REALTIME, &status_message).await;
    }
}
