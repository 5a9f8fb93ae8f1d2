//! Document processor (§4.3): the `chunk -> encode -> store -> delete`
//! pipeline applied to a single resource, grounded on the teacher's
//! `TextChunker`-then-`EmbeddingService`-then-`VectorStore` call chain but
//! generalized to multi-vector (dense/sparse/rerank) chunks and events
//! instead of a direct store write. `strategy=custom` collections delegate
//! entirely to `settings.chunking_url` instead of running a local chunker.

use std::sync::Arc;

use crate::db::broker::{queues, MessageBroker};
use crate::db::InMemoryBroker;
use crate::rag::chunker::{RecursiveChunker, SemanticChunkParams, SemanticChunker};
use crate::rag::embeddings::EmbeddingClient;
use crate::rag::loader::DocumentLoader;
use crate::types::events::{PersistEvent, PersistEventData, PersistEventKind};
use crate::types::{AppError, ChunkingOverrides, ChunkingStrategy, Chunk, CollectionSettings, Resource, Result};
use crate::utils::hashing::chunk_id;

/// Drives one resource through chunk -> encode -> store.
pub struct DocumentProcessor<'a> {
    embedding_client: &'a EmbeddingClient,
    broker: Arc<InMemoryBroker>,
    loader: &'a DocumentLoader,
}

impl<'a> DocumentProcessor<'a> {
    /// Build a processor that reuses the caller's `loader` rather than opening a
    /// fresh HTTP client per resource (its connection pool is shared across
    /// every `strategy=custom` chunking call this processor makes).
    pub fn new(embedding_client: &'a EmbeddingClient, broker: Arc<InMemoryBroker>, loader: &'a DocumentLoader) -> Self {
        Self { embedding_client, broker, loader }
    }

    /// Split `resource.content` into chunks, preferring per-resource
    /// overrides over the collection's settings.
    pub async fn chunk(&self, resource: &Resource, settings: &CollectionSettings) -> Result<Vec<Chunk>> {
        let content = resource.content.as_deref().unwrap_or_default();
        if content.trim().is_empty() {
            return Ok(Vec::new());
        }

        let strategy = resolved_strategy(settings, resource.chunking_overrides.as_ref());
        let chunk_size = resolved_chunk_size(settings, resource.chunking_overrides.as_ref());
        let chunk_overlap = resolved_chunk_overlap(settings, resource.chunking_overrides.as_ref());

        if strategy == ChunkingStrategy::Custom {
            let url = settings
                .chunking_url
                .as_deref()
                .ok_or_else(|| AppError::Validation("strategy=custom requires chunkingUrl".to_string()))?;
            let custom_chunks = self.loader.custom_chunk(url, content).await?;
            return Ok(custom_chunks
                .into_iter()
                .map(|c| build_chunk(resource, settings, c.text, c.vector_source, c.metadata.unwrap_or_default()))
                .collect());
        }

        let texts = match strategy {
            ChunkingStrategy::Recursive | ChunkingStrategy::Agentic => {
                RecursiveChunker::new(chunk_size, chunk_overlap).chunk(content)
            }
            ChunkingStrategy::Semantic => {
                let chunker = SemanticChunker::new(self.embedding_client);
                let params = SemanticChunkParams {
                    min_chunk_size: (chunk_size / 4).max(64),
                    max_chunk_size: chunk_size,
                    dense_model: settings.dense_model.clone(),
                };
                chunker.chunk(content, &params).await?
            }
            ChunkingStrategy::Custom => unreachable!("handled above"),
        };

        Ok(texts
            .into_iter()
            .map(|text| build_chunk(resource, settings, text, None, Default::default()))
            .collect())
    }

    /// Populate dense/sparse/rerank vectors on every chunk according to the
    /// collection's configured model set.
    pub async fn encode(&self, chunks: &mut [Chunk], settings: &CollectionSettings) -> Result<()> {
        if chunks.is_empty() {
            return Ok(());
        }
        let texts: Vec<String> = chunks.iter().map(|c| c.embeddable_text().to_string()).collect();

        let dense = self.embedding_client.encode_dense(&texts, &settings.dense_model).await?;
        for (chunk, vector) in chunks.iter_mut().zip(dense) {
            chunk.vector = Some(vector);
        }

        if let Some(sparse_model) = &settings.sparse_model {
            let sparse = self.embedding_client.encode_sparse(&texts, sparse_model).await?;
            for (chunk, vector) in chunks.iter_mut().zip(sparse) {
                chunk.sparse_vector = Some(vector);
            }
        }

        if let Some(reranker_model) = &settings.reranker_model {
            let rerank = self
                .embedding_client
                .encode_late_interaction(&texts, reranker_model)
                .await?;
            for (chunk, matrix) in chunks.iter_mut().zip(rerank) {
                chunk.rerank_vector = Some(matrix);
            }
        }

        Ok(())
    }

    /// Publish one persist event per chunk batch; a chunk carrying a rerank
    /// matrix is always emitted alone (§4.3: "the payload is too large to
    /// batch safely").
    pub async fn store(&self, resource: &Resource, chunks: Vec<Chunk>) -> Result<()> {
        let mut batch: Vec<Chunk> = Vec::new();
        for chunk in chunks {
            let solo = chunk.rerank_vector.is_some();
            if solo {
                if !batch.is_empty() {
                    self.publish_persist(resource, std::mem::take(&mut batch)).await?;
                }
                self.publish_persist(resource, vec![chunk]).await?;
                continue;
            }
            batch.push(chunk);
        }
        if !batch.is_empty() {
            self.publish_persist(resource, batch).await?;
        }
        Ok(())
    }

    async fn publish_persist(&self, resource: &Resource, chunks: Vec<Chunk>) -> Result<()> {
        let event = PersistEvent {
            version: 1,
            event: PersistEventKind::Upsert,
            data: PersistEventData {
                collection_id: resource.collection_id.clone(),
                resource_id: resource.id.clone(),
                owner_id: resource.owner_id.clone(),
                chunks,
            },
        };
        self.broker.publish(queues::CHUNK_EXCHANGE, &event).await
    }

    /// Emit a delete persist event to purge every point belonging to
    /// `resource.id`.
    pub async fn delete(&self, resource: &Resource) -> Result<()> {
        let event = PersistEvent {
            version: 1,
            event: PersistEventKind::Delete,
            data: PersistEventData {
                collection_id: resource.collection_id.clone(),
                resource_id: resource.id.clone(),
                owner_id: resource.owner_id.clone(),
                chunks: Vec::new(),
            },
        };
        self.broker.publish(queues::CHUNK_EXCHANGE, &event).await
    }
}

fn resolved_strategy(settings: &CollectionSettings, overrides: Option<&ChunkingOverrides>) -> ChunkingStrategy {
    overrides.and_then(|o| o.strategy).unwrap_or(settings.strategy)
}

fn resolved_chunk_size(settings: &CollectionSettings, overrides: Option<&ChunkingOverrides>) -> usize {
    overrides
        .and_then(|o| o.chunk_size)
        .unwrap_or_else(|| settings.clamped_chunk_size())
        .min(4000)
}

fn resolved_chunk_overlap(settings: &CollectionSettings, overrides: Option<&ChunkingOverrides>) -> usize {
    overrides.and_then(|o| o.chunk_overlap).unwrap_or(settings.chunk_overlap)
}

fn build_chunk(
    resource: &Resource,
    settings: &CollectionSettings,
    text: String,
    vector_source: Option<String>,
    metadata: std::collections::HashMap<String, serde_json::Value>,
) -> Chunk {
    let id = if settings.keep_duplicate {
        uuid::Uuid::new_v4().to_string()
    } else {
        chunk_id(&resource.collection_id, &resource.owner_id, &text, vector_source.as_deref())
    };
    Chunk {
        id,
        collection_id: resource.collection_id.clone(),
        owner_id: resource.owner_id.clone(),
        resource_id: resource.id.clone(),
        data: text,
        vector_source,
        vector: None,
        sparse_vector: None,
        rerank_vector: None,
        metadata,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn settings() -> CollectionSettings {
        CollectionSettings {
            dense_model: "bge-small-en-v1.5".to_string(),
            sparse_model: None,
            reranker_model: None,
            chunk_size: 50,
            chunk_overlap: 10,
            strategy: ChunkingStrategy::Recursive,
            chunking_url: None,
            keep_duplicate: false,
        }
    }

    fn resource(content: &str) -> Resource {
        Resource {
            id: "r1".to_string(),
            collection_id: "c1".to_string(),
            owner_id: "alice".to_string(),
            title: None,
            url: None,
            content: Some(content.to_string()),
            content_hash: None,
            description: None,
            metadata: Default::default(),
            chunking_overrides: None,
            status: crate::types::ResourceStatus::Loaded,
            status_message: None,
            is_deleted: false,
            refreshed_at: Utc::now(),
            created_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn chunking_empty_content_yields_no_chunks() {
        let config = crate::utils::config::EmbeddingConfig {
            base_url: "http://localhost:0".to_string(),
            api_key: None,
            request_timeout_secs: 1,
        };
        let client = EmbeddingClient::new(&config);
        let broker = InMemoryBroker::new();
        let loader = DocumentLoader::new();
        let processor = DocumentProcessor::new(&client, broker, &loader);
        let res = resource("");
        let chunks = processor.chunk(&res, &settings()).await.unwrap();
        assert!(chunks.is_empty());
    }

    #[tokio::test]
    async fn recursive_chunking_assigns_content_addressed_ids() {
        let config = crate::utils::config::EmbeddingConfig {
            base_url: "http://localhost:0".to_string(),
            api_key: None,
            request_timeout_secs: 1,
        };
        let client = EmbeddingClient::new(&config);
        let broker = InMemoryBroker::new();
        let loader = DocumentLoader::new();
        let processor = DocumentProcessor::new(&client, broker, &loader);
        let res = resource("one two three four five six seven eight nine ten eleven twelve");
        let chunks = processor.chunk(&res, &settings()).await.unwrap();
        assert!(!chunks.is_empty());
        for chunk in &chunks {
            assert_eq!(chunk.id.len(), 36);
            assert_eq!(chunk.collection_id, "c1");
            assert_eq!(chunk.owner_id, "alice");
        }
    }

    #[tokio::test]
    async fn custom_strategy_delegates_to_the_chunking_url() {
        let mock_server = wiremock::MockServer::start().await;
        wiremock::Mock::given(wiremock::matchers::method("POST"))
            .and(wiremock::matchers::path("/chunk"))
            .respond_with(wiremock::ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "chunks": [
                    {"text": "first chunk", "vectorSource": "embed this", "metadata": {"page": 1}},
                    {"text": "second chunk"},
                ]
            })))
            .mount(&mock_server)
            .await;

        let config = crate::utils::config::EmbeddingConfig {
            base_url: "http://localhost:0".to_string(),
            api_key: None,
            request_timeout_secs: 1,
        };
        let client = EmbeddingClient::new(&config);
        let broker = InMemoryBroker::new();
        let loader = DocumentLoader::new();
        let processor = DocumentProcessor::new(&client, broker, &loader);

        let mut custom_settings = settings();
        custom_settings.strategy = ChunkingStrategy::Custom;
        custom_settings.chunking_url = Some(format!("{}/chunk", mock_server.uri()));

        let res = resource("ignored: the custom endpoint owns chunk boundaries");
        let chunks = processor.chunk(&res, &custom_settings).await.unwrap();

        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0].data, "first chunk");
        assert_eq!(chunks[0].vector_source.as_deref(), Some("embed this"));
        assert_eq!(chunks[0].metadata.get("page").unwrap(), &serde_json::json!(1));
        assert_eq!(chunks[1].data, "second chunk");
        assert!(chunks[1].vector_source.is_none());
    }

    #[tokio::test]
    async fn custom_strategy_without_chunking_url_is_a_validation_error() {
        let config = crate::utils::config::EmbeddingConfig {
            base_url: "http://localhost:0".to_string(),
            api_key: None,
            request_timeout_secs: 1,
        };
        let client = EmbeddingClient::new(&config);
        let broker = InMemoryBroker::new();
        let loader = DocumentLoader::new();
        let processor = DocumentProcessor::new(&client, broker, &loader);

        let mut custom_settings = settings();
        custom_settings.strategy = ChunkingStrategy::Custom;

        let res = resource("some content");
        let err = processor.chunk(&res, &custom_settings).await.unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
    }
}
