//! Server binary for `ragd`: wires storage, the embedding client, the
//! broker-driven ingestion/persist/feedback workers and the HTTP API
//! together, then serves.

use std::sync::Arc;
use std::time::Duration;

use rag_core::db::{AresVectorStore, DocumentStoreProvider, InMemoryBroker, VectorStore};
use rag_core::ingest::{IngestionWorker, PersistWorker};
use rag_core::rag::adapter::{AdapterService, DocumentStoreAdapterPersistence, FileAdapterPersistence};
use rag_core::rag::cache::ShortTtlCache;
use rag_core::rag::embeddings::EmbeddingClient;
use rag_core::rag::evaluator::Evaluator;
use rag_core::rag::feedback::FeedbackWorker;
use rag_core::rag::search::QueryEngine;
use rag_core::utils::config::Config;
use rag_core::{api, AppState};
use tower_http::{
    compression::CompressionLayer, cors::CorsLayer, limit::RequestBodyLimitLayer, trace::TraceLayer,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// `PUT`/`POST` bodies larger than this are rejected at the edge.
const MAX_BODY_BYTES: usize = 20 * 1024 * 1024;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env()?;
    tracing::info!(host = %config.server.host, port = config.server.port, "starting ragd");

    let document_store = DocumentStoreProvider::from_env().create_store()?;

    let vector_store: Arc<dyn VectorStore> = match &config.backends.vector_store_url {
        Some(path) if !path.is_empty() => {
            tracing::info!(path, "opening persistent vector store");
            Arc::new(AresVectorStore::open(vector_engine::Config::persistent(path.clone())).await?)
        }
        _ => {
            tracing::info!("no VECTOR_STORE_URL set, using an in-memory vector store");
            Arc::new(AresVectorStore::in_memory().await?)
        }
    };

    let embedding_client = Arc::new(EmbeddingClient::new(&config.embedding));

    let adapter_service = Arc::new(AdapterService::new(if config.adapter.use_document_store {
        Box::new(DocumentStoreAdapterPersistence::new(Arc::clone(&document_store)))
    } else {
        Box::new(FileAdapterPersistence::new(config.adapter.storage_path.clone()))
    }));

    let broker = InMemoryBroker::new();

    let query_engine = Arc::new(QueryEngine::new(
        Arc::clone(&document_store),
        Arc::clone(&vector_store),
        Arc::clone(&embedding_client),
        Arc::clone(&adapter_service),
        Arc::clone(&broker),
    ));
    let evaluator = Arc::new(Evaluator::new(Arc::clone(&document_store), Arc::clone(&query_engine)));

    let ingestion_worker = Arc::new(IngestionWorker::new(
        Arc::clone(&document_store),
        Arc::clone(&broker),
        Arc::clone(&embedding_client),
    ));
    tokio::spawn(Arc::clone(&ingestion_worker).run());

    let persist_worker = Arc::new(PersistWorker::new(Arc::clone(&vector_store), Arc::clone(&broker)));
    tokio::spawn(Arc::clone(&persist_worker).run());

    let feedback_worker = Arc::new(FeedbackWorker::new(
        Arc::clone(&document_store),
        Arc::clone(&vector_store),
        Arc::clone(&embedding_client),
        Arc::clone(&adapter_service),
        Arc::clone(&broker),
    ));
    tokio::spawn(Arc::clone(&feedback_worker).run());

    let state = AppState {
        document_store,
        vector_store,
        embedding_client,
        adapter_service,
        query_engine,
        evaluator,
        broker,
        config: Arc::new(config.clone()),
        collection_cache: Arc::new(ShortTtlCache::default()),
        feedback_link_cache: Arc::new(ShortTtlCache::new(Duration::from_secs(24 * 60 * 60))),
    };

    let app = api::routes::create_router(state)
        .layer(CompressionLayer::new())
        .layer(RequestBodyLimitLayer::new(MAX_BODY_BYTES))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http());

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!(%addr, "ragd listening");
    axum::serve(listener, app).await?;

    Ok(())
}
