//! Black-box HTTP tests over the full router: auth gate, collection/resource
//! CRUD, and the ingest -> search round trip (§8 S1).

use std::sync::Arc;
use std::time::Duration;

use axum_test::TestServer;
use rag_core::db::{AresVectorStore, InMemoryBroker, InMemoryDocumentStore, VectorStore};
use rag_core::rag::adapter::{AdapterService, FileAdapterPersistence};
use rag_core::rag::cache::ShortTtlCache;
use rag_core::rag::embeddings::EmbeddingClient;
use rag_core::rag::evaluator::Evaluator;
use rag_core::rag::search::QueryEngine;
use rag_core::utils::config::{Config, EmbeddingConfig};
use rag_core::{api, AppState};
use serde_json::json;

const API_KEY: &str = "test-api-key";

async fn test_state_with_embedding(embedding_base_url: &str) -> AppState {
    let document_store = Arc::new(InMemoryDocumentStore::new());
    let vector_store = Arc::new(AresVectorStore::in_memory().await.unwrap());
    let embedding_client = Arc::new(EmbeddingClient::new(&EmbeddingConfig {
        base_url: embedding_base_url.to_string(),
        api_key: None,
        request_timeout_secs: 5,
    }));
    let tempdir = std::env::temp_dir().join(format!("ragd-api-test-{}", uuid::Uuid::new_v4()));
    let adapter_service = Arc::new(AdapterService::new(Box::new(FileAdapterPersistence::new(tempdir))));
    let broker = InMemoryBroker::new();

    let mut config = Config::default();
    config.auth.api_key = API_KEY.to_string();

    let query_engine = Arc::new(QueryEngine::new(
        document_store.clone() as Arc<dyn rag_core::db::DocumentStore>,
        vector_store.clone() as Arc<dyn rag_core::db::VectorStore>,
        embedding_client.clone(),
        adapter_service.clone(),
        broker.clone(),
    ));
    let evaluator = Arc::new(Evaluator::new(
        document_store.clone() as Arc<dyn rag_core::db::DocumentStore>,
        query_engine.clone(),
    ));

    AppState {
        document_store,
        vector_store,
        embedding_client,
        adapter_service,
        query_engine,
        evaluator,
        broker,
        config: Arc::new(config),
        collection_cache: Arc::new(ShortTtlCache::default()),
        feedback_link_cache: Arc::new(ShortTtlCache::new(Duration::from_secs(24 * 60 * 60))),
    }
}

async fn test_server(embedding_base_url: &str) -> TestServer {
    let state = test_state_with_embedding(embedding_base_url).await;
    let app = api::routes::create_router(state);
    TestServer::new(app).expect("failed to build test server")
}

#[tokio::test]
async fn health_and_landing_need_no_api_key() {
    let server = test_server("http://localhost:0").await;

    server.get("/health").await.assert_text("OK");
    server.get("/").await.assert_status_ok();
}

#[tokio::test]
async fn business_routes_reject_missing_or_wrong_api_key() {
    let server = test_server("http://localhost:0").await;

    server.get("/collection/missing").await.assert_status_unauthorized();
    server
        .get("/collection/missing")
        .add_header("x-api-key", "wrong-key")
        .await
        .assert_status_unauthorized();
}

#[tokio::test]
async fn create_collection_then_fetch_it() {
    let server = test_server("http://localhost:0").await;

    let create_resp = server
        .post("/collection")
        .add_header("x-api-key", API_KEY)
        .json(&json!({
            "name": "docs",
            "settings": {
                "dense_model": "bge-small-en-v1.5",
                "chunk_size": 200,
                "chunk_overlap": 20,
                "strategy": "recursive",
                "keep_duplicate": false
            }
        }))
        .await;
    create_resp.assert_status(axum::http::StatusCode::CREATED);
    let created: serde_json::Value = create_resp.json();
    let id = created["id"].as_str().unwrap().to_string();

    let get_resp = server.get(&format!("/collection/{id}")).add_header("x-api-key", API_KEY).await;
    get_resp.assert_status_ok();
    let fetched: serde_json::Value = get_resp.json();
    assert_eq!(fetched["name"], "docs");
}

#[tokio::test]
async fn create_collection_rejects_unknown_dense_model() {
    let server = test_server("http://localhost:0").await;

    let resp = server
        .post("/collection")
        .add_header("x-api-key", API_KEY)
        .json(&json!({
            "name": "docs",
            "settings": {
                "dense_model": "not-a-real-model",
                "chunk_size": 200,
                "chunk_overlap": 20,
                "strategy": "recursive",
                "keep_duplicate": false
            }
        }))
        .await;
    resp.assert_status_bad_request();
}

#[tokio::test]
async fn search_rejects_missing_query() {
    let server = test_server("http://localhost:0").await;

    let resp = server
        .post("/search")
        .add_header("x-api-key", API_KEY)
        .json(&json!({"query": "", "collection_id": "c1"}))
        .await;
    resp.assert_status_bad_request();
}

#[tokio::test]
async fn ingest_then_query_returns_the_matching_chunk() {
    let mock_server = wiremock::MockServer::start().await;
    wiremock::Mock::given(wiremock::matchers::path("/embed"))
        .respond_with(wiremock::ResponseTemplate::new(200).set_body_json(json!({
            "embeddings": [vec![1.0f32, 0.0, 0.0]]
        })))
        .mount(&mock_server)
        .await;

    let state = test_state_with_embedding(&mock_server.uri()).await;

    let create_collection_resp = axum_test::TestServer::new(api::routes::create_router(state.clone()))
        .unwrap()
        .post("/collection")
        .add_header("x-api-key", API_KEY)
        .json(&json!({
            "name": "docs",
            "settings": {
                "dense_model": "bge-small-en-v1.5",
                "chunk_size": 200,
                "chunk_overlap": 20,
                "strategy": "recursive",
                "keep_duplicate": false
            }
        }))
        .await;
    let collection: serde_json::Value = create_collection_resp.json();
    let collection_id = collection["id"].as_str().unwrap().to_string();

    let point = rag_core::db::vector_store::StoredPoint {
        id: "chunk-cats".to_string(),
        resource_id: "r1".to_string(),
        collection_id: collection_id.clone(),
        owner_id: rag_core::types::default_owner(),
        content: "Cats purr.".to_string(),
        metadata: Default::default(),
        dense: Some(vec![1.0, 0.0, 0.0]),
        sparse: None,
        rerank: None,
    };
    state.vector_store.upsert(&collection_id, point).await.unwrap();

    let server = TestServer::new(api::routes::create_router(state)).unwrap();
    let search_resp = server
        .post("/search")
        .add_header("x-api-key", API_KEY)
        .json(&json!({"query": "feline sound", "collection_id": collection_id, "use_feedback": false, "analytics": false}))
        .await;
    search_resp.assert_status_ok();
    let body: serde_json::Value = search_resp.json();
    assert_eq!(body["result"][0]["payload"]["content"], "Cats purr.");
}
