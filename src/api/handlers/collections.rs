//! Collection handlers (§6: `POST /collection`, `GET /collection/:id`,
//! `GET /collection/:id/resources`, `PUT /collection/:id`).

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use chrono::Utc;

use crate::db::DocumentStoreExt;
use crate::rag::embeddings::{dense_models, reranker_models, sparse_models, ModelDescriptor};
use crate::rag::loader::DocumentLoader;
use crate::types::api::{
    CreateCollectionRequest, ListMetadata, ListResourcesQuery, ListResourcesResponse, UpdateCollectionRequest,
};
use crate::types::{AppError, ChunkingStrategy, Collection, CollectionSettings, Resource, Result};
use crate::AppState;

fn validate_model(name: &str, table: &[ModelDescriptor], kind: &str) -> Result<()> {
    if table.iter().any(|m| m.name == name) {
        Ok(())
    } else {
        Err(AppError::Validation(format!("unsupported {kind} model '{name}'")))
    }
}

async fn validate_settings(settings: &CollectionSettings) -> Result<()> {
    validate_model(&settings.dense_model, &dense_models(), "dense")?;
    if let Some(model) = &settings.sparse_model {
        validate_model(model, &sparse_models(), "sparse")?;
    }
    if let Some(model) = &settings.reranker_model {
        validate_model(model, &reranker_models(), "reranker")?;
    }
    if settings.strategy == ChunkingStrategy::Custom {
        let url = settings
            .chunking_url
            .as_deref()
            .ok_or_else(|| AppError::Validation("strategy=custom requires chunkingUrl".to_string()))?;
        let healthy = DocumentLoader::new().probe(url).await?;
        if !healthy {
            return Err(AppError::Validation(format!(
                "chunkingUrl '{url}' failed its health probe"
            )));
        }
    }
    Ok(())
}

pub async fn create_collection(
    State(state): State<AppState>,
    Json(req): Json<CreateCollectionRequest>,
) -> Result<(StatusCode, Json<Collection>)> {
    let settings = CollectionSettings {
        dense_model: req.settings.dense_model,
        sparse_model: req.settings.sparse_model,
        reranker_model: req.settings.reranker_model,
        chunk_size: req.settings.chunk_size,
        chunk_overlap: req.settings.chunk_overlap,
        strategy: req.settings.strategy,
        chunking_url: req.settings.chunking_url,
        keep_duplicate: req.settings.keep_duplicate,
    };
    validate_settings(&settings).await?;

    let now = Utc::now();
    let collection = Collection {
        id: uuid::Uuid::new_v4().to_string(),
        name: req.name,
        description: req.description,
        metadata: req.metadata,
        settings,
        created_at: now,
        updated_at: now,
    };

    state
        .document_store
        .put_json(&format!("collection:{}", collection.id), &collection)
        .await?;

    tracing::info!(collection_id = %collection.id, "collection created");
    Ok((StatusCode::CREATED, Json(collection)))
}

pub async fn get_collection(State(state): State<AppState>, Path(id): Path<String>) -> Result<Json<Collection>> {
    if let Some(collection) = state.collection_cache.get(&id) {
        return Ok(Json(collection));
    }
    let collection: Collection = state
        .document_store
        .get_json(&format!("collection:{id}"))
        .await?
        .ok_or_else(|| AppError::NotFound(format!("collection {id} not found")))?;
    state.collection_cache.set(id, collection.clone(), None);
    Ok(Json(collection))
}

pub async fn list_resources(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(query): Query<ListResourcesQuery>,
) -> Result<Json<ListResourcesResponse>> {
    let keys = state.document_store.list_prefix("resource:").await?;
    let mut resources = Vec::new();
    for key in keys {
        let Some(mut resource): Option<Resource> = state.document_store.get_json(&key).await? else {
            continue;
        };
        if resource.collection_id != id || resource.is_deleted {
            continue;
        }
        if let Some(owner_id) = &query.owner_id {
            if &resource.owner_id != owner_id {
                continue;
            }
        }
        if !query.content.unwrap_or(false) {
            resource.content = None;
        }
        resources.push(resource);
    }
    resources.sort_by(|a, b| a.created_at.cmp(&b.created_at));
    let total = resources.len();
    Ok(Json(ListResourcesResponse { resources, metadata: ListMetadata { total } }))
}

pub async fn update_collection(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(req): Json<UpdateCollectionRequest>,
) -> Result<Json<Collection>> {
    let mut collection: Collection = state
        .document_store
        .get_json(&format!("collection:{id}"))
        .await?
        .ok_or_else(|| AppError::NotFound(format!("collection {id} not found")))?;

    if let Some(chunk_size) = req.chunk_size {
        collection.settings.chunk_size = chunk_size;
    }
    if let Some(chunk_overlap) = req.chunk_overlap {
        collection.settings.chunk_overlap = chunk_overlap;
    }
    if let Some(strategy) = req.strategy {
        collection.settings.strategy = strategy;
    }
    collection.updated_at = Utc::now();

    state
        .document_store
        .put_json(&format!("collection:{id}"), &collection)
        .await?;
    state.collection_cache.del(&id);

    Ok(Json(collection))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::test_support::test_state;

    fn create_req() -> CreateCollectionRequest {
        CreateCollectionRequest {
            name: "docs".to_string(),
            description: None,
            metadata: Default::default(),
            settings: crate::types::api::CreateCollectionSettings {
                dense_model: "bge-small-en-v1.5".to_string(),
                sparse_model: None,
                reranker_model: None,
                chunk_size: 200,
                chunk_overlap: 20,
                strategy: ChunkingStrategy::Recursive,
                chunking_url: None,
                keep_duplicate: false,
            },
        }
    }

    #[tokio::test]
    async fn create_rejects_unknown_dense_model() {
        let state = test_state("key").await;
        let mut req = create_req();
        req.settings.dense_model = "not-a-real-model".to_string();
        let err = create_collection(State(state), Json(req)).await.unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
    }

    #[tokio::test]
    async fn create_then_get_round_trips() {
        let state = test_state("key").await;
        let (status, Json(created)) = create_collection(State(state.clone()), Json(create_req())).await.unwrap();
        assert_eq!(status, StatusCode::CREATED);

        let Json(fetched) = get_collection(State(state), Path(created.id.clone())).await.unwrap();
        assert_eq!(fetched.id, created.id);
        assert_eq!(fetched.name, "docs");
    }

    #[tokio::test]
    async fn get_missing_collection_is_not_found() {
        let state = test_state("key").await;
        let err = get_collection(State(state), Path("missing".to_string())).await.unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }

    #[tokio::test]
    async fn update_invalidates_cache() {
        let state = test_state("key").await;
        let (_, Json(created)) = create_collection(State(state.clone()), Json(create_req())).await.unwrap();
        let _ = get_collection(State(state.clone()), Path(created.id.clone())).await.unwrap();
        assert!(state.collection_cache.get(&created.id).is_some());

        let update = UpdateCollectionRequest { chunk_size: Some(999), chunk_overlap: None, strategy: None };
        let Json(updated) = update_collection(State(state.clone()), Path(created.id.clone()), Json(update))
            .await
            .unwrap();
        assert_eq!(updated.settings.chunk_size, 999);
        assert!(state.collection_cache.get(&created.id).is_none());
    }
}
