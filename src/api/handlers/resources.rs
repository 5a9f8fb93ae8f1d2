//! Resource handlers (§6: `POST /resource`, `GET /resource/:id`,
//! `GET /resource/:id/chunks`, `PUT /resource/:id`, `DELETE /resource/:id`).

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use chrono::Utc;

use crate::db::broker::queues;
use crate::db::DocumentStoreExt;
use crate::types::api::{CreateResourceRequest, ListChunksResponse, UpdateResourceRequest};
use crate::types::events::{IngestEvent, IngestEventData, IngestEventKind};
use crate::types::{AppError, Chunk, Resource, ResourceStatus, Result};
use crate::AppState;

fn resource_key(id: &str) -> String {
    format!("resource:{id}")
}

async fn load_resource(state: &AppState, id: &str) -> Result<Resource> {
    state
        .document_store
        .get_json(&resource_key(id))
        .await?
        .filter(|r: &Resource| !r.is_deleted)
        .ok_or_else(|| AppError::NotFound(format!("resource {id} not found")))
}

async fn queue_ingest(state: &AppState, resource: &Resource, event: IngestEventKind, url: Option<String>) {
    let ingest_event = IngestEvent {
        version: 1,
        event,
        data: IngestEventData {
            resource_id: resource.id.clone(),
            collection_id: resource.collection_id.clone(),
            owner_id: Some(resource.owner_id.clone()),
            url,
        },
    };
    if let Err(e) = state.broker.publish(queues::RAG, &ingest_event).await {
        tracing::warn!(error = %e, resource_id = %resource.id, "failed to queue ingestion event");
    }
}

pub async fn create_resource(
    State(state): State<AppState>,
    Json(req): Json<CreateResourceRequest>,
) -> Result<(StatusCode, Json<Resource>)> {
    let _: crate::types::Collection = state
        .document_store
        .get_json(&format!("collection:{}", req.collection_id))
        .await?
        .ok_or_else(|| AppError::NotFound(format!("collection {} not found", req.collection_id)))?;

    let now = Utc::now();
    let resource = Resource {
        id: uuid::Uuid::new_v4().to_string(),
        collection_id: req.collection_id,
        owner_id: req.owner_id,
        title: req.title,
        url: req.url.clone(),
        content: req.content,
        content_hash: None,
        description: req.description,
        metadata: req.metadata,
        chunking_overrides: req.chunking_overrides,
        status: ResourceStatus::Created,
        status_message: None,
        is_deleted: false,
        refreshed_at: now,
        created_at: now,
    };

    state.document_store.put_json(&resource_key(&resource.id), &resource).await?;

    let event = if let Some(url) = &req.url {
        queue_ingest(&state, &resource, IngestEventKind::Load, Some(url.clone())).await;
        "load"
    } else {
        queue_ingest(&state, &resource, IngestEventKind::Chunk, None).await;
        "chunk"
    };

    tracing::info!(resource_id = %resource.id, collection_id = %resource.collection_id, event, "resource created and queued");
    Ok((StatusCode::CREATED, Json(resource)))
}

pub async fn get_resource(State(state): State<AppState>, Path(id): Path<String>) -> Result<Json<Resource>> {
    Ok(Json(load_resource(&state, &id).await?))
}

fn chunk_from_point(point: crate::db::vector_store::StoredPoint) -> Chunk {
    Chunk {
        id: point.id,
        collection_id: point.collection_id,
        owner_id: point.owner_id,
        resource_id: point.resource_id,
        data: point.content,
        vector_source: None,
        vector: point.dense,
        sparse_vector: point.sparse,
        rerank_vector: point.rerank,
        metadata: point.metadata,
    }
}

pub async fn list_chunks(State(state): State<AppState>, Path(id): Path<String>) -> Result<Json<ListChunksResponse>> {
    let resource = load_resource(&state, &id).await?;
    let points = state
        .vector_store
        .list_by_resource(&resource.collection_id, &resource.id)
        .await?;
    let mut chunks: Vec<Chunk> = points.into_iter().map(chunk_from_point).collect();
    chunks.sort_by(|a, b| a.id.cmp(&b.id));
    Ok(Json(ListChunksResponse { chunks }))
}

pub async fn update_resource(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(req): Json<UpdateResourceRequest>,
) -> Result<Json<Resource>> {
    let mut resource = load_resource(&state, &id).await?;

    let mut content_changed = false;
    if let Some(title) = req.title {
        resource.title = Some(title);
    }
    if let Some(url) = req.url {
        content_changed = content_changed || resource.url.as_deref() != Some(url.as_str());
        resource.url = Some(url);
    }
    if let Some(content) = req.content {
        content_changed = content_changed || resource.content.as_deref() != Some(content.as_str());
        resource.content = Some(content);
    }
    if let Some(description) = req.description {
        resource.description = Some(description);
    }
    if let Some(metadata) = req.metadata {
        resource.metadata = metadata;
    }
    resource.refreshed_at = Utc::now();

    state.document_store.put_json(&resource_key(&resource.id), &resource).await?;

    if content_changed {
        if let Some(url) = resource.url.clone() {
            queue_ingest(&state, &resource, IngestEventKind::Load, Some(url)).await;
        } else {
            queue_ingest(&state, &resource, IngestEventKind::Chunk, None).await;
        }
    }

    Ok(Json(resource))
}

pub async fn delete_resource(State(state): State<AppState>, Path(id): Path<String>) -> Result<Json<Resource>> {
    let mut resource = load_resource(&state, &id).await?;
    queue_ingest(&state, &resource, IngestEventKind::Delete, None).await;

    resource.is_deleted = true;
    resource.status = ResourceStatus::Deleted;
    state.document_store.put_json(&resource_key(&resource.id), &resource).await?;

    tracing::info!(resource_id = %resource.id, "resource queued for deletion");
    Ok(Json(resource))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::test_support::test_state;
    use crate::types::{ChunkingStrategy, Collection, CollectionSettings};

    async fn seed_collection(state: &AppState) -> Collection {
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
        collection
    }

    fn create_req(collection_id: &str) -> CreateResourceRequest {
        CreateResourceRequest {
            collection_id: collection_id.to_string(),
            owner_id: "alice".to_string(),
            title: Some("doc".to_string()),
            url: None,
            content: Some("hello world".to_string()),
            description: None,
            metadata: Default::default(),
            chunking_overrides: None,
        }
    }

    #[tokio::test]
    async fn create_rejects_unknown_collection() {
        let state = test_state("key").await;
        let err = create_resource(State(state), Json(create_req("missing"))).await.unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }

    #[tokio::test]
    async fn create_then_get_round_trips() {
        let state = test_state("key").await;
        seed_collection(&state).await;
        let (status, Json(created)) =
            create_resource(State(state.clone()), Json(create_req("c1"))).await.unwrap();
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(created.status, ResourceStatus::Created);

        let Json(fetched) = get_resource(State(state), Path(created.id.clone())).await.unwrap();
        assert_eq!(fetched.id, created.id);
    }

    #[tokio::test]
    async fn delete_then_get_is_not_found() {
        let state = test_state("key").await;
        seed_collection(&state).await;
        let (_, Json(created)) = create_resource(State(state.clone()), Json(create_req("c1"))).await.unwrap();

        let Json(deleted) = delete_resource(State(state.clone()), Path(created.id.clone())).await.unwrap();
        assert!(deleted.is_deleted);

        let err = get_resource(State(state), Path(created.id)).await.unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }

    #[tokio::test]
    async fn list_chunks_on_resource_with_no_points_is_empty() {
        let state = test_state("key").await;
        seed_collection(&state).await;
        let (_, Json(created)) = create_resource(State(state.clone()), Json(create_req("c1"))).await.unwrap();

        let Json(resp) = list_chunks(State(state), Path(created.id)).await.unwrap();
        assert!(resp.chunks.is_empty());
    }
}
