//! Feedback handlers (§6: `POST /feedback/vote`, `GET /feedback/vote/:refId/:action`).

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{Html, IntoResponse, Response};
use axum::Json;

use crate::db::broker::queues;
use crate::types::api::{FeedbackVoteRequest, FeedbackVoteResponse};
use crate::types::events::FeedbackEvent;
use crate::types::{AppError, FeedbackAction, Result};
use crate::AppState;

pub async fn vote(
    State(state): State<AppState>,
    Json(req): Json<FeedbackVoteRequest>,
) -> Result<Json<FeedbackVoteResponse>> {
    if req.query.trim().is_empty() || req.chunk_id.trim().is_empty() {
        return Err(AppError::Validation("query and chunkId are required".to_string()));
    }

    let event = FeedbackEvent {
        query: req.query,
        chunk_id: req.chunk_id,
        resource_id: req.resource_id,
        action: req.action,
        collection_id: req.collection_id,
        owner_id: req.owner_id,
    };
    state.broker.publish(queues::SEARCH_FEEDBACK, &event).await?;

    Ok(Json(FeedbackVoteResponse { success: true, message: "vote recorded".to_string() }))
}

pub async fn vote_via_link(
    State(state): State<AppState>,
    Path((reference_id, action)): Path<(String, String)>,
) -> Result<Response> {
    let link = state
        .feedback_link_cache
        .get(&reference_id)
        .ok_or_else(|| AppError::NotFound(format!("feedback link {reference_id} expired or not found")))?;

    let action = match action.as_str() {
        "upvote" => FeedbackAction::Upvote,
        "downvote" => FeedbackAction::Downvote,
        other => return Err(AppError::Validation(format!("unknown feedback action '{other}'"))),
    };

    let event = FeedbackEvent {
        query: link.query,
        chunk_id: link.chunk_id,
        resource_id: link.resource_id,
        action,
        collection_id: link.collection_id,
        owner_id: link.owner_id,
    };
    state.broker.publish(queues::SEARCH_FEEDBACK, &event).await?;

    let body = format!(
        "<html><body><p>Thanks, your {} was recorded.</p></body></html>",
        if matches!(action, FeedbackAction::Upvote) { "upvote" } else { "downvote" }
    );
    Ok((StatusCode::OK, Html(body)).into_response())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::test_support::test_state;

    #[tokio::test]
    async fn vote_rejects_empty_query() {
        let state = test_state("key").await;
        let req = FeedbackVoteRequest {
            collection_id: "c1".to_string(),
            query: String::new(),
            chunk_id: "chunk-1".to_string(),
            resource_id: "r1".to_string(),
            action: FeedbackAction::Upvote,
            owner_id: crate::types::default_owner(),
        };
        let err = vote(State(state), Json(req)).await.unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
    }

    #[tokio::test]
    async fn vote_publishes_to_the_feedback_queue() {
        let state = test_state("key").await;
        let mut rx = state.broker.subscribe(queues::SEARCH_FEEDBACK);
        let req = FeedbackVoteRequest {
            collection_id: "c1".to_string(),
            query: "hello".to_string(),
            chunk_id: "chunk-1".to_string(),
            resource_id: "r1".to_string(),
            action: FeedbackAction::Upvote,
            owner_id: crate::types::default_owner(),
        };
        let Json(resp) = vote(State(state), Json(req)).await.unwrap();
        assert!(resp.success);
        let delivery = rx.recv().await.unwrap();
        let event: FeedbackEvent = serde_json::from_slice(&delivery.payload).unwrap();
        assert_eq!(event.chunk_id, "chunk-1");
    }

    #[tokio::test]
    async fn link_vote_is_not_found_when_expired() {
        let state = test_state("key").await;
        let err = vote_via_link(State(state), Path(("missing".to_string(), "upvote".to_string())))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }

    #[tokio::test]
    async fn link_vote_succeeds_for_a_minted_reference() {
        let state = test_state("key").await;
        state.feedback_link_cache.set(
            "ref-1".to_string(),
            crate::FeedbackLink {
                query: "hello".to_string(),
                collection_id: "c1".to_string(),
                chunk_id: "chunk-1".to_string(),
                resource_id: "r1".to_string(),
                owner_id: crate::types::default_owner(),
            },
            None,
        );
        let resp = vote_via_link(State(state), Path(("ref-1".to_string(), "upvote".to_string())))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
    }
}
