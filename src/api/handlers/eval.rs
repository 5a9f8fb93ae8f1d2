//! Evaluation handlers (§6: `POST /eval/cases`, `GET /eval/cases/:collectionId/:ownerId`,
//! `POST /eval/run/:datasetId/:ownerId`).

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;

use crate::types::api::{CreateEvalTestCaseRequest, ListMetadata, ListTestCasesResponse};
use crate::types::{EvalRun, EvalTestCase, Result};
use crate::AppState;

pub async fn create_case(
    State(state): State<AppState>,
    Json(req): Json<CreateEvalTestCaseRequest>,
) -> Result<(StatusCode, Json<EvalTestCase>)> {
    let case = state
        .evaluator
        .create_test_case(&req.collection_id, &req.owner_id, &req.query, req.expected_chunk_ids)
        .await?;
    Ok((StatusCode::CREATED, Json(case)))
}

pub async fn list_cases(
    State(state): State<AppState>,
    Path((collection_id, owner_id)): Path<(String, String)>,
) -> Result<Json<ListTestCasesResponse>> {
    let test_cases = state.evaluator.list_test_cases(&collection_id, &owner_id).await?;
    let total = test_cases.len();
    Ok(Json(ListTestCasesResponse { test_cases, metadata: ListMetadata { total } }))
}

pub async fn run(
    State(state): State<AppState>,
    Path((dataset_id, owner_id)): Path<(String, String)>,
) -> Result<Json<EvalRun>> {
    let report = state.evaluator.run(&dataset_id, &owner_id).await?;
    Ok(Json(report))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::test_support::test_state;
    use crate::types::AppError;

    #[tokio::test]
    async fn create_then_list_round_trips() {
        let state = test_state("key").await;
        let req = CreateEvalTestCaseRequest {
            collection_id: "c1".to_string(),
            owner_id: "alice".to_string(),
            query: "what is rust".to_string(),
            expected_chunk_ids: vec!["chunk-1".to_string()],
        };
        let (status, Json(case)) = create_case(State(state.clone()), Json(req)).await.unwrap();
        assert_eq!(status, StatusCode::CREATED);

        let Json(resp) = list_cases(State(state), Path(("c1".to_string(), "alice".to_string()))).await.unwrap();
        assert_eq!(resp.metadata.total, 1);
        assert_eq!(resp.test_cases[0].id, case.id);
    }

    #[tokio::test]
    async fn run_with_no_cases_is_validation_error() {
        let state = test_state("key").await;
        let err = run(State(state), Path(("c1".to_string(), "alice".to_string()))).await.unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
    }
}
