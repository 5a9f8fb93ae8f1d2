//! Route table (§6). Every business route requires the static API-key
//! header via [`super::middleware::require_api_key`]; `/health` and `/` stay
//! outside that layer.

use axum::{
    routing::{get, post},
    Router,
};

use super::handlers::{collections, eval, feedback, resources, search, utility};
use super::middleware::require_api_key;
use crate::AppState;

/// Build the full router, with the API-key layer applied only to business routes.
pub fn create_router(state: AppState) -> Router {
    let business_routes = Router::new()
        .route("/collection", post(collections::create_collection))
        .route(
            "/collection/:id",
            get(collections::get_collection).put(collections::update_collection),
        )
        .route("/collection/:id/resources", get(collections::list_resources))
        .route("/resource", post(resources::create_resource))
        .route(
            "/resource/:id",
            get(resources::get_resource)
                .put(resources::update_resource)
                .delete(resources::delete_resource),
        )
        .route("/resource/:id/chunks", get(resources::list_chunks))
        .route("/search", post(search::search))
        .route("/feedback/vote", post(feedback::vote))
        .route("/feedback/vote/:ref_id/:action", get(feedback::vote_via_link))
        .route("/utility/encoding-models", get(utility::encoding_models))
        .route("/eval/cases", post(eval::create_case))
        .route("/eval/cases/:collection_id/:owner_id", get(eval::list_cases))
        .route("/eval/run/:dataset_id/:owner_id", post(eval::run))
        .route_layer(axum::middleware::from_fn_with_state(state.clone(), require_api_key));

    Router::new()
        .route("/health", get(health))
        .route("/", get(landing))
        .merge(business_routes)
        .with_state(state)
}

async fn health() -> &'static str {
    "OK"
}

async fn landing() -> &'static str {
    "ragd: retrieval-augmented generation backend"
}
