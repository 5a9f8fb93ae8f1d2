//! API-key authentication, generalized from the teacher's JWT-claims
//! `auth::middleware` to the static header check §6 specifies ("all business
//! endpoints require a static API key header validated by the edge").

use axum::{
    extract::{Request, State},
    http::{header::HeaderName, StatusCode},
    middleware::Next,
    response::Response,
};

use crate::AppState;

static API_KEY_HEADER: HeaderName = HeaderName::from_static("x-api-key");

pub async fn require_api_key(
    State(state): State<AppState>,
    req: Request,
    next: Next,
) -> Result<Response, StatusCode> {
    let provided = req
        .headers()
        .get(&API_KEY_HEADER)
        .and_then(|h| h.to_str().ok())
        .ok_or(StatusCode::UNAUTHORIZED)?;

    if provided != state.config.auth.api_key {
        return Err(StatusCode::UNAUTHORIZED);
    }

    Ok(next.run(req).await)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{routing::get, Router};
    use axum_test::TestServer;

    async fn ok_handler() -> &'static str {
        "ok"
    }

    #[tokio::test]
    async fn rejects_missing_header() {
        let state = crate::api::test_support::test_state("secret").await;
        let app = Router::new()
            .route("/protected", get(ok_handler))
            .layer(axum::middleware::from_fn_with_state(state.clone(), require_api_key))
            .with_state(state);
        let server = TestServer::new(app).unwrap();
        let resp = server.get("/protected").await;
        resp.assert_status_unauthorized();
    }

    #[tokio::test]
    async fn accepts_matching_key() {
        let state = crate::api::test_support::test_state("secret").await;
        let app = Router::new()
            .route("/protected", get(ok_handler))
            .layer(axum::middleware::from_fn_with_state(state.clone(), require_api_key))
            .with_state(state);
        let server = TestServer::new(app).unwrap();
        let resp = server.get("/protected").add_header("x-api-key", "secret").await;
        resp.assert_status_ok();
    }
}
