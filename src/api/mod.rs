//! HTTP API handlers and routes.
//!
//! This module provides the REST API layer for ragd, built on the Axum web framework.
//!
//! # Module Structure
//!
//! - [`api::handlers`](crate::api::handlers) - Request handlers for each endpoint
//! - [`api::routes`](crate::api::routes) - Route definitions and router configuration
//! - [`api::middleware`](crate::api::middleware) - API-key authentication
//!
//! # API Endpoints
//!
//! ## Collections
//! - `POST /collection` - Create a collection
//! - `GET /collection/:id` - Fetch a collection
//! - `GET /collection/:id/resources` - List a collection's resources
//! - `PUT /collection/:id` - Update a collection's chunking settings
//!
//! ## Resources
//! - `POST /resource` - Register a resource and queue it for ingestion
//! - `GET /resource/:id` - Fetch a resource
//! - `GET /resource/:id/chunks` - List a resource's chunks
//! - `PUT /resource/:id` - Update a resource and re-queue ingestion
//! - `DELETE /resource/:id` - Queue a resource for deletion
//!
//! ## Search and feedback
//! - `POST /search` - Hybrid retrieval + rerank + feedback-fused query
//! - `POST /feedback/vote` - Record an upvote/downvote
//! - `GET /feedback/vote/:refId/:action` - Vote via a review-link reference id
//!
//! ## Utility and evaluation
//! - `GET /utility/encoding-models` - List supported embedding/reranker models
//! - `POST /eval/cases` - Register an evaluation test case
//! - `GET /eval/cases/:collectionId/:ownerId` - List a collection's test cases
//! - `POST /eval/run/:datasetId/:ownerId` - Run the evaluator and persist a report
//!
//! # Authentication
//!
//! Every route above requires a static API key in the `x-api-key` header,
//! checked by [`middleware::require_api_key`]. `/health` and `/` are exempt.

/// Request and response handlers for all API endpoints.
pub mod handlers;
/// API-key authentication middleware.
pub mod middleware;
/// Router configuration and route definitions.
pub mod routes;
