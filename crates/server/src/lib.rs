pub mod api;
pub mod config;
pub mod cors;
pub mod db;
pub mod engine;
pub mod error;
pub mod store;
pub mod validation;

use std::time::Instant;

use axum::{
    body::Body,
    extract::DefaultBodyLimit,
    http::{Request, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::get,
    Router,
};
use tracing::{error, info};

use crate::{
    error::{
        attach_request_id_header, request_id_from_headers_or_generate, with_request_id_scope,
        ApiError, ErrorCode,
    },
    store::DocumentStore,
    validation::MAX_REST_BODY_BYTES,
};

/// The full HTTP application: health check, document API, CORS and the
/// request context middleware.
pub fn build_app(store: DocumentStore, cors_origins: Option<&str>) -> Router {
    apply_middleware(
        Router::new().route("/healthz", get(healthz)).merge(api::build_router(store)),
    )
    .layer(cors::cors_layer(cors_origins))
}

fn apply_middleware(router: Router) -> Router {
    router
        .layer(DefaultBodyLimit::max(MAX_REST_BODY_BYTES))
        .layer(middleware::from_fn(request_context_middleware))
        .layer(middleware::from_fn(panic_handler))
}

async fn healthz() -> (StatusCode, &'static str) {
    (StatusCode::OK, "ok")
}

async fn panic_handler(request: Request<Body>, next: Next) -> Response {
    match tokio::spawn(async move { next.run(request).await }).await {
        Ok(response) => response,
        Err(join_error) => {
            error!(?join_error, "request handling panicked");
            ApiError::from_code(ErrorCode::InternalError).into_response()
        }
    }
}

async fn request_context_middleware(request: Request<Body>, next: Next) -> Response {
    let request_id = request_id_from_headers_or_generate(request.headers());
    let method = request.method().clone();
    let path = request.uri().path().to_owned();
    let started_at = Instant::now();

    let mut response = with_request_id_scope(request_id.clone(), next.run(request)).await;
    attach_request_id_header(&mut response, &request_id);

    info!(
        request_id = %request_id,
        method = %method,
        path = %path,
        status = response.status().as_u16(),
        latency_ms = started_at.elapsed().as_millis() as u64,
        "request completed"
    );

    response
}
