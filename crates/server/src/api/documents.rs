// Document endpoints.
//
// Routes (`{kind}` accepts singular or plural forms):
//   POST   /v1/{kind}            create
//   GET    /v1/{kind}/{doc_id}   reload one active document
//   PUT    /v1/{kind}/{doc_id}   save a full snapshot
//   DELETE /v1/{kind}/{doc_id}   soft delete, `?hard=true` removes it

use axum::{
    extract::{rejection::QueryRejection, Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use docket_common::snapshot::DocumentSnapshot;
use docket_common::types::{Document, DocumentKind};
use serde::{Deserialize, Serialize};
use serde_json::json;
use uuid::Uuid;

use crate::{
    engine::error::DocumentError,
    error::{ApiError, ErrorCode},
    store::DocumentStore,
    validation::ValidatedJson,
};

// ── Request / Response types ───────────────────────────────────────

#[derive(Debug, Default, Deserialize)]
pub struct DeleteDocumentQuery {
    pub hard: Option<bool>,
}

#[derive(Serialize)]
struct DocumentEnvelope {
    document: Document,
}

#[derive(Clone)]
struct DocApiState {
    store: DocumentStore,
}

// ── Error mapping ──────────────────────────────────────────────────

impl IntoResponse for DocumentError {
    fn into_response(self) -> Response {
        match self {
            Self::Validation(failure) => {
                let details = json!({ "fields": failure.fields, "rules": failure.rules });
                ApiError::new(ErrorCode::ValidationFailed, format!("validation failed: {failure}"))
                    .with_details(details)
                    .into_response()
            }
            Self::Reconciliation(error) => {
                ApiError::new(ErrorCode::ReconciliationFailed, error.to_string())
                    .with_details(json!({ "collection": error.collection() }))
                    .into_response()
            }
            Self::OptimisticLock { stored, client_known } => ApiError::new(
                ErrorCode::OptimisticLock,
                "document was modified since it was loaded; reload it or overwrite",
            )
            .with_details(json!({ "modifiedAt": stored, "clientModifiedAt": client_known }))
            .into_response(),
            Self::NotFound => {
                ApiError::new(ErrorCode::NotFound, "document not found").into_response()
            }
            Self::SequenceUnavailable(error) => {
                tracing::error!(error = ?error, "document number sequence unavailable");
                ApiError::from_code(ErrorCode::SequenceUnavailable).into_response()
            }
            Self::Storage(error) => {
                tracing::error!(error = ?error, "document api internal error");
                ApiError::from_code(ErrorCode::InternalError).into_response()
            }
        }
    }
}

// ── Router ─────────────────────────────────────────────────────────

pub fn router(store: DocumentStore) -> Router {
    let state = DocApiState { store };

    Router::new()
        .route("/v1/{kind}", post(create_document))
        .route(
            "/v1/{kind}/{doc_id}",
            get(get_document).put(update_document).delete(delete_document),
        )
        .with_state(state)
}

fn parse_kind(raw: &str) -> Result<DocumentKind, DocumentError> {
    raw.parse().map_err(|_| DocumentError::NotFound)
}

/// An id that is not a UUID cannot name a stored document.
fn parse_target(kind: &str, doc_id: &str) -> Result<(DocumentKind, Uuid), DocumentError> {
    let kind = parse_kind(kind)?;
    let id = Uuid::parse_str(doc_id).map_err(|_| DocumentError::NotFound)?;
    Ok((kind, id))
}

// ── Handlers ───────────────────────────────────────────────────────

async fn create_document(
    State(state): State<DocApiState>,
    Path(kind): Path<String>,
    ValidatedJson(snapshot): ValidatedJson<DocumentSnapshot>,
) -> Result<(StatusCode, Json<DocumentEnvelope>), DocumentError> {
    let kind = parse_kind(&kind)?;
    let document = state.store.create(kind, snapshot).await?;
    Ok((StatusCode::CREATED, Json(DocumentEnvelope { document })))
}

async fn get_document(
    State(state): State<DocApiState>,
    Path((kind, doc_id)): Path<(String, String)>,
) -> Result<Json<DocumentEnvelope>, DocumentError> {
    let (kind, id) = parse_target(&kind, &doc_id)?;
    let document = state.store.get(kind, id).await?;
    Ok(Json(DocumentEnvelope { document }))
}

async fn update_document(
    State(state): State<DocApiState>,
    Path((kind, doc_id)): Path<(String, String)>,
    ValidatedJson(snapshot): ValidatedJson<DocumentSnapshot>,
) -> Result<Json<DocumentEnvelope>, DocumentError> {
    let (kind, id) = parse_target(&kind, &doc_id)?;
    let document = state.store.update(kind, id, snapshot).await?;
    Ok(Json(DocumentEnvelope { document }))
}

async fn delete_document(
    State(state): State<DocApiState>,
    Path((kind, doc_id)): Path<(String, String)>,
    query: Result<Query<DeleteDocumentQuery>, QueryRejection>,
) -> Result<StatusCode, Response> {
    let Query(query) = query.map_err(|rejection| {
        ApiError::new(ErrorCode::ValidationFailed, rejection.body_text()).into_response()
    })?;
    let (kind, id) = parse_target(&kind, &doc_id).map_err(IntoResponse::into_response)?;
    state
        .store
        .delete(kind, id, query.hard.unwrap_or(false))
        .await
        .map_err(IntoResponse::into_response)?;
    Ok(StatusCode::NO_CONTENT)
}
