// HTTP client for the document API.

use std::time::Duration;

use chrono::{DateTime, Utc};
use docket_common::snapshot::DocumentSnapshot;
use docket_common::types::{Document, DocumentKind};
use reqwest::{Method, StatusCode};
use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;
use url::Url;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum ClientError {
    /// The server rejected a stale `modifiedAt`. Nothing was written.
    #[error("document was modified by someone else: {message}")]
    Conflict { stored: Option<DateTime<Utc>>, message: String },
    #[error("{code}: {message}")]
    Api { status: u16, code: String, message: String, retryable: bool, details: Value },
    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("invalid server url: {0}")]
    InvalidUrl(#[from] url::ParseError),
    #[error("save cancelled before it was sent")]
    Cancelled,
}

impl ClientError {
    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::Conflict { .. })
    }

    /// Server error code, when the server answered with an error envelope.
    pub fn code(&self) -> Option<&str> {
        match self {
            Self::Conflict { .. } => Some("OPTIMISTIC_LOCK_ERROR"),
            Self::Api { code, .. } => Some(code),
            _ => None,
        }
    }
}

#[derive(Deserialize)]
struct DocumentEnvelope {
    document: Document,
}

#[derive(Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Deserialize)]
struct ErrorBody {
    code: String,
    message: String,
    #[serde(default)]
    retryable: bool,
    #[serde(default)]
    details: Value,
}

#[derive(Debug, Clone)]
pub struct DocumentClient {
    base_url: Url,
    http: reqwest::Client,
}

impl DocumentClient {
    pub fn new(server_url: &str, timeout: Duration) -> Result<Self, ClientError> {
        let mut base_url = Url::parse(server_url)?;
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }
        let http = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self { base_url, http })
    }

    pub fn collection_url(&self, kind: DocumentKind) -> Result<Url, ClientError> {
        Ok(self.base_url.join(&format!("v1/{}", kind.path_segment()))?)
    }

    pub fn document_url(&self, kind: DocumentKind, id: Uuid) -> Result<Url, ClientError> {
        Ok(self.base_url.join(&format!("v1/{}/{id}", kind.path_segment()))?)
    }

    pub async fn get(&self, kind: DocumentKind, id: Uuid) -> Result<Document, ClientError> {
        self.send(Method::GET, self.document_url(kind, id)?, None).await
    }

    pub async fn create(
        &self,
        kind: DocumentKind,
        snapshot: &DocumentSnapshot,
    ) -> Result<Document, ClientError> {
        self.send(Method::POST, self.collection_url(kind)?, Some(snapshot)).await
    }

    pub async fn update(
        &self,
        kind: DocumentKind,
        id: Uuid,
        snapshot: &DocumentSnapshot,
    ) -> Result<Document, ClientError> {
        self.send(Method::PUT, self.document_url(kind, id)?, Some(snapshot)).await
    }

    pub async fn delete(&self, kind: DocumentKind, id: Uuid, hard: bool) -> Result<(), ClientError> {
        let mut url = self.document_url(kind, id)?;
        if hard {
            url.set_query(Some("hard=true"));
        }
        let response = self.http.delete(url).send().await?;
        if response.status().is_success() {
            return Ok(());
        }
        let status = response.status();
        let body = response.bytes().await?;
        Err(decode_error(status, &body))
    }

    async fn send(
        &self,
        method: Method,
        url: Url,
        body: Option<&DocumentSnapshot>,
    ) -> Result<Document, ClientError> {
        tracing::debug!(method = %method, url = %url, "document request");
        let mut request = self.http.request(method, url);
        if let Some(body) = body {
            request = request.json(body);
        }
        let response = request.send().await?;
        let status = response.status();
        if status.is_success() {
            let envelope: DocumentEnvelope = response.json().await?;
            return Ok(envelope.document);
        }
        let body = response.bytes().await?;
        Err(decode_error(status, &body))
    }
}

/// Turn a non-success response into a [`ClientError`].
pub fn decode_error(status: StatusCode, body: &[u8]) -> ClientError {
    let Ok(ErrorEnvelope { error }) = serde_json::from_slice::<ErrorEnvelope>(body) else {
        return ClientError::Api {
            status: status.as_u16(),
            code: "UNEXPECTED_RESPONSE".to_string(),
            message: String::from_utf8_lossy(body).trim().to_string(),
            retryable: status.is_server_error(),
            details: Value::Null,
        };
    };

    if status == StatusCode::CONFLICT || error.code == "OPTIMISTIC_LOCK_ERROR" {
        let stored = error
            .details
            .get("modifiedAt")
            .and_then(Value::as_str)
            .and_then(|raw| DateTime::parse_from_rfc3339(raw).ok())
            .map(|stamp| stamp.with_timezone(&Utc));
        return ClientError::Conflict { stored, message: error.message };
    }

    ClientError::Api {
        status: status.as_u16(),
        code: error.code,
        message: error.message,
        retryable: error.retryable,
        details: error.details,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn client(url: &str) -> DocumentClient {
        DocumentClient::new(url, Duration::from_secs(1)).unwrap()
    }

    #[test]
    fn urls_use_plural_segments_and_keep_base_path() {
        let id = Uuid::nil();
        let plain = client("http://localhost:8080");
        assert_eq!(
            plain.document_url(DocumentKind::ProductionTicket, id).unwrap().as_str(),
            format!("http://localhost:8080/v1/production-tickets/{id}")
        );

        let prefixed = client("https://example.com/api");
        assert_eq!(
            prefixed.collection_url(DocumentKind::Invoice).unwrap().as_str(),
            "https://example.com/api/v1/invoices"
        );
    }

    #[test]
    fn invalid_server_url_is_rejected() {
        assert!(matches!(
            DocumentClient::new("not a url", Duration::from_secs(1)),
            Err(ClientError::InvalidUrl(_))
        ));
    }

    #[test]
    fn conflict_carries_stored_timestamp() {
        let body = json!({
            "error": {
                "code": "OPTIMISTIC_LOCK_ERROR",
                "message": "document was modified",
                "retryable": false,
                "request_id": "req-1",
                "details": { "modifiedAt": "2025-03-01T10:00:00.123456Z" }
            }
        });
        let error = decode_error(StatusCode::CONFLICT, &serde_json::to_vec(&body).unwrap());

        assert!(error.is_conflict());
        let ClientError::Conflict { stored, .. } = error else { unreachable!() };
        assert_eq!(stored.unwrap().to_rfc3339(), "2025-03-01T10:00:00.123456+00:00");
    }

    #[test]
    fn validation_error_keeps_details() {
        let body = json!({
            "error": {
                "code": "VALIDATION_FAILED",
                "message": "validation failed: missing required fields: billTo",
                "retryable": false,
                "details": { "fields": ["billTo"], "rules": [] }
            }
        });
        let error = decode_error(StatusCode::BAD_REQUEST, &serde_json::to_vec(&body).unwrap());

        assert_eq!(error.code(), Some("VALIDATION_FAILED"));
        let ClientError::Api { status, details, retryable, .. } = error else { unreachable!() };
        assert_eq!(status, 400);
        assert!(!retryable);
        assert_eq!(details["fields"][0], "billTo");
    }

    #[test]
    fn non_json_body_is_unexpected_response() {
        let error = decode_error(StatusCode::BAD_GATEWAY, b"upstream down\n");
        let ClientError::Api { code, message, retryable, .. } = error else { unreachable!() };
        assert_eq!(code, "UNEXPECTED_RESPONSE");
        assert_eq!(message, "upstream down");
        assert!(retryable);
    }
}
