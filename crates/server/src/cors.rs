// CORS middleware configuration for the document server.
//
// Allowed origins come from `ServerConfig::cors_origins` (the
// `DOCKET_CORS_ORIGINS` variable, comma-separated). Falls back to
// localhost defaults in development.

use axum::http::{HeaderName, HeaderValue, Method};
use tower_http::cors::{AllowOrigin, CorsLayer};

/// Default origins allowed when no origin list is configured.
const DEFAULT_DEV_ORIGINS: &[&str] = &[
    "http://localhost:3000",
    "http://localhost:5173",
    "http://127.0.0.1:3000",
    "http://127.0.0.1:5173",
];

/// Build a [`CorsLayer`] from the configured origin list.
///
/// - `"*"` allows any origin without credentials.
/// - A comma-separated list allows exactly those origins.
/// - `None` allows the default development origins.
///
/// Preflight responses are cached for 1 hour and `X-Request-Id` is
/// exposed to the browser.
pub fn cors_layer(origins: Option<&str>) -> CorsLayer {
    let base = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE, Method::OPTIONS])
        .allow_headers([
            axum::http::header::CONTENT_TYPE,
            axum::http::header::AUTHORIZATION,
            HeaderName::from_static("x-request-id"),
        ])
        .expose_headers([HeaderName::from_static("x-request-id")])
        .allow_credentials(true)
        .max_age(std::time::Duration::from_secs(3600));

    match origins.map(str::trim) {
        Some("*") => base.allow_origin(AllowOrigin::any()).allow_credentials(false),
        Some(origins) if !origins.is_empty() => base.allow_origin(parse_origins(origins)),
        _ => base.allow_origin(parse_origins(&DEFAULT_DEV_ORIGINS.join(","))),
    }
}

fn parse_origins(comma_separated: &str) -> Vec<HeaderValue> {
    comma_separated
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .filter_map(|s| HeaderValue::from_str(s).ok())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{body::Body, http::Request, response::IntoResponse, routing::get, Router};
    use tower::ServiceExt;

    async fn ok_handler() -> impl IntoResponse {
        "ok"
    }

    fn test_app(origins: Option<&str>) -> Router {
        Router::new().route("/test", get(ok_handler)).layer(cors_layer(origins))
    }

    fn preflight(origin: &str, method: &str) -> Request<Body> {
        Request::builder()
            .method(Method::OPTIONS)
            .uri("/test")
            .header("origin", origin)
            .header("access-control-request-method", method)
            .body(Body::empty())
            .unwrap()
    }

    #[tokio::test]
    async fn preflight_returns_cors_headers_for_allowed_origin() {
        let response = test_app(None).oneshot(preflight("http://localhost:3000", "PUT")).await.unwrap();

        assert_eq!(
            response.headers().get("access-control-allow-origin").unwrap(),
            "http://localhost:3000"
        );
        assert!(response
            .headers()
            .get("access-control-allow-credentials")
            .unwrap()
            .to_str()
            .unwrap()
            .contains("true"));
        assert_eq!(response.headers().get("access-control-max-age").unwrap(), "3600");
    }

    #[tokio::test]
    async fn preflight_rejects_unknown_origin() {
        let response =
            test_app(None).oneshot(preflight("https://evil.example.com", "POST")).await.unwrap();

        assert!(response.headers().get("access-control-allow-origin").is_none());
    }

    #[tokio::test]
    async fn configured_origins_replace_defaults() {
        let app = test_app(Some("https://app.docket.dev,https://staging.docket.dev"));

        let response =
            app.clone().oneshot(preflight("https://app.docket.dev", "GET")).await.unwrap();
        assert_eq!(
            response.headers().get("access-control-allow-origin").unwrap(),
            "https://app.docket.dev"
        );

        let response = app.oneshot(preflight("http://localhost:3000", "GET")).await.unwrap();
        assert!(response.headers().get("access-control-allow-origin").is_none());
    }

    #[tokio::test]
    async fn wildcard_origin_disables_credentials() {
        let response = test_app(Some("*"))
            .oneshot(preflight("https://anything.example.com", "GET"))
            .await
            .unwrap();

        assert_eq!(response.headers().get("access-control-allow-origin").unwrap(), "*");
        assert!(response.headers().get("access-control-allow-credentials").is_none());
    }

    #[tokio::test]
    async fn blank_origin_list_uses_defaults() {
        let response = test_app(Some("  "))
            .oneshot(
                Request::builder()
                    .uri("/test")
                    .header("origin", "http://localhost:5173")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(
            response.headers().get("access-control-allow-origin").unwrap(),
            "http://localhost:5173"
        );
    }

    #[test]
    fn parse_origins_handles_whitespace() {
        let origins = parse_origins("  https://a.com , https://b.com  , ");
        assert_eq!(origins.len(), 2);
        assert_eq!(origins[0], "https://a.com");
        assert_eq!(origins[1], "https://b.com");
    }
}
