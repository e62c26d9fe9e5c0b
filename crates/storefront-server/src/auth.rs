use axum::{
    body::Body,
    extract::{Request, State},
    http::header::AUTHORIZATION,
    middleware::Next,
    response::Response,
};
use subtle::ConstantTimeEq;

use crate::state::AppState;

/// Axum middleware that gates the admin API behind a shared bearer token.
///
/// Auth flow (evaluated in order):
/// 1. No admin token configured on the server → 500 (misconfiguration, never open)
/// 2. `Authorization: Bearer <token>` matches → passthrough
/// 3. Anything else → 401 JSON
pub async fn admin_auth(State(app): State<AppState>, req: Request, next: Next) -> Response {
    let Some(expected) = app.admin_token.as_deref().filter(|t| !t.is_empty()) else {
        tracing::error!(path = %req.uri().path(), "admin request refused: ADMIN_TOKEN is not set");
        return json_response(500, r#"{"error":"admin token not configured"}"#);
    };

    let presented = req
        .headers()
        .get(AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .and_then(bearer_token);

    match presented {
        Some(token) if tokens_match(token, expected) => next.run(req).await,
        _ => {
            tracing::debug!(path = %req.uri().path(), "admin request rejected");
            json_response(401, r#"{"error":"unauthorized"}"#)
        }
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn bearer_token(header: &str) -> Option<&str> {
    let (scheme, token) = header.trim().split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("bearer") {
        return None;
    }
    let token = token.trim();
    (!token.is_empty()).then_some(token)
}

fn tokens_match(presented: &str, expected: &str) -> bool {
    bool::from(presented.as_bytes().ct_eq(expected.as_bytes()))
}

fn json_response(status: u16, body: &'static str) -> Response {
    Response::builder()
        .status(status)
        .header("Content-Type", "application/json")
        .body(Body::from(body))
        .expect("infallible: all header values are valid ASCII")
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::{Request, StatusCode};
    use axum::{middleware, routing::get, Router};
    use std::sync::Arc;
    use storefront_core::catalog::CatalogStore;
    use storefront_core::kv::MemoryKv;
    use storefront_core::publish::{
        BackgroundTasks, Scheduler, SchedulerSettings, SystemClock,
    };
    use tower::ServiceExt;

    async fn ok_handler() -> &'static str {
        "ok"
    }

    fn test_app(token: Option<&str>) -> Router {
        let store = Arc::new(MemoryKv::new());
        let state = AppState {
            catalog: CatalogStore::new(store.clone()),
            scheduler: Scheduler::new(
                store,
                None,
                Arc::new(SystemClock),
                BackgroundTasks::new(),
                SchedulerSettings::default(),
            ),
            admin_token: token.map(str::to_string),
            debug_errors: false,
        };
        Router::new()
            .route("/api/get-data", get(ok_handler))
            .layer(middleware::from_fn_with_state(state, admin_auth))
    }

    async fn status_with(token: Option<&str>, header: Option<&str>) -> StatusCode {
        let mut req = Request::builder().uri("/api/get-data");
        if let Some(h) = header {
            req = req.header("authorization", h);
        }
        test_app(token)
            .oneshot(req.body(Body::empty()).unwrap())
            .await
            .unwrap()
            .status()
    }

    #[tokio::test]
    async fn matching_bearer_passes_through() {
        assert_eq!(
            status_with(Some("secret"), Some("Bearer secret")).await,
            StatusCode::OK
        );
    }

    #[tokio::test]
    async fn scheme_is_case_insensitive() {
        assert_eq!(
            status_with(Some("secret"), Some("bearer secret")).await,
            StatusCode::OK
        );
    }

    #[tokio::test]
    async fn wrong_token_is_401() {
        assert_eq!(
            status_with(Some("secret"), Some("Bearer nope")).await,
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            status_with(Some("secret"), Some("Bearer secretx")).await,
            StatusCode::UNAUTHORIZED
        );
    }

    #[tokio::test]
    async fn missing_header_is_401() {
        assert_eq!(status_with(Some("secret"), None).await, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn basic_scheme_is_401() {
        assert_eq!(
            status_with(Some("secret"), Some("Basic secret")).await,
            StatusCode::UNAUTHORIZED
        );
    }

    #[tokio::test]
    async fn unconfigured_server_token_is_500() {
        assert_eq!(
            status_with(None, Some("Bearer anything")).await,
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(
            status_with(Some(""), Some("Bearer ")).await,
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn token_comparison_requires_exact_bytes() {
        assert!(tokens_match("secret", "secret"));
        assert!(!tokens_match("secret", "secreT"));
        assert!(!tokens_match("secret", "secret-longer"));
        assert!(!tokens_match("", "secret"));
    }

    #[test]
    fn bearer_parsing() {
        assert_eq!(bearer_token("Bearer abc"), Some("abc"));
        assert_eq!(bearer_token("Bearer   abc  "), Some("abc"));
        assert_eq!(bearer_token("Bearer "), None);
        assert_eq!(bearer_token("abc"), None);
    }
}
