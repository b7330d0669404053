//! Local status API for `gas-auth serve`
//!
//! Binds to loopback by default. Token values never leave the process
//! through this API; only [`TokenInfo`] summaries do.
//!
//! Endpoints:
//! - GET    /health          200 when a usable or refreshable token exists, else 503
//! - GET    /metrics         Prometheus text exposition
//! - GET    /tokens          stored token summary
//! - POST   /tokens/refresh  obtain a valid token now (refreshing if needed)
//! - DELETE /tokens          clear stored tokens

use std::time::Instant;

use axum::Json;
use axum::Router;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use metrics_exporter_prometheus::PrometheusHandle;
use tracing::{info, warn};

use token_manager::{TokenInfo, TokenManager};

use crate::metrics;

/// Shared state for admin handlers.
#[derive(Clone)]
pub struct AdminState {
    manager: TokenManager,
    prometheus: PrometheusHandle,
    started_at: Instant,
}

impl AdminState {
    pub fn new(manager: TokenManager, prometheus: PrometheusHandle) -> Self {
        Self {
            manager,
            prometheus,
            started_at: Instant::now(),
        }
    }
}

/// Build the admin router. `max_connections` bounds concurrent requests.
pub fn build_admin_router(state: AdminState, max_connections: usize) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/metrics", get(metrics_handler))
        .route("/tokens", get(token_info).delete(clear_tokens))
        .route("/tokens/refresh", post(refresh_tokens))
        .layer(tower::limit::ConcurrencyLimitLayer::new(max_connections))
        .with_state(state)
}

/// A stored token is healthy when it is fresh or can be refreshed without
/// user interaction.
fn is_usable(info: &TokenInfo) -> bool {
    info.status == "valid" || info.has_refresh_token
}

async fn health(State(state): State<AdminState>) -> Response {
    let uptime = state.started_at.elapsed().as_secs();
    let (status, body) = match state.manager.token_info().await {
        Ok(info) => {
            metrics::record_token_status(&info);
            if is_usable(&info) {
                (
                    StatusCode::OK,
                    serde_json::json!({"status": "healthy", "token": info, "uptime_seconds": uptime}),
                )
            } else {
                (
                    StatusCode::SERVICE_UNAVAILABLE,
                    serde_json::json!({
                        "status": "degraded",
                        "reason": "authorization required",
                        "token": info,
                        "uptime_seconds": uptime,
                    }),
                )
            }
        }
        Err(e) => {
            warn!(error = %e, "health check could not read token store");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                serde_json::json!({"status": "degraded", "reason": e.to_string(), "uptime_seconds": uptime}),
            )
        }
    };
    metrics::record_admin_request("/health", status.as_u16());
    (status, Json(body)).into_response()
}

async fn metrics_handler(State(state): State<AdminState>) -> impl IntoResponse {
    (
        StatusCode::OK,
        [(
            axum::http::header::CONTENT_TYPE,
            "text/plain; version=0.0.4; charset=utf-8",
        )],
        state.prometheus.render(),
    )
}

async fn token_info(State(state): State<AdminState>) -> Response {
    let response = match state.manager.token_info().await {
        Ok(info) => {
            metrics::record_token_status(&info);
            (StatusCode::OK, Json(info)).into_response()
        }
        Err(e) => error_response(&e),
    };
    metrics::record_admin_request("/tokens", response.status().as_u16());
    response
}

async fn refresh_tokens(State(state): State<AdminState>) -> Response {
    let result = match state.manager.valid_access_token().await {
        Ok(_) => state.manager.token_info().await,
        Err(e) => Err(e),
    };
    let response = match result {
        Ok(info) => {
            info!(status = info.status, "token acquisition requested via admin API");
            metrics::record_token_status(&info);
            (StatusCode::OK, Json(info)).into_response()
        }
        Err(e) => {
            warn!(error = %e, "token acquisition via admin API failed");
            error_response(&e)
        }
    };
    metrics::record_admin_request("/tokens/refresh", response.status().as_u16());
    response
}

async fn clear_tokens(State(state): State<AdminState>) -> Response {
    let response = match state.manager.clear_tokens().await {
        Ok(()) => {
            info!("stored tokens cleared via admin API");
            StatusCode::NO_CONTENT.into_response()
        }
        Err(e) => error_response(&e),
    };
    metrics::record_admin_request("/tokens", response.status().as_u16());
    response
}

fn error_response(err: &token_manager::Error) -> Response {
    let status = match err {
        token_manager::Error::NoTokens(_) => StatusCode::CONFLICT,
        token_manager::Error::RefreshFailed { .. } | token_manager::Error::Authorization(_) => {
            StatusCode::BAD_GATEWAY
        }
        token_manager::Error::Persistence(_) | token_manager::Error::InvalidHeader(_) => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    };
    (
        status,
        Json(serde_json::json!({"error": err.kind(), "message": err.to_string()})),
    )
        .into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{Method, Request};
    use google_auth::{OAuthClient, TokenRecord, TokenStore};
    use token_manager::ManagerOptions;
    use tokio::net::TcpListener;
    use tower::ServiceExt;

    fn test_prometheus_handle() -> PrometheusHandle {
        metrics_exporter_prometheus::PrometheusBuilder::new()
            .build_recorder()
            .handle()
    }

    /// Token endpoint that always answers with `status` and `body`.
    async fn start_token_endpoint(status: StatusCode, body: serde_json::Value) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let app = Router::new().route(
            "/token",
            post(move || {
                let body = body.clone();
                async move { (status, Json(body)) }
            }),
        );
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{addr}/token")
    }

    fn test_manager(dir: &tempfile::TempDir, token_endpoint: &str) -> TokenManager {
        let oauth = OAuthClient::new("cid", common::Secret::new("csecret".to_string()))
            .unwrap()
            .with_token_endpoint(token_endpoint);
        TokenManager::new(
            TokenStore::new(dir.path().join("tokens.json")),
            oauth,
            reqwest::Client::new(),
            ManagerOptions::default(),
        )
    }

    fn test_app(manager: TokenManager) -> Router {
        build_admin_router(AdminState::new(manager, test_prometheus_handle()), 16)
    }

    fn stored(access: &str, refresh: Option<&str>, expires_in_ms: i64) -> TokenRecord {
        let now = common::now_millis();
        TokenRecord {
            access_token: access.into(),
            refresh_token: refresh.map(Into::into),
            token_type: "Bearer".into(),
            expires_at: (now as i64 + expires_in_ms) as u64,
            scope: String::new(),
            saved_at: now,
        }
    }

    async fn send(app: Router, method: Method, uri: &str) -> (StatusCode, serde_json::Value) {
        let response = app
            .oneshot(Request::builder().method(method).uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), 1024 * 1024)
            .await
            .unwrap();
        let json = if bytes.is_empty() {
            serde_json::Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, json)
    }

    #[tokio::test]
    async fn health_is_degraded_without_tokens() {
        let dir = tempfile::tempdir().unwrap();
        let app = test_app(test_manager(&dir, "http://127.0.0.1:9/token"));

        let (status, body) = send(app, Method::GET, "/health").await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(body["status"], "degraded");
        assert_eq!(body["token"]["status"], "absent");
    }

    #[tokio::test]
    async fn health_is_ok_with_refreshable_token() {
        let dir = tempfile::tempdir().unwrap();
        let manager = test_manager(&dir, "http://127.0.0.1:9/token");
        manager
            .store()
            .save(&stored("A1", Some("R1"), -60_000))
            .await
            .unwrap();

        let (status, body) = send(test_app(manager), Method::GET, "/health").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "healthy");
        assert_eq!(body["token"]["status"], "expired");
    }

    #[tokio::test]
    async fn health_is_degraded_when_expired_without_refresh_token() {
        let dir = tempfile::tempdir().unwrap();
        let manager = test_manager(&dir, "http://127.0.0.1:9/token");
        manager
            .store()
            .save(&stored("A1", None, -60_000))
            .await
            .unwrap();

        let (status, _) = send(test_app(manager), Method::GET, "/health").await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    }

    #[tokio::test]
    async fn token_summary_never_contains_token_values() {
        let dir = tempfile::tempdir().unwrap();
        let manager = test_manager(&dir, "http://127.0.0.1:9/token");
        manager
            .store()
            .save(&stored("ya29.secret", Some("1//refresh"), 3_600_000))
            .await
            .unwrap();

        let (status, body) = send(test_app(manager), Method::GET, "/tokens").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["has_tokens"], true);
        assert_eq!(body["status"], "valid");
        let text = body.to_string();
        assert!(!text.contains("ya29.secret"));
        assert!(!text.contains("1//refresh"));
    }

    #[tokio::test]
    async fn refresh_endpoint_refreshes_expired_token() {
        let dir = tempfile::tempdir().unwrap();
        let endpoint = start_token_endpoint(
            StatusCode::OK,
            serde_json::json!({"access_token": "A2", "expires_in": 3600}),
        )
        .await;
        let manager = test_manager(&dir, &endpoint);
        manager
            .store()
            .save(&stored("A1", Some("R1"), -60_000))
            .await
            .unwrap();

        let (status, body) = send(test_app(manager.clone()), Method::POST, "/tokens/refresh").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "valid");

        let record = manager.store().load().await.unwrap().unwrap();
        assert_eq!(record.access_token, "A2");
        assert_eq!(record.refresh_token.as_deref(), Some("R1"));
    }

    #[tokio::test]
    async fn refresh_endpoint_reports_rejection() {
        let dir = tempfile::tempdir().unwrap();
        let endpoint = start_token_endpoint(
            StatusCode::BAD_REQUEST,
            serde_json::json!({"error": "invalid_grant"}),
        )
        .await;
        let manager = test_manager(&dir, &endpoint);
        manager
            .store()
            .save(&stored("A1", Some("R1"), -60_000))
            .await
            .unwrap();

        let (status, body) = send(test_app(manager), Method::POST, "/tokens/refresh").await;
        assert_eq!(status, StatusCode::BAD_GATEWAY);
        assert_eq!(body["error"], "refresh_failed");
        assert!(body["message"].as_str().unwrap().contains("invalid_grant"));
    }

    #[tokio::test]
    async fn refresh_endpoint_without_tokens_is_conflict() {
        let dir = tempfile::tempdir().unwrap();
        let app = test_app(test_manager(&dir, "http://127.0.0.1:9/token"));

        let (status, body) = send(app, Method::POST, "/tokens/refresh").await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(body["error"], "no_tokens");
    }

    #[tokio::test]
    async fn delete_clears_tokens() {
        let dir = tempfile::tempdir().unwrap();
        let manager = test_manager(&dir, "http://127.0.0.1:9/token");
        manager
            .store()
            .save(&stored("A1", Some("R1"), 3_600_000))
            .await
            .unwrap();
        let app = test_app(manager.clone());

        let (status, _) = send(app.clone(), Method::DELETE, "/tokens").await;
        assert_eq!(status, StatusCode::NO_CONTENT);
        let (status, _) = send(app.clone(), Method::DELETE, "/tokens").await;
        assert_eq!(status, StatusCode::NO_CONTENT);

        let (_, body) = send(app, Method::GET, "/tokens").await;
        assert_eq!(body["has_tokens"], false);
        assert!(manager.store().load().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn metrics_endpoint_serves_text() {
        let dir = tempfile::tempdir().unwrap();
        let app = test_app(test_manager(&dir, "http://127.0.0.1:9/token"));

        let response = app
            .oneshot(Request::builder().uri("/metrics").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert!(
            response.headers()[axum::http::header::CONTENT_TYPE]
                .to_str()
                .unwrap()
                .starts_with("text/plain")
        );
    }

    #[tokio::test]
    async fn unknown_route_is_404() {
        let dir = tempfile::tempdir().unwrap();
        let app = test_app(test_manager(&dir, "http://127.0.0.1:9/token"));
        let (status, _) = send(app, Method::GET, "/admin").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }
}
