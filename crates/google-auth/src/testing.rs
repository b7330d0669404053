//! Local mock token endpoint for unit tests

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use axum::Router;
use axum::extract::{Form, State};
use axum::http::StatusCode;
use axum::routing::post;
use tokio::net::TcpListener;
use tokio::sync::Mutex;

use crate::client::OAuthClient;

#[derive(Clone)]
struct MockState {
    status: StatusCode,
    body: serde_json::Value,
    calls: Arc<AtomicUsize>,
    last_form: Arc<Mutex<Option<HashMap<String, String>>>>,
}

/// Token endpoint answering every POST with a fixed status and JSON body.
pub(crate) struct MockTokenEndpoint {
    pub url: String,
    calls: Arc<AtomicUsize>,
    last_form: Arc<Mutex<Option<HashMap<String, String>>>>,
    _server: tokio::task::JoinHandle<()>,
}

impl MockTokenEndpoint {
    pub async fn spawn(status: StatusCode, body: serde_json::Value) -> Self {
        let state = MockState {
            status,
            body,
            calls: Arc::new(AtomicUsize::new(0)),
            last_form: Arc::new(Mutex::new(None)),
        };
        let calls = state.calls.clone();
        let last_form = state.last_form.clone();

        let app = Router::new()
            .route("/token", post(handle_token))
            .with_state(state);
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let server = tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self {
            url: format!("http://{addr}/token"),
            calls,
            last_form,
            _server: server,
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub async fn last_form(&self) -> Option<HashMap<String, String>> {
        self.last_form.lock().await.clone()
    }
}

async fn handle_token(
    State(state): State<MockState>,
    Form(form): Form<HashMap<String, String>>,
) -> (StatusCode, axum::Json<serde_json::Value>) {
    state.calls.fetch_add(1, Ordering::SeqCst);
    *state.last_form.lock().await = Some(form);
    (state.status, axum::Json(state.body.clone()))
}

/// OAuth client pointed at the mock endpoint.
pub(crate) fn test_client(endpoint: &MockTokenEndpoint) -> OAuthClient {
    OAuthClient::new("test-client-id", common::Secret::new("test-client-secret".into()))
        .unwrap()
        .with_token_endpoint(endpoint.url.clone())
}
