//! Interactive browser consent flow
//!
//! One full authorization-code round trip:
//!
//! 1. [`start_authorization`] binds the loopback callback listener and builds
//!    the consent URL (`access_type=offline`, `prompt=consent`, `state`, PKCE).
//! 2. The caller shows the URL; [`PendingAuthorization::present`] opens a
//!    browser when enabled and always logs the URL.
//! 3. [`PendingAuthorization::wait`] serves callbacks until one is terminal,
//!    exchanges the code, and returns the token response.
//!
//! Callback handling:
//! - unknown path → 404, keep waiting
//! - missing or wrong `state` → 400, keep waiting (bare or forged hits
//!   cannot end the flow)
//! - `error=...` → denied; no `code` → missing code; exchange failure →
//!   exchange error; all terminal
//! - `code=...` → exchange, confirmation page, done
//!
//! The listener is owned by `wait()` and shut down on every exit path,
//! including timeout and cancellation of the `wait()` future.

use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};
use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{Html, IntoResponse, Response};
use axum::routing::get;
use serde::Deserialize;
use tokio::net::TcpListener;
use tokio::sync::{Mutex, oneshot};
use tracing::{debug, info, warn};
use url::Url;

use crate::client::OAuthClient;
use crate::constants::{AUTHORIZATION_TIMEOUT, CALLBACK_PATH, CALLBACK_PORT, REDIRECT_HOST, default_scopes};
use crate::error::{Error, Result};
use crate::pkce::{compute_challenge, generate_state, generate_verifier, state_matches};
use crate::token::{TokenResponse, exchange_code};

/// Upper bound on draining in-flight callback responses after a terminal outcome.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

/// Settings for one interactive authorization.
#[derive(Debug, Clone)]
pub struct FlowConfig {
    /// Where the callback listener binds. Port 0 picks a free port, and the
    /// redirect URI follows the bound port.
    pub bind_addr: SocketAddr,
    /// Host written into the redirect URI
    pub redirect_host: String,
    /// Registered callback path
    pub callback_path: String,
    pub scopes: Vec<String>,
    pub timeout: Duration,
    /// Try to launch the system browser
    pub open_browser: bool,
}

impl Default for FlowConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::V4(SocketAddrV4::new(Ipv4Addr::LOCALHOST, CALLBACK_PORT)),
            redirect_host: REDIRECT_HOST.to_string(),
            callback_path: CALLBACK_PATH.to_string(),
            scopes: default_scopes(),
            timeout: AUTHORIZATION_TIMEOUT,
            open_browser: true,
        }
    }
}

impl FlowConfig {
    pub fn with_port(mut self, port: u16) -> Self {
        self.bind_addr.set_port(port);
        self
    }

    fn redirect_uri(&self, port: u16) -> String {
        format!(
            "http://{}:{}{}",
            self.redirect_host, port, self.callback_path
        )
    }

    fn validate(&self) -> Result<()> {
        if !self.callback_path.starts_with('/') {
            return Err(Error::InvalidConfig(format!(
                "callback path must start with '/', got {:?}",
                self.callback_path
            )));
        }
        if self.scopes.is_empty() {
            return Err(Error::InvalidConfig("at least one scope is required".into()));
        }
        if self.timeout.is_zero() {
            return Err(Error::InvalidConfig("authorization timeout must be non-zero".into()));
        }
        Ok(())
    }
}

/// Consent URL with every parameter the provider needs to issue a refresh token.
pub fn build_authorization_url(
    client: &OAuthClient,
    redirect_uri: &str,
    scopes: &[String],
    state: &str,
    challenge: &str,
) -> Result<Url> {
    let mut url = Url::parse(client.authorize_endpoint())
        .map_err(|e| Error::InvalidConfig(format!("authorization endpoint: {e}")))?;
    url.query_pairs_mut()
        .append_pair("client_id", client.client_id())
        .append_pair("redirect_uri", redirect_uri)
        .append_pair("response_type", "code")
        .append_pair("access_type", "offline")
        .append_pair("prompt", "consent")
        .append_pair("scope", &scopes.join(" "))
        .append_pair("state", state)
        .append_pair("code_challenge", challenge)
        .append_pair("code_challenge_method", "S256");
    Ok(url)
}

/// A bound callback listener waiting for the browser redirect.
pub struct PendingAuthorization {
    listener: TcpListener,
    router: Router,
    outcome: oneshot::Receiver<Result<TokenResponse>>,
    local_addr: SocketAddr,
    authorization_url: Url,
    redirect_uri: String,
    state: String,
    timeout: Duration,
    open_browser: bool,
}

/// Shared with the callback handler. `outcome` is taken by the first
/// terminal callback so only one ever completes the flow.
struct CallbackContext {
    http: reqwest::Client,
    client: OAuthClient,
    redirect_uri: String,
    expected_state: String,
    verifier: String,
    outcome: Mutex<Option<oneshot::Sender<Result<TokenResponse>>>>,
}

#[derive(Debug, Deserialize)]
struct CallbackParams {
    code: Option<String>,
    error: Option<String>,
    state: Option<String>,
}

/// Bind the callback listener and prepare the consent URL.
///
/// Fails fast with [`Error::ListenerBind`] when the port is taken, which is
/// also what a second concurrent flow on the same port sees.
pub async fn start_authorization(
    http: reqwest::Client,
    client: OAuthClient,
    config: FlowConfig,
) -> Result<PendingAuthorization> {
    config.validate()?;

    let listener = TcpListener::bind(config.bind_addr)
        .await
        .map_err(|e| Error::ListenerBind {
            addr: config.bind_addr,
            kind: e.kind(),
            message: e.to_string(),
        })?;
    let local_addr = listener.local_addr().map_err(|e| Error::ListenerBind {
        addr: config.bind_addr,
        kind: e.kind(),
        message: e.to_string(),
    })?;

    let redirect_uri = config.redirect_uri(local_addr.port());
    let state = generate_state();
    let verifier = generate_verifier();
    let challenge = compute_challenge(&verifier);
    let authorization_url =
        build_authorization_url(&client, &redirect_uri, &config.scopes, &state, &challenge)?;

    let (outcome_tx, outcome_rx) = oneshot::channel();
    let context = Arc::new(CallbackContext {
        http,
        client,
        redirect_uri: redirect_uri.clone(),
        expected_state: state.clone(),
        verifier,
        outcome: Mutex::new(Some(outcome_tx)),
    });
    let router = Router::new()
        .route(&config.callback_path, get(handle_callback))
        .fallback(not_found)
        .with_state(context);

    info!(addr = %local_addr, redirect_uri, "callback listener bound, awaiting authorization");

    Ok(PendingAuthorization {
        listener,
        router,
        outcome: outcome_rx,
        local_addr,
        authorization_url,
        redirect_uri,
        state,
        timeout: config.timeout,
        open_browser: config.open_browser,
    })
}

/// Start, present and wait in one call.
pub async fn run_interactive_authorization(
    http: reqwest::Client,
    client: OAuthClient,
    config: FlowConfig,
) -> Result<TokenResponse> {
    let pending = start_authorization(http, client, config).await?;
    pending.present();
    pending.wait().await
}

impl PendingAuthorization {
    pub fn authorization_url(&self) -> &Url {
        &self.authorization_url
    }

    pub fn redirect_uri(&self) -> &str {
        &self.redirect_uri
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// The anti-CSRF nonce embedded in the authorization URL.
    pub fn state(&self) -> &str {
        &self.state
    }

    /// Log the consent URL and, when enabled, open it in a browser.
    pub fn present(&self) {
        info!(url = %self.authorization_url, "open this URL to authorize access");
        if self.open_browser {
            if let Err(e) = open::that(self.authorization_url.as_str()) {
                warn!(error = %e, "could not launch a browser, open the URL manually");
            }
        }
    }

    /// Serve callbacks until a terminal outcome or the timeout, then close
    /// the listener.
    pub async fn wait(self) -> Result<TokenResponse> {
        let PendingAuthorization {
            listener,
            router,
            outcome,
            local_addr,
            timeout,
            ..
        } = self;

        // Dropping shutdown_tx (including when this future is cancelled) also
        // triggers the graceful shutdown below.
        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
        let mut server = tokio::spawn(async move {
            axum::serve(listener, router)
                .with_graceful_shutdown(async move {
                    let _ = shutdown_rx.await;
                })
                .await
        });

        let result = match tokio::time::timeout(timeout, outcome).await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => Err(Error::Http(
                "callback listener stopped before the authorization completed".into(),
            )),
            Err(_) => {
                warn!(timeout_secs = timeout.as_secs(), "authorization timed out");
                Err(Error::AuthorizationTimeout(timeout))
            }
        };

        let _ = shutdown_tx.send(());
        if tokio::time::timeout(SHUTDOWN_GRACE, &mut server).await.is_err() {
            warn!("callback listener did not drain in time, aborting");
            server.abort();
            let _ = server.await;
        }
        debug!(addr = %local_addr, "callback listener closed");

        result
    }
}

async fn handle_callback(
    State(flow): State<Arc<CallbackContext>>,
    Query(params): Query<CallbackParams>,
) -> Response {
    if !state_matches(&flow.expected_state, params.state.as_deref()) {
        warn!(
            has_code = params.code.is_some(),
            has_error = params.error.is_some(),
            "callback with missing or mismatched state, ignoring"
        );
        return (
            StatusCode::BAD_REQUEST,
            page(
                "Invalid authorization response",
                "This response does not belong to the pending authorization request.",
                false,
            ),
        )
            .into_response();
    }

    let Some(outcome) = flow.outcome.lock().await.take() else {
        return (
            StatusCode::CONFLICT,
            page(
                "Authorization already handled",
                "This authorization request has already completed.",
                false,
            ),
        )
            .into_response();
    };

    if let Some(error) = params.error {
        warn!(error = %error, "provider returned an authorization error");
        let body = page("Authentication failed", &format!("Error: {error}"), false);
        let _ = outcome.send(Err(Error::AuthorizationDenied(error)));
        return (StatusCode::BAD_REQUEST, body).into_response();
    }

    let Some(code) = params.code.filter(|c| !c.is_empty()) else {
        warn!("callback carried neither code nor error");
        let _ = outcome.send(Err(Error::MissingCode));
        return (
            StatusCode::BAD_REQUEST,
            page(
                "No authorization code",
                "No authorization code was received from Google.",
                false,
            ),
        )
            .into_response();
    };

    debug!("authorization code received, exchanging");
    match exchange_code(
        &flow.http,
        &flow.client,
        &code,
        &flow.redirect_uri,
        Some(&flow.verifier),
    )
    .await
    {
        Ok(tokens) => {
            let refresh = if tokens.refresh_token.is_some() {
                "A refresh token was granted."
            } else {
                "No refresh token was granted; revoke access and authorize again to obtain one."
            };
            let body = page(
                "Authentication successful",
                &format!("{refresh} You can close this window and return to your application."),
                true,
            );
            info!(
                refresh_token_granted = tokens.refresh_token.is_some(),
                "authorization completed"
            );
            let _ = outcome.send(Ok(tokens));
            (StatusCode::OK, body).into_response()
        }
        Err(e) => {
            warn!(error = %e, "authorization code exchange failed");
            let body = page("Token exchange failed", &e.to_string(), false);
            let _ = outcome.send(Err(e));
            (StatusCode::BAD_GATEWAY, body).into_response()
        }
    }
}

async fn not_found() -> (StatusCode, &'static str) {
    (StatusCode::NOT_FOUND, "Not Found")
}

fn page(title: &str, message: &str, success: bool) -> Html<String> {
    let color = if success { "#28a745" } else { "#dc3545" };
    Html(format!(
        "<!DOCTYPE html>\n<html>\n<head><title>{title}</title></head>\n\
         <body style=\"font-family: system-ui, sans-serif; padding: 50px; text-align: center;\">\n\
         <h2 style=\"color: {color};\">{title}</h2>\n<p>{message}</p>\n</body>\n</html>",
        title = escape_html(title),
        message = escape_html(message),
    ))
}

/// Provider error strings are reflected into the page; escape them.
fn escape_html(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for c in raw.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            c => out.push(c),
        }
    }
    out
}
