//! OAuth token exchange and refresh
//!
//! Handles the two token endpoint interactions:
//! 1. Authorization code exchange (end of the interactive consent flow)
//! 2. Token refresh (when the stored access token is past its skew window)
//!
//! Both operations POST a form-encoded body to the client's token endpoint
//! with different grant types, authenticating with the client ID and secret.

use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::client::OAuthClient;
use crate::error::{Error, Result};

/// Response from the token endpoint for both exchange and refresh.
///
/// `expires_in` is a delta in seconds from the response time; the caller
/// converts it to an absolute timestamp when storing the record. Google omits
/// `refresh_token` on most refresh responses, so it is optional here.
#[derive(Clone, Deserialize, Serialize)]
pub struct TokenResponse {
    pub access_token: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    /// Seconds until the access token expires (delta, not absolute)
    pub expires_in: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,
}

impl fmt::Debug for TokenResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenResponse")
            .field("access_token", &"[REDACTED]")
            .field(
                "refresh_token",
                &self.refresh_token.as_ref().map(|_| "[REDACTED]"),
            )
            .field("expires_in", &self.expires_in)
            .field("token_type", &self.token_type)
            .field("scope", &self.scope)
            .finish()
    }
}

/// Exchange an authorization code for tokens.
///
/// `redirect_uri` must be byte-identical to the one sent in the authorization
/// URL. `verifier` is the PKCE code verifier when the flow used one.
pub async fn exchange_code(
    http: &reqwest::Client,
    client: &OAuthClient,
    code: &str,
    redirect_uri: &str,
    verifier: Option<&str>,
) -> Result<TokenResponse> {
    let mut form = vec![
        ("grant_type", "authorization_code"),
        ("code", code),
        ("redirect_uri", redirect_uri),
        ("client_id", client.client_id()),
        ("client_secret", client.client_secret()),
    ];
    if let Some(verifier) = verifier {
        form.push(("code_verifier", verifier));
    }

    let response = http
        .post(client.token_endpoint())
        .form(&form)
        .send()
        .await
        .map_err(|e| Error::Http(format!("token exchange request failed: {e}")))?;

    let status = response.status();
    if !status.is_success() {
        let body = response
            .text()
            .await
            .unwrap_or_else(|_| String::from("<no body>"));
        return Err(Error::TokenExchange(format!(
            "token endpoint returned {status}: {body}"
        )));
    }

    let tokens = response
        .json::<TokenResponse>()
        .await
        .map_err(|e| Error::TokenExchange(format!("invalid token response: {e}")))?;
    debug!(
        expires_in = tokens.expires_in,
        refresh_token_granted = tokens.refresh_token.is_some(),
        "authorization code exchanged"
    );
    Ok(tokens)
}

/// Mint a new access token from a refresh token.
///
/// Any non-2xx answer is reported as [`Error::RefreshRejected`] with the
/// provider's raw body. No retries happen here: replaying a refresh grant
/// can trip provider throttling or invalidate a rotating refresh token.
pub async fn refresh_token(
    http: &reqwest::Client,
    client: &OAuthClient,
    refresh: &str,
) -> Result<TokenResponse> {
    let response = http
        .post(client.token_endpoint())
        .form(&[
            ("grant_type", "refresh_token"),
            ("refresh_token", refresh),
            ("client_id", client.client_id()),
            ("client_secret", client.client_secret()),
        ])
        .send()
        .await
        .map_err(|e| Error::Http(format!("token refresh request failed: {e}")))?;

    let status = response.status();
    if !status.is_success() {
        let body = response
            .text()
            .await
            .unwrap_or_else(|_| String::from("<no body>"));
        return Err(Error::RefreshRejected {
            status: status.as_u16(),
            body,
        });
    }

    response
        .json::<TokenResponse>()
        .await
        .map_err(|e| Error::TokenExchange(format!("invalid refresh response: {e}")))
}
