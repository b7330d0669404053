//! OAuth client identity and endpoints

use common::Secret;

use crate::constants::{AUTHORIZE_ENDPOINT, TOKEN_ENDPOINT};
use crate::error::{Error, Result};

/// Registered OAuth client: ID, secret, and the provider endpoints.
///
/// Endpoints default to Google's and can be overridden (tests point the token
/// endpoint at a local mock). The secret is held in [`Secret`] so it never
/// shows up in `Debug` output or logs.
#[derive(Debug, Clone)]
pub struct OAuthClient {
    client_id: String,
    client_secret: Secret<String>,
    authorize_endpoint: String,
    token_endpoint: String,
}

impl OAuthClient {
    /// Build a client for Google's endpoints.
    ///
    /// Rejects blank IDs and secrets up front: the token endpoint would
    /// otherwise answer with an opaque `invalid_client`.
    pub fn new(client_id: impl Into<String>, client_secret: Secret<String>) -> Result<Self> {
        let client_id = client_id.into();
        if client_id.trim().is_empty() {
            return Err(Error::InvalidConfig("client_id must not be empty".into()));
        }
        if client_secret.is_blank() {
            return Err(Error::InvalidConfig("client_secret must not be empty".into()));
        }
        Ok(Self {
            client_id,
            client_secret,
            authorize_endpoint: AUTHORIZE_ENDPOINT.to_string(),
            token_endpoint: TOKEN_ENDPOINT.to_string(),
        })
    }

    /// Override the token endpoint.
    pub fn with_token_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.token_endpoint = endpoint.into();
        self
    }

    /// Override the authorization endpoint.
    pub fn with_authorize_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.authorize_endpoint = endpoint.into();
        self
    }

    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    pub(crate) fn client_secret(&self) -> &str {
        self.client_secret.expose()
    }

    pub fn authorize_endpoint(&self) -> &str {
        &self.authorize_endpoint
    }

    pub fn token_endpoint(&self) -> &str {
        &self.token_endpoint
    }
}
