//! The persisted token set
//!
//! `expires_at` and `saved_at` are unix timestamps in milliseconds. Both are
//! computed at construction time from the token endpoint's `expires_in` delta
//! and the caller's clock; neither is ever taken from user input.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::token::TokenResponse;

fn default_token_type() -> String {
    "Bearer".to_string()
}

/// The single token set held by the token store.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenRecord {
    /// Short-lived bearer credential for API calls
    pub access_token: String,
    /// Long-lived credential for minting new access tokens. Absent when the
    /// provider withheld it (repeat consent without `prompt=consent`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    #[serde(default = "default_token_type")]
    pub token_type: String,
    /// Absolute expiry as unix milliseconds
    pub expires_at: u64,
    /// Space-delimited granted scopes (informational)
    #[serde(default)]
    pub scope: String,
    /// When this record was written, unix milliseconds
    #[serde(default)]
    pub saved_at: u64,
}

impl TokenRecord {
    /// Build a record from a full token response (code exchange).
    pub fn from_response(response: TokenResponse, now_millis: u64) -> Self {
        Self {
            access_token: response.access_token,
            refresh_token: response.refresh_token.filter(|t| !t.is_empty()),
            token_type: response.token_type.unwrap_or_else(default_token_type),
            expires_at: now_millis.saturating_add(response.expires_in.saturating_mul(1000)),
            scope: response.scope.unwrap_or_default(),
            saved_at: now_millis,
        }
    }

    /// A record holding only a refresh token from outside the consent flow.
    ///
    /// It has no access token and `expires_at` is 0, so the first access
    /// goes through the refresh path, which derives the real expiry.
    pub fn seeded(refresh_token: impl Into<String>, now_millis: u64) -> Self {
        Self {
            access_token: String::new(),
            refresh_token: Some(refresh_token.into()),
            token_type: default_token_type(),
            expires_at: 0,
            scope: String::new(),
            saved_at: now_millis,
        }
    }

    /// Build the record that replaces `self` after a refresh exchange.
    ///
    /// A response without `refresh_token` keeps the existing one; the same
    /// goes for `scope`. Every other field comes from the response.
    pub fn merge_refresh(&self, response: TokenResponse, now_millis: u64) -> Self {
        let refresh_token = response
            .refresh_token
            .clone()
            .filter(|t| !t.is_empty())
            .or_else(|| self.refresh_token.clone());
        let scope = response
            .scope
            .clone()
            .unwrap_or_else(|| self.scope.clone());
        let mut merged = Self::from_response(response, now_millis);
        merged.refresh_token = refresh_token;
        merged.scope = scope;
        merged
    }
}

impl fmt::Debug for TokenRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenRecord")
            .field("access_token", &"[REDACTED]")
            .field(
                "refresh_token",
                &self.refresh_token.as_ref().map(|_| "[REDACTED]"),
            )
            .field("token_type", &self.token_type)
            .field("expires_at", &self.expires_at)
            .field("scope", &self.scope)
            .field("saved_at", &self.saved_at)
            .finish()
    }
}
