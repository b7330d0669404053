//! Error types for OAuth authentication operations

use std::net::SocketAddr;
use std::time::Duration;

/// Errors from token endpoint calls, token persistence and the interactive
/// authorization flow.
///
/// Payloads are strings (and `Copy` kinds) so the error can be cloned and
/// handed to every caller waiting on a shared refresh.
#[derive(Debug, Clone, thiserror::Error)]
pub enum Error {
    #[error("HTTP request failed: {0}")]
    Http(String),

    #[error("token exchange failed: {0}")]
    TokenExchange(String),

    /// The token endpoint refused a refresh grant. `body` is the provider's
    /// raw response (typically `{"error":"invalid_grant",...}`).
    #[error("refresh token rejected ({status}): {body}")]
    RefreshRejected { status: u16, body: String },

    #[error("token persistence failed: {0}")]
    Persistence(String),

    #[error("authorization denied by provider: {0}")]
    AuthorizationDenied(String),

    #[error("no authorization callback within {} seconds", .0.as_secs())]
    AuthorizationTimeout(Duration),

    #[error("authorization callback did not include a code")]
    MissingCode,

    #[error("failed to bind callback listener on {addr}: {message}")]
    ListenerBind {
        addr: SocketAddr,
        kind: std::io::ErrorKind,
        message: String,
    },

    #[error("invalid OAuth configuration: {0}")]
    InvalidConfig(String),
}

impl Error {
    /// True when the callback port is held by another listener, usually a
    /// second authorization flow in flight.
    pub fn is_port_in_use(&self) -> bool {
        matches!(
            self,
            Error::ListenerBind {
                kind: std::io::ErrorKind::AddrInUse,
                ..
            }
        )
    }
}

/// Result alias for auth operations.
pub type Result<T> = std::result::Result<T, Error>;
