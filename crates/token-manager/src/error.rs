//! Error types for token lifecycle operations

/// Errors surfaced to callers asking for a usable access token.
///
/// `Clone` so one refresh outcome can be handed to every coalesced waiter.
#[derive(Debug, Clone, thiserror::Error)]
pub enum Error {
    /// Nothing usable is stored; the interactive flow has to run.
    #[error("no usable tokens: {0}")]
    NoTokens(String),

    /// The token endpoint refused or failed the refresh grant. `body` is the
    /// provider's raw response, or the transport error when there was none.
    #[error("token refresh failed{}: {body}", status_suffix(.status))]
    RefreshFailed { status: Option<u16>, body: String },

    #[error("token persistence failed: {0}")]
    Persistence(String),

    #[error("authorization failed: {0}")]
    Authorization(#[source] google_auth::Error),

    #[error("invalid header value: {0}")]
    InvalidHeader(String),
}

fn status_suffix(status: &Option<u16>) -> String {
    status.map(|s| format!(" ({s})")).unwrap_or_default()
}

impl Error {
    /// Stable label for logs and metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            Error::NoTokens(_) => "no_tokens",
            Error::RefreshFailed { .. } => "refresh_failed",
            Error::Persistence(_) => "persistence",
            Error::Authorization(_) => "authorization",
            Error::InvalidHeader(_) => "invalid_header",
        }
    }

    /// Map a failed refresh grant. Rejections keep the provider status.
    pub(crate) fn from_refresh(err: google_auth::Error) -> Self {
        match err {
            google_auth::Error::RefreshRejected { status, body } => Error::RefreshFailed {
                status: Some(status),
                body,
            },
            google_auth::Error::Persistence(msg) => Error::Persistence(msg),
            other => Error::RefreshFailed {
                status: None,
                body: other.to_string(),
            },
        }
    }
}

impl From<google_auth::Error> for Error {
    fn from(err: google_auth::Error) -> Self {
        match err {
            google_auth::Error::Persistence(msg) => Error::Persistence(msg),
            other => Error::Authorization(other),
        }
    }
}

/// Result alias for manager operations.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn refresh_failure_display_includes_provider_body() {
        let err = Error::from_refresh(google_auth::Error::RefreshRejected {
            status: 400,
            body: r#"{"error":"invalid_grant","error_description":"Token has been expired or revoked."}"#
                .into(),
        });
        let msg = err.to_string();
        assert!(msg.starts_with("token refresh failed (400): "), "got {msg}");
        assert!(msg.contains("invalid_grant"));
        assert_eq!(err.kind(), "refresh_failed");
    }

    #[test]
    fn transport_failure_has_no_status() {
        let err = Error::from_refresh(google_auth::Error::Http("connection refused".into()));
        assert!(matches!(err, Error::RefreshFailed { status: None, ref body } if body.contains("connection refused")));
    }

    #[test]
    fn store_errors_stay_persistence() {
        let err: Error = google_auth::Error::Persistence("disk full".into()).into();
        assert_eq!(err.kind(), "persistence");

        let err: Error = google_auth::Error::MissingCode.into();
        assert_eq!(err.kind(), "authorization");
    }
}
