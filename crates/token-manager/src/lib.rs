//! Token lifecycle manager for Google Apps Script API access
//!
//! Sits on top of `google-auth` and decides when to reuse, refresh or
//! (re)authorize. Callers only ask for a token or a header set:
//!
//! 1. `TokenManager::valid_access_token()` returns a cached token while it
//!    is outside the skew window
//! 2. An expired token with a refresh token is refreshed once, even with
//!    many concurrent callers, and the result is persisted
//! 3. Without usable tokens the caller gets `Error::NoTokens` and runs
//!    `TokenManager::run_interactive_authorization()` (or configures
//!    auto-authorize)
//! 4. `headers::auth_headers()` wraps the token into request headers

pub mod error;
pub mod headers;
pub mod manager;
pub mod metrics;

pub use error::{Error, Result};
pub use headers::{auth_headers, bearer_value, build_headers};
pub use manager::{ManagerOptions, TokenInfo, TokenManager};
