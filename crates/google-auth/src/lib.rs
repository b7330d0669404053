//! Google OAuth building blocks for Apps Script tooling
//!
//! Token endpoint calls, single-slot token persistence, the freshness policy,
//! and the interactive loopback consent flow. Nothing here decides *when* to
//! refresh or authorize; that policy lives in the `token-manager` crate.
//!
//! Credential flow:
//! 1. `flow::start_authorization()` binds the callback listener and builds
//!    the consent URL (state + PKCE)
//! 2. The user authorizes in a browser; `PendingAuthorization::wait()`
//!    receives the redirect and calls `token::exchange_code()`
//! 3. The response becomes a `TokenRecord`, saved by `store::TokenStore::save()`
//! 4. Once `freshness::is_expired()` reports true, `token::refresh_token()`
//!    mints a new access token and `TokenRecord::merge_refresh()` keeps the
//!    old refresh token when the provider omits one

pub mod client;
pub mod constants;
pub mod error;
pub mod flow;
pub mod freshness;
pub mod pkce;
pub mod record;
pub mod store;
pub mod token;

#[cfg(test)]
mod testing;

pub use client::OAuthClient;
pub use constants::*;
pub use error::{Error, Result};
pub use flow::{FlowConfig, PendingAuthorization, run_interactive_authorization, start_authorization};
pub use freshness::{Clock, DEFAULT_SKEW, FixedClock, Freshness, SystemClock};
pub use record::TokenRecord;
pub use store::TokenStore;
pub use token::{TokenResponse, exchange_code, refresh_token};
