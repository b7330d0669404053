//! Token lifecycle orchestration
//!
//! [`TokenManager`] answers one question: "give me an access token I can use
//! right now". It reads the store, applies the freshness policy, refreshes
//! through the token endpoint when needed, and persists the result.
//!
//! Decision table for [`TokenManager::valid_access_token`]:
//!
//! | stored record                      | action                              |
//! |------------------------------------|-------------------------------------|
//! | absent                             | `NoTokens` (or auto-authorize)      |
//! | fresh                              | return it, no network               |
//! | expired, refresh token present     | refresh, merge, persist, return     |
//! | expired, no usable refresh token   | `NoTokens` (or auto-authorize)      |
//!
//! A failed refresh is returned as `RefreshFailed`; the browser is never
//! launched as a side effect of a token request unless auto-authorize is
//! configured, and even then only for the `NoTokens` rows.
//!
//! Concurrent refreshes are coalesced: the first caller starts the exchange
//! and every caller that arrives while it is in flight awaits the same
//! shared future.

use std::path::PathBuf;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use chrono::{DateTime, SecondsFormat, Utc};
use futures_util::FutureExt;
use futures_util::future::{BoxFuture, Shared};
use google_auth::freshness::{Freshness, classify, has_refresh_capability, is_expired};
use google_auth::{
    Clock, DEFAULT_SKEW, FlowConfig, OAuthClient, PendingAuthorization, SystemClock, TokenRecord,
    TokenStore,
};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::error::{Error, Result};
use crate::metrics;

type SharedRefresh = Shared<BoxFuture<'static, Result<TokenRecord>>>;

/// Tunables for [`TokenManager`].
#[derive(Debug, Clone)]
pub struct ManagerOptions {
    /// Treat tokens as expired this long before their actual expiry.
    pub skew: Duration,
    /// When set, a token request with nothing usable stored runs the
    /// interactive flow with this configuration instead of failing.
    pub auto_authorize: Option<FlowConfig>,
}

impl Default for ManagerOptions {
    fn default() -> Self {
        Self {
            skew: DEFAULT_SKEW,
            auto_authorize: None,
        }
    }
}

/// Operator-facing summary of the stored tokens. Never carries token values.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TokenInfo {
    pub location: PathBuf,
    pub has_tokens: bool,
    /// `absent`, `valid` or `expired`
    pub status: &'static str,
    pub has_refresh_token: bool,
    pub is_expired: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub saved_at: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<String>,
    /// Seconds until expiry; negative once expired
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_in_secs: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,
}

impl TokenInfo {
    /// Summarize `record` as seen at `now_millis`. Usable without OAuth
    /// credentials, straight off a [`TokenStore`].
    pub fn from_record(
        location: PathBuf,
        record: Option<&TokenRecord>,
        now_millis: u64,
        skew: Duration,
    ) -> Self {
        let freshness = classify(record, now_millis, skew);
        let Some(record) = record else {
            return Self {
                location,
                has_tokens: false,
                status: status_label(freshness),
                has_refresh_token: false,
                is_expired: true,
                saved_at: None,
                expires_at: None,
                expires_in_secs: None,
                token_type: None,
                scope: None,
            };
        };

        Self {
            location,
            has_tokens: true,
            status: status_label(freshness),
            has_refresh_token: has_refresh_capability(record),
            is_expired: freshness != Freshness::Fresh,
            saved_at: rfc3339(record.saved_at),
            expires_at: rfc3339(record.expires_at),
            expires_in_secs: Some(
                millis_i64(record.expires_at).saturating_sub(millis_i64(now_millis)) / 1000,
            ),
            token_type: Some(record.token_type.clone()),
            scope: Some(record.scope.clone()).filter(|s| !s.is_empty()),
        }
    }
}

/// Owns the token lifecycle for one OAuth client and one token store.
///
/// Cheap to clone; clones share the store, the HTTP client and the in-flight
/// refresh slot.
#[derive(Clone)]
pub struct TokenManager {
    inner: Arc<Inner>,
}

struct Inner {
    store: Arc<TokenStore>,
    oauth: OAuthClient,
    http: reqwest::Client,
    clock: Arc<dyn Clock>,
    options: ManagerOptions,
    in_flight: Mutex<Option<SharedRefresh>>,
    /// Serializes auto-authorization so concurrent callers don't race for
    /// the callback port.
    authorize_lock: tokio::sync::Mutex<()>,
}

impl std::fmt::Debug for TokenManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenManager")
            .field("store", &self.inner.store.locate())
            .field("client_id", &self.inner.oauth.client_id())
            .field("options", &self.inner.options)
            .finish()
    }
}

impl TokenManager {
    pub fn new(
        store: TokenStore,
        oauth: OAuthClient,
        http: reqwest::Client,
        options: ManagerOptions,
    ) -> Self {
        Self::with_clock(store, oauth, http, options, Arc::new(SystemClock))
    }

    /// Manager driven by an explicit clock.
    pub fn with_clock(
        store: TokenStore,
        oauth: OAuthClient,
        http: reqwest::Client,
        options: ManagerOptions,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                store: Arc::new(store),
                oauth,
                http,
                clock,
                options,
                in_flight: Mutex::new(None),
                authorize_lock: tokio::sync::Mutex::new(()),
            }),
        }
    }

    pub fn store(&self) -> &TokenStore {
        &self.inner.store
    }

    pub fn options(&self) -> &ManagerOptions {
        &self.inner.options
    }

    /// An access token that is valid for at least the skew window.
    ///
    /// No retries happen here; callers decide whether a `RefreshFailed` is
    /// worth trying again.
    pub async fn valid_access_token(&self) -> Result<String> {
        let record = self.inner.store.load().await?;
        let now = self.inner.clock.now_millis();

        match record {
            Some(record) if !is_expired(Some(&record), now, self.inner.options.skew) => {
                debug!("using cached access token");
                metrics::record_token_request("cache");
                Ok(record.access_token)
            }
            Some(record) if has_refresh_capability(&record) => {
                let refreshed = self.refresh().await?;
                metrics::record_token_request("refresh");
                Ok(refreshed.access_token)
            }
            Some(_) => {
                self.authorize_or_fail("access token expired and no refresh token is stored")
                    .await
            }
            None => self.authorize_or_fail("no tokens are stored").await,
        }
    }

    /// Whether the store holds a record that can be refreshed. Does not
    /// touch the network.
    pub async fn has_stored_tokens(&self) -> Result<bool> {
        let record = self.inner.store.load().await?;
        Ok(record.as_ref().is_some_and(has_refresh_capability))
    }

    pub async fn token_info(&self) -> Result<TokenInfo> {
        let record = self.inner.store.load().await?;
        Ok(TokenInfo::from_record(
            self.inner.store.locate().to_path_buf(),
            record.as_ref(),
            self.inner.clock.now_millis(),
            self.inner.options.skew,
        ))
    }

    /// Store a refresh token obtained outside the consent flow.
    ///
    /// Only an empty store is seeded, and blank or placeholder values are
    /// ignored. The seeded record is already expired, so the next token
    /// request refreshes it. Returns whether a record was written.
    pub async fn seed_refresh_token(&self, refresh_token: &str) -> Result<bool> {
        let seeded = TokenRecord::seeded(refresh_token.trim(), self.inner.clock.now_millis());
        if !has_refresh_capability(&seeded) {
            debug!("ignoring blank or placeholder refresh token seed");
            return Ok(false);
        }
        if self.inner.store.load().await?.is_some() {
            debug!("token store already populated, refresh token seed not applied");
            return Ok(false);
        }
        self.inner.store.save(&seeded).await?;
        info!(
            path = %self.inner.store.locate().display(),
            "seeded token store with configured refresh token"
        );
        Ok(true)
    }

    /// Remove stored tokens. Clearing an empty store succeeds.
    pub async fn clear_tokens(&self) -> Result<()> {
        self.inner.store.clear().await?;
        Ok(())
    }

    /// Bind the callback listener and build the consent URL.
    pub async fn start_authorization(&self, flow: FlowConfig) -> Result<PendingAuthorization> {
        let pending = google_auth::start_authorization(
            self.inner.http.clone(),
            self.inner.oauth.clone(),
            flow,
        )
        .await;
        if let Err(e) = &pending {
            metrics::record_authorization("error");
            warn!(error = %e, "could not start authorization");
        }
        pending.map_err(Error::from)
    }

    /// Wait for the consent callback and persist the granted tokens.
    pub async fn complete_authorization(&self, pending: PendingAuthorization) -> Result<TokenRecord> {
        let result = pending.wait().await;
        metrics::record_authorization(metrics::authorization_outcome(&result));
        let response = result?;

        let record = TokenRecord::from_response(response, self.inner.clock.now_millis());
        if !has_refresh_capability(&record) {
            warn!(
                "provider granted no refresh token; revoke the app's access and authorize again \
                 to enable automatic refresh"
            );
        }
        self.inner.store.save(&record).await?;
        info!(
            path = %self.inner.store.locate().display(),
            has_refresh_token = record.refresh_token.is_some(),
            "authorization complete, tokens stored"
        );
        Ok(record)
    }

    /// Run the full interactive flow (start, present, wait) and persist.
    pub async fn run_interactive_authorization(&self, flow: FlowConfig) -> Result<TokenRecord> {
        let pending = self.start_authorization(flow).await?;
        pending.present();
        self.complete_authorization(pending).await
    }

    async fn authorize_or_fail(&self, reason: &'static str) -> Result<String> {
        let Some(flow) = self.inner.options.auto_authorize.clone() else {
            warn!(reason, "interactive authorization required");
            return Err(Error::NoTokens(format!(
                "{reason}; run the authorization flow first"
            )));
        };

        let _guard = self.inner.authorize_lock.lock().await;
        // Another caller may have finished authorizing while we waited
        if let Some(record) = self.inner.store.load().await? {
            if !is_expired(Some(&record), self.inner.clock.now_millis(), self.inner.options.skew) {
                metrics::record_token_request("cache");
                return Ok(record.access_token);
            }
        }

        info!(reason, "starting interactive authorization");
        let record = self.run_interactive_authorization(flow).await?;
        metrics::record_token_request("authorize");
        Ok(record.access_token)
    }

    /// Refresh, joining the in-flight exchange when there is one.
    async fn refresh(&self) -> Result<TokenRecord> {
        let (shared, leader) = {
            let mut slot = self
                .inner
                .in_flight
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            match slot.as_ref() {
                Some(existing) if existing.peek().is_none() => (existing.clone(), false),
                _ => {
                    let fut = refresh_stored(
                        self.inner.store.clone(),
                        self.inner.oauth.clone(),
                        self.inner.http.clone(),
                        self.inner.clock.clone(),
                        self.inner.options.skew,
                    )
                    .boxed()
                    .shared();
                    *slot = Some(fut.clone());
                    (fut, true)
                }
            }
        };

        if !leader {
            debug!("joining in-flight token refresh");
            metrics::record_refresh_coalesced();
        }

        let result = shared.clone().await;

        let mut slot = self
            .inner
            .in_flight
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if slot.as_ref().is_some_and(|current| current.ptr_eq(&shared)) {
            *slot = None;
        }
        result
    }
}

/// The refresh exchange itself.
///
/// Re-reads the store first: a refresh that finished just before this one
/// started (or another process) may already have stored a fresh token.
async fn refresh_stored(
    store: Arc<TokenStore>,
    oauth: OAuthClient,
    http: reqwest::Client,
    clock: Arc<dyn Clock>,
    skew: Duration,
) -> Result<TokenRecord> {
    let current = store
        .load()
        .await?
        .ok_or_else(|| Error::NoTokens("tokens were cleared before refresh".into()))?;
    if !is_expired(Some(&current), clock.now_millis(), skew) {
        debug!("stored token already fresh, skipping refresh");
        return Ok(current);
    }

    let refresh = match current.refresh_token.as_deref() {
        Some(token) if has_refresh_capability(&current) => token.to_string(),
        _ => {
            return Err(Error::NoTokens(
                "access token expired and no refresh token is stored".into(),
            ));
        }
    };

    info!("access token expired, refreshing");
    let response = match google_auth::refresh_token(&http, &oauth, &refresh).await {
        Ok(response) => response,
        Err(e) => {
            metrics::record_refresh("failure");
            warn!(error = %e, "token refresh failed");
            return Err(Error::from_refresh(e));
        }
    };

    let record = current.merge_refresh(response, clock.now_millis());
    if let Err(e) = store.save(&record).await {
        metrics::record_refresh("failure");
        warn!(error = %e, "refreshed token could not be persisted");
        return Err(e.into());
    }
    metrics::record_refresh("success");
    info!(expires_at = record.expires_at, "access token refreshed");
    Ok(record)
}

fn status_label(freshness: Freshness) -> &'static str {
    match freshness {
        Freshness::Absent => "absent",
        Freshness::Fresh => "valid",
        Freshness::Expired => "expired",
    }
}

fn millis_i64(millis: u64) -> i64 {
    i64::try_from(millis).unwrap_or(i64::MAX)
}

fn rfc3339(millis: u64) -> Option<String> {
    if millis == 0 {
        return None;
    }
    let millis = i64::try_from(millis).ok()?;
    DateTime::<Utc>::from_timestamp_millis(millis)
        .map(|t| t.to_rfc3339_opts(SecondsFormat::Secs, true))
}
