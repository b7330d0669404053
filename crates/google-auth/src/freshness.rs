//! Token freshness policy
//!
//! Pure decisions over an optional [`TokenRecord`]. The current time is passed
//! in explicitly; [`Clock`] is the seam callers use to supply it.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use crate::constants::PLACEHOLDER_REFRESH_TOKEN;
use crate::record::TokenRecord;

/// Safety margin subtracted from the expiry instant so a token never expires
/// mid-request.
pub const DEFAULT_SKEW: Duration = Duration::from_secs(60);

/// Source of the current unix time in milliseconds.
pub trait Clock: Send + Sync + 'static {
    fn now_millis(&self) -> u64;
}

/// Wall clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_millis(&self) -> u64 {
        common::now_millis()
    }
}

/// Manually driven clock for tests and simulations.
#[derive(Debug, Default)]
pub struct FixedClock(AtomicU64);

impl FixedClock {
    pub fn new(now_millis: u64) -> Self {
        Self(AtomicU64::new(now_millis))
    }

    pub fn set(&self, now_millis: u64) {
        self.0.store(now_millis, Ordering::SeqCst);
    }

    pub fn advance(&self, by: Duration) {
        self.0.fetch_add(by.as_millis() as u64, Ordering::SeqCst);
    }
}

impl Clock for FixedClock {
    fn now_millis(&self) -> u64 {
        self.0.load(Ordering::SeqCst)
    }
}

/// Outcome of applying the policy to the stored record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Freshness {
    /// Nothing stored
    Absent,
    /// Usable as-is
    Fresh,
    /// Inside the skew window or past expiry
    Expired,
}

pub fn is_absent(record: Option<&TokenRecord>) -> bool {
    record.is_none()
}

/// True if `now >= expires_at - skew`. An absent record counts as expired.
pub fn is_expired(record: Option<&TokenRecord>, now_millis: u64, skew: Duration) -> bool {
    match record {
        None => true,
        Some(record) => {
            let skew_millis = skew.as_millis() as u64;
            now_millis >= record.expires_at.saturating_sub(skew_millis)
        }
    }
}

/// True iff the record carries a real refresh token.
pub fn has_refresh_capability(record: &TokenRecord) -> bool {
    match record.refresh_token.as_deref() {
        Some(token) => {
            let token = token.trim();
            !token.is_empty() && token != PLACEHOLDER_REFRESH_TOKEN
        }
        None => false,
    }
}

pub fn classify(record: Option<&TokenRecord>, now_millis: u64, skew: Duration) -> Freshness {
    if is_absent(record) {
        Freshness::Absent
    } else if is_expired(record, now_millis, skew) {
        Freshness::Expired
    } else {
        Freshness::Fresh
    }
}
