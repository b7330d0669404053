//! Prometheus metrics exposition
//!
//! The token lifecycle counters are emitted by `token_manager::metrics`;
//! this module installs the recorder and adds the service-level series:
//!
//! - `token_expires_in_seconds` (gauge): seconds until the stored access
//!   token expires, updated whenever token status is read
//! - `admin_requests_total` (counter): labels `route`, `status`

use metrics_exporter_prometheus::{BuildError, PrometheusBuilder, PrometheusHandle};
use token_manager::TokenInfo;

/// Install the global Prometheus recorder and return a handle for rendering.
pub fn install_recorder() -> Result<PrometheusHandle, BuildError> {
    PrometheusBuilder::new().install_recorder()
}

/// Mirror the stored token's remaining lifetime. Absent tokens read as 0.
pub fn record_token_status(info: &TokenInfo) {
    let remaining = info.expires_in_secs.unwrap_or(0).max(0);
    metrics::gauge!("token_expires_in_seconds").set(remaining as f64);
}

pub fn record_admin_request(route: &'static str, status: u16) {
    metrics::counter!("admin_requests_total", "route" => route, "status" => status.to_string())
        .increment(1);
}
