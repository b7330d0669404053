//! Token lifecycle counters
//!
//! - `token_requests_total` (counter): label `source` = `cache|refresh|authorize`
//! - `token_refresh_total` (counter): label `outcome` = `success|failure`
//! - `token_refresh_coalesced_total` (counter): callers that joined an
//!   in-flight refresh instead of starting one
//! - `authorization_flow_total` (counter): label `outcome`
//!
//! Calls are no-ops until the binary installs a recorder.

pub fn record_token_request(source: &'static str) {
    metrics::counter!("token_requests_total", "source" => source).increment(1);
}

pub fn record_refresh(outcome: &'static str) {
    metrics::counter!("token_refresh_total", "outcome" => outcome).increment(1);
}

pub fn record_refresh_coalesced() {
    metrics::counter!("token_refresh_coalesced_total").increment(1);
}

pub fn record_authorization(outcome: &'static str) {
    metrics::counter!("authorization_flow_total", "outcome" => outcome).increment(1);
}

/// `outcome` label for a finished interactive flow.
pub fn authorization_outcome(result: &google_auth::Result<google_auth::TokenResponse>) -> &'static str {
    match result {
        Ok(_) => "success",
        Err(google_auth::Error::AuthorizationDenied(_)) => "denied",
        Err(google_auth::Error::AuthorizationTimeout(_)) => "timeout",
        Err(google_auth::Error::MissingCode) => "missing_code",
        Err(google_auth::Error::TokenExchange(_)) => "exchange_failed",
        Err(_) => "error",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use metrics_exporter_prometheus::PrometheusBuilder;
    use std::time::Duration;

    #[test]
    fn counters_render_with_labels() {
        let recorder = PrometheusBuilder::new().build_recorder();
        let handle = recorder.handle();
        let _guard = metrics::set_default_local_recorder(&recorder);

        record_token_request("cache");
        record_token_request("refresh");
        record_refresh("failure");
        record_refresh_coalesced();
        record_authorization("timeout");

        let output = handle.render();
        assert!(output.contains("token_requests_total{source=\"cache\"} 1"), "{output}");
        assert!(output.contains("token_requests_total{source=\"refresh\"} 1"));
        assert!(output.contains("token_refresh_total{outcome=\"failure\"} 1"));
        assert!(output.contains("token_refresh_coalesced_total 1"));
        assert!(output.contains("authorization_flow_total{outcome=\"timeout\"} 1"));
    }

    #[test]
    fn authorization_outcome_labels() {
        assert_eq!(
            authorization_outcome(&Err(google_auth::Error::AuthorizationTimeout(
                Duration::from_secs(300)
            ))),
            "timeout"
        );
        assert_eq!(
            authorization_outcome(&Err(google_auth::Error::AuthorizationDenied(
                "access_denied".into()
            ))),
            "denied"
        );
        assert_eq!(
            authorization_outcome(&Err(google_auth::Error::InvalidConfig("x".into()))),
            "error"
        );
    }
}
