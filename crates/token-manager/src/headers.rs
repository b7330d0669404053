//! Authorization headers for Apps Script API calls

use reqwest::header::{ACCEPT, AUTHORIZATION, CONTENT_TYPE, HeaderMap, HeaderValue};

use crate::error::{Error, Result};
use crate::manager::TokenManager;

/// `Bearer <token>`, marked sensitive so it is masked in `Debug` output.
pub fn bearer_value(token: &str) -> Result<HeaderValue> {
    let mut value = HeaderValue::from_str(&format!("Bearer {token}"))
        .map_err(|e| Error::InvalidHeader(format!("access token is not a valid header value: {e}")))?;
    value.set_sensitive(true);
    Ok(value)
}

/// Header set for a JSON API request authenticated with `token`.
pub fn build_headers(token: &str) -> Result<HeaderMap> {
    let json = HeaderValue::from_static("application/json");
    let mut headers = HeaderMap::with_capacity(3);
    headers.insert(AUTHORIZATION, bearer_value(token)?);
    headers.insert(ACCEPT, json.clone());
    headers.insert(CONTENT_TYPE, json);
    Ok(headers)
}

/// Obtain a valid access token (refreshing when needed) and build the
/// request headers. Fails exactly when [`TokenManager::valid_access_token`]
/// fails.
pub async fn auth_headers(manager: &TokenManager) -> Result<HeaderMap> {
    let token = manager.valid_access_token().await?;
    build_headers(&token)
}
