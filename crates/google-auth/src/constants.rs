//! Google OAuth constants
//!
//! Endpoints, the registered loopback redirect, and the default scope set for
//! the Apps Script API. None of these are secrets; the client ID and secret
//! come from configuration.

use std::time::Duration;

/// Authorization endpoint the user is sent to for consent
pub const AUTHORIZE_ENDPOINT: &str = "https://accounts.google.com/o/oauth2/v2/auth";

/// Token endpoint for code exchange and token refresh
pub const TOKEN_ENDPOINT: &str = "https://oauth2.googleapis.com/token";

/// Loopback port registered as the redirect URI in the Google Cloud console
pub const CALLBACK_PORT: u16 = 3001;

/// Path the provider redirects to after consent
pub const CALLBACK_PATH: &str = "/oauth/callback";

/// Host used in the redirect URI. Must match the console registration exactly.
pub const REDIRECT_HOST: &str = "localhost";

/// How long the callback listener waits for the browser redirect
pub const AUTHORIZATION_TIMEOUT: Duration = Duration::from_secs(5 * 60);

/// Per-user configuration directory name holding the token file
pub const APP_DIR_NAME: &str = "google-apps-script-mcp";

/// Token file name inside [`APP_DIR_NAME`]
pub const TOKEN_FILE_NAME: &str = "tokens.json";

/// Value shipped in sample `.env` files; never a usable refresh token.
pub const PLACEHOLDER_REFRESH_TOKEN: &str = "your_refresh_token_here";

/// Scopes requested by default.
///
/// Apps Script management (read-write and readonly), plus the Drive, Sheets,
/// Docs, Gmail, Calendar and Cloud APIs that scripts commonly call, and the
/// profile scopes. `script.projects` stays first.
pub const DEFAULT_SCOPES: &[&str] = &[
    "https://www.googleapis.com/auth/script.projects",
    "https://www.googleapis.com/auth/script.projects.readonly",
    "https://www.googleapis.com/auth/script.deployments",
    "https://www.googleapis.com/auth/script.deployments.readonly",
    "https://www.googleapis.com/auth/script.metrics",
    "https://www.googleapis.com/auth/script.processes",
    "https://www.googleapis.com/auth/script.webapp.deploy",
    "https://www.googleapis.com/auth/drive",
    "https://www.googleapis.com/auth/drive.file",
    "https://www.googleapis.com/auth/drive.readonly",
    "https://www.googleapis.com/auth/spreadsheets",
    "https://www.googleapis.com/auth/spreadsheets.readonly",
    "https://www.googleapis.com/auth/documents",
    "https://www.googleapis.com/auth/documents.readonly",
    "https://www.googleapis.com/auth/gmail.readonly",
    "https://www.googleapis.com/auth/gmail.modify",
    "https://www.googleapis.com/auth/calendar",
    "https://www.googleapis.com/auth/calendar.readonly",
    "https://www.googleapis.com/auth/cloud-platform",
    "https://www.googleapis.com/auth/cloud-platform.read-only",
    "https://www.googleapis.com/auth/userinfo.email",
    "https://www.googleapis.com/auth/userinfo.profile",
];

/// Default scopes as owned strings, for configuration defaults.
pub fn default_scopes() -> Vec<String> {
    DEFAULT_SCOPES.iter().map(|s| s.to_string()).collect()
}
