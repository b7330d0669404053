//! Configuration types and loading
//!
//! Config precedence: CLI flags > env vars > config file > defaults.
//! The client secret is loaded from GOOGLE_APP_SCRIPT_API_CLIENT_SECRET or
//! `client_secret_file`, never stored in the TOML directly. A refresh token
//! from GOOGLE_APP_SCRIPT_API_REFRESH_TOKEN seeds an empty token store.

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use common::Secret;
use google_auth::{FlowConfig, TokenStore};
use serde::Deserialize;
use token_manager::ManagerOptions;

pub const CLIENT_ID_ENV: &str = "GOOGLE_APP_SCRIPT_API_CLIENT_ID";
pub const CLIENT_SECRET_ENV: &str = "GOOGLE_APP_SCRIPT_API_CLIENT_SECRET";
pub const REFRESH_TOKEN_ENV: &str = "GOOGLE_APP_SCRIPT_API_REFRESH_TOKEN";

/// Config file used when neither `--config` nor CONFIG_PATH is given.
/// Unlike an explicit path, it may be missing.
pub const DEFAULT_CONFIG_PATH: &str = "gas-auth.toml";

/// Root configuration. Every section is optional.
#[derive(Debug, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub oauth: OAuthConfig,
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub refresh: RefreshConfig,
    #[serde(default)]
    pub callback: CallbackConfig,
    #[serde(default)]
    pub admin: AdminConfig,
}

/// OAuth client registration
#[derive(Debug, Deserialize)]
pub struct OAuthConfig {
    #[serde(default)]
    pub client_id: Option<String>,
    #[serde(skip)]
    pub client_secret: Option<Secret<String>>,
    /// Path to a file holding the client secret (alternative to the env var)
    #[serde(default)]
    pub client_secret_file: Option<PathBuf>,
    /// Refresh token for headless hosts; only seeds an empty store
    #[serde(skip)]
    pub refresh_token: Option<Secret<String>>,
    #[serde(default = "google_auth::default_scopes")]
    pub scopes: Vec<String>,
}

impl Default for OAuthConfig {
    fn default() -> Self {
        Self {
            client_id: None,
            client_secret: None,
            client_secret_file: None,
            refresh_token: None,
            scopes: google_auth::default_scopes(),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct StoreConfig {
    /// Token file; defaults to the per-user config directory
    #[serde(default)]
    pub path: Option<PathBuf>,
}

#[derive(Debug, Deserialize)]
pub struct RefreshConfig {
    #[serde(default = "default_skew_secs")]
    pub skew_secs: u64,
    /// Run the browser flow when a token is requested and none is usable
    #[serde(default)]
    pub auto_authorize: bool,
}

impl Default for RefreshConfig {
    fn default() -> Self {
        Self {
            skew_secs: default_skew_secs(),
            auto_authorize: false,
        }
    }
}

/// Loopback callback listener for the consent flow
#[derive(Debug, Deserialize)]
pub struct CallbackConfig {
    #[serde(default = "default_callback_port")]
    pub port: u16,
    #[serde(default = "default_callback_timeout")]
    pub timeout_secs: u64,
    #[serde(default = "default_true")]
    pub open_browser: bool,
}

impl Default for CallbackConfig {
    fn default() -> Self {
        Self {
            port: default_callback_port(),
            timeout_secs: default_callback_timeout(),
            open_browser: true,
        }
    }
}

/// `serve` listener
#[derive(Debug, Deserialize)]
pub struct AdminConfig {
    #[serde(default = "default_admin_addr")]
    pub listen_addr: SocketAddr,
    #[serde(default = "default_max_connections")]
    pub max_connections: usize,
}

impl Default for AdminConfig {
    fn default() -> Self {
        Self {
            listen_addr: default_admin_addr(),
            max_connections: default_max_connections(),
        }
    }
}

fn default_skew_secs() -> u64 {
    google_auth::DEFAULT_SKEW.as_secs()
}

fn default_callback_port() -> u16 {
    google_auth::CALLBACK_PORT
}

fn default_callback_timeout() -> u64 {
    google_auth::AUTHORIZATION_TIMEOUT.as_secs()
}

fn default_true() -> bool {
    true
}

fn default_admin_addr() -> SocketAddr {
    SocketAddr::from(([127, 0, 0, 1], 9090))
}

fn default_max_connections() -> usize {
    64
}

impl Config {
    /// Load configuration from a TOML file, then overlay environment variables.
    ///
    /// Client ID: GOOGLE_APP_SCRIPT_API_CLIENT_ID, then `client_id`.
    /// Client secret: GOOGLE_APP_SCRIPT_API_CLIENT_SECRET, then
    /// `client_secret_file`.
    pub fn load(path: &Path) -> common::Result<Self> {
        let contents = std::fs::read_to_string(path).map_err(|e| common::Error::io(path, e))?;
        Self::from_toml(&contents)
    }

    /// Like [`Config::load`], but a missing file yields defaults plus env.
    pub fn load_optional(path: &Path) -> common::Result<Self> {
        match std::fs::read_to_string(path) {
            Ok(contents) => Self::from_toml(&contents),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Self::from_toml(""),
            Err(e) => Err(common::Error::io(path, e)),
        }
    }

    /// Load from an explicit path (`--config` / CONFIG_PATH) or fall back to
    /// the optional default file.
    pub fn discover(explicit: Option<&Path>) -> common::Result<(PathBuf, Self)> {
        match explicit {
            Some(path) => Ok((path.to_path_buf(), Self::load(path)?)),
            None => {
                let path = PathBuf::from(DEFAULT_CONFIG_PATH);
                let config = Self::load_optional(&path)?;
                Ok((path, config))
            }
        }
    }

    fn from_toml(contents: &str) -> common::Result<Self> {
        let mut config: Config = toml::from_str(contents)?;
        config.validate()?;

        if let Some(id) = env_value(CLIENT_ID_ENV) {
            config.oauth.client_id = Some(id);
        }

        // Secret: env var takes precedence over file
        if let Some(secret) = env_value(CLIENT_SECRET_ENV) {
            config.oauth.client_secret = Some(Secret::new(secret));
        } else if let Some(ref secret_file) = config.oauth.client_secret_file {
            let secret = std::fs::read_to_string(secret_file).map_err(|e| {
                common::Error::Config(format!(
                    "failed to read client_secret_file {}: {e}",
                    secret_file.display()
                ))
            })?;
            let secret = secret.trim().to_owned();
            if !secret.is_empty() {
                config.oauth.client_secret = Some(Secret::new(secret));
            }
        }

        config.oauth.refresh_token = env_value(REFRESH_TOKEN_ENV)
            .filter(|token| token != google_auth::PLACEHOLDER_REFRESH_TOKEN)
            .map(Secret::new);

        Ok(config)
    }

    fn validate(&self) -> common::Result<()> {
        if self.callback.timeout_secs == 0 {
            return Err(common::Error::Config(
                "callback.timeout_secs must be greater than 0".into(),
            ));
        }
        if self.refresh.skew_secs >= 3600 {
            return Err(common::Error::Config(format!(
                "refresh.skew_secs must be below 3600 (access tokens live one hour), got {}",
                self.refresh.skew_secs
            )));
        }
        if self.oauth.scopes.is_empty() {
            return Err(common::Error::Config(
                "oauth.scopes must list at least one scope".into(),
            ));
        }
        if self.admin.max_connections == 0 {
            return Err(common::Error::Config(
                "admin.max_connections must be greater than 0".into(),
            ));
        }
        Ok(())
    }

    /// Client ID and secret, required by every command that talks to Google.
    pub fn credentials(&self) -> common::Result<(String, Secret<String>)> {
        let client_id = self
            .oauth
            .client_id
            .clone()
            .filter(|id| !id.trim().is_empty())
            .ok_or(common::Error::MissingSetting {
                name: "oauth.client_id",
                env: CLIENT_ID_ENV,
            })?;
        let secret = self
            .oauth
            .client_secret
            .clone()
            .filter(|s| !s.is_blank())
            .ok_or(common::Error::MissingSetting {
                name: "oauth.client_secret_file",
                env: CLIENT_SECRET_ENV,
            })?;
        Ok((client_id, secret))
    }

    pub fn token_store(&self) -> google_auth::Result<TokenStore> {
        match &self.store.path {
            Some(path) => Ok(TokenStore::new(path)),
            None => TokenStore::open_default(),
        }
    }

    pub fn flow_config(&self) -> FlowConfig {
        FlowConfig {
            scopes: self.oauth.scopes.clone(),
            timeout: Duration::from_secs(self.callback.timeout_secs),
            open_browser: self.callback.open_browser,
            ..FlowConfig::default()
        }
        .with_port(self.callback.port)
    }

    pub fn manager_options(&self) -> ManagerOptions {
        ManagerOptions {
            skew: Duration::from_secs(self.refresh.skew_secs),
            auto_authorize: self.refresh.auto_authorize.then(|| self.flow_config()),
        }
    }
}

fn env_value(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|v| v.trim().to_owned())
        .filter(|v| !v.is_empty())
}
