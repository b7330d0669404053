//! Configuration error types

use std::path::PathBuf;

use thiserror::Error;

/// Errors raised while loading or validating configuration.
#[derive(Error, Debug)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Missing required setting {name}: set {env} or add it to the config file")]
    MissingSetting { name: &'static str, env: &'static str },

    #[error("I/O error reading {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
}

impl Error {
    /// Attach the offending path to an I/O error.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

/// Result alias using common Error
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display_includes_context() {
        let config_err = Error::Config("missing field".into());
        assert_eq!(config_err.to_string(), "Configuration error: missing field");

        let io_err = Error::io(
            "/etc/gas-auth.toml",
            std::io::Error::new(std::io::ErrorKind::NotFound, "file not found"),
        );
        let msg = io_err.to_string();
        assert!(msg.starts_with("I/O error reading /etc/gas-auth.toml"), "got: {msg}");
    }

    #[test]
    fn missing_setting_names_the_env_var() {
        let err = Error::MissingSetting {
            name: "client_id",
            env: "GOOGLE_APP_SCRIPT_API_CLIENT_ID",
        };
        let msg = err.to_string();
        assert!(msg.contains("client_id"));
        assert!(msg.contains("GOOGLE_APP_SCRIPT_API_CLIENT_ID"));
    }
}
