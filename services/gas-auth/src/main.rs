//! gas-auth
//!
//! Command-line front end for the Google Apps Script OAuth token lifecycle:
//! 1. `login` runs the browser consent flow and stores the tokens
//! 2. `token` / `headers` hand out a valid access token, refreshing it when
//!    it is inside the expiry skew window
//! 3. `status` / `logout` inspect or clear the stored tokens
//! 4. `serve` exposes status, refresh and metrics on a local HTTP listener

mod admin;
mod config;
mod metrics;

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use tokio::net::TcpListener;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use common::Secret;
use google_auth::OAuthClient;
use token_manager::{TokenInfo, TokenManager, auth_headers};

use crate::admin::{AdminState, build_admin_router};
use crate::config::Config;

/// Time allowed for in-flight admin requests after a shutdown signal.
const DRAIN_TIMEOUT: Duration = Duration::from_secs(10);

/// Timeout for calls to Google's token endpoint.
const HTTP_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Parser)]
#[command(name = "gas-auth", version, about = "Google Apps Script OAuth token manager")]
struct Cli {
    /// Config file (default: ./gas-auth.toml, optional)
    #[arg(long, global = true, env = "CONFIG_PATH")]
    config: Option<PathBuf>,

    /// Log output format; logs always go to stderr
    #[arg(long, global = true, value_enum, default_value_t = LogFormat::Json)]
    log_format: LogFormat,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum LogFormat {
    Json,
    Pretty,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Authorize in the browser and store the granted tokens
    Login {
        /// Print the authorization URL instead of opening a browser
        #[arg(long)]
        no_browser: bool,
        /// Callback port (overrides callback.port)
        #[arg(long)]
        port: Option<u16>,
    },
    /// Show where tokens are stored and whether they are valid
    Status,
    /// Print a valid access token, refreshing it if needed
    Token,
    /// Print request headers as JSON
    Headers {
        /// Print the full bearer token instead of a prefix
        #[arg(long)]
        reveal: bool,
    },
    /// Delete stored tokens
    Logout,
    /// Run the local status API
    Serve {
        /// Listen address (overrides admin.listen_addr)
        #[arg(long)]
        listen: Option<SocketAddr>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.log_format);

    let (config_path, config) = Config::discover(cli.config.as_deref())
        .context("failed to load configuration")?;
    info!(path = %config_path.display(), "configuration loaded");

    match cli.command {
        Command::Login { no_browser, port } => login(&config, no_browser, port).await,
        Command::Status => status(&config).await,
        Command::Token => {
            let manager = build_manager(&config).await?;
            let token = manager
                .valid_access_token()
                .await
                .context("no valid access token; run `gas-auth login`")?;
            println!("{token}");
            Ok(())
        }
        Command::Headers { reveal } => headers(&config, reveal).await,
        Command::Logout => {
            let store = config.token_store().context("failed to locate token store")?;
            store.clear().await.context("failed to clear stored tokens")?;
            println!("Stored tokens removed from {}", store.locate().display());
            Ok(())
        }
        Command::Serve { listen } => serve(&config, listen).await,
    }
}

/// Initialize tracing with LOG_LEVEL / RUST_LOG support.
fn init_tracing(format: LogFormat) {
    let registry = tracing_subscriber::registry().with(
        EnvFilter::try_from_env("LOG_LEVEL")
            .or_else(|_| EnvFilter::try_from_default_env())
            .unwrap_or_else(|_| EnvFilter::new("info")),
    );
    match format {
        LogFormat::Json => registry
            .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
            .init(),
        LogFormat::Pretty => registry
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init(),
    }
}

async fn build_manager(config: &Config) -> Result<TokenManager> {
    let (client_id, client_secret) = config.credentials()?;
    let oauth = OAuthClient::new(client_id, client_secret).context("invalid OAuth client")?;
    let store = config.token_store().context("failed to locate token store")?;
    let http = reqwest::Client::builder()
        .timeout(HTTP_TIMEOUT)
        .build()
        .context("failed to build HTTP client")?;
    let manager = TokenManager::new(store, oauth, http, config.manager_options());
    if let Some(seed) = &config.oauth.refresh_token {
        manager
            .seed_refresh_token(seed.expose())
            .await
            .with_context(|| {
                format!("failed to seed token store from {}", crate::config::REFRESH_TOKEN_ENV)
            })?;
    }
    Ok(manager)
}

async fn login(config: &Config, no_browser: bool, port: Option<u16>) -> Result<()> {
    let manager = build_manager(config).await?;
    let mut flow = config.flow_config();
    if no_browser {
        flow.open_browser = false;
    }
    if let Some(port) = port {
        flow = flow.with_port(port);
    }

    let pending = match manager.start_authorization(flow).await {
        Ok(pending) => pending,
        Err(token_manager::Error::Authorization(e)) if e.is_port_in_use() => {
            anyhow::bail!("{e}; another login may already be waiting for its callback");
        }
        Err(e) => return Err(anyhow::Error::new(e).context("failed to start authorization")),
    };

    println!("Open this URL in your browser to authorize access:\n\n{}\n", pending.authorization_url());
    println!("Waiting for the redirect to {} ...", pending.redirect_uri());
    pending.present();

    let record = manager
        .complete_authorization(pending)
        .await
        .context("authorization failed")?;

    println!("Authorization complete. Tokens saved to {}", manager.store().locate().display());
    if record.refresh_token.is_some() {
        println!("A refresh token was granted; access tokens will be renewed automatically.");
    } else {
        println!(
            "No refresh token was granted. Revoke the app at https://myaccount.google.com/permissions \
             and run `gas-auth login` again to enable automatic renewal."
        );
    }
    Ok(())
}

async fn status(config: &Config) -> Result<()> {
    let store = config.token_store().context("failed to locate token store")?;
    let record = store.load().await.context("failed to read stored tokens")?;
    let info = TokenInfo::from_record(
        store.locate().to_path_buf(),
        record.as_ref(),
        common::now_millis(),
        Duration::from_secs(config.refresh.skew_secs),
    );
    println!("{}", serde_json::to_string_pretty(&info)?);
    Ok(())
}

async fn headers(config: &Config, reveal: bool) -> Result<()> {
    let manager = build_manager(config).await?;
    let headers = auth_headers(&manager)
        .await
        .context("no valid access token; run `gas-auth login`")?;

    let mut out = serde_json::Map::new();
    for (name, value) in &headers {
        let value = value.to_str().context("header value is not printable")?;
        let shown = match value.strip_prefix("Bearer ") {
            Some(token) if !reveal => format!(
                "Bearer {}",
                Secret::new(token.to_string()).preview(12)
            ),
            _ => value.to_string(),
        };
        out.insert(name.to_string(), serde_json::Value::String(shown));
    }
    println!("{}", serde_json::to_string_pretty(&out)?);
    Ok(())
}

async fn serve(config: &Config, listen: Option<SocketAddr>) -> Result<()> {
    let prometheus = metrics::install_recorder().context("failed to install Prometheus recorder")?;
    let manager = build_manager(config).await?;

    match manager.token_info().await {
        Ok(info) => {
            metrics::record_token_status(&info);
            info!(status = info.status, has_refresh_token = info.has_refresh_token, "token status");
        }
        Err(e) => warn!(error = %e, "could not read stored tokens"),
    }

    let app = build_admin_router(AdminState::new(manager, prometheus), config.admin.max_connections);
    let listen_addr = listen.unwrap_or(config.admin.listen_addr);
    let listener = TcpListener::bind(listen_addr)
        .await
        .with_context(|| format!("failed to bind to {listen_addr}"))?;
    info!(addr = %listen_addr, "status API listening");

    let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel::<()>();
    let server_handle = tokio::spawn(async move {
        axum::serve(listener, app)
            .with_graceful_shutdown(async {
                let _ = shutdown_rx.await;
            })
            .await
    });

    shutdown_signal().await;
    let _ = shutdown_tx.send(());

    // The drain timer starts at signal receipt
    match tokio::time::timeout(DRAIN_TIMEOUT, server_handle).await {
        Ok(Ok(Ok(()))) => info!("all in-flight requests drained"),
        Ok(Ok(Err(e))) => error!(error = %e, "server error during shutdown"),
        Ok(Err(e)) => error!(error = %e, "server task panicked"),
        Err(_) => warn!(
            drain_timeout_secs = DRAIN_TIMEOUT.as_secs(),
            "drain timeout exceeded, forcing shutdown"
        ),
    }

    info!("shutdown complete");
    Ok(())
}

/// Wait for SIGTERM or SIGINT.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("received SIGINT, shutting down"),
        _ = terminate => info!("received SIGTERM, shutting down"),
    }
}
