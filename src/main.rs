use anyhow::{Context, Result};
use jobscout::api::{create_router, AppState};
use jobscout::auth::SessionStore;
use jobscout::config::load_or_default;
use jobscout::credentials::{CryptoBox, TokenStore};
use jobscout::dedup::{InMemoryLedger, ResultLedger, SqliteLedger};
use jobscout::oauth::{
    run_pending_cleanup, HttpIdentityProvider, IdentityProvider, OAuthCoordinator, PendingAuthStore,
};
use jobscout::search::{JsonFileSource, SearchPipeline};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

const DEFAULT_CANDIDATES_PATH: &str = "candidates.json";

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing subscriber
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "jobscout=info".into()),
        )
        .init();

    info!("jobscout starting...");

    let config_path =
        std::env::var("JOBSCOUT_CONFIG").unwrap_or_else(|_| "jobscout.toml".to_string());
    let config = load_or_default(&config_path)
        .with_context(|| format!("Failed to load configuration from {}", config_path))?;

    info!(
        bind_addr = %config.server.bind_addr,
        oauth_configured = config.oauth.has_client_credentials(),
        ledger = config.search.ledger_path.as_deref().unwrap_or("memory"),
        "Configuration loaded"
    );

    // Without a usable key the OAuth feature stays disabled
    let crypto = match CryptoBox::from_config(config.crypto.secret_key.as_deref()) {
        Ok(crypto) => crypto,
        Err(e) => {
            warn!(error = %e, "Invalid secret key, OAuth disabled");
            CryptoBox::disabled()
        }
    };
    if !crypto.is_enabled() {
        warn!("No secret key configured (set JOBSCOUT_SECRET_KEY), OAuth disabled");
    }

    let upstream_timeout = Duration::from_secs(config.oauth.upstream_timeout_seconds);
    let provider: Arc<dyn IdentityProvider> = Arc::new(HttpIdentityProvider::from_config(&config.oauth));
    let tokens = Arc::new(TokenStore::new(
        Arc::new(crypto),
        Arc::clone(&provider),
        upstream_timeout,
    ));

    let pending = PendingAuthStore::new(config.oauth.pending_auth_ttl()?);
    tokio::spawn(run_pending_cleanup(
        pending.clone(),
        config.oauth.cleanup_interval_seconds,
    ));

    let coordinator = Arc::new(OAuthCoordinator::new(
        &config.oauth,
        pending,
        tokens,
        provider,
    ));
    info!(enabled = coordinator.is_enabled(), "OAuth coordinator initialized");

    let ledger: Arc<dyn ResultLedger> = match &config.search.ledger_path {
        Some(path) => Arc::new(
            SqliteLedger::open(path).context("Failed to initialize result ledger")?,
        ),
        None => Arc::new(InMemoryLedger::new()),
    };

    let candidates_path = config
        .search
        .candidates_path
        .clone()
        .unwrap_or_else(|| DEFAULT_CANDIDATES_PATH.to_string());
    let source = Arc::new(JsonFileSource::new(&candidates_path));
    info!(path = %candidates_path, "Candidate source initialized");

    let search = Arc::new(SearchPipeline::new(source, ledger, config.search.clone()));

    let sessions = SessionStore::new(config.oauth.session_ttl()?);

    let router = create_router(AppState {
        coordinator,
        search,
        sessions,
    });
    let listener = tokio::net::TcpListener::bind(&config.server.bind_addr)
        .await
        .with_context(|| format!("Failed to bind {}", config.server.bind_addr))?;
    info!(addr = %config.server.bind_addr, "HTTP API listening");

    let server_handle = tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, router).await {
            tracing::error!(error = %e, "HTTP server error");
        }
    });

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for ctrl_c signal")?;
    info!("Shutdown signal received");

    server_handle.abort();
    info!("jobscout stopped");

    Ok(())
}
