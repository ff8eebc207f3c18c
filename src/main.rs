use anyhow::{bail, Context, Result};
use std::sync::Arc;
use tracing::{error, info, warn};
use vitals::api::{create_router, AppState};
use vitals::config::{self, StorageBackend, StorageConfig};
use vitals::credentials::{generate_key, EncryptedStore, JsonFileStore, TokenStore};
use vitals::oauth::{configured_providers, run_state_cleanup, StateManager};
use vitals::token::{Refresher, TokenAccessor};

fn open_store(storage: &StorageConfig) -> Result<Arc<dyn TokenStore>> {
    match storage.backend {
        StorageBackend::Json => {
            let store = JsonFileStore::new(&storage.directory)
                .context("Failed to initialize JSON token store")?;
            Ok(Arc::new(store))
        }
        StorageBackend::Encrypted => {
            let encryption_key = match std::env::var("VITALS_ENCRYPTION_KEY") {
                Ok(key) => key,
                Err(_) => {
                    error!(
                        example_key = %generate_key(),
                        "VITALS_ENCRYPTION_KEY is not set; export a base64-encoded 32-byte key such as the one shown"
                    );
                    bail!("VITALS_ENCRYPTION_KEY is required for the encrypted backend");
                }
            };
            let store = EncryptedStore::new(&storage.database, &encryption_key)
                .context("Failed to initialize encrypted token store")?;
            let slots = store.list_slots().context("Failed to list stored slots")?;
            info!(database = %storage.database, slots = ?slots, "Encrypted token store opened");
            Ok(Arc::new(store))
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing subscriber
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "vitals=info".into()),
        )
        .init();

    info!("Vitals starting...");

    let config = config::load_from_env()?;

    info!(
        bind = %config.server.bind,
        callback_base_url = %config.server.callback_base_url,
        backend = ?config.storage.backend,
        expiry_margin_seconds = config.tokens.expiry_margin_seconds,
        "Configuration loaded"
    );

    let store = open_store(&config.storage)?;
    info!("Token store initialized");

    let refresher = Refresher::new(config.tokens.http_timeout())?;
    let accessor = Arc::new(TokenAccessor::new(
        store,
        refresher,
        config.tokens.expiry_margin(),
    ));

    let providers = configured_providers(&config);
    if providers.is_empty() {
        warn!("No OAuth providers configured (set VITALS_OAUTH_<NAME>_CLIENT_ID and _CLIENT_SECRET)");
    }
    for provider in &providers {
        info!(
            provider = %provider.name,
            slot = %provider.slot,
            state = ?accessor.state(&provider.slot),
            "Provider configured"
        );
    }

    let state_manager = StateManager::new(config.tokens.state_expiry_seconds);
    tokio::spawn(run_state_cleanup(
        state_manager.clone(),
        config.tokens.state_cleanup_interval_seconds,
    ));

    let app_state = AppState::new(
        accessor,
        providers,
        state_manager,
        config.server.callback_base_url.clone(),
        config.server.api_token.clone(),
    );
    let router = create_router(app_state);

    let listener = tokio::net::TcpListener::bind(&config.server.bind)
        .await
        .with_context(|| format!("Failed to bind {}", config.server.bind))?;
    info!(bind = %config.server.bind, "Vitals API listening");

    let server_handle = tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, router).await {
            error!(error = %e, "API server error");
        }
    });

    // Wait for shutdown signal
    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for ctrl_c signal")?;
    info!("Shutdown signal received");

    server_handle.abort();
    info!("Vitals stopped");

    Ok(())
}
