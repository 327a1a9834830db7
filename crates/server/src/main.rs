//! Stevedore registry server binary.

use anyhow::{Context, Result};
use clap::Parser;
use figment::Figment;
use figment::providers::{Env, Format, Toml};
use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;
use stevedore_core::config::AppConfig;
use stevedore_metadata::InMemoryMetadataStore;
use stevedore_server::{AppState, create_router};
use stevedore_signer::TrustKey;
use stevedore_storage::{Registry, RegistryOptions};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Stevedore - a container image registry
#[derive(Parser, Debug)]
#[command(name = "stevedored")]
#[command(version, about, long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(
        short,
        long,
        env = "STEVEDORE_CONFIG",
        default_value = "config/registry.toml"
    )]
    config: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Stevedore v{}", env!("CARGO_PKG_VERSION"));

    // Load configuration; the file is optional, env vars can provide or
    // override everything.
    let mut figment = Figment::new();
    if Path::new(&args.config).exists() {
        tracing::info!(config_path = %args.config, "Loading configuration from file");
        figment = figment.merge(Toml::file(&args.config));
    } else {
        tracing::debug!("No config file found at {}", args.config);
    }
    let config: AppConfig = figment
        .merge(Env::prefixed("STEVEDORE_").split("__"))
        .extract()
        .context("failed to load configuration")?;

    stevedore_server::metrics::register_metrics();

    let driver = stevedore_storage::from_config(&config.storage)
        .await
        .context("failed to initialize storage driver")?;
    tracing::info!(driver = driver.name(), "Storage driver initialized");

    // A durable metadata backend slots in behind the same trait; until one
    // is configured the repository metadata lives in memory.
    let metadata = InMemoryMetadataStore::new();
    tracing::warn!("Using in-memory metadata store; repository metadata is lost on restart");

    let trust_key = load_trust_key(&config).await?;

    let registry = Registry::new(
        driver,
        metadata,
        RegistryOptions::from(&config.registry),
        Some(Arc::new(trust_key)),
    );

    let addr: SocketAddr = config
        .server
        .bind
        .parse()
        .context("invalid bind address")?;

    let state = AppState::new(config, registry);
    let app = create_router(state);

    tracing::info!("Listening on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind to {addr}"))?;
    axum::serve(listener, app).await?;

    Ok(())
}

/// Load the schema1 trust key, generating (and persisting, when a path is
/// configured) one if absent.
async fn load_trust_key(config: &AppConfig) -> Result<TrustKey> {
    match &config.signing.key_file {
        Some(path) if path.exists() => {
            let encoded = tokio::fs::read_to_string(path)
                .await
                .with_context(|| format!("failed to read trust key: {}", path.display()))?;
            let key = TrustKey::from_base64(&encoded).context("failed to parse trust key")?;
            tracing::info!(key_id = %key.key_id(), "Loaded trust key");
            Ok(key)
        }
        Some(path) => {
            let key = TrustKey::generate();
            if let Some(parent) = path.parent() {
                tokio::fs::create_dir_all(parent).await?;
            }
            tokio::fs::write(path, key.to_base64())
                .await
                .with_context(|| format!("failed to write trust key: {}", path.display()))?;
            tracing::info!(key_id = %key.key_id(), path = %path.display(), "Generated trust key");
            Ok(key)
        }
        None => {
            tracing::warn!("No trust key file configured, generating ephemeral key");
            Ok(TrustKey::generate())
        }
    }
}
