//! ChatRelay server binary

use chatrelay::auth::AuthState;
use chatrelay::cli::{Cli, Commands};
use chatrelay::config::Config;
use chatrelay::error::Result;
use chatrelay::gateway::{self, AppState};
use chatrelay::providers::ProviderRegistry;
use clap::Parser;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();

    let cli = Cli::parse();
    let config = Config::load(&cli.config)?;
    config.validate()?;

    match cli.command {
        Commands::Serve { bind } => serve(config, bind).await,
        Commands::Check => check(config),
    }
}

/// Initialize the tracing subscriber
///
/// `RUST_LOG` wins when set; the default keeps this crate at info.
fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("chatrelay=info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

/// Run the gateway server
async fn serve(config: Config, bind_override: Option<String>) -> Result<()> {
    if config.auth.session_secret.is_none() {
        tracing::warn!("CHATRELAY_SESSION_SECRET is not set; API requests will be rejected");
    }
    if config.auth.credentials.is_none() {
        tracing::warn!("CHATRELAY_USERS is not set; API requests will be rejected");
    }

    let registry = Arc::new(ProviderRegistry::from_config(&config.providers));
    let auth = Arc::new(AuthState::from_config(&config.auth)?);
    let state = AppState::from_config(&config, registry)?;
    let router = gateway::router(state, auth);

    let bind = bind_override.unwrap_or_else(|| config.server.bind.clone());
    let listener = tokio::net::TcpListener::bind(&bind).await?;
    tracing::info!(%bind, "ChatRelay listening");
    axum::serve(listener, router).await?;
    Ok(())
}

/// Validate the configuration and report what would run
fn check(config: Config) -> Result<()> {
    let registry = ProviderRegistry::from_config(&config.providers);
    println!("Configuration OK");
    println!("  bind: {}", config.server.bind);
    println!("  storage: {}", config.storage.resolve_path().display());
    println!("  upload limit: {} bytes", config.upload.max_bytes);
    println!(
        "  session secret: {}",
        if config.auth.session_secret.is_some() {
            "set"
        } else {
            "MISSING"
        }
    );
    println!(
        "  credentials: {}",
        if config.auth.credentials.is_some() {
            "set"
        } else {
            "MISSING"
        }
    );
    println!("  providers:");
    for key in registry.keys() {
        match registry.resolve(key, true) {
            Ok(provider) => println!(
                "    {} -> {} (secret {})",
                key,
                provider.endpoint(),
                if provider.secret.is_some() {
                    "set"
                } else {
                    "missing"
                }
            ),
            Err(e) => println!("    {} -> error: {}", key, e),
        }
    }
    Ok(())
}
