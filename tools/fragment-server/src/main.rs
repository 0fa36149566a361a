//! Fragment server - demo storefront API behind the fragment cache.
//!
//! Commands:
//! - `fragment-server serve` - Serve the demo API (default)
//! - `fragment-server config` - Print the effective configuration
//! - `fragment-server routes` - List cacheable fragments

mod app;
mod config;

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use fragment_cache::{LogFormat, MemoryStore};
use fragment_core::FragmentType;
use tracing::{info, warn};

use config::ServerConfig;

/// Fragment server - demo storefront API behind the fragment cache
#[derive(Parser)]
#[command(name = "fragment-server")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Config file path
    #[arg(short, long, global = true)]
    config: Option<String>,

    /// Use JSON log output
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Serve the demo API
    Serve {
        /// Override the listen address
        #[arg(short, long)]
        listen: Option<String>,
    },

    /// Print the effective configuration as TOML
    Config,

    /// List cacheable fragments
    Routes,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = ServerConfig::load(cli.config.as_deref())?;
    if cli.json {
        config.fragment_cache.logging.format = LogFormat::Json;
    }

    match cli.command.unwrap_or(Commands::Serve { listen: None }) {
        Commands::Serve { listen } => {
            if let Some(listen) = listen {
                config.server.listen = listen;
            }
            serve(config).await
        }
        Commands::Config => {
            print!("{}", config.to_toml()?);
            Ok(())
        }
        Commands::Routes => {
            let registry = app::registry();
            for ty in [FragmentType::Api, FragmentType::Block] {
                for name in registry.names(ty) {
                    println!("{:<6} {}", ty, name);
                }
            }
            Ok(())
        }
    }
}

async fn serve(config: ServerConfig) -> Result<()> {
    fragment_cache::telemetry::init(&config.fragment_cache.logging)?;

    let cache_config = &config.fragment_cache;
    let store = Arc::new(MemoryStore::new(cache_config.memory_capacity_non_zero()));
    let router = app::build(cache_config, store);

    let listener = tokio::net::TcpListener::bind(&config.server.listen)
        .await
        .with_context(|| format!("Failed to bind {}", config.server.listen))?;
    info!(
        listen = %config.server.listen,
        namespace = %cache_config.namespace,
        enabled = cache_config.enabled,
        "fragment server listening"
    );

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        warn!(error = %err, "failed to listen for ctrl-c");
        std::future::pending::<()>().await;
    }
    info!("shutting down");
}
