mod api;
mod auth;

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use shopguard_config::{
    config_dir, config_file_path, load_and_prepare, redact, ShopGuardConfig,
};
use shopguard_core::{CounterStore, Decision};
use shopguard_ratelimit::{RateLimiter, RetentionSweeper, SqliteCounterStore, DEFAULT_CALL_TIMEOUT};

use api::AppState;

#[derive(Parser)]
#[command(name = "shopguard")]
#[command(about = "ShopGuard: persistent rate limiting for storefront actions")]
#[command(version)]
struct Cli {
    /// Config file (defaults to ~/.shopguard/config.yaml)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP API server
    Serve {
        /// Port to bind the HTTP server to
        #[arg(short, long)]
        port: Option<u16>,
    },
    /// Delete counters older than the retention period
    Sweep {
        /// Override the configured retention, in hours
        #[arg(long)]
        retention_hours: Option<u64>,
    },
    /// Check and record one attempt, as a storefront handler would
    Check {
        /// Caller identity (client IP, email, account id)
        identity: String,
        /// Action key, e.g. sign-in/email
        action: String,
    },
    /// List the effective policy table
    Policies,
    /// Print the effective config with secrets masked
    Config {
        /// Write the effective config to the config file
        #[arg(long)]
        init: bool,
    },
    /// Query a running server's health endpoint
    Status,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let path = cli
        .config
        .clone()
        .unwrap_or_else(|| config_file_path(&config_dir()));

    let loaded = load_and_prepare(&path)
        .await
        .with_context(|| format!("Failed to load config from {}", path.display()))?;
    let config = loaded.config.clone();

    shopguard_logging::init_logger(
        &config.logging.level,
        config.logging.dir.as_deref().map(Path::new),
        config.logging.json,
    );
    for warning in &loaded.warnings {
        warn!(path = %warning.path, message = %warning.message, "Config warning");
    }

    match cli.command {
        Commands::Serve { port } => {
            let mut config = config;
            if let Some(port) = port {
                config.server.port = port;
            }
            run_server(config).await?;
        }
        Commands::Sweep { retention_hours } => {
            let retention = sweep_retention(retention_hours, &config)?;
            let store = open_store(&config)?;
            let deleted = RetentionSweeper::new(store).sweep(retention).await?;
            println!("Deleted {deleted} counter(s) older than {}h", retention.as_secs() / 3600);
        }
        Commands::Check { identity, action } => {
            let Some((policy, _mode)) = config.policy(&action) else {
                anyhow::bail!("no policy configured for action '{action}'");
            };
            let store = open_store(&config)?;
            let decision = limiter_for(store, &config)
                .check_and_record(&identity, &policy)
                .await?;
            match decision {
                Decision::Allowed { remaining } => {
                    println!("allowed ({remaining} remaining in this window)")
                }
                Decision::Denied { .. } => println!(
                    "denied: {}",
                    decision.wait_message().unwrap_or_default()
                ),
            }
        }
        Commands::Policies => {
            for (action, p) in &config.policies {
                println!(
                    "{action:<24} {:>3} per {:>5}s  failure-mode: {:?}",
                    p.max_count, p.window_seconds, p.failure_mode
                );
            }
        }
        Commands::Config { init } => {
            if init {
                loaded.write_to(&path).await?;
                println!("Wrote {}", path.display());
            }
            let value = serde_json::to_value(&config)?;
            print!("{}", serde_yaml::to_string(&redact(&value))?);
        }
        Commands::Status => {
            let url = format!("http://localhost:{}/api/health", config.server.port);
            let client = reqwest::Client::new();
            match client.get(&url).send().await {
                Ok(resp) => {
                    let status = resp.status();
                    let body: serde_json::Value = resp.json().await?;
                    println!("{status}");
                    println!("{}", serde_json::to_string_pretty(&body)?);
                }
                Err(_) => {
                    println!("ShopGuard is not running on port {}", config.server.port);
                }
            }
        }
    }

    Ok(())
}

/// Retention for one sweep pass. A zero override would delete every counter,
/// active lockouts included, so it is refused like a zero in the config.
fn sweep_retention(override_hours: Option<u64>, config: &ShopGuardConfig) -> Result<Duration> {
    match override_hours {
        Some(0) => anyhow::bail!("--retention-hours must be greater than zero"),
        Some(hours) => Ok(Duration::from_secs(hours.saturating_mul(3600))),
        None => Ok(config.retention()),
    }
}

fn open_store(config: &ShopGuardConfig) -> Result<Arc<dyn CounterStore>> {
    let store = SqliteCounterStore::open(&config.store.path, config.store_timeout())
        .with_context(|| format!("Failed to open counter store at {}", config.store.path))?;
    Ok(Arc::new(store))
}

/// The async call bound must outlast the store's own lock wait so a busy
/// store reports its own timeout first.
fn limiter_for(store: Arc<dyn CounterStore>, config: &ShopGuardConfig) -> RateLimiter {
    RateLimiter::new(store)
        .with_call_timeout(DEFAULT_CALL_TIMEOUT.max(config.store_timeout() * 2))
}

async fn run_server(config: ShopGuardConfig) -> Result<()> {
    info!(
        addr = %config.bind_addr(),
        db = %config.store.path,
        policies = config.policies.len(),
        sweep_trigger = config.sweep.trigger_secret.is_some(),
        "Starting ShopGuard"
    );

    let store = open_store(&config)?;
    let config = Arc::new(config);
    let app_state = Arc::new(AppState {
        limiter: limiter_for(Arc::clone(&store), &config),
        ..AppState::new(store, Arc::clone(&config))
    });

    let app = api::build_router(app_state).layer(TraceLayer::new_for_http());
    let addr = config.bind_addr();
    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {addr}"))?;
    info!(addr = %addr, "HTTP API listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("ShopGuard stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
