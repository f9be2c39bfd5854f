use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde::{Deserialize, Serialize};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use events::EventBus;
use incident_core::GraphRegistry;
use orchestrator::services::BackendClient;
use orchestrator::{ExecutorConfig, IncidentExecutor, PollerConfig};

mod audio;
mod render;

const CONFIG_FILE: &str = "aegis.toml";
const DEFAULT_BACKEND_URL: &str = "http://localhost:8000";

#[derive(Parser)]
#[command(name = "aegis-console")]
#[command(about = "Incident-response console for campus evacuation", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Base URL of the evacuation backend.
    #[arg(long)]
    backend_url: Option<String>,

    /// Path to the configuration file.
    #[arg(long, default_value = CONFIG_FILE)]
    config: PathBuf,
}

#[derive(Subcommand)]
enum Commands {
    /// Write a default configuration file and exit.
    Init,
    /// Run the console (the default when no subcommand is given).
    Run,
}

#[derive(Debug, Serialize, Deserialize)]
struct ConsoleConfig {
    backend: BackendConfig,
    polling: PollingConfig,
    alerts: AlertConfig,
}

#[derive(Debug, Serialize, Deserialize)]
struct BackendConfig {
    url: String,
}

#[derive(Debug, Serialize, Deserialize)]
struct PollingConfig {
    world_interval_ms: u64,
    session_interval_ms: u64,
}

#[derive(Debug, Serialize, Deserialize)]
struct AlertConfig {
    /// Directory where synthesized alert audio is written.
    audio_dir: PathBuf,
}

impl Default for ConsoleConfig {
    fn default() -> Self {
        Self {
            backend: BackendConfig {
                url: DEFAULT_BACKEND_URL.to_string(),
            },
            polling: PollingConfig {
                world_interval_ms: 2000,
                session_interval_ms: 1000,
            },
            alerts: AlertConfig {
                audio_dir: PathBuf::from("alerts"),
            },
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Some(Commands::Init) => init_config(&cli.config).await,
        Some(Commands::Run) | None => run(&cli).await,
    }
}

async fn init_config(path: &PathBuf) -> Result<()> {
    if path.exists() {
        println!("Configuration already exists at {}", path.display());
        return Ok(());
    }

    let content = toml::to_string_pretty(&ConsoleConfig::default())?;
    tokio::fs::write(path, content).await?;

    println!("Wrote default configuration to {}", path.display());
    println!();
    println!("Next steps:");
    println!("  1. Point [backend].url at the evacuation backend");
    println!("  2. Run 'aegis-console' to start monitoring");
    Ok(())
}

async fn load_config(cli: &Cli) -> Result<ConsoleConfig> {
    let mut config = if cli.config.exists() {
        let content = tokio::fs::read_to_string(&cli.config)
            .await
            .with_context(|| format!("Failed to read {}", cli.config.display()))?;
        toml::from_str(&content)
            .with_context(|| format!("Failed to parse {}", cli.config.display()))?
    } else {
        ConsoleConfig::default()
    };

    if let Some(url) = &cli.backend_url {
        config.backend.url = url.clone();
    }
    Ok(config)
}

async fn run(cli: &Cli) -> Result<()> {
    init_tracing();

    let config = load_config(cli).await?;
    tracing::info!("Backend: {}", config.backend.url);

    let registry = Arc::new(GraphRegistry::campus().context("Failed to load campus graph")?);
    let backend = Arc::new(
        BackendClient::new(&config.backend.url).context("Failed to build backend client")?,
    );
    let bus = EventBus::new();

    let audio_sink = audio::spawn_alert_sink(
        bus.subscribe(),
        backend.clone(),
        config.alerts.audio_dir.clone(),
    );

    let executor_config = ExecutorConfig {
        poller: PollerConfig {
            world_interval: Duration::from_millis(config.polling.world_interval_ms),
            session_interval: Duration::from_millis(config.polling.session_interval_ms),
        },
    };
    let (handle, executor) =
        IncidentExecutor::spawn(backend, registry, bus.clone(), executor_config);

    println!();
    println!("Aegis Console");
    println!("════════════════════════════════════════");
    println!();
    println!("  Backend:  {}", config.backend.url);
    println!();
    println!("Press Ctrl+C to stop");
    println!();

    let mut views = handle.watch_view();
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("Shutting down");
                break;
            }
            changed = views.changed() => {
                if changed.is_err() {
                    break;
                }
                let view = views.borrow_and_update().clone();
                println!("{}", render::render(&view));
            }
        }
    }

    handle.shutdown().await.ok();
    executor.await.ok();
    audio_sink.abort();
    Ok(())
}

fn init_tracing() {
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "aegis_console=info,orchestrator=info".into()),
        )
        .init();
}
