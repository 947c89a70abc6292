//! `provider-resilience` command line.
//!
//! Loads a provider configuration, builds the registry and either inspects
//! it, runs one operation through the fallback chain, or serves the health
//! monitor until interrupted.

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use serde::Serialize;
use serde_json::{json, Value};

use provider_resilience::config::{load_config, ProviderCategory};
use provider_resilience::health::ProviderHealthMonitor;
use provider_resilience::lifecycle::{self, signals, Shutdown};
use provider_resilience::observability;
use provider_resilience::providers::{ProviderError, SearchParams};

#[derive(Parser)]
#[command(name = "provider-resilience")]
#[command(about = "Inspect and exercise resilient upstream providers", long_about = None)]
struct Cli {
    /// Provider configuration file.
    #[arg(short, long, default_value = "providers.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print registrations and fallback chains
    Status,
    /// Probe every provider once
    Check,
    /// Search through the fallback chain
    Search {
        #[arg(long)]
        category: ProviderCategory,
        /// Search parameters as a JSON object
        #[arg(long)]
        params: String,
    },
    /// Fetch one item through the fallback chain
    Details {
        #[arg(long)]
        category: ProviderCategory,
        #[arg(long)]
        id: String,
    },
    /// Run the health monitor (and metrics exporter) until Ctrl+C
    Serve,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let config = match load_config(&cli.config) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error: {}", e);
            return ExitCode::FAILURE;
        }
    };

    if let Err(e) = observability::init_logging(&config.observability) {
        eprintln!("Error: failed to initialize logging: {}", e);
        return ExitCode::FAILURE;
    }
    tracing::info!(config = %cli.config.display(), providers = config.providers.len(), "Configuration loaded");

    match run(cli.command, config).await {
        Ok(code) => code,
        Err(e) => {
            tracing::error!(error = %e, "Command failed");
            eprintln!("Error: {}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(
    command: Commands,
    config: provider_resilience::AppConfig,
) -> Result<ExitCode, Box<dyn std::error::Error>> {
    let runtime = lifecycle::start(config).await?;
    let registry = runtime.registry.clone();

    match command {
        Commands::Status => {
            let categories = [ProviderCategory::Flight, ProviderCategory::Hotel, ProviderCategory::Transfer];
            let chains: serde_json::Map<String, Value> = categories
                .iter()
                .map(|c| (c.to_string(), json!(registry.get_fallback_chain(*c))))
                .collect();
            print_json(&json!({
                "registrations": registry.registrations(),
                "fallbackChains": chains,
                "metrics": registry.metrics().get_all_metrics(),
            }))?;
        }
        Commands::Check => {
            let monitor = ProviderHealthMonitor::new(registry, runtime.config.health_check.clone());
            let results = monitor.check_all().await;
            let all_healthy = results.iter().all(|r| r.healthy);
            print_json(&results)?;
            if !all_healthy {
                return Ok(ExitCode::FAILURE);
            }
        }
        Commands::Search { category, params } => {
            let params: SearchParams = serde_json::from_str(&params)?;
            let result = registry
                .try_with_fallback(category, |provider| {
                    let params = params.clone();
                    async move { provider.search(&params).await.into_result() }
                })
                .await;
            return finish(result, category);
        }
        Commands::Details { category, id } => {
            let result = registry
                .try_with_fallback(category, |provider| {
                    let id = id.clone();
                    async move { provider.get_details(&id).await.into_result() }
                })
                .await;
            return finish(result, category);
        }
        Commands::Serve => serve(runtime).await?,
    }
    Ok(ExitCode::SUCCESS)
}

async fn serve(runtime: lifecycle::Runtime) -> Result<(), Box<dyn std::error::Error>> {
    let metrics_config = &runtime.config.observability;
    if metrics_config.metrics_enabled {
        let addr = metrics_config.metrics_address.parse()?;
        observability::init_metrics(addr)?;
    }

    let shutdown = Shutdown::new();
    let monitor = Arc::new(ProviderHealthMonitor::new(
        runtime.registry.clone(),
        runtime.config.health_check.clone(),
    ));

    let health_task = tokio::spawn({
        let monitor = monitor.clone();
        let rx = shutdown.subscribe();
        async move { monitor.run(rx).await }
    });

    signals::shutdown_on_signal(shutdown).await;
    health_task.await?;
    tracing::info!("Shutdown complete");
    Ok(())
}

fn finish<T: Serialize>(
    result: Option<T>,
    category: ProviderCategory,
) -> Result<ExitCode, Box<dyn std::error::Error>> {
    match result {
        Some(value) => {
            print_json(&value)?;
            Ok(ExitCode::SUCCESS)
        }
        None => {
            eprintln!("Error: {}", ProviderError::AllProvidersExhausted(category));
            Ok(ExitCode::FAILURE)
        }
    }
}

fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<(), serde_json::Error> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
