//! Baton CLI

use anyhow::{Context, Result};
use baton_config::{load_config, Config, ProbeConfig};
use baton_health::{check_fn, Check, CheckError, Health, HealthOptions, HealthStatus, ProbeSpec};
use baton_runtime::prelude::*;
use baton_runtime::{NotFound, StateView, TlsAcceptor};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Parser)]
#[command(name = "baton")]
#[command(about = "Baton lifecycle controller", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Serve until an exit signal; SIGHUP upgrades in place
    Serve {
        /// Path to configuration file
        #[arg(short, long, default_value = "baton.yaml", env = "BATON_CONFIG")]
        config: PathBuf,

        /// Log level (trace, debug, info, warn, error), overrides the config
        #[arg(short, long)]
        log_level: Option<String>,
    },

    /// Validate configuration file
    Validate {
        /// Path to configuration file
        #[arg(short, long, default_value = "baton.yaml", env = "BATON_CONFIG")]
        config: PathBuf,
    },

    /// Show version information
    Version,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Serve { config, log_level } => serve(config, log_level).await,

        Commands::Validate { config } => {
            tracing_subscriber::fmt().with_target(false).init();

            tracing::info!("Validating configuration: {}", config.display());

            match load_config(&config) {
                Ok(cfg) => {
                    tracing::info!("✓ Configuration is valid");
                    for server in &cfg.servers {
                        tracing::info!("  Server {}: {}", server.name, server.descriptor());
                    }
                    tracing::info!("  Readiness probe: {}", cfg.health.readiness.enabled);
                    tracing::info!("  Liveness probe: {}", cfg.health.liveness.enabled);
                    Ok(())
                }
                Err(e) => {
                    tracing::error!("✗ Configuration validation failed: {}", e);
                    std::process::exit(1);
                }
            }
        }

        Commands::Version => {
            println!("Baton lifecycle controller");
            println!("Version: {}", env!("CARGO_PKG_VERSION"));
            println!("Rust version: {}", env!("CARGO_PKG_RUST_VERSION"));
            Ok(())
        }
    }
}

async fn serve(path: PathBuf, log_level: Option<String>) -> Result<()> {
    let config = load_config(&path)
        .with_context(|| format!("failed to load {}", path.display()))?;

    let level = log_level.unwrap_or_else(|| config.logging.level.clone());
    init_tracing(&level, &config.logging.format)?;

    tracing::info!(
        config = %path.display(),
        servers = config.servers.len(),
        pid = std::process::id(),
        "Starting Baton"
    );

    let status = HealthStatus::new();
    let registry = build_registry(&config, &status)?;

    let upgrader = Arc::new(Upgrader::new(UpgraderOptions {
        pid_file: config.upgrade.pid_file.clone(),
        upgrade_timeout: config.upgrade.upgrade_timeout,
        executable: None,
        args: None,
    })?);
    let coordinator = UpgradeCoordinator::new(
        registry,
        upgrader.clone(),
        CoordinatorOptions {
            network: config.upgrade.network()?,
            shutdown_timeout: config.upgrade.shutdown_timeout,
        },
    );
    let health = Health::start_with_status(
        health_options(&config, coordinator.state_view()),
        status,
    )?;
    let triggers = SignalTriggers::new().context("failed to install signal handlers")?;

    let run = coordinator.run(triggers);
    tokio::pin!(run);

    if config.health.wait_before_continue {
        let gate = health.wait_until_ready_and_healthy(config.health.max_waiting_time);
        tokio::select! {
            result = run.as_mut() => {
                health.stop();
                return result.map_err(Into::into);
            }
            gated = gate => {
                if let Err(e) = gated {
                    tracing::error!(error = %e, "Readiness gate failed, exiting");
                    upgrader.stop();
                    if let Err(drain) = run.as_mut().await {
                        tracing::warn!(error = %drain, "Shutdown after gate failure was incomplete");
                    }
                    health.stop();
                    return Err(e.into());
                }
            }
        }
    }

    let result = run.as_mut().await;
    health.stop();
    health.wait_stopped().await;
    result?;

    tracing::info!("Baton stopped");
    Ok(())
}

fn health_options(config: &Config, generation: StateView) -> HealthOptions {
    let readiness_check = serving_check(generation);
    let liveness_check = check_fn(|_ctx| async { Ok::<(), CheckError>(()) });

    HealthOptions {
        wait_before_continue: config.health.wait_before_continue,
        max_waiting_time: config.health.max_waiting_time,
        readiness: probe_spec(&config.health.readiness, readiness_check),
        liveness: probe_spec(&config.health.liveness, liveness_check),
    }
}

fn probe_spec(config: &ProbeConfig, check: Arc<dyn Check>) -> ProbeSpec {
    let spec = if config.enabled {
        ProbeSpec::enabled(config.endpoint.clone(), check)
    } else {
        ProbeSpec::disabled(config.endpoint.clone())
    };
    spec.thresholds(config.success_threshold, config.failure_threshold)
        .timing(config.initial_delay, config.period, config.check_timeout)
}

/// Ready once this generation's own accept loops run.
///
/// Connecting to a listener address is not enough: with `SO_REUSEPORT` the
/// predecessor's socket can answer for it.
fn serving_check(generation: StateView) -> Arc<dyn Check> {
    check_fn(move |_ctx| {
        let state = generation.get();
        async move {
            if state.is_serving() {
                Ok(())
            } else {
                Err::<(), CheckError>(format!("generation is {state}").into())
            }
        }
    })
}

fn build_registry(config: &Config, status: &HealthStatus) -> Result<ServerRegistry> {
    let handler: Arc<dyn Handler> = Arc::new(HealthHandler::new(
        status.clone(),
        config.health.readiness.endpoint.clone(),
        config.health.liveness.endpoint.clone(),
        Arc::new(NotFound),
    ));

    let mut registry = ServerRegistry::new();
    for server in &config.servers {
        let mut http = HttpServer::new(server.name.clone(), Arc::clone(&handler))
            .listen(server.descriptor());
        if let Some(tls) = &server.tls {
            http = http.tls(TlsAcceptor::new(tls)?);
        }
        registry.register(Arc::new(http))?;
    }
    Ok(registry)
}

fn init_tracing(level: &str, format: &str) -> Result<()> {
    let filter = EnvFilter::try_from_default_env().or_else(|_| EnvFilter::try_new(level))?;
    let registry = tracing_subscriber::registry().with(filter);

    match format {
        "json" => registry
            .with(tracing_subscriber::fmt::layer().json().with_target(false))
            .init(),
        _ => registry
            .with(
                tracing_subscriber::fmt::layer()
                    .with_target(false)
                    .with_level(true),
            )
            .init(),
    }

    Ok(())
}
