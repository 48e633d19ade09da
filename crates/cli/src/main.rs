use std::path::PathBuf;

use {
    clap::{Parser, Subcommand},
    tracing::{error, info},
    tracing_subscriber::EnvFilter,
};

use {
    mudgate_config::{MudgateConfig, Severity},
    mudgate_gateway::Gateway,
};

#[derive(Parser)]
#[command(name = "mudgate", about = "mudgate — Intermud-3 to JSON-RPC gateway")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Path to the config file (defaults to ./mudgate.toml).
    #[arg(short, long, global = true, env = "MUDGATE_CONFIG")]
    config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    /// Output logs as JSON instead of human-readable.
    #[arg(long, global = true, default_value_t = false)]
    json_logs: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the gateway (default when no subcommand is provided).
    Gateway,
    /// Validate the configuration and exit.
    CheckConfig,
}

fn init_logging(cli: &Cli) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(cli.log_level.clone()));
    if cli.json_logs {
        tracing_subscriber::fmt().with_env_filter(filter).json().init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}

fn load_config(cli: &Cli) -> anyhow::Result<MudgateConfig> {
    match &cli.config {
        Some(path) => Ok(mudgate_config::load_config(path)?),
        None => Ok(mudgate_config::discover_and_load()),
    }
}

/// Returns false when the configuration cannot run.
fn report_diagnostics(config: &MudgateConfig) -> bool {
    let diagnostics = mudgate_config::validate(config);
    let mut ok = true;
    for diagnostic in &diagnostics {
        match diagnostic.severity {
            Severity::Error => {
                error!(path = %diagnostic.path, "config error: {}", diagnostic.message);
                ok = false;
            },
            Severity::Warning => {
                tracing::warn!(path = %diagnostic.path, "config warning: {}", diagnostic.message);
            },
        }
    }
    ok
}

async fn run_gateway(config: MudgateConfig) -> anyhow::Result<()> {
    let gateway = Gateway::build(config);

    // Graceful shutdown on SIGINT/SIGTERM.
    {
        let gateway_core = std::sync::Arc::clone(&gateway.core);
        tokio::spawn(async move {
            shutdown_signal().await;
            info!("shutdown signal received");
            gateway_core.cancel.cancel();
        });
    }

    gateway.run().await
}

async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};
        let mut term = match signal(SignalKind::terminate()) {
            Ok(term) => term,
            Err(_) => return tokio::signal::ctrl_c().await.unwrap_or(()),
        };
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {},
            _ = term.recv() => {},
        }
    }
    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging(&cli);

    let config = load_config(&cli)?;

    match cli.command.unwrap_or(Commands::Gateway) {
        Commands::CheckConfig => {
            if report_diagnostics(&config) {
                info!("configuration is valid");
                Ok(())
            } else {
                anyhow::bail!("configuration has errors");
            }
        },
        Commands::Gateway => {
            if !report_diagnostics(&config) {
                anyhow::bail!("refusing to start with configuration errors");
            }
            info!(
                mud_name = %config.mud.name,
                routers = config.routers.len(),
                "starting mudgate"
            );
            run_gateway(config).await
        },
    }
}
