use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt::writer::BoxMakeWriter;

use narrator_core::config::{Config, GatewayConfig, LoggingConfig};
use narrator_gateway::{GatewayState, Pipeline};

#[derive(Parser)]
#[command(
    name = "narrator",
    about = "Webcam photos narrated by a wildlife documentary voice, over WebSocket",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Config file path (default: ~/.narrator/config.json)
    #[arg(short, long, global = true)]
    config: Option<String>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the WebSocket gateway
    Serve {
        /// Port to listen on (default: 8765)
        #[arg(long)]
        port: Option<u16>,

        /// Address to bind (default: 0.0.0.0)
        #[arg(long)]
        bind: Option<String>,
    },

    /// Configuration management
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Show the effective configuration, secrets redacted
    Show,
    /// Validate the configuration
    Check,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config_path = cli
        .config
        .map(PathBuf::from)
        .unwrap_or_else(Config::config_path);

    let mut config = Config::load_with_env(&config_path)
        .with_context(|| format!("Failed to load config from {}", config_path.display()))?;

    init_logging(&config.logging.clone().unwrap_or_default(), cli.verbose)?;

    match cli.command {
        Commands::Serve { port, bind } => {
            if port.is_some() || bind.is_some() {
                let gateway = config.gateway.get_or_insert_with(GatewayConfig::default);
                if let Some(port) = port {
                    gateway.port = port;
                }
                if let Some(bind) = bind {
                    gateway.bind = Some(bind);
                }
            }

            let (warnings, errors) = config.validate();
            for warning in &warnings {
                tracing::warn!("{warning}");
            }
            if !errors.is_empty() {
                for error in &errors {
                    tracing::error!("{error}");
                }
                anyhow::bail!("Configuration has {} error(s)", errors.len());
            }

            let port = config.gateway_port();
            tracing::info!(
                port,
                config = %config_path.display(),
                "Starting narrator gateway"
            );

            let pipeline = Pipeline::from_config(&config).await?;
            let state = Arc::new(GatewayState::new(Arc::new(config), pipeline));
            narrator_gateway::start_gateway(state, port).await?;
        }
        Commands::Config { action } => match action {
            ConfigAction::Show => {
                let json = serde_json::to_string_pretty(&redacted(&config))?;
                println!("{json}");
            }
            ConfigAction::Check => {
                let (warnings, errors) = config.validate();
                println!("Config: {}", config_path.display());
                for warning in &warnings {
                    println!("  warning: {warning}");
                }
                for error in &errors {
                    println!("  error: {error}");
                }
                if errors.is_empty() {
                    println!("OK ({} warning(s))", warnings.len());
                } else {
                    anyhow::bail!("Configuration has {} error(s)", errors.len());
                }
            }
        },
    }

    Ok(())
}

/// Build the `EnvFilter` directives: `RUST_LOG` wins, then `-v`, then config.
fn filter_directives(logging: &LoggingConfig, verbose: bool) -> String {
    let level = if verbose {
        "debug"
    } else {
        logging.level.as_deref().unwrap_or("info")
    };
    std::iter::once(level.to_string())
        .chain(logging.filters.iter().cloned())
        .collect::<Vec<_>>()
        .join(",")
}

fn init_logging(logging: &LoggingConfig, verbose: bool) -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(filter_directives(logging, verbose)))
        .context("Invalid log filter")?;

    let (writer, ansi) = match logging.output.as_str() {
        "stdout" => (BoxMakeWriter::new(std::io::stdout), true),
        "file" => {
            let path = logging.file_path();
            let file = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(&path)
                .with_context(|| format!("Cannot open log file {}", path.display()))?;
            (BoxMakeWriter::new(Mutex::new(file)), false)
        }
        _ => (BoxMakeWriter::new(std::io::stderr), true),
    };

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(writer)
        .with_ansi(ansi);

    if logging.format == "json" {
        builder.json().init();
    } else {
        builder.init();
    }
    Ok(())
}

/// Copy of `config` with API keys masked.
fn redacted(config: &Config) -> Config {
    let mut config = config.clone();
    if let Some(key) = config.vision.as_mut().and_then(|v| v.api_key.as_mut()) {
        *key = "***".into();
    }
    if let Some(key) = config.tts.as_mut().and_then(|t| t.api_key.as_mut()) {
        *key = "***".into();
    }
    config
}
