//! DPF DDNS Server Entry Point
//!
//! Runs the dynamic update gateway for zones hosted on the DNS Platform:
//! - UDP and TCP listener for RFC 2136 UPDATE messages
//! - Zone changes pushed through the platform's job-based REST API
//!
//! ## Usage
//!
//! ```bash
//! # Token from the environment, config from ~/.ddns.yml when present
//! DPF_TOKEN=... dpf-ddns
//!
//! # Explicit config file (TOML or YAML, chosen by extension)
//! dpf-ddns --config /etc/dpf-ddns.toml
//!
//! # Non-standard port (for testing without root)
//! dpf-ddns --listen 127.0.0.1:5353 --debug 1
//! ```
//!
//! ## Configuration
//!
//! Command line arguments override the config file. `--listen`,
//! `--endpoint`, `--token` and `--debug` also read `DPF_*` environment
//! variables.

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tracing::{error, info, Level};
use tracing_subscriber::FmtSubscriber;

use dpf_ddns::dns::{DdnsConfig, DnsServer, DpfClient, UpdateHandler};

/// Config file looked up in the home directory
const DEFAULT_CONFIG_FILE: &str = ".ddns.yml";

/// Dynamic DNS server for the DNS Platform
#[derive(Parser, Debug)]
#[command(name = "dpf-ddns")]
#[command(version)]
#[command(about = "Dynamic DNS Server for the DNS Platform", long_about = None)]
struct Args {
    /// Path to configuration file (default: $HOME/.ddns.yml)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// UDP and TCP listen address
    #[arg(long, env = "DPF_LISTEN")]
    listen: Option<SocketAddr>,

    /// Zone management API endpoint
    #[arg(long, env = "DPF_ENDPOINT")]
    endpoint: Option<String>,

    /// Zone management API token
    #[arg(long, env = "DPF_TOKEN", hide_env_values = true)]
    token: Option<String>,

    /// Log level 0=trace, 1=debug, 2=info, 3=error
    #[arg(long, env = "DPF_DEBUG", default_value_t = 2)]
    debug: u8,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let log_level = if args.verbose {
        Level::DEBUG
    } else {
        match args.debug {
            0 => Level::TRACE,
            1 => Level::DEBUG,
            2 => Level::INFO,
            _ => Level::ERROR,
        }
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(true)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .finish();

    tracing::subscriber::set_global_default(subscriber)
        .expect("Failed to set tracing subscriber");

    info!("Starting DPF DDNS Server v{}", env!("CARGO_PKG_VERSION"));

    let mut config = load_config(args.config.as_deref())?;

    // Override with command line arguments
    if let Some(listen) = args.listen {
        config.set_listen(listen);
    }
    if let Some(endpoint) = args.endpoint {
        config.api.endpoint = endpoint;
    }
    if let Some(token) = args.token {
        config.api.token = token;
    }

    config.validate()?;

    let client = Arc::new(DpfClient::new(&config.api, &config.jobs)?);
    let handler = Arc::new(UpdateHandler::new(client, &config.update));
    let server = DnsServer::new(config.clone(), handler)?;

    info!("DDNS server configuration:");
    info!("  UDP: {}", config.udp_addr);
    info!("  TCP: {}", config.tcp_addr);
    info!("  API: {}", config.api.endpoint);
    info!("  Update timeout: {}s", config.update.timeout_secs);

    tokio::select! {
        result = server.run() => {
            if let Err(e) = result {
                error!("DDNS server error: {}", e);
                std::process::exit(1);
            }
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Shutting down");
        }
    }

    Ok(())
}

/// Load the config file named on the command line, or the default one
/// from the home directory when it exists
fn load_config(path: Option<&Path>) -> anyhow::Result<DdnsConfig> {
    let path = match path {
        Some(path) => path.to_path_buf(),
        None => match default_config_path() {
            Some(path) if path.exists() => path,
            _ => return Ok(DdnsConfig::default()),
        },
    };

    let content = std::fs::read_to_string(&path)
        .with_context(|| format!("Failed to read config file {}", path.display()))?;
    info!("Using config file: {}", path.display());

    let config = match path.extension().and_then(|ext| ext.to_str()) {
        Some("toml") => DdnsConfig::from_toml(&content)?,
        _ => DdnsConfig::from_yaml(&content)?,
    };
    Ok(config)
}

fn default_config_path() -> Option<PathBuf> {
    dirs::home_dir().map(|home| home.join(DEFAULT_CONFIG_FILE))
}
