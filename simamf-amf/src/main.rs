//! simamf - simulated AMF
//!
//! Listens for one access node, answers its NG-C procedures and runs
//! subscribers from registration through deregistration.
//!
//! # Usage
//!
//! ```bash
//! simamf -c config/simamf.yaml --log-level debug
//! ```

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use simamf_common::{init_logging, load_config, LogLevel, SimConfig};
use tokio::signal;
use tracing::{error, info};

use simamf_amf::{SimAmf, UdpAssociation};

/// simamf - simulated AMF for NG-C procedure testing
#[derive(Parser, Debug)]
#[command(name = "simamf")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to the configuration file (YAML); built-in defaults when omitted
    #[arg(short = 'c', long = "config", value_name = "FILE")]
    config_file: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short = 'l', long = "log-level", default_value_t = LogLevel::Info)]
    log_level: LogLevel,
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();
    init_logging(args.log_level);

    match run(args).await {
        Ok(()) => {
            info!("simamf exited successfully");
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!("simamf failed: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(args: Args) -> Result<()> {
    let config = match &args.config_file {
        Some(path) => {
            info!("Loading configuration from: {}", path.display());
            load_config(path)
                .with_context(|| format!("Failed to load configuration from {}", path.display()))?
        }
        None => SimConfig::default(),
    };
    config.validate().context("Invalid configuration")?;
    info!(
        "Configuration loaded: AMF {}, listen {}, integrity NIA{} ciphering NEA{}",
        config.amf.name,
        config.transport.listen_addr,
        config.security.integrity,
        config.security.ciphering
    );

    let association = UdpAssociation::bind(&config.transport)
        .await
        .with_context(|| format!("Failed to bind {}", config.transport.listen_addr))?;
    let amf = SimAmf::new(config, Arc::new(association));

    tokio::select! {
        result = amf.run() => result.context("Association failed"),
        _ = signal::ctrl_c() => {
            info!("Received Ctrl+C, shutting down");
            Ok(())
        }
    }
}
