mod args_parse;
mod server_metrics;
mod service;
mod service_configuration;
mod source;
mod store_processor;

#[cfg(test)]
mod service_test;

use std::{fs::read_to_string, net::SocketAddr, path::Path, process::ExitCode};

use crate::{
    args_parse::Args,
    server_metrics::init_metrics,
    service::Backends,
    service_configuration::{LoadConfiguration, ServiceConfiguration},
};

use anyhow::{Context, Result};
use clap::Parser;
use tokio::io::BufReader;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> ExitCode {
    // Initialize logging, RUST_LOG wins over the default level
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    match run().await {
        Ok(code) => code,
        Err(e) => {
            error!(error = format!("{:#}", e), "tweetamo-server failed");
            ExitCode::FAILURE
        }
    }
}

async fn run() -> Result<ExitCode> {
    // Parse command line arguments
    let args = Args::parse();

    // Load the configuration from the specified YAML file
    let config_content = read_to_string(Path::new(&args.config_file))
        .context(format!("Failed to read config file {}", args.config_file))?;
    let load_config: LoadConfiguration =
        serde_yaml::from_str(&config_content).context("Failed to parse config file")?;

    // Attempt to transform LoadConfiguration into ServiceConfiguration
    let mut service_config: ServiceConfiguration = load_config.try_into()?;

    // If `initial_position` is provided via command-line args, override the value from the config file
    if let Some(position) = args.initial_position {
        service_config.consumer.initial_position = position;
    }

    // If `prom_exporter` is provided via command-line args, override the value from the config file
    if let Some(prom_exporter) = args.prom_exporter {
        let prom_address: SocketAddr = prom_exporter.parse().context(format!(
            "Failed to parse into Socket address: {}",
            prom_exporter
        ))?;
        service_config.prom_exporter = Some(prom_address);
    }

    init_metrics(service_config.prom_exporter)?;

    let cancel = CancellationToken::new();
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("shutdown requested");
                cancel.cancel();
            }
        });
    }

    let backends = Backends::default();
    let report = if args.input == "-" {
        let input = BufReader::new(tokio::io::stdin());
        service::run(&service_config, &backends, input, "stdin", cancel).await?
    } else {
        let file = tokio::fs::File::open(&args.input)
            .await
            .context(format!("Failed to open input {}", args.input))?;
        service::run(&service_config, &backends, BufReader::new(file), &args.input, cancel)
            .await?
    };

    Ok(report.exit_code())
}
