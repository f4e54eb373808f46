//! cluster-dns binary entry point.

use clap::Parser;
use cluster_dns::{telemetry, Config, DnsServer};
use std::path::PathBuf;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

/// Authoritative DNS server over orchestrator cluster state.
#[derive(Parser, Debug)]
#[command(name = "cluster-dns")]
#[command(version, about, long_about = None)]
struct Args {
    /// Path to configuration file (TOML).
    #[arg(short, long, default_value = "cluster-dns.toml")]
    config: PathBuf,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    // Load configuration
    let config: Config = config::Config::builder()
        .add_source(config::File::from(args.config.clone()))
        .add_source(
            config::Environment::with_prefix("CLUSTER_DNS")
                .separator("__")
                .try_parsing(true),
        )
        .build()?
        .try_deserialize()?;

    // Initialize telemetry
    telemetry::init(&config.telemetry).map_err(|e| e as Box<dyn std::error::Error>)?;

    info!(
        config_file = %args.config.display(),
        listen_addr = %config.dns.listen_addr,
        cluster_domain = %config.dns.domain(),
        "starting cluster-dns"
    );

    // Graceful shutdown on SIGINT
    let shutdown = CancellationToken::new();
    let signal_token = shutdown.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("shutdown signal received");
            signal_token.cancel();
        }
    });

    let server = DnsServer::new(config.dns);
    let result = server.run(shutdown).await;

    if let Err(e) = result {
        error!(error = %e, "DNS server error");
        return Err(e.into());
    }

    info!("cluster-dns shutdown complete");
    Ok(())
}
