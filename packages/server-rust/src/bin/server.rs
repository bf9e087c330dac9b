//! `tracelink-server` entry point: correlation middleware in front of a
//! health endpoint, JSON logs on stdout.

use clap::Parser;
use tracing::info;

use tracelink_server::config::ServerArgs;
use tracelink_server::network::{CorrelationLayer, NetworkModule};
use tracelink_server::telemetry::init_logging;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = ServerArgs::parse();
    init_logging(&args.logging())?;

    let correlation = CorrelationLayer::new(args.correlation())?;
    let mut module = NetworkModule::new(args.network(), correlation);
    let port = module.start().await?;
    info!(port, host = %args.host, "tracelink server listening");

    module
        .serve(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::warn!(error = %e, "failed to listen for shutdown signal");
            }
        })
        .await?;

    info!("tracelink server stopped");
    Ok(())
}
