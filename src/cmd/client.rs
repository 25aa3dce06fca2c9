//! `gate-client` — dials the server, opens a TUN, and pumps packets.

use clap::Parser;
use gate::cli::CommonArgs;
use gate::client::Client;

/// Run in client mode.
#[derive(Parser, Debug)]
#[command(name = "gate-client", author, version, about)]
struct Cli {
    #[command(flatten)]
    common: CommonArgs,

    /// Server address to connect to, e.g. `127.0.0.1:3389`.
    #[arg(long)]
    connect: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    gate::logging::init(&cli.common.loglevel);

    let config = cli.common.endpoint_config()?;
    tracing::info!(connect = %cli.connect, ip = %config.ip, network = %config.network, "starting client");

    let client = Client::connect(config, &cli.connect).await?;
    client.run(shutdown_signal()).await?;

    tracing::info!("client shut down cleanly");
    Ok(())
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
}
