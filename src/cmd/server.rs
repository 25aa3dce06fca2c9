//! `gate-server` — binds a listener, serves clients, forwards into its TUN.

use clap::Parser;
use gate::cli::CommonArgs;
use gate::server::Server;

/// Run in server mode.
#[derive(Parser, Debug)]
#[command(name = "gate-server", author, version, about)]
struct Cli {
    #[command(flatten)]
    common: CommonArgs,

    /// Address to listen on, e.g. `0.0.0.0:3389`.
    #[arg(long)]
    listen: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    gate::logging::init(&cli.common.loglevel);

    let config = cli.common.endpoint_config()?;
    tracing::info!(listen = %cli.listen, ip = %config.ip, network = %config.network, "starting server");

    let server = Server::bind(config, &cli.listen).await?;
    server.run(shutdown_signal()).await?;

    tracing::info!("server shut down cleanly");
    Ok(())
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
}
