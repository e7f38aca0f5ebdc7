use std::net::SocketAddr;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use tokio::signal;
use tracing_subscriber::EnvFilter;

use powgate_server::{QuoteStore, Server, ServerConfig, ServerConfigOverrides};

#[derive(Parser)]
#[command(name = "powgate-server", version, about = "Run the powgate quote server", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the powgate quote service.
    Run(RunCommand),
}

#[derive(Args, Debug)]
struct RunCommand {
    /// Socket address to listen on.
    #[arg(long, value_parser = clap::value_parser!(SocketAddr))]
    listen: SocketAddr,
    /// Optional path to a TOML configuration file.
    #[arg(long)]
    config: Option<PathBuf>,
    /// Path to the quote collection, one quote per line.
    #[arg(long)]
    quotes: Option<PathBuf>,
    /// Cap on concurrently handled connections.
    #[arg(long = "max-connections")]
    max_connections: Option<usize>,
    /// Leading zero bits every solution digest must carry.
    #[arg(long = "pow-difficulty")]
    pow_difficulty: Option<u8>,
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();

    match cli.command {
        Commands::Run(cmd) => run_server(cmd).await,
    }
}

fn init_tracing() {
    let subscriber = tracing_subscriber::fmt().with_env_filter(
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
    );
    let _ = subscriber.try_init();
}

async fn run_server(cmd: RunCommand) -> Result<()> {
    let overrides = cmd.as_config_overrides();
    let config = ServerConfig::from_sources(cmd.listen, cmd.config, overrides).await?;

    let quotes = QuoteStore::load(&config.quotes_path)
        .await
        .context("loading quote collection")?;
    tracing::info!(
        count = quotes.len(),
        path = %config.quotes_path.display(),
        "loaded quote collection"
    );

    let server = Server::start(config, quotes).await?;
    println!("powgate server listening on {}", server.listen_addr());
    println!("press Ctrl+C to stop the server");

    signal::ctrl_c().await?;

    tracing::info!("shutdown signal received; stopping listener");
    server.shutdown().await?;
    println!("powgate server stopped cleanly");

    Ok(())
}

impl RunCommand {
    fn as_config_overrides(&self) -> ServerConfigOverrides {
        ServerConfigOverrides {
            max_connections: self.max_connections,
            pow_difficulty: self.pow_difficulty,
            quotes_path: self.quotes.clone(),
        }
    }
}
