use std::time::Duration;

use anyhow::Result;
use clap::{Args, Parser, Subcommand};
use tracing_subscriber::EnvFilter;

mod client;

#[derive(Parser)]
#[command(name = "powgate", version, about = "Fetch proof-of-work gated quotes", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Request quotes from a powgate server.
    Fetch(FetchCommand),
}

#[derive(Args, Debug)]
struct FetchCommand {
    /// Server address (host:port).
    #[arg(long, default_value = "127.0.0.1:7777")]
    server: String,
    /// Overall deadline for one exchange, connect and solve included.
    #[arg(long, default_value = "30s", value_parser = humantime::parse_duration)]
    timeout: Duration,
    /// Number of quotes to request.
    #[arg(long, default_value_t = 1)]
    count: u32,
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();

    match cli.command {
        Commands::Fetch(cmd) => fetch(cmd).await,
    }
}

fn init_tracing() {
    let subscriber = tracing_subscriber::fmt().with_env_filter(
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
    );
    let _ = subscriber.try_init();
}

async fn fetch(cmd: FetchCommand) -> Result<()> {
    let mut succeeded = 0u32;
    for attempt in 1..=cmd.count {
        if cmd.count > 1 {
            tracing::info!(attempt, total = cmd.count, "requesting quote");
        }
        match client::fetch_quote(&cmd.server, cmd.timeout).await {
            Ok(fetched) => {
                succeeded += 1;
                tracing::info!(
                    nonce = fetched.nonce,
                    difficulty = fetched.difficulty,
                    elapsed = ?fetched.solve_time,
                    "challenge solved"
                );
                println!("{}", fetched.text);
            }
            Err(err) => tracing::warn!(error = ?err, "quote request failed"),
        }
    }
    println!("received {succeeded}/{} quotes", cmd.count);
    Ok(())
}
