use std::time::{Duration, Instant};

use anyhow::{bail, Context, Result};
use tokio::net::TcpStream;
use tokio::time::timeout;

use powgate_core::challenge::Challenge;
use powgate_core::wire::{self, Message};

/// Outcome of one successful exchange.
pub struct FetchedQuote {
    pub text: String,
    pub nonce: u64,
    pub difficulty: u8,
    pub solve_time: Duration,
}

/// Connects to `server`, solves its challenge and returns the quote.
///
/// The whole exchange, connect included, runs under one overall deadline
/// mirroring the server's connection timeout.
pub async fn fetch_quote(server: &str, deadline: Duration) -> Result<FetchedQuote> {
    match timeout(deadline, exchange(server)).await {
        Ok(result) => result,
        Err(_) => bail!("exchange with {server} timed out"),
    }
}

async fn exchange(server: &str) -> Result<FetchedQuote> {
    let mut stream = TcpStream::connect(server)
        .await
        .with_context(|| format!("connecting to {server}"))?;

    wire::write_message(&mut stream, &Message::ChallengeRequest)
        .await
        .context("sending challenge request")?;

    let message = wire::read_message(&mut stream)
        .await
        .context("reading challenge response")?;
    let challenge = match message {
        Message::ChallengeResponse {
            difficulty,
            unix_seconds,
            random,
            identity,
        } => Challenge::from_parts(random, unix_seconds, identity, difficulty),
        Message::Error { code, message } => {
            bail!("server rejected request: {message} ({code})")
        }
        other => bail!("expected challenge response, got {}", other.kind()),
    };
    tracing::info!(
        difficulty = challenge.difficulty(),
        identity = %challenge.identity(),
        "received challenge"
    );

    // The search is pure CPU; keep it off the async runtime.
    let solve_started = Instant::now();
    let solver = challenge.clone();
    let nonce = tokio::task::spawn_blocking(move || solver.solve())
        .await
        .context("joining solver task")??;
    let solve_time = solve_started.elapsed();

    wire::write_message(&mut stream, &Message::Solution { nonce })
        .await
        .context("sending solution")?;

    let message = wire::read_message(&mut stream)
        .await
        .context("reading quote")?;
    match message {
        Message::Quote { text } => Ok(FetchedQuote {
            text,
            nonce,
            difficulty: challenge.difficulty(),
            solve_time,
        }),
        Message::Error { code, message } => {
            bail!("server rejected solution: {message} ({code})")
        }
        other => bail!("expected quote, got {}", other.kind()),
    }
}
