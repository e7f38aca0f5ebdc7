use std::net::SocketAddr;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use tokio::net::TcpStream;

use powgate_core::challenge::Challenge;
use powgate_core::wire::{self, Message};
use powgate_server::{
    ListenerConfig, PowConfig, QuoteStore, RateLimitConfig, Server, ServerConfig,
};

pub fn test_config() -> ServerConfig {
    ServerConfig {
        listen: "127.0.0.1:0".parse().expect("loopback address parses"),
        listener: ListenerConfig {
            max_connections: 16,
            read_timeout: Duration::from_secs(2),
            write_timeout: Duration::from_secs(2),
            connection_timeout: Duration::from_secs(10),
        },
        pow: PowConfig {
            base_difficulty: 4,
            challenge_max_age: Duration::from_secs(60),
        },
        rate_limit: RateLimitConfig {
            max_requests: 100,
            window: Duration::from_secs(1),
            cleanup_interval: Duration::from_millis(100),
        },
        quotes_path: "quotes.txt".into(),
    }
}

pub async fn start_server(
    quotes: &[&str],
    configure: impl FnOnce(&mut ServerConfig),
) -> Result<Server> {
    let mut config = test_config();
    configure(&mut config);
    let store = QuoteStore::from_quotes(quotes.iter().map(|quote| (*quote).to_owned()).collect());
    Server::start(config, store).await
}

pub async fn connect(addr: SocketAddr) -> Result<TcpStream> {
    TcpStream::connect(addr)
        .await
        .context("connecting to test server")
}

/// Requests a challenge and reassembles it from the response payload.
pub async fn request_challenge(stream: &mut TcpStream) -> Result<Challenge> {
    wire::write_message(stream, &Message::ChallengeRequest).await?;
    match wire::read_message(stream).await? {
        Message::ChallengeResponse {
            difficulty,
            unix_seconds,
            random,
            identity,
        } => Ok(Challenge::from_parts(random, unix_seconds, identity, difficulty)),
        other => bail!("expected challenge response, got {other:?}"),
    }
}

pub async fn submit_nonce(stream: &mut TcpStream, nonce: u64) -> Result<Message> {
    wire::write_message(stream, &Message::Solution { nonce }).await?;
    Ok(wire::read_message(stream).await?)
}

/// Runs one complete exchange and returns the server's final frame.
pub async fn fetch_quote(addr: SocketAddr) -> Result<Message> {
    let mut stream = connect(addr).await?;
    let challenge = request_challenge(&mut stream).await?;
    let nonce = challenge.solve()?;
    submit_nonce(&mut stream, nonce).await
}

pub async fn wait_until(what: &str, condition: impl Fn() -> bool) {
    for _ in 0..200 {
        if condition() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("timed out waiting for {what}");
}
