use std::sync::Arc;

use anyhow::{bail, Context, Result};
use tokio::net::TcpStream;
use tokio::time::timeout;

use powgate_core::challenge::Challenge;
use powgate_core::wire::{self, ErrorCode, Message, WireError};

use crate::server::ServerShared;

/// Drives one connection through the full exchange and disposes of it.
///
/// The entire exchange runs under the overall connection deadline; expiry
/// or any transport failure simply ends the connection. Failures stop at
/// this boundary: nothing below retries and nothing panics the process.
pub(crate) async fn serve_connection(
    mut stream: TcpStream,
    identity: String,
    shared: Arc<ServerShared>,
) {
    tracing::debug!(peer = %identity, "connection accepted");
    let deadline = shared.config.listener.connection_timeout;
    match timeout(deadline, run_exchange(&mut stream, &identity, &shared)).await {
        Ok(Ok(())) => tracing::info!(peer = %identity, "connection completed"),
        Ok(Err(err)) => tracing::warn!(peer = %identity, error = ?err, "connection aborted"),
        Err(_) => tracing::warn!(peer = %identity, "connection deadline expired"),
    }
}

async fn run_exchange(
    stream: &mut TcpStream,
    identity: &str,
    shared: &ServerShared,
) -> Result<()> {
    if !shared.limiter.allow(identity) {
        send_error(
            stream,
            shared,
            ErrorCode::RateLimitExceeded,
            "Rate limit exceeded",
        )
        .await;
        bail!("rate limit exceeded");
    }

    let challenge = match Challenge::generate(identity, shared.config.pow.base_difficulty) {
        Ok(challenge) => challenge,
        Err(err) => {
            send_error(stream, shared, ErrorCode::InternalError, "Internal error").await;
            return Err(err).context("generating challenge");
        }
    };

    let request = read_client_frame(stream, shared, "challenge request").await?;
    if request != Message::ChallengeRequest {
        send_error(
            stream,
            shared,
            ErrorCode::InvalidMessage,
            "Expected challenge request",
        )
        .await;
        bail!("expected challenge request, got {}", request.kind());
    }

    let response = Message::ChallengeResponse {
        difficulty: challenge.difficulty(),
        unix_seconds: challenge.unix_seconds(),
        random: *challenge.random(),
        identity: identity.to_owned(),
    };
    write_server_frame(stream, shared, &response, "challenge response").await?;

    let solution = read_client_frame(stream, shared, "solution").await?;
    let nonce = match solution {
        Message::Solution { nonce } => nonce,
        other => {
            send_error(stream, shared, ErrorCode::InvalidMessage, "Expected solution").await;
            bail!("expected solution, got {}", other.kind());
        }
    };

    if !challenge.verify(nonce, identity) {
        send_error(stream, shared, ErrorCode::InvalidSolution, "Invalid solution").await;
        bail!(
            "nonce {nonce} does not satisfy difficulty {}",
            challenge.difficulty()
        );
    }
    tracing::debug!(peer = %identity, nonce, "solution accepted");

    let quote = match shared.quotes.get_random() {
        Ok(quote) => quote.to_owned(),
        Err(err) => {
            send_error(stream, shared, ErrorCode::InternalError, "No quotes available").await;
            return Err(err).context("selecting quote");
        }
    };
    write_server_frame(stream, shared, &Message::Quote { text: quote }, "quote").await?;
    shared.observability.record_quote_served();
    Ok(())
}

/// Reads one frame under the per-read deadline.
///
/// Decode-level violations are answered with `Error(1)` before aborting;
/// transport failures and oversized declarations end the connection with
/// no frame.
async fn read_client_frame(
    stream: &mut TcpStream,
    shared: &ServerShared,
    expecting: &str,
) -> Result<Message> {
    let read_timeout = shared.config.listener.read_timeout;
    match timeout(read_timeout, wire::read_message(stream)).await {
        Err(_) => bail!("timed out reading {expecting}"),
        Ok(Err(err)) => {
            if is_decode_violation(&err) {
                send_error(stream, shared, ErrorCode::InvalidMessage, "Invalid message").await;
            }
            Err(err).with_context(|| format!("reading {expecting}"))
        }
        Ok(Ok(message)) => Ok(message),
    }
}

fn is_decode_violation(err: &WireError) -> bool {
    matches!(
        err,
        WireError::UnknownKind(_)
            | WireError::UnknownErrorCode(_)
            | WireError::InvalidPayloadLength { .. }
            | WireError::InvalidUtf8(_)
    )
}

async fn write_server_frame(
    stream: &mut TcpStream,
    shared: &ServerShared,
    message: &Message,
    what: &str,
) -> Result<()> {
    let write_timeout = shared.config.listener.write_timeout;
    match timeout(write_timeout, wire::write_message(stream, message)).await {
        Err(_) => bail!("timed out writing {what}"),
        Ok(result) => result.with_context(|| format!("writing {what}")),
    }
}

/// Best-effort rejection frame; write failures are logged and swallowed.
async fn send_error(stream: &mut TcpStream, shared: &ServerShared, code: ErrorCode, message: &str) {
    shared.observability.record_rejected(code);
    let frame = Message::Error {
        code,
        message: message.to_owned(),
    };
    let write_timeout = shared.config.listener.write_timeout;
    match timeout(write_timeout, wire::write_message(stream, &frame)).await {
        Ok(Ok(())) => {}
        Ok(Err(err)) => tracing::debug!(error = ?err, "failed to send error frame"),
        Err(_) => tracing::debug!("timed out sending error frame"),
    }
}
