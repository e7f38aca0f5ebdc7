use std::time::Duration;

use anyhow::Result;
use tokio::io::AsyncReadExt;

use powgate_core::wire::{self, ErrorCode, Message};

mod support;
use support::{connect, fetch_quote, request_challenge, start_server, submit_nonce, wait_until};

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn fourth_connection_in_the_window_is_rate_limited() -> Result<()> {
    let server = start_server(&["only quote"], |config| {
        config.rate_limit.max_requests = 3;
        config.rate_limit.window = Duration::from_secs(1);
    })
    .await?;
    let addr = server.listen_addr();

    for _ in 0..3 {
        let mut stream = connect(addr).await?;
        request_challenge(&mut stream).await?;
    }

    let mut stream = connect(addr).await?;
    let reply = wire::read_message(&mut stream).await?;
    assert_eq!(
        reply,
        Message::Error {
            code: ErrorCode::RateLimitExceeded,
            message: "Rate limit exceeded".to_owned()
        }
    );

    // Once the window has fully aged out, admission resumes.
    tokio::time::sleep(Duration::from_millis(1_100)).await;
    let mut stream = connect(addr).await?;
    request_challenge(&mut stream).await?;

    server.shutdown().await
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn window_slides_rather_than_resetting() -> Result<()> {
    let server = start_server(&["only quote"], |config| {
        config.rate_limit.max_requests = 3;
        config.rate_limit.window = Duration::from_secs(2);
    })
    .await?;
    let addr = server.listen_addr();

    for _ in 0..3 {
        let mut stream = connect(addr).await?;
        request_challenge(&mut stream).await?;
    }

    // Mid-window the three admissions still count.
    tokio::time::sleep(Duration::from_millis(1_100)).await;
    let mut stream = connect(addr).await?;
    let reply = wire::read_message(&mut stream).await?;
    assert!(matches!(
        reply,
        Message::Error {
            code: ErrorCode::RateLimitExceeded,
            ..
        }
    ));

    // Past the window the earliest admissions have aged out.
    tokio::time::sleep(Duration::from_millis(1_000)).await;
    let reply = fetch_quote(addr).await?;
    assert_eq!(
        reply,
        Message::Quote {
            text: "only quote".to_owned()
        }
    );

    server.shutdown().await
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn overflow_connections_are_closed_without_a_frame() -> Result<()> {
    let server = start_server(&["only quote"], |config| {
        config.listener.max_connections = 2;
        config.listener.read_timeout = Duration::from_secs(5);
    })
    .await?;
    let addr = server.listen_addr();

    // Two handlers parked waiting for a challenge request.
    let first = connect(addr).await?;
    let second = connect(addr).await?;
    wait_until("both handlers to be admitted", || {
        server.active_connections() == 2
    })
    .await;

    let mut third = connect(addr).await?;
    let mut rest = Vec::new();
    let outcome = third.read_to_end(&mut rest).await;
    assert!(matches!(outcome, Ok(0) | Err(_)), "got bytes: {rest:?}");

    drop(first);
    drop(second);
    wait_until("handlers to drain", || server.active_connections() == 0).await;
    server.shutdown().await
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn gauge_converges_after_concurrent_exchanges() -> Result<()> {
    let server = start_server(&["only quote"], |_| {}).await?;
    let addr = server.listen_addr();

    let (first, second, third) =
        tokio::join!(fetch_quote(addr), fetch_quote(addr), fetch_quote(addr));
    for reply in [first?, second?, third?] {
        assert!(matches!(reply, Message::Quote { .. }));
    }

    wait_until("active connection gauge to reach zero", || {
        server.active_connections() == 0
    })
    .await;
    server.shutdown().await
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn shutdown_refuses_new_peers_but_lets_inflight_finish() -> Result<()> {
    let server = start_server(&["only quote"], |config| {
        config.listener.read_timeout = Duration::from_secs(5);
    })
    .await?;
    let addr = server.listen_addr();

    // Park one handler between challenge and solution.
    let mut inflight = connect(addr).await?;
    let challenge = request_challenge(&mut inflight).await?;

    server.shutdown().await?;

    // The listener is gone for new peers.
    assert!(tokio::net::TcpStream::connect(addr).await.is_err());

    // The in-flight exchange still completes under its own deadline.
    let reply = submit_nonce(&mut inflight, challenge.solve()?).await?;
    assert_eq!(
        reply,
        Message::Quote {
            text: "only quote".to_owned()
        }
    );

    Ok(())
}
