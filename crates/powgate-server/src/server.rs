use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

use crate::config::ServerConfig;
use crate::handler;
use crate::observability::ServerObservability;
use crate::quotes::QuoteStore;
use crate::rate_limit::RateLimiter;

/// State shared between the accept loop and every connection handler.
///
/// The rate limiter map and the active-connection gauge live here as
/// explicit resources owned by the server, handed down by reference; their
/// lifecycle is tied to start/shutdown.
pub(crate) struct ServerShared {
    pub(crate) config: ServerConfig,
    pub(crate) quotes: QuoteStore,
    pub(crate) limiter: RateLimiter,
    pub(crate) observability: ServerObservability,
    pub(crate) active_connections: AtomicUsize,
}

/// Handle over a running powgate listener.
pub struct Server {
    listen_addr: SocketAddr,
    shared: Arc<ServerShared>,
    shutdown: Option<oneshot::Sender<()>>,
    accept_task: JoinHandle<()>,
}

impl Server {
    /// Binds the listener, starts the rate limiter and spawns the accept
    /// loop.
    pub async fn start(config: ServerConfig, quotes: QuoteStore) -> Result<Self> {
        config.validate()?;
        let listener = TcpListener::bind(config.listen)
            .await
            .with_context(|| format!("binding listener on {}", config.listen))?;
        let listen_addr = listener
            .local_addr()
            .context("resolving listener address")?;

        let limiter = RateLimiter::start(&config.rate_limit);
        let shared = Arc::new(ServerShared {
            config,
            quotes,
            limiter,
            observability: ServerObservability::new(),
            active_connections: AtomicUsize::new(0),
        });

        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        let accept_task = tokio::spawn(accept_loop(listener, Arc::clone(&shared), shutdown_rx));
        tracing::info!(listen = %listen_addr, "listener started");

        Ok(Self {
            listen_addr,
            shared,
            shutdown: Some(shutdown_tx),
            accept_task,
        })
    }

    #[must_use]
    pub fn listen_addr(&self) -> SocketAddr {
        self.listen_addr
    }

    /// Connections currently being handled.
    #[must_use]
    pub fn active_connections(&self) -> usize {
        self.shared.active_connections.load(Ordering::Relaxed)
    }

    #[must_use]
    pub fn observability(&self) -> ServerObservability {
        self.shared.observability.clone()
    }

    /// Closes the listener and stops the rate limiter.
    ///
    /// No new connections are admitted once the signal is sent. In-flight
    /// handlers are not cancelled; each runs to completion bounded by its
    /// own connection deadline.
    pub async fn shutdown(mut self) -> Result<()> {
        if let Some(shutdown) = self.shutdown.take() {
            let _ = shutdown.send(());
        }
        self.accept_task
            .await
            .context("awaiting accept loop shutdown")?;
        self.shared.limiter.shutdown().await;

        let snapshot = self.shared.observability.snapshot();
        tracing::info!(
            uptime = %humantime::format_duration(snapshot.uptime),
            quotes_served = snapshot.quotes_served_total,
            rejected = ?snapshot.rejected_total,
            "server stopped"
        );
        Ok(())
    }
}

async fn accept_loop(
    listener: TcpListener,
    shared: Arc<ServerShared>,
    mut shutdown: oneshot::Receiver<()>,
) {
    loop {
        tokio::select! {
            _ = &mut shutdown => {
                tracing::info!("shutdown signalled; listener closing");
                break;
            }
            accepted = listener.accept() => match accepted {
                Ok((stream, peer)) => admit(stream, peer, &shared),
                Err(err) => tracing::warn!(error = ?err, "accept failed"),
            },
        }
    }
}

/// Admits a freshly accepted connection or closes it over the cap.
///
/// Over the cap the connection is closed without sending any frame.
fn admit(stream: TcpStream, peer: SocketAddr, shared: &Arc<ServerShared>) {
    let active = shared.active_connections.load(Ordering::Relaxed);
    if active >= shared.config.listener.max_connections {
        tracing::warn!(peer = %peer, active, "connection limit reached; closing connection");
        drop(stream);
        return;
    }

    shared.active_connections.fetch_add(1, Ordering::Relaxed);
    let shared = Arc::clone(shared);
    tokio::spawn(async move {
        let identity = peer.ip().to_string();
        handler::serve_connection(stream, identity, Arc::clone(&shared)).await;
        shared.active_connections.fetch_sub(1, Ordering::Relaxed);
    });
}
