use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use tokio::sync::oneshot;
use tokio::task::JoinHandle;

use crate::config::RateLimitConfig;

/// Sliding-window admission limiter keyed by peer identity.
///
/// Each identity keeps the timestamps of its admissions inside the current
/// window. One exclusive lock covers both reads and writes because
/// admission must evict expired entries before it can count. A background
/// task reclaims identities that have gone quiet so the map stays bounded
/// by recent traffic.
#[derive(Clone)]
pub struct RateLimiter {
    inner: Arc<LimiterInner>,
}

struct LimiterInner {
    requests: Mutex<HashMap<String, Vec<Instant>>>,
    max_requests: usize,
    window: Duration,
    shutdown: Mutex<Option<oneshot::Sender<()>>>,
    reclaimer: Mutex<Option<JoinHandle<()>>>,
}

impl RateLimiter {
    /// Builds the limiter and spawns its reclamation task.
    #[must_use]
    pub fn start(config: &RateLimitConfig) -> Self {
        let inner = Arc::new(LimiterInner {
            requests: Mutex::new(HashMap::new()),
            max_requests: config.max_requests,
            window: config.window,
            shutdown: Mutex::new(None),
            reclaimer: Mutex::new(None),
        });

        let (shutdown_tx, mut shutdown_rx) = oneshot::channel();
        let task_inner = Arc::clone(&inner);
        let cleanup_interval = config.cleanup_interval;
        let reclaimer = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(cleanup_interval);
            loop {
                tokio::select! {
                    _ = ticker.tick() => task_inner.reclaim(),
                    _ = &mut shutdown_rx => break,
                }
            }
        });

        *inner.shutdown.lock().expect("limiter shutdown lock poisoned") = Some(shutdown_tx);
        *inner.reclaimer.lock().expect("limiter reclaimer lock poisoned") = Some(reclaimer);
        Self { inner }
    }

    /// Admits the identity iff fewer than `max_requests` admissions fall
    /// inside the trailing window, recording the admission timestamp on
    /// success.
    #[must_use]
    pub fn allow(&self, identity: &str) -> bool {
        let now = Instant::now();
        let mut requests = self
            .inner
            .requests
            .lock()
            .expect("limiter request lock poisoned");
        let timestamps = requests.entry(identity.to_owned()).or_default();
        timestamps.retain(|stamp| now.duration_since(*stamp) <= self.inner.window);
        if timestamps.len() >= self.inner.max_requests {
            return false;
        }
        timestamps.push(now);
        true
    }

    /// Number of identities currently holding window state.
    #[must_use]
    pub fn tracked_identities(&self) -> usize {
        self.inner
            .requests
            .lock()
            .expect("limiter request lock poisoned")
            .len()
    }

    /// Signals the reclamation task to exit and joins it. Idempotent;
    /// `allow` keeps functioning afterwards, only reclamation stops.
    pub async fn shutdown(&self) {
        let sender = self
            .inner
            .shutdown
            .lock()
            .expect("limiter shutdown lock poisoned")
            .take();
        if let Some(sender) = sender {
            let _ = sender.send(());
        }
        let reclaimer = self
            .inner
            .reclaimer
            .lock()
            .expect("limiter reclaimer lock poisoned")
            .take();
        if let Some(reclaimer) = reclaimer {
            if let Err(err) = reclaimer.await {
                tracing::warn!(error = ?err, "rate limiter reclamation task failed");
            }
        }
    }
}

impl LimiterInner {
    /// Drops expired timestamps everywhere and removes identities whose
    /// window emptied. Purely a memory bound; admission outcomes are
    /// unaffected because `allow` evicts on its own path.
    fn reclaim(&self) {
        let now = Instant::now();
        let mut requests = self.requests.lock().expect("limiter request lock poisoned");
        requests.retain(|_, timestamps| {
            timestamps.retain(|stamp| now.duration_since(*stamp) <= self.window);
            !timestamps.is_empty()
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(max_requests: usize, window: Duration, cleanup_interval: Duration) -> RateLimitConfig {
        RateLimitConfig {
            max_requests,
            window,
            cleanup_interval,
        }
    }

    #[tokio::test]
    async fn admits_up_to_the_cap_and_then_denies() {
        let limiter = RateLimiter::start(&config(
            3,
            Duration::from_secs(60),
            Duration::from_secs(60),
        ));
        assert!(limiter.allow("10.0.0.1"));
        assert!(limiter.allow("10.0.0.1"));
        assert!(limiter.allow("10.0.0.1"));
        assert!(!limiter.allow("10.0.0.1"));
        limiter.shutdown().await;
    }

    #[tokio::test]
    async fn identities_are_limited_independently() {
        let limiter = RateLimiter::start(&config(
            1,
            Duration::from_secs(60),
            Duration::from_secs(60),
        ));
        assert!(limiter.allow("10.0.0.1"));
        assert!(!limiter.allow("10.0.0.1"));
        assert!(limiter.allow("10.0.0.2"));
        limiter.shutdown().await;
    }

    #[tokio::test]
    async fn window_expiry_restores_admission() {
        let limiter = RateLimiter::start(&config(
            2,
            Duration::from_millis(50),
            Duration::from_secs(60),
        ));
        assert!(limiter.allow("10.0.0.1"));
        assert!(limiter.allow("10.0.0.1"));
        assert!(!limiter.allow("10.0.0.1"));

        tokio::time::sleep(Duration::from_millis(80)).await;
        assert!(limiter.allow("10.0.0.1"));
        limiter.shutdown().await;
    }

    #[tokio::test]
    async fn oldest_admission_ages_out_first() {
        let limiter = RateLimiter::start(&config(
            2,
            Duration::from_millis(120),
            Duration::from_secs(60),
        ));
        assert!(limiter.allow("10.0.0.1"));
        tokio::time::sleep(Duration::from_millis(80)).await;
        assert!(limiter.allow("10.0.0.1"));
        assert!(!limiter.allow("10.0.0.1"));

        // Only the first admission has aged out; one slot opens.
        tokio::time::sleep(Duration::from_millis(60)).await;
        assert!(limiter.allow("10.0.0.1"));
        assert!(!limiter.allow("10.0.0.1"));
        limiter.shutdown().await;
    }

    #[tokio::test]
    async fn reclamation_drops_idle_identities() {
        let limiter = RateLimiter::start(&config(
            4,
            Duration::from_millis(20),
            Duration::from_millis(30),
        ));
        assert!(limiter.allow("10.0.0.1"));
        assert!(limiter.allow("10.0.0.2"));
        assert_eq!(limiter.tracked_identities(), 2);

        tokio::time::sleep(Duration::from_millis(120)).await;
        assert_eq!(limiter.tracked_identities(), 0);
        limiter.shutdown().await;
    }

    #[tokio::test]
    async fn shutdown_is_idempotent_and_leaves_allow_working() {
        let limiter = RateLimiter::start(&config(
            1,
            Duration::from_secs(60),
            Duration::from_secs(60),
        ));
        limiter.shutdown().await;
        limiter.shutdown().await;
        assert!(limiter.allow("10.0.0.1"));
        assert!(!limiter.allow("10.0.0.1"));
    }
}
