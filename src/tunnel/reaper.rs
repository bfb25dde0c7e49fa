//! Idle-session eviction.
//!
//! The reaper wakes on a fixed interval and evicts every session whose last
//! activity is older than the idle timeout. It runs until the shutdown
//! broadcast fires.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::{self, Instant, MissedTickBehavior};

use crate::config::SessionConfig;
use crate::tunnel::store::SessionStore;

pub struct Reaper {
    store: Arc<SessionStore>,
    interval: Duration,
    idle_timeout: Duration,
}

impl Reaper {
    pub fn new(store: Arc<SessionStore>, config: &SessionConfig) -> Self {
        Self {
            store,
            interval: Duration::from_secs(config.sweep_interval_secs),
            idle_timeout: Duration::from_secs(config.idle_timeout_secs),
        }
    }

    /// Start the reaper on its own task.
    pub fn spawn(self, shutdown: broadcast::Receiver<()>) -> JoinHandle<()> {
        tokio::spawn(self.run(shutdown))
    }

    pub async fn run(self, mut shutdown: broadcast::Receiver<()>) {
        tracing::info!(
            interval = ?self.interval,
            idle_timeout = ?self.idle_timeout,
            "Session reaper starting"
        );

        // first tick fires one full interval after start
        let mut ticker = time::interval_at(Instant::now() + self.interval, self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let evicted = self.store.sweep_idle(Instant::now(), self.idle_timeout).await;
                    if evicted > 0 {
                        tracing::debug!(evicted, remaining = self.store.len(), "Reaper sweep finished");
                    }
                }
                _ = shutdown.recv() => {
                    tracing::info!("Session reaper received shutdown signal, exiting loop");
                    break;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tunnel::store::tests::{sink_destination, CountingDialer};

    fn config(idle_secs: u64, sweep_secs: u64) -> SessionConfig {
        SessionConfig {
            idle_timeout_secs: idle_secs,
            sweep_interval_secs: sweep_secs,
        }
    }

    #[tokio::test]
    async fn sweep_keeps_fresh_sessions() {
        let store = SessionStore::new(Arc::new(CountingDialer::new()));
        let dest = sink_destination().await;
        drop(store.get_or_create("fresh", &dest).await.unwrap());

        let evicted = store.sweep_idle(Instant::now(), Duration::from_secs(300)).await;
        assert_eq!(evicted, 0);
        assert!(store.contains("fresh"));
    }

    #[tokio::test]
    async fn sweep_evicts_stale_sessions() {
        let store = SessionStore::new(Arc::new(CountingDialer::new()));
        let dest = sink_destination().await;
        drop(store.get_or_create("stale", &dest).await.unwrap());

        let later = Instant::now() + Duration::from_secs(301);
        let evicted = store.sweep_idle(later, Duration::from_secs(300)).await;
        assert_eq!(evicted, 1);
        assert!(!store.contains("stale"));
    }

    #[tokio::test]
    async fn reaper_evicts_after_idle_timeout() {
        let dialer = Arc::new(CountingDialer::new());
        let store = Arc::new(SessionStore::new(dialer.clone()));
        let dest = sink_destination().await;
        drop(store.get_or_create("idle", &dest).await.unwrap());
        time::pause();

        let (tx, rx) = broadcast::channel(1);
        let handle = Reaper::new(store.clone(), &config(300, 60)).spawn(rx);

        // four sweeps in, the session is only 240s idle
        time::advance(Duration::from_secs(241)).await;
        tokio::task::yield_now().await;
        assert!(store.contains("idle"));

        // the sweep at 360s sees it 360s idle
        time::advance(Duration::from_secs(120)).await;
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }
        assert!(!store.contains("idle"));

        let _ = tx.send(());
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn touched_session_survives() {
        let store = Arc::new(SessionStore::new(Arc::new(CountingDialer::new())));
        let dest = sink_destination().await;
        drop(store.get_or_create("busy", &dest).await.unwrap());
        time::pause();

        let (tx, rx) = broadcast::channel(1);
        let handle = Reaper::new(store.clone(), &config(300, 60)).spawn(rx);

        for _ in 0..10 {
            time::advance(Duration::from_secs(60)).await;
            let mut guard = store.get_or_create("busy", &dest).await.unwrap();
            guard.touch();
        }
        assert!(store.contains("busy"));

        let _ = tx.send(());
        handle.await.unwrap();
    }
}
