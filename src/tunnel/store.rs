//! Concurrent session registry.
//!
//! Sessions are keyed by the client-supplied session id in a sharded
//! [`DashMap`]. Shard locks are only held for map bookkeeping, never across
//! I/O; dialing and draining happen under the per-session lock.

use std::sync::Arc;
use std::time::Duration;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use tokio::time::Instant;

use crate::error::TunnelError;
use crate::observability::metrics;
use crate::tunnel::destination::Destination;
use crate::tunnel::session::{Connection, Session, SessionGuard};
use crate::tunnel::upstream::Dialer;

/// Shortened session id for log lines.
pub fn short_id(id: &str) -> &str {
    match id.char_indices().nth(8) {
        Some((idx, _)) => &id[..idx],
        None => id,
    }
}

/// Registry of live tunnel sessions.
#[derive(Debug)]
pub struct SessionStore {
    sessions: DashMap<String, Arc<Session>>,
    dialer: Arc<dyn Dialer>,
}

impl SessionStore {
    pub fn new(dialer: Arc<dyn Dialer>) -> Self {
        Self {
            sessions: DashMap::new(),
            dialer,
        }
    }

    /// Resolve `id` to a locked, connected session.
    ///
    /// A new id is dialed and inserted only if the dial succeeds. An existing
    /// but disconnected session is redialed in place. A connected session is
    /// returned without any I/O.
    pub async fn get_or_create(
        &self,
        id: &str,
        destination: &Destination,
    ) -> Result<SessionGuard, TunnelError> {
        loop {
            let (session, created) = match self.sessions.entry(id.to_string()) {
                Entry::Occupied(entry) => (entry.get().clone(), false),
                Entry::Vacant(entry) => {
                    let session = Arc::new(Session::new());
                    entry.insert(session.clone());
                    (session, true)
                }
            };

            let mut state = session.lock().await;
            if state.retired {
                // removed while we waited on the lock; look the id up again
                continue;
            }

            if state.connection.is_connected() {
                tracing::debug!(session = %short_id(id), "Reusing existing connection");
                return Ok(SessionGuard {
                    id: id.to_string(),
                    session,
                    state,
                });
            }

            tracing::debug!(
                session = %short_id(id),
                destination = %destination,
                reconnect = !created,
                "Dialing destination"
            );

            match self.dialer.dial(destination).await {
                Ok(upstream) => {
                    state.connection = Connection::Connected(upstream);
                    state.last_active = Instant::now();
                    if created {
                        metrics::record_session_opened(self.sessions.len());
                        tracing::info!(session = %short_id(id), destination = %destination, "Session created");
                    } else {
                        tracing::info!(session = %short_id(id), destination = %destination, "Session reconnected");
                    }
                    return Ok(SessionGuard {
                        id: id.to_string(),
                        session,
                        state,
                    });
                }
                Err(source) => {
                    metrics::record_dial_failure();
                    if created {
                        state.retired = true;
                        self.sessions.remove_if(id, |_, current| current.ptr_eq(&session));
                    }
                    return Err(TunnelError::Dial {
                        destination: destination.to_string(),
                        source,
                    });
                }
            }
        }
    }

    /// Close the session's connection and remove it from the store.
    pub async fn close(&self, mut guard: SessionGuard) {
        guard.state.retired = true;
        guard.disconnect().await;
        let session = guard.session.clone();
        self.sessions
            .remove_if(&guard.id, |_, current| current.ptr_eq(&session));
        metrics::record_session_closed("client", self.sessions.len());
        tracing::info!(session = %short_id(&guard.id), "Session closed");
    }

    fn snapshot(&self) -> Vec<(String, Arc<Session>)> {
        self.sessions
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().clone()))
            .collect()
    }

    /// Evict sessions idle for longer than `idle_timeout` as of `now`.
    ///
    /// A session locked by a request is in use and skipped, so one slow
    /// request never holds up the sweep. Returns the number evicted.
    pub async fn sweep_idle(&self, now: Instant, idle_timeout: Duration) -> usize {
        let mut evicted = 0;
        for (id, session) in self.snapshot() {
            let Some(mut state) = session.try_lock() else {
                continue;
            };
            if state.retired || now.saturating_duration_since(state.last_active) <= idle_timeout {
                continue;
            }

            state.retired = true;
            if let Some(upstream) = state.connection.take() {
                upstream.close().await;
            }
            self.sessions.remove_if(&id, |_, current| current.ptr_eq(&session));
            evicted += 1;
            metrics::record_session_closed("idle", self.sessions.len());
            tracing::info!(session = %short_id(&id), "Idle session evicted");
        }
        evicted
    }

    /// Close every session. Used on shutdown.
    ///
    /// Idle sessions are closed here. A session still held by a request is
    /// only unregistered; its connection is dropped with the request's guard.
    pub async fn close_all(&self) -> usize {
        let snapshot = self.snapshot();
        let count = snapshot.len();
        for (id, session) in snapshot {
            self.sessions.remove_if(&id, |_, current| current.ptr_eq(&session));
            match session.try_lock() {
                Some(mut state) => {
                    state.retired = true;
                    if let Some(upstream) = state.connection.take() {
                        upstream.close().await;
                    }
                }
                None => {
                    tracing::debug!(session = %short_id(&id), "Session busy at shutdown, released with its request");
                }
            }
            metrics::record_session_closed("shutdown", self.sessions.len());
        }
        count
    }

    pub fn contains(&self, id: &str) -> bool {
        self.sessions.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}
