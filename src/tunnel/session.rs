//! A single tunnel session and its per-request operations.
//!
//! Every field of a session lives behind one async mutex. A request holds the
//! lock (through a [`SessionGuard`]) from session resolution until its
//! response is ready, so a write and a following read on the same session
//! never interleave.

use std::io;
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::sync::{Mutex, OwnedMutexGuard};
use tokio::time::Instant;

use crate::tunnel::upstream::Upstream;

/// Outbound connection state of a session.
#[derive(Debug, Default)]
pub enum Connection {
    Connected(Upstream),
    /// The last connection failed; the entry is kept and the next request redials.
    #[default]
    Disconnected,
}

impl Connection {
    pub fn is_connected(&self) -> bool {
        matches!(self, Connection::Connected(_))
    }

    /// Take the upstream out, leaving `Disconnected` behind.
    pub fn take(&mut self) -> Option<Upstream> {
        match std::mem::take(self) {
            Connection::Connected(upstream) => Some(upstream),
            Connection::Disconnected => None,
        }
    }
}

/// Lock-protected state of a session.
#[derive(Debug)]
pub struct SessionState {
    pub(crate) connection: Connection,
    pub(crate) last_active: Instant,
    /// Set once the entry has been removed from the store. A request that
    /// raced the removal must not reconnect a retired session.
    pub(crate) retired: bool,
}

/// Server-side state bridging one client stream to one outbound connection.
#[derive(Debug)]
pub struct Session {
    state: Arc<Mutex<SessionState>>,
}

impl Session {
    pub(crate) fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(SessionState {
                connection: Connection::Disconnected,
                last_active: Instant::now(),
                retired: false,
            })),
        }
    }

    pub(crate) async fn lock(&self) -> OwnedMutexGuard<SessionState> {
        self.state.clone().lock_owned().await
    }

    /// Lock without waiting. `None` means a request holds the session.
    pub(crate) fn try_lock(&self) -> Option<OwnedMutexGuard<SessionState>> {
        self.state.clone().try_lock_owned().ok()
    }

    pub(crate) fn ptr_eq(&self, other: &Session) -> bool {
        Arc::ptr_eq(&self.state, &other.state)
    }
}

/// Limits for draining an upstream in one read request.
#[derive(Debug, Clone, Copy)]
pub struct PollLimits {
    /// Deadline for each individual read attempt.
    pub read_deadline: Duration,
    /// Size of a single read.
    pub chunk_size: usize,
    /// Hard cap on bytes returned per request.
    pub max_bytes: usize,
}

impl Default for PollLimits {
    fn default() -> Self {
        Self {
            read_deadline: Duration::from_millis(100),
            chunk_size: 32 * 1024,
            max_bytes: 64 * 1024,
        }
    }
}

/// A locked, connected session handed to one request.
#[derive(Debug)]
pub struct SessionGuard {
    pub(crate) id: String,
    pub(crate) session: Arc<Session>,
    pub(crate) state: OwnedMutexGuard<SessionState>,
}

impl SessionGuard {
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Refresh the liveness timestamp.
    pub fn touch(&mut self) {
        self.state.last_active = Instant::now();
    }

    pub fn last_active(&self) -> Instant {
        self.state.last_active
    }

    pub fn is_connected(&self) -> bool {
        self.state.connection.is_connected()
    }

    /// Write `data` verbatim to the upstream.
    ///
    /// On failure the session drops its connection and becomes `Disconnected`.
    pub async fn write(&mut self, data: &[u8]) -> io::Result<()> {
        let Connection::Connected(upstream) = &mut self.state.connection else {
            return Err(io::Error::new(io::ErrorKind::NotConnected, "session is disconnected"));
        };

        let result = async {
            upstream.write_all(data).await?;
            upstream.flush().await
        }
        .await;

        if result.is_err() {
            self.disconnect().await;
        }
        result
    }

    /// Collect whatever the upstream has ready, bounded by `limits`.
    ///
    /// A timed-out read or end-of-stream ends the poll normally. Any other
    /// read error disconnects the session and is returned.
    pub async fn drain(&mut self, limits: &PollLimits) -> io::Result<Vec<u8>> {
        let Connection::Connected(upstream) = &mut self.state.connection else {
            return Err(io::Error::new(io::ErrorKind::NotConnected, "session is disconnected"));
        };

        let chunk_size = limits.chunk_size.max(1);
        let mut chunk = vec![0u8; chunk_size];
        let mut data = Vec::with_capacity(limits.max_bytes);

        let result = loop {
            let want = chunk_size.min(limits.max_bytes.saturating_sub(data.len()));
            if want == 0 {
                break Ok(());
            }

            match tokio::time::timeout(limits.read_deadline, upstream.read(&mut chunk[..want])).await {
                // deadline passed with nothing more to read
                Err(_) => break Ok(()),
                // End of stream keeps the connection. A destination that went
                // away surfaces on the next write, which disconnects.
                Ok(Ok(0)) => break Ok(()),
                Ok(Ok(n)) => {
                    data.extend_from_slice(&chunk[..n]);
                    if n < want {
                        break Ok(());
                    }
                }
                Ok(Err(e)) if e.kind() == io::ErrorKind::TimedOut => break Ok(()),
                Ok(Err(e)) => break Err(e),
            }
        };

        match result {
            Ok(()) => Ok(data),
            Err(e) => {
                self.disconnect().await;
                Err(e)
            }
        }
    }

    /// Drop the current connection but keep the session registered.
    pub async fn disconnect(&mut self) {
        if let Some(upstream) = self.state.connection.take() {
            upstream.close().await;
        }
    }
}
