//! Shared utilities for integration tests: fake destinations and a server spawner.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use base64::{engine::general_purpose::STANDARD, Engine as _};
use cdn_tunnel::config::TunnelConfig;
use cdn_tunnel::http::HttpServer;
use cdn_tunnel::lifecycle::Shutdown;
use cdn_tunnel::tunnel::SessionStore;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// Header value naming `addr` as the tunnel destination.
pub fn destination_header(addr: SocketAddr) -> String {
    STANDARD.encode(addr.to_string())
}

/// A destination that echoes every byte back. Counts accepted connections
/// and reports each connection's end on `closed`.
pub struct Echo {
    pub addr: SocketAddr,
    pub accepted: Arc<AtomicUsize>,
    pub closed: mpsc::UnboundedReceiver<()>,
}

pub async fn start_echo() -> Echo {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let accepted = Arc::new(AtomicUsize::new(0));
    let (closed_tx, closed) = mpsc::unbounded_channel();

    let counter = accepted.clone();
    tokio::spawn(async move {
        while let Ok((mut socket, _)) = listener.accept().await {
            counter.fetch_add(1, Ordering::SeqCst);
            let closed_tx = closed_tx.clone();
            tokio::spawn(async move {
                let mut buf = [0u8; 4096];
                loop {
                    match socket.read(&mut buf).await {
                        Ok(0) | Err(_) => break,
                        Ok(n) => {
                            if socket.write_all(&buf[..n]).await.is_err() {
                                break;
                            }
                        }
                    }
                }
                let _ = closed_tx.send(());
            });
        }
    });

    Echo {
        addr,
        accepted,
        closed,
    }
}

/// A destination that accepts and never writes.
pub async fn start_silent() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        while let Ok((mut socket, _)) = listener.accept().await {
            tokio::spawn(async move {
                let mut buf = [0u8; 1024];
                while let Ok(n) = socket.read(&mut buf).await {
                    if n == 0 {
                        break;
                    }
                }
            });
        }
    });
    addr
}

/// A destination that writes `total` bytes of a repeating pattern on
/// connect, then holds the connection open.
pub async fn start_flood(total: usize) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        while let Ok((mut socket, _)) = listener.accept().await {
            tokio::spawn(async move {
                let data: Vec<u8> = (0..total).map(|i| (i % 251) as u8).collect();
                if socket.write_all(&data).await.is_err() {
                    return;
                }
                let mut buf = [0u8; 1024];
                while let Ok(n) = socket.read(&mut buf).await {
                    if n == 0 {
                        break;
                    }
                }
            });
        }
    });
    addr
}

/// A destination that resets the first connection it accepts and holds
/// every later one open. Returns the address and the accept count.
#[allow(deprecated)]
pub async fn start_reset_once() -> (SocketAddr, Arc<AtomicUsize>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let accepted = Arc::new(AtomicUsize::new(0));

    let counter = accepted.clone();
    tokio::spawn(async move {
        while let Ok((mut socket, _)) = listener.accept().await {
            if counter.fetch_add(1, Ordering::SeqCst) == 0 {
                let _ = socket.set_linger(Some(Duration::ZERO));
                drop(socket);
                continue;
            }
            tokio::spawn(async move {
                let mut buf = [0u8; 1024];
                while let Ok(n) = socket.read(&mut buf).await {
                    if n == 0 {
                        break;
                    }
                }
            });
        }
    });
    (addr, accepted)
}

/// A tunnel server running on an ephemeral port.
pub struct TestServer {
    pub base: String,
    pub sessions: Arc<SessionStore>,
    pub shutdown: Shutdown,
    pub handle: JoinHandle<std::io::Result<()>>,
}

/// Start a server with direct access allowed and a short read deadline.
/// `configure` adjusts the config before the server is built.
pub async fn start_server(configure: impl FnOnce(&mut TunnelConfig)) -> TestServer {
    let mut config = TunnelConfig::default();
    config.access.allow_direct = true;
    config.polling.read_deadline_ms = 100;
    configure(&mut config);

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let server = HttpServer::new(config);
    let sessions = server.sessions();
    let shutdown = Shutdown::new();
    let receiver = shutdown.subscribe();
    let handle = tokio::spawn(server.run(listener, receiver));

    // Let the accept loop start.
    tokio::time::sleep(Duration::from_millis(50)).await;

    TestServer {
        base: format!("http://{}", addr),
        sessions,
        shutdown,
        handle,
    }
}

pub fn client() -> reqwest::Client {
    reqwest::Client::builder()
        .timeout(Duration::from_secs(10))
        .build()
        .unwrap()
}
