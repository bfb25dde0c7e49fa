//! Outbound connections behind a session.
//!
//! A session owns exactly one [`Upstream`]: usually a TCP connection to the
//! decoded destination, or, in application mode, the standard streams of a
//! locally spawned process. Both are reached through a [`Dialer`].

use std::io;
use std::pin::Pin;
use std::process::Stdio;
use std::task::{Context, Poll};
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader, ReadBuf};
use tokio::net::TcpStream;
use tokio::process::{Child, ChildStdin, ChildStdout, Command};

use crate::tunnel::destination::Destination;

/// Opens outbound connections for new or disconnected sessions.
#[async_trait]
pub trait Dialer: Send + Sync + std::fmt::Debug {
    async fn dial(&self, destination: &Destination) -> io::Result<Upstream>;
}

/// A live outbound byte stream.
#[derive(Debug)]
pub enum Upstream {
    Tcp(TcpStream),
    Process(ProcessStream),
}

impl Upstream {
    /// Shut the stream down. Errors are irrelevant at this point and ignored.
    pub async fn close(self) {
        match self {
            Upstream::Tcp(mut stream) => {
                let _ = stream.shutdown().await;
            }
            Upstream::Process(process) => process.terminate().await,
        }
    }
}

impl AsyncRead for Upstream {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        match self.get_mut() {
            Upstream::Tcp(stream) => Pin::new(stream).poll_read(cx, buf),
            Upstream::Process(process) => Pin::new(&mut process.stdout).poll_read(cx, buf),
        }
    }
}

impl AsyncWrite for Upstream {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        match self.get_mut() {
            Upstream::Tcp(stream) => Pin::new(stream).poll_write(cx, buf),
            Upstream::Process(process) => Pin::new(&mut process.stdin).poll_write(cx, buf),
        }
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match self.get_mut() {
            Upstream::Tcp(stream) => Pin::new(stream).poll_flush(cx),
            Upstream::Process(process) => Pin::new(&mut process.stdin).poll_flush(cx),
        }
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match self.get_mut() {
            Upstream::Tcp(stream) => Pin::new(stream).poll_shutdown(cx),
            Upstream::Process(process) => Pin::new(&mut process.stdin).poll_shutdown(cx),
        }
    }
}

/// Dials the destination over TCP.
#[derive(Debug, Clone)]
pub struct TcpDialer {
    connect_timeout: Duration,
}

impl TcpDialer {
    pub fn new(connect_timeout: Duration) -> Self {
        Self { connect_timeout }
    }
}

#[async_trait]
impl Dialer for TcpDialer {
    async fn dial(&self, destination: &Destination) -> io::Result<Upstream> {
        let connect = TcpStream::connect((destination.host(), destination.port()));
        let stream = match tokio::time::timeout(self.connect_timeout, connect).await {
            Ok(result) => result?,
            Err(_) => {
                return Err(io::Error::new(
                    io::ErrorKind::TimedOut,
                    format!("connect to {} timed out after {:?}", destination, self.connect_timeout),
                ))
            }
        };
        stream.set_nodelay(true)?;
        Ok(Upstream::Tcp(stream))
    }
}

/// Spawns one local process per session and talks to its stdin/stdout.
///
/// The destination is still validated by the handler but otherwise ignored.
#[derive(Debug, Clone)]
pub struct ProcessDialer {
    program: String,
    args: Vec<String>,
}

impl ProcessDialer {
    /// Build from a whitespace-separated command line. Returns `None` when empty.
    pub fn from_command_line(command: &str) -> Option<Self> {
        let mut parts = command.split_whitespace().map(str::to_string);
        let program = parts.next()?;
        Some(Self {
            program,
            args: parts.collect(),
        })
    }
}

#[async_trait]
impl Dialer for ProcessDialer {
    async fn dial(&self, destination: &Destination) -> io::Result<Upstream> {
        let mut child = Command::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()?;

        let missing = |name: &str| io::Error::new(io::ErrorKind::BrokenPipe, format!("child {name} unavailable"));
        let stdin = child.stdin.take().ok_or_else(|| missing("stdin"))?;
        let stdout = child.stdout.take().ok_or_else(|| missing("stdout"))?;

        if let Some(stderr) = child.stderr.take() {
            let program = self.program.clone();
            tokio::spawn(async move {
                let mut lines = BufReader::new(stderr).lines();
                loop {
                    match lines.next_line().await {
                        Ok(Some(line)) => tracing::debug!(program = %program, "stderr: {}", line),
                        Ok(None) => break,
                        Err(e) => {
                            tracing::debug!(program = %program, error = %e, "Error reading application stderr");
                            break;
                        }
                    }
                }
            });
        }

        tracing::debug!(
            program = %self.program,
            pid = ?child.id(),
            destination = %destination,
            "Application launched"
        );

        Ok(Upstream::Process(ProcessStream { child, stdin, stdout }))
    }
}

/// The piped standard streams of a spawned application.
#[derive(Debug)]
pub struct ProcessStream {
    child: Child,
    stdin: ChildStdin,
    stdout: ChildStdout,
}

impl ProcessStream {
    async fn terminate(self) {
        let ProcessStream { mut child, stdin, stdout } = self;
        drop(stdin);
        drop(stdout);
        if let Err(e) = child.kill().await {
            tracing::debug!(error = %e, "Application already exited");
        }
    }
}
