//! Origin address parsing and listener binding.
//!
//! # Responsibilities
//! - Parse the `proto://host:port` origin the tunnel serves on
//! - Refuse to bind anything but a local address
//! - Bind the TCP listener handed to the HTTP server

use std::fmt;
use std::net::{IpAddr, SocketAddr};
use std::str::FromStr;

use tokio::net::TcpListener;
use url::{Host, Url};

/// Error type for listener operations.
#[derive(Debug, thiserror::Error)]
pub enum ListenerError {
    #[error("Invalid origin URL: {0}")]
    InvalidOrigin(String),

    #[error("Origin host must be a local IP address, got {0}")]
    NotLocal(IpAddr),

    #[error("Failed to bind: {0}")]
    Bind(#[from] std::io::Error),
}

/// Transport scheme served on the origin.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scheme {
    Http,
    Https,
}

impl fmt::Display for Scheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scheme::Http => f.write_str("http"),
            Scheme::Https => f.write_str("https"),
        }
    }
}

/// The parsed listen origin.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Origin {
    pub scheme: Scheme,
    pub addr: SocketAddr,
}

impl Origin {
    pub fn is_https(&self) -> bool {
        self.scheme == Scheme::Https
    }
}

impl fmt::Display for Origin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}://{}", self.scheme, self.addr)
    }
}

impl FromStr for Origin {
    type Err = ListenerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let url = Url::parse(s).map_err(|e| ListenerError::InvalidOrigin(format!("{s}: {e}")))?;

        let scheme = match url.scheme() {
            "http" => Scheme::Http,
            "https" => Scheme::Https,
            other => {
                return Err(ListenerError::InvalidOrigin(format!(
                    "scheme must be either 'http' or 'https', got '{other}'"
                )))
            }
        };

        let ip = match url.host() {
            Some(Host::Ipv4(ip)) => IpAddr::V4(ip),
            Some(Host::Ipv6(ip)) => IpAddr::V6(ip),
            Some(Host::Domain(domain)) => domain.parse::<IpAddr>().map_err(|_| {
                ListenerError::InvalidOrigin(format!("host must be an IP address, got '{domain}'"))
            })?,
            None => return Err(ListenerError::InvalidOrigin(format!("{s}: missing host"))),
        };

        let port = url
            .port_or_known_default()
            .ok_or_else(|| ListenerError::InvalidOrigin(format!("{s}: missing port")))?;

        Ok(Self {
            scheme,
            addr: SocketAddr::new(ip, port),
        })
    }
}

/// True for addresses this host can serve on: unspecified, loopback,
/// private ranges, or any address assigned to a local interface.
pub fn is_local_ip(ip: IpAddr) -> bool {
    if ip.is_unspecified() || ip.is_loopback() {
        return true;
    }

    let private = match ip {
        IpAddr::V4(v4) => v4.is_private(),
        // fc00::/7 unique local
        IpAddr::V6(v6) => (v6.segments()[0] & 0xfe00) == 0xfc00,
    };
    if private {
        return true;
    }

    // Binding succeeds only if the address belongs to a local interface.
    std::net::UdpSocket::bind(SocketAddr::new(ip, 0)).is_ok()
}

/// Bind a TCP listener on the origin after checking it is local.
pub async fn bind(origin: &Origin) -> Result<TcpListener, ListenerError> {
    if !is_local_ip(origin.addr.ip()) {
        return Err(ListenerError::NotLocal(origin.addr.ip()));
    }

    let listener = TcpListener::bind(origin.addr).await?;
    tracing::info!(
        address = %listener.local_addr()?,
        scheme = %origin.scheme,
        "Listener bound"
    );
    Ok(listener)
}
