//! Request header interpretation.
//!
//! # Responsibilities
//! - Resolve the client identity through the forwarding header chain
//! - Resolve the session id through its fallback chain
//! - Read the destination and close-intent headers
//!
//! Every chain stops at the first header that is present and non-empty.

use std::net::SocketAddr;

use axum::http::HeaderMap;

/// Address of the client as seen by the front proxy.
pub const CF_CONNECTING_IP: &str = "cf-connecting-ip";
/// Edge-assigned ray id.
pub const CF_RAY: &str = "cf-ray";
pub const X_REAL_IP: &str = "x-real-ip";
pub const X_FORWARDED_FOR: &str = "x-forwarded-for";
/// Explicit session id chosen by the client.
pub const X_FOR: &str = "x-for";
/// Base64-encoded `host:port`.
pub const X_REQUESTED_WITH: &str = "x-requested-with";
/// `true` to tear the session down.
pub const X_CONNECTION_CLOSE: &str = "x-connection-close";
pub const X_REQUEST_ID: &str = "x-request-id";

/// Which link of the chain produced the identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdentitySource {
    FrontProxy,
    RealIp,
    ForwardedFor,
    Peer,
    Unknown,
}

/// The originating client, for logging and access control.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientIdentity {
    pub address: String,
    pub source: IdentitySource,
}

impl ClientIdentity {
    /// Resolve `Cf-Connecting-Ip` → `X-Real-IP` → `X-Forwarded-For` → peer.
    pub fn resolve(headers: &HeaderMap, peer: Option<SocketAddr>) -> Self {
        if let Some(ip) = header_str(headers, CF_CONNECTING_IP) {
            return Self::new(ip, IdentitySource::FrontProxy);
        }
        if let Some(ip) = header_str(headers, X_REAL_IP) {
            return Self::new(ip, IdentitySource::RealIp);
        }
        if let Some(first) = header_str(headers, X_FORWARDED_FOR)
            .and_then(|list| list.split(',').map(str::trim).find(|s| !s.is_empty()))
        {
            return Self::new(first, IdentitySource::ForwardedFor);
        }
        match peer {
            Some(addr) => Self::new(&addr.ip().to_string(), IdentitySource::Peer),
            None => Self::new("", IdentitySource::Unknown),
        }
    }

    fn new(address: &str, source: IdentitySource) -> Self {
        Self {
            address: address.to_string(),
            source,
        }
    }

    /// True when the request carried the front proxy's identity header.
    pub fn is_fronted(&self) -> bool {
        self.source == IdentitySource::FrontProxy
    }
}

/// Resolve the session id: `X-For` → `Cf-Ray` → `Cf-Connecting-Ip`.
pub fn session_id(headers: &HeaderMap) -> Option<String> {
    [X_FOR, CF_RAY, CF_CONNECTING_IP]
        .into_iter()
        .find_map(|name| header_str(headers, name))
        .map(str::to_string)
}

/// The raw destination header value, if any.
pub fn encoded_destination(headers: &HeaderMap) -> Option<&str> {
    header_str(headers, X_REQUESTED_WITH)
}

/// True when the client asked to close the session.
pub fn wants_close(headers: &HeaderMap) -> bool {
    header_str(headers, X_CONNECTION_CLOSE) == Some("true")
}

/// Request id assigned by the request-id layer.
pub fn request_id(headers: &HeaderMap) -> &str {
    header_str(headers, X_REQUEST_ID).unwrap_or("unknown")
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
}
