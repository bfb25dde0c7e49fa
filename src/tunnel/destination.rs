//! Destination decoding and validation.
//!
//! The client names its target as `host:port`, base64-encoded into a request
//! header. Decoding happens before any session lookup, so a malformed
//! destination never reaches the dialer.

use std::fmt;

use base64::{engine::general_purpose::STANDARD, Engine as _};

/// Errors produced while decoding a destination header.
#[derive(Debug, thiserror::Error)]
pub enum DestinationError {
    /// The header value is not valid base64.
    #[error("invalid destination encoding: {0}")]
    Decode(#[from] base64::DecodeError),

    /// The decoded bytes are not UTF-8.
    #[error("destination is not valid UTF-8")]
    Utf8(#[from] std::string::FromUtf8Error),

    /// The decoded string is not shaped like `host:port`.
    #[error("invalid destination format: {0:?}")]
    Format(String),

    /// The port is not a number in `1..=65535`.
    #[error("destination port out of range: {0:?}")]
    PortRange(String),
}

impl DestinationError {
    /// True when the value decoded fine but does not describe a `host:port`.
    pub fn is_shape(&self) -> bool {
        matches!(self, DestinationError::Format(_) | DestinationError::PortRange(_))
    }
}

/// A validated dial target.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Destination {
    host: String,
    port: u16,
}

impl Destination {
    /// Decode a base64 header value into a destination.
    pub fn decode(encoded: &str) -> Result<Self, DestinationError> {
        let bytes = STANDARD.decode(encoded.trim())?;
        let decoded = String::from_utf8(bytes)?;
        decoded.parse()
    }

    /// Encode this destination the way clients send it.
    pub fn encode(&self) -> String {
        STANDARD.encode(self.to_string())
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }
}

impl std::str::FromStr for Destination {
    type Err = DestinationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (host, port) = split_host_port(s)?;
        if host.is_empty() {
            return Err(DestinationError::Format(s.to_string()));
        }

        let port = match port.parse::<u32>() {
            Ok(p) if (1..=65535).contains(&p) => p as u16,
            _ => return Err(DestinationError::PortRange(port.to_string())),
        };

        Ok(Self {
            host: host.to_string(),
            port,
        })
    }
}

impl fmt::Display for Destination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.host.contains(':') {
            write!(f, "[{}]:{}", self.host, self.port)
        } else {
            write!(f, "{}:{}", self.host, self.port)
        }
    }
}

/// Split `host:port` or `[v6]:port`. Unbracketed hosts may not contain colons.
fn split_host_port(s: &str) -> Result<(&str, &str), DestinationError> {
    let format_err = || DestinationError::Format(s.to_string());

    if let Some(rest) = s.strip_prefix('[') {
        let (host, after) = rest.split_once(']').ok_or_else(format_err)?;
        let port = after.strip_prefix(':').ok_or_else(format_err)?;
        return Ok((host, port));
    }

    let (host, port) = s.rsplit_once(':').ok_or_else(format_err)?;
    if host.contains(':') || host.contains('[') || host.contains(']') {
        return Err(format_err());
    }
    Ok((host, port))
}
