//! Configuration validation.
//!
//! Serde handles syntax; this checks value ranges and cross-field rules and
//! reports every problem at once.

use std::fmt;

use crate::config::schema::TunnelConfig;
use crate::net::listener::Origin;

/// A single semantic problem in the configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    pub field: &'static str,
    pub message: String,
}

impl ValidationError {
    fn new(field: &'static str, message: impl Into<String>) -> Self {
        Self {
            field,
            message: message.into(),
        }
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Validate a parsed configuration.
pub fn validate_config(config: &TunnelConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    match config.listener.origin.parse::<Origin>() {
        Ok(origin) => {
            if origin.is_https() && config.listener.tls.is_none() {
                errors.push(ValidationError::new(
                    "listener.tls",
                    "HTTPS requires both certificate and key files",
                ));
            }
        }
        Err(e) => errors.push(ValidationError::new("listener.origin", e.to_string())),
    }
    if let Some(tls) = &config.listener.tls {
        if tls.cert_path.is_empty() || tls.key_path.is_empty() {
            errors.push(ValidationError::new(
                "listener.tls",
                "certificate and key paths must both be set",
            ));
        }
    }

    if config.sessions.idle_timeout_secs == 0 {
        errors.push(ValidationError::new("sessions.idle_timeout_secs", "must be > 0"));
    }
    if config.sessions.sweep_interval_secs == 0 {
        errors.push(ValidationError::new("sessions.sweep_interval_secs", "must be > 0"));
    }
    if config.upstream.connect_timeout_secs == 0 {
        errors.push(ValidationError::new("upstream.connect_timeout_secs", "must be > 0"));
    }
    if let Some(command) = &config.upstream.app_command {
        if command.trim().is_empty() {
            errors.push(ValidationError::new("upstream.app_command", "must not be empty"));
        }
    }
    if config.polling.read_deadline_ms == 0 {
        errors.push(ValidationError::new("polling.read_deadline_ms", "must be > 0"));
    }
    if config.polling.chunk_size == 0 {
        errors.push(ValidationError::new("polling.chunk_size", "must be > 0"));
    }
    if config.polling.max_response_bytes < config.polling.chunk_size {
        errors.push(ValidationError::new(
            "polling.max_response_bytes",
            "must be at least polling.chunk_size",
        ));
    }
    if config.timeouts.request_secs == 0 {
        errors.push(ValidationError::new("timeouts.request_secs", "must be > 0"));
    }
    if config.observability.metrics_enabled
        && config.observability.metrics_address.parse::<std::net::SocketAddr>().is_err()
    {
        errors.push(ValidationError::new(
            "observability.metrics_address",
            "must be a socket address",
        ));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
