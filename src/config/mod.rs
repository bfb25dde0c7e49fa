//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML, optional)
//!     → loader.rs (parse & deserialize)
//!     → cli.rs (command-line overrides)
//!     → validation.rs (semantic checks)
//!     → TunnelConfig (validated, immutable)
//!     → shared by value with the server, reaper and dialer
//! ```
//!
//! # Design Decisions
//! - All fields have defaults so the tunnel runs with no file at all
//! - Validation separates syntactic (serde) from semantic checks

pub mod loader;
pub mod schema;
pub mod validation;

pub use loader::ConfigError;
pub use schema::{
    AccessConfig, ListenerConfig, ObservabilityConfig, PollingConfig, SecurityConfig,
    SessionConfig, TimeoutConfig, TlsConfig, TunnelConfig, UpstreamConfig,
};
