//! CDN tunnel library.
//!
//! Carries TCP byte streams inside plain HTTP(S) requests so a CDN that only
//! forwards HTTP can relay them. See [`tunnel`] for the session model and
//! [`http`] for the request handling.

pub mod cli;
pub mod config;
pub mod error;
pub mod http;
pub mod lifecycle;
pub mod net;
pub mod observability;
pub mod tunnel;

pub use config::schema::TunnelConfig;
pub use error::TunnelError;
pub use http::HttpServer;
pub use lifecycle::Shutdown;
