//! Network layer subsystem.
//!
//! # Data Flow
//! ```text
//! Origin URL (proto://host:port)
//!     → listener.rs (parse, local-address check, bind)
//!     → tls.rs (optional rustls configuration for https)
//!     → Hand off to HTTP layer
//! ```
//!
//! # Design Decisions
//! - Only local addresses may be bound
//! - TLS is optional and handled transparently; the handler never knows

pub mod listener;
pub mod tls;
