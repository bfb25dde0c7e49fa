//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP/TLS connection
//!     → server.rs (Axum setup, middleware, serve loop)
//!     → request.rs (identity, session id, destination and close headers)
//!     → tunnel.rs (session step: close / write / drain)
//!     → response.rs (static headers)
//!     → Send to client
//! ```

pub mod request;
pub mod response;
pub mod server;
pub mod tunnel;

pub use server::HttpServer;
pub use tunnel::AppState;
