//! Session multiplexing core.
//!
//! # Data Flow
//! ```text
//! X-Requested-With header
//!     → destination.rs (base64 decode, host:port validation)
//!     → store.rs (session id → session, dial on miss/disconnect)
//!     → session.rs (locked write / bounded drain of the upstream)
//!     → upstream.rs (TCP connection or spawned application stdio)
//!
//! reaper.rs runs beside all of this and evicts idle sessions.
//! ```
//!
//! # Session States
//! ```text
//! NO-ENTRY → CONNECTED → DISCONNECTED (fatal I/O error, entry kept)
//!                      → REMOVED      (close header or idle eviction)
//! DISCONNECTED → CONNECTED (redial on the next request)
//! ```

pub mod destination;
pub mod reaper;
pub mod session;
pub mod store;
pub mod upstream;

pub use destination::{Destination, DestinationError};
pub use reaper::Reaper;
pub use session::{Connection, PollLimits, SessionGuard};
pub use store::SessionStore;
pub use upstream::{Dialer, ProcessDialer, TcpDialer, Upstream};
