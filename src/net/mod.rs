//! Network layer subsystem.
//!
//! Listening and accepting are left to `axum::serve`; what remains here is
//! tracking of upgraded connections, which hyper no longer sees once the
//! handshake completes.
//!
//! ```text
//! Tunnel states:
//!     Opened (guard created) → Spliced → Closed (guard dropped)
//! ```

pub mod connection;

pub use connection::{ConnectionGuard, ConnectionId, ConnectionTracker};
