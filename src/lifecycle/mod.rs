//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Signals (signals.rs):
//!     SIGTERM/SIGINT → Shutdown::trigger
//!
//! Shutdown (shutdown.rs):
//!     trigger → server stops accepting → in-flight requests finish
//!             → tunnels close → exit (bounded by the grace period)
//! ```
//!
//! # Design Decisions
//! - One coordinator, cloned into every task that needs to observe it
//! - Shutdown has timeout: remaining work is aborted after the grace period

pub mod shutdown;
pub mod signals;

pub use shutdown::Shutdown;
