//! Identity-hiding reverse proxy library.
//!
//! Forwards every request to a single upstream origin and rewrites what comes
//! back (headers, redirects, cookies, textual bodies) so the origin's
//! hostname and IP never reach the client.

pub mod config;
pub mod error;
pub mod http;
pub mod lifecycle;
pub mod net;
pub mod observability;
pub mod rewrite;

pub use config::schema::ProxyConfig;
pub use error::{ProxyError, StartupError};
pub use http::ProxyServer;
pub use lifecycle::Shutdown;
