//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (Axum setup, request ID, tracing span)
//!     → dispatcher.rs (rewrite context, state machine)
//!     → upstream.rs (forward to the origin)
//!     → websocket.rs (splice upgraded connections)
//!     → response.rs (reassemble sanitized response)
//!     → Send to client
//! ```

pub mod dispatcher;
pub mod request;
pub mod response;
pub mod server;
pub mod upstream;
pub mod websocket;

pub use dispatcher::{DispatchState, proxy_handler};
pub use request::X_REQUEST_ID;
pub use server::{AppState, ProxyServer};
pub use upstream::UpstreamClient;
