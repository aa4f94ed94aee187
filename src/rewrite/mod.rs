//! Identity rewriting subsystem.
//!
//! # Data Flow
//! ```text
//! Inbound request
//!     → request.rs (drop forwarding headers, point Referer/Origin at upstream)
//!     → [upstream transport]
//!     → headers.rs (strip banners, rewrite Location / Set-Cookie / every value)
//!     → body.rs (buffer + rewrite textual bodies, recompute framing)
//!     → client
//! ```
//!
//! # Design Decisions
//! - Every stage is a plain function over (context, headers/body)
//! - `RewriteContext` is built per request; nothing here is shared mutably
//! - Matching is literal and token-bounded (see matcher.rs), never regex

pub mod body;
pub mod context;
pub mod headers;
pub mod matcher;
pub mod request;

pub use body::{BodyRewriter, Buffered};
pub use context::{is_valid_public_host, requested_host, RewriteContext, UpstreamIdentity};
pub use headers::HeaderSanitizer;
pub use request::RequestSanitizer;
