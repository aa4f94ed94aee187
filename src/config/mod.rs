//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! .env file (dotenvy) + CLI flags / env vars
//!     → loader.rs (optional TOML file, then overrides)
//!     → validation.rs (semantic checks)
//!     → ProxyConfig (validated, immutable)
//!     → shared via Arc to every request
//! ```
//!
//! # Design Decisions
//! - Config is read once at startup and never changes afterwards
//! - All fields have defaults to allow minimal configs; only the target is required
//! - Validation separates syntactic (serde) from semantic checks

pub mod loader;
pub mod schema;
pub mod validation;

pub use loader::{ConfigError, ConfigOverrides};
pub use schema::ProxyConfig;
pub use schema::{ListenerConfig, Mode, OversizePolicy, RewriteConfig, UpstreamConfig};
