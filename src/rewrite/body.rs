//! Textual body rewriting.
//!
//! # Responsibilities
//! - Decide whether a response body is textual (HTML, JS, JSON)
//! - Buffer it up to a bounded size
//! - Replace upstream references and recompute framing
//!
//! # Design Decisions
//! - Non-textual bodies are never buffered; they stream straight through
//! - Replacement runs on raw bytes, so bodies that are not valid UTF-8 are
//!   still handled without corruption
//! - The size bound is checked against Content-Length before reading anything

use axum::http::header::{CONTENT_ENCODING, CONTENT_LENGTH, CONTENT_TYPE};
use axum::http::{HeaderMap, HeaderValue};
use bytes::{Bytes, BytesMut};
use futures_util::{Stream, StreamExt};

use crate::config::{OversizePolicy, RewriteConfig};
use crate::error::ProxyError;
use crate::rewrite::RewriteContext;

/// Outcome of buffering a body.
pub enum Buffered<S> {
    /// The whole body, within the limit.
    Complete(Bytes),
    /// The limit was hit. `prefix` holds what was already read; `rest` the remainder.
    Oversized { prefix: Bytes, rest: S },
}

#[derive(Debug, Clone)]
pub struct BodyRewriter {
    enabled: bool,
    max_body_bytes: usize,
    oversize_policy: OversizePolicy,
    textual: Vec<String>,
}

impl BodyRewriter {
    pub fn new(config: &RewriteConfig) -> Self {
        Self {
            enabled: config.enabled,
            max_body_bytes: config.max_body_bytes,
            oversize_policy: config.oversize_policy,
            textual: config
                .textual_content_types
                .iter()
                .map(|t| t.trim().to_ascii_lowercase())
                .collect(),
        }
    }

    pub fn max_body_bytes(&self) -> usize {
        self.max_body_bytes
    }

    pub fn oversize_policy(&self) -> OversizePolicy {
        self.oversize_policy
    }

    /// Whether the content type selects the rewrite path.
    pub fn is_textual(&self, headers: &HeaderMap) -> bool {
        if !self.enabled {
            return false;
        }
        let Some(content_type) = headers.get(CONTENT_TYPE).and_then(|v| v.to_str().ok()) else {
            return false;
        };
        let content_type = content_type.trim().to_ascii_lowercase();
        self.textual.iter().any(|t| content_type.starts_with(t.as_str()))
    }

    /// Whether the body is encoded in a way byte replacement cannot handle.
    pub fn is_encoded(headers: &HeaderMap) -> bool {
        headers
            .get(CONTENT_ENCODING)
            .and_then(|v| v.to_str().ok())
            .is_some_and(|v| !v.trim().is_empty() && !v.trim().eq_ignore_ascii_case("identity"))
    }

    /// Read a body stream into memory, stopping once it would exceed the limit.
    pub async fn buffer<S, E>(&self, declared_len: Option<u64>, mut stream: S) -> Result<Buffered<S>, E>
    where
        S: Stream<Item = Result<Bytes, E>> + Unpin,
    {
        if declared_len.is_some_and(|len| len > self.max_body_bytes as u64) {
            return Ok(Buffered::Oversized {
                prefix: Bytes::new(),
                rest: stream,
            });
        }

        let mut buf = BytesMut::with_capacity(declared_len.unwrap_or(0) as usize);
        while let Some(chunk) = stream.next().await {
            let chunk = chunk?;
            buf.extend_from_slice(&chunk);
            if buf.len() > self.max_body_bytes {
                return Ok(Buffered::Oversized {
                    prefix: buf.freeze(),
                    rest: stream,
                });
            }
        }
        Ok(Buffered::Complete(buf.freeze()))
    }

    /// Replace upstream references in a fully buffered body.
    pub fn rewrite(&self, ctx: &RewriteContext, body: Bytes) -> Bytes {
        if body.is_empty() {
            return body;
        }
        if let Err(e) = std::str::from_utf8(&body) {
            let err = ProxyError::RewriteEncoding(e);
            tracing::debug!(error = %err, "Rewriting body as raw bytes");
        }
        match ctx.rewrite(&body) {
            Some(rewritten) => Bytes::from(rewritten),
            None => body,
        }
    }

    /// Set Content-Length for a rewritten body of `len` bytes.
    pub fn reframe(headers: &mut HeaderMap, len: usize) {
        headers.remove(CONTENT_LENGTH);
        headers.insert(CONTENT_LENGTH, HeaderValue::from(len));
    }
}

/// The Content-Length an upstream declared, if any.
pub fn declared_length(headers: &HeaderMap) -> Option<u64> {
    headers
        .get(CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse().ok())
}
