//! Outbound request sanitization.
//!
//! # Responsibilities
//! - Drop forwarding headers that describe the proxy hop
//! - Drop Host so the transport addresses the upstream itself
//! - Point Referer/Origin back at the upstream's own domain
//! - Ask for uncompressed bodies when they may need rewriting

use axum::http::header::{ACCEPT_ENCODING, HOST, ORIGIN, REFERER};
use axum::http::{HeaderMap, HeaderValue};

use crate::rewrite::headers::strip_hop_by_hop;
use crate::rewrite::RewriteContext;

/// Forwarding headers removed before a request leaves the proxy.
pub const FORWARDING_HEADERS: &[&str] = &[
    "x-forwarded-host",
    "x-forwarded-server",
    "x-forwarded-port",
    "forwarded",
    "via",
];

/// Mutates the outbound header map of a request. Never touches the body.
#[derive(Debug, Clone)]
pub struct RequestSanitizer {
    force_identity_encoding: bool,
}

impl RequestSanitizer {
    pub fn new(force_identity_encoding: bool) -> Self {
        Self {
            force_identity_encoding,
        }
    }

    pub fn sanitize(&self, ctx: &RewriteContext, headers: &mut HeaderMap, upgrade: bool) {
        strip_hop_by_hop(headers, upgrade);
        headers.remove(HOST);

        for name in FORWARDING_HEADERS {
            headers.remove(*name);
        }

        for name in [REFERER, ORIGIN] {
            let Some(value) = headers.get_mut(&name) else {
                continue;
            };
            if let Some(rewritten) = ctx.rewrite_to_upstream(value.as_bytes()) {
                match HeaderValue::from_bytes(&rewritten) {
                    Ok(v) => *value = v,
                    Err(_) => {
                        headers.remove(&name);
                    }
                }
            }
        }

        if self.force_identity_encoding && !upgrade {
            headers.insert(ACCEPT_ENCODING, HeaderValue::from_static("identity"));
        }
    }
}
