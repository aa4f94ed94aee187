//! Response header sanitization.
//!
//! # Responsibilities
//! - Remove headers that advertise backend software (Server, X-Powered-By, ...)
//! - Rewrite Location, Set-Cookie domains and every other header value so no
//!   upstream host or IP reaches the client
//! - Strip hop-by-hop headers in both directions
//!
//! # Design Decisions
//! - Runs before any body processing
//! - Set-Cookie values are rewritten one by one; count and order are preserved
//! - A value that cannot be rebuilt is dropped rather than forwarded raw

use axum::http::header::{CONNECTION, SET_COOKIE, UPGRADE};
use axum::http::{HeaderMap, HeaderName, HeaderValue};

use crate::rewrite::RewriteContext;

/// Headers that reveal backend software or topology. Always removed.
pub const IDENTITY_HEADERS: &[&str] = &[
    "x-powered-by",
    "server",
    "x-aspnet-version",
    "x-aspnetmvc-version",
    "via",
];

const HOP_BY_HOP: &[&str] = &[
    "connection",
    "keep-alive",
    "proxy-connection",
    "proxy-authenticate",
    "proxy-authorization",
    "te",
    "trailer",
    "transfer-encoding",
    "upgrade",
];

/// Remove hop-by-hop headers, including any named by `Connection`.
///
/// With `keep_upgrade`, `Connection` and `Upgrade` survive so a protocol
/// upgrade handshake can pass through.
pub fn strip_hop_by_hop(headers: &mut HeaderMap, keep_upgrade: bool) {
    let listed: Vec<HeaderName> = headers
        .get_all(CONNECTION)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(','))
        .filter_map(|name| HeaderName::from_bytes(name.trim().as_bytes()).ok())
        .collect();

    for name in listed {
        if keep_upgrade && (name == UPGRADE || name == CONNECTION) {
            continue;
        }
        headers.remove(name);
    }

    for name in HOP_BY_HOP {
        if keep_upgrade && (*name == "connection" || *name == "upgrade") {
            continue;
        }
        headers.remove(*name);
    }
}

/// Strips identity headers and rewrites the rest of a response header map.
#[derive(Debug, Clone)]
pub struct HeaderSanitizer {
    strip: Vec<HeaderName>,
}

impl HeaderSanitizer {
    /// Built-in strip set plus `extra` names. Invalid names are ignored.
    pub fn new(extra: &[String]) -> Self {
        let strip = IDENTITY_HEADERS
            .iter()
            .map(|name| name.to_string())
            .chain(extra.iter().cloned())
            .filter_map(|name| HeaderName::from_bytes(name.as_bytes()).ok())
            .collect();
        Self { strip }
    }

    pub fn sanitize(&self, ctx: &RewriteContext, headers: &mut HeaderMap) {
        for name in &self.strip {
            headers.remove(name);
        }

        let mut unusable = Vec::new();
        for (name, value) in headers.iter_mut() {
            let rewritten = if *name == SET_COOKIE {
                rewrite_set_cookie(ctx, value.as_bytes())
            } else {
                ctx.rewrite(value.as_bytes())
            };
            let Some(bytes) = rewritten else {
                continue;
            };
            match HeaderValue::from_bytes(&bytes) {
                Ok(v) => *value = v,
                Err(_) => unusable.push(name.clone()),
            }
        }

        for name in unusable {
            tracing::warn!(header = %name, "Dropping header that could not be rewritten");
            headers.remove(name);
        }
    }
}

/// Rewrite one Set-Cookie value: Domain attribute first, then any other reference.
pub fn rewrite_set_cookie(ctx: &RewriteContext, raw: &[u8]) -> Option<Vec<u8>> {
    let domain_fixed = rewrite_cookie_domain(ctx, raw);
    let source = domain_fixed.as_deref().unwrap_or(raw);
    ctx.rewrite(source).or(domain_fixed)
}

fn rewrite_cookie_domain(ctx: &RewriteContext, raw: &[u8]) -> Option<Vec<u8>> {
    let mut out = Vec::with_capacity(raw.len());
    let mut changed = false;

    for (idx, segment) in raw.split(|&b| b == b';').enumerate() {
        if idx == 0 {
            out.extend_from_slice(segment);
            continue;
        }
        out.push(b';');
        match rewrite_domain_attribute(ctx, segment) {
            Some(rewritten) => {
                out.extend_from_slice(&rewritten);
                changed = true;
            }
            None => out.extend_from_slice(segment),
        }
    }

    changed.then_some(out)
}

fn rewrite_domain_attribute(ctx: &RewriteContext, segment: &[u8]) -> Option<Vec<u8>> {
    let eq = segment.iter().position(|&b| b == b'=')?;
    if !segment[..eq].trim_ascii().eq_ignore_ascii_case(b"domain") {
        return None;
    }

    let value = segment[eq + 1..].trim_ascii();
    let (dot, bare) = match value.strip_prefix(b".") {
        Some(rest) => (&b"."[..], rest),
        None => (&b""[..], value),
    };
    let domain = std::str::from_utf8(bare).ok()?.to_ascii_lowercase();
    if !covers_upstream(ctx, &domain) {
        return None;
    }

    let mut out = segment[..=eq].to_vec();
    out.extend_from_slice(dot);
    out.extend_from_slice(ctx.public_hostname().as_bytes());
    Some(out)
}

/// A cookie domain that the browser would only accept from the upstream.
fn covers_upstream(ctx: &RewriteContext, domain: &str) -> bool {
    let upstream = ctx.upstream();
    if domain == upstream.hostname() || upstream.ip() == Some(domain) {
        return true;
    }
    domain.contains('.')
        && upstream
            .hostname()
            .strip_suffix(domain)
            .is_some_and(|prefix| prefix.ends_with('.'))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rewrite::context::tests::context;

    fn map(pairs: &[(&str, &str)]) -> HeaderMap {
        let mut headers = HeaderMap::new();
        for (k, v) in pairs {
            headers.append(
                HeaderName::from_bytes(k.as_bytes()).unwrap(),
                HeaderValue::from_str(v).unwrap(),
            );
        }
        headers
    }

    fn sanitize(pairs: &[(&str, &str)]) -> HeaderMap {
        let mut headers = map(pairs);
        HeaderSanitizer::new(&[]).sanitize(&context(), &mut headers);
        headers
    }

    #[test]
    fn removes_identity_headers() {
        let headers = sanitize(&[
            ("server", "nginx/1.25"),
            ("X-Powered-By", "Express"),
            ("x-aspnet-version", "4.0"),
            ("x-aspnetmvc-version", "5.2"),
            ("content-type", "text/html"),
        ]);
        assert_eq!(headers.len(), 1);
        assert_eq!(headers.get("content-type").unwrap(), "text/html");
    }

    #[test]
    fn extra_strip_names_are_honoured() {
        let mut headers = map(&[("x-backend-node", "web-3"), ("x-cache", "HIT")]);
        HeaderSanitizer::new(&["X-Backend-Node".to_string()]).sanitize(&context(), &mut headers);
        assert!(headers.get("x-backend-node").is_none());
        assert!(headers.get("x-cache").is_some());
    }

    #[test]
    fn location_is_rewritten() {
        let headers = sanitize(&[("location", "https://origin.example.com/login")]);
        assert_eq!(headers.get("location").unwrap(), "https://proxy.example.com/login");

        let headers = sanitize(&[("location", "http://10.0.0.5/health")]);
        assert_eq!(headers.get("location").unwrap(), "http://proxy.example.com/health");
    }

    #[test]
    fn cookie_domain_is_rewritten() {
        let headers = sanitize(&[("set-cookie", "session=abc; Domain=origin.example.com")]);
        assert_eq!(headers.get("set-cookie").unwrap(), "session=abc; Domain=proxy.example.com");
    }

    #[test]
    fn cookie_domain_drops_public_port_and_keeps_dot() {
        let ctx = RewriteContext::new(
            crate::rewrite::context::tests::identity("https://www.origin.example.com", None),
            "localhost:3000",
            "http",
        )
        .unwrap();
        let out = rewrite_set_cookie(&ctx, b"id=1; Path=/; domain=.ORIGIN.example.com; Secure").unwrap();
        assert_eq!(out, b"id=1; Path=/; domain=.localhost; Secure");

        // Public host already in place: nothing to do.
        assert!(rewrite_set_cookie(&ctx, b"id=1; Domain=localhost").is_none());
        // A bare TLD is never treated as a parent domain.
        assert!(rewrite_set_cookie(&ctx, b"id=1; Domain=com").is_none());
    }

    #[test]
    fn set_cookie_list_keeps_length_and_order() {
        let headers = sanitize(&[
            ("set-cookie", "a=1; Domain=origin.example.com"),
            ("set-cookie", "b=2; Path=/"),
            ("set-cookie", "c=10.0.0.5; Domain=10.0.0.5"),
        ]);
        let cookies: Vec<_> = headers
            .get_all("set-cookie")
            .iter()
            .map(|v| v.to_str().unwrap().to_string())
            .collect();
        assert_eq!(
            cookies,
            vec![
                "a=1; Domain=proxy.example.com",
                "b=2; Path=/",
                "c=proxy.example.com; Domain=proxy.example.com",
            ]
        );
    }

    #[test]
    fn no_header_value_leaks_after_sanitizing() {
        let ctx = context();
        let hosts = ["origin.example.com", "ORIGIN.EXAMPLE.COM", "Origin.Example.Com", "10.0.0.5"];
        let templates = [
            "{}",
            "https://{}/a",
            "http://{}",
            "wss://{}/socket",
            "<https://{}/next>; rel=\"next\"",
            "x={}; Domain={}",
            "default-src 'self' https://{} {}",
            "max-age=0, url={}/retry",
        ];
        let names = ["location", "set-cookie", "link", "content-security-policy", "x-upstream", "refresh"];

        for host in hosts {
            for template in templates {
                let value = template.replace("{}", host);
                for name in names {
                    let mut headers = map(&[(name, &value)]);
                    HeaderSanitizer::new(&[]).sanitize(&ctx, &mut headers);
                    for (_, v) in headers.iter() {
                        let lower = v.to_str().unwrap().to_ascii_lowercase();
                        assert!(!lower.contains("origin.example.com"), "{} leaked in {}: {}", host, name, lower);
                        assert!(!lower.contains("10.0.0.5"), "{} leaked in {}: {}", host, name, lower);
                        assert!(!ctx.leaks(v.as_bytes()));
                    }
                }
            }
        }
    }

    #[test]
    fn strip_hop_by_hop_honours_connection_list() {
        let mut headers = map(&[
            ("connection", "close, X-Trace"),
            ("x-trace", "1"),
            ("transfer-encoding", "chunked"),
            ("content-type", "text/plain"),
        ]);
        strip_hop_by_hop(&mut headers, false);
        assert_eq!(headers.len(), 1);
        assert!(headers.get("content-type").is_some());
    }
}
