//! Upstream identity and the per-request rewrite context.

use std::sync::Arc;

use axum::http::{header::HOST, Request};
use url::{Host, Url};

use crate::config::validation::ValidationError;
use crate::config::UpstreamConfig;
use crate::error::ProxyError;
use crate::rewrite::matcher::{self, Pattern, TokenKind};

const WEB_SCHEMES: &[&str] = &["https://", "http://"];
const WS_SCHEMES: &[&str] = &["wss://", "ws://"];

/// The real identity of the origin, derived once from configuration.
#[derive(Debug, Clone)]
pub struct UpstreamIdentity {
    base_url: Url,
    hostname: String,
    authority: String,
    ip: Option<String>,
}

impl UpstreamIdentity {
    /// Derive the identity from the upstream section of the config.
    pub fn from_config(config: &UpstreamConfig) -> Result<Self, ValidationError> {
        let raw = config.target_url.trim();
        if raw.is_empty() {
            return Err(ValidationError::MissingUpstream);
        }

        let invalid = |reason: &str| ValidationError::InvalidUpstream {
            url: raw.to_string(),
            reason: reason.to_string(),
        };

        let base_url = Url::parse(raw).map_err(|e| invalid(&e.to_string()))?;
        if base_url.scheme() != "http" && base_url.scheme() != "https" {
            return Err(invalid("scheme must be http or https"));
        }

        let hostname = base_url
            .host_str()
            .ok_or_else(|| invalid("missing host"))?
            .to_ascii_lowercase();

        let authority = match base_url.port() {
            Some(port) => format!("{}:{}", hostname, port),
            None => hostname.clone(),
        };

        let ip = config.ip.clone().or_else(|| match base_url.host() {
            Some(Host::Ipv4(addr)) => Some(addr.to_string()),
            Some(Host::Ipv6(addr)) => Some(addr.to_string()),
            _ => None,
        });

        Ok(Self {
            base_url,
            hostname,
            authority,
            ip,
        })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    pub fn scheme(&self) -> &str {
        self.base_url.scheme()
    }

    /// Host without port.
    pub fn hostname(&self) -> &str {
        &self.hostname
    }

    /// Host plus the port, when one is given explicitly.
    pub fn authority(&self) -> &str {
        &self.authority
    }

    pub fn ip(&self) -> Option<&str> {
        self.ip.as_deref()
    }

    /// Host needles, most specific first.
    pub fn host_needles(&self) -> impl Iterator<Item = &str> {
        let with_port = (self.authority != self.hostname).then_some(self.authority.as_str());
        with_port.into_iter().chain(std::iter::once(self.hostname.as_str()))
    }
}

/// Whether a host value is safe to splice into rewritten content.
pub fn is_valid_public_host(host: &str) -> bool {
    !host.is_empty()
        && host.len() <= 255
        && host
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || matches!(b, b'.' | b'-' | b'_' | b':' | b'[' | b']'))
}

/// The host the client addressed: Host header first, then the URI authority.
pub fn requested_host<B>(request: &Request<B>) -> Option<&str> {
    request
        .headers()
        .get(HOST)
        .and_then(|v| v.to_str().ok())
        .or_else(|| request.uri().authority().map(|a| a.as_str()))
}

/// Everything a rewrite needs for one request.
///
/// Built fresh per request and owned by that request's task.
#[derive(Debug, Clone)]
pub struct RewriteContext {
    upstream: Arc<UpstreamIdentity>,
    public_host: String,
    secure: bool,
}

impl RewriteContext {
    pub fn new(
        upstream: Arc<UpstreamIdentity>,
        public_host: &str,
        public_scheme: &str,
    ) -> Result<Self, ProxyError> {
        let public_host = public_host.trim().to_ascii_lowercase();
        if !is_valid_public_host(&public_host) {
            return Err(ProxyError::InvalidHost);
        }
        Ok(Self {
            upstream,
            public_host,
            secure: public_scheme != "http",
        })
    }

    pub fn upstream(&self) -> &UpstreamIdentity {
        &self.upstream
    }

    /// Public host as addressed by the client, port included.
    pub fn public_host(&self) -> &str {
        &self.public_host
    }

    /// Public host without port, as used in cookie domains.
    pub fn public_hostname(&self) -> &str {
        let host = self.public_host.as_str();
        if host.starts_with('[') {
            return host.find(']').map_or(host, |end| &host[..=end]);
        }
        host.split(':').next().unwrap_or(host)
    }

    fn web_origin(&self) -> String {
        let scheme = if self.secure { "https" } else { "http" };
        format!("{}://{}", scheme, self.public_host)
    }

    fn ws_origin(&self) -> String {
        let scheme = if self.secure { "wss" } else { "ws" };
        format!("{}://{}", scheme, self.public_host)
    }

    /// Replace upstream references with the public identity.
    ///
    /// Order: scheme-qualified host, bare host, then IP. Returns `None` when
    /// the input holds no reference.
    pub fn rewrite(&self, input: &[u8]) -> Option<Vec<u8>> {
        let protect = self.public_host.as_bytes();
        let web = self.web_origin();
        let ws = self.ws_origin();
        let mut out = None;

        for needle in self.upstream.host_needles() {
            let schemed = Pattern::with_schemes(WEB_SCHEMES, needle, TokenKind::Host);
            apply(&mut out, input, &schemed, web.as_bytes(), protect);
            let schemed = Pattern::with_schemes(WS_SCHEMES, needle, TokenKind::Host);
            apply(&mut out, input, &schemed, ws.as_bytes(), protect);
        }
        for needle in self.upstream.host_needles() {
            let bare = Pattern::bare(needle, TokenKind::Host);
            apply(&mut out, input, &bare, protect, protect);
        }
        if let Some(ip) = self.upstream.ip() {
            let bare = Pattern::bare(ip, TokenKind::Address);
            apply(&mut out, input, &bare, protect, protect);
        }

        out
    }

    /// Replace public references with the upstream identity (request direction).
    pub fn rewrite_to_upstream(&self, input: &[u8]) -> Option<Vec<u8>> {
        let authority = self.upstream.authority();
        let protect = authority.as_bytes();
        let origin = format!("{}://{}", self.upstream.scheme(), authority);
        let mut out = None;

        let schemed = Pattern::with_schemes(WEB_SCHEMES, &self.public_host, TokenKind::Host);
        apply(&mut out, input, &schemed, origin.as_bytes(), protect);
        let bare = Pattern::bare(&self.public_host, TokenKind::Host);
        apply(&mut out, input, &bare, protect, protect);

        out
    }

    /// Whether the input still references the upstream host or IP.
    pub fn leaks(&self, input: &[u8]) -> bool {
        let protect = self.public_host.as_bytes();
        self.upstream
            .host_needles()
            .any(|needle| matcher::contains(input, &Pattern::bare(needle, TokenKind::Host), protect))
            || self
                .upstream
                .ip()
                .is_some_and(|ip| matcher::contains(input, &Pattern::bare(ip, TokenKind::Address), protect))
    }
}

fn apply(
    current: &mut Option<Vec<u8>>,
    input: &[u8],
    pattern: &Pattern<'_>,
    replacement: &[u8],
    protect: &[u8],
) {
    let source = current.as_deref().unwrap_or(input);
    if let Some(rewritten) = matcher::replace_all(source, pattern, replacement, protect) {
        *current = Some(rewritten);
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub(crate) fn identity(target: &str, ip: Option<&str>) -> Arc<UpstreamIdentity> {
        let config = UpstreamConfig {
            target_url: target.to_string(),
            ip: ip.map(String::from),
            ..Default::default()
        };
        Arc::new(UpstreamIdentity::from_config(&config).unwrap())
    }

    pub(crate) fn context() -> RewriteContext {
        RewriteContext::new(
            identity("https://origin.example.com", Some("10.0.0.5")),
            "proxy.example.com",
            "https",
        )
        .unwrap()
    }

    fn rewrite(ctx: &RewriteContext, input: &str) -> String {
        match ctx.rewrite(input.as_bytes()) {
            Some(out) => String::from_utf8(out).unwrap(),
            None => input.to_string(),
        }
    }

    #[test]
    fn identity_from_target() {
        let id = identity("https://Origin.Example.com:8443/app", None);
        assert_eq!(id.hostname(), "origin.example.com");
        assert_eq!(id.authority(), "origin.example.com:8443");
        assert_eq!(id.host_needles().collect::<Vec<_>>(), vec!["origin.example.com:8443", "origin.example.com"]);
        assert_eq!(id.ip(), None);

        let id = identity("http://10.0.0.5:8080", None);
        assert_eq!(id.ip(), Some("10.0.0.5"));
    }

    #[test]
    fn rewrites_in_documented_order() {
        let ctx = context();
        assert_eq!(
            rewrite(&ctx, r#"<a href="http://origin.example.com/x">10.0.0.5</a>"#),
            r#"<a href="https://proxy.example.com/x">proxy.example.com</a>"#
        );
        assert_eq!(
            rewrite(&ctx, "new WebSocket('ws://origin.example.com/live')"),
            "new WebSocket('wss://proxy.example.com/live')"
        );
        assert_eq!(rewrite(&ctx, "//origin.example.com/app.js"), "//proxy.example.com/app.js");
    }

    #[test]
    fn port_qualified_host_is_replaced_whole() {
        let ctx = RewriteContext::new(
            identity("http://origin.example.com:8080", None),
            "proxy.example.com",
            "https",
        )
        .unwrap();
        assert_eq!(
            rewrite(&ctx, "http://origin.example.com:8080/a origin.example.com:8080 origin.example.com"),
            "https://proxy.example.com/a proxy.example.com proxy.example.com"
        );
    }

    #[test]
    fn rewrite_is_idempotent_even_when_public_host_contains_upstream() {
        let ctx = RewriteContext::new(
            identity("https://example.com", None),
            "www.example.com",
            "https",
        )
        .unwrap();
        let once = rewrite(&ctx, "https://example.com/a www.example.com example.com");
        assert_eq!(once, "https://www.example.com/a www.example.com www.example.com");
        assert!(ctx.rewrite(once.as_bytes()).is_none());
        assert!(!ctx.leaks(once.as_bytes()));
    }

    #[test]
    fn public_host_prefix_of_upstream_address_is_still_rewritten() {
        let ctx = RewriteContext::new(
            identity("https://origin.example.com", Some("203.0.113.12")),
            "203.0.113.1",
            "https",
        )
        .unwrap();
        assert!(ctx.leaks(b"server at 203.0.113.12 ok"));
        let once = rewrite(&ctx, "server at 203.0.113.12 ok");
        assert_eq!(once, "server at 203.0.113.1 ok");
        assert!(!ctx.leaks(once.as_bytes()));
        assert!(ctx.rewrite(once.as_bytes()).is_none());
    }

    #[test]
    fn public_host_prefix_of_upstream_name_is_still_rewritten() {
        let ctx = RewriteContext::new(identity("https://example.com", None), "example.co", "https").unwrap();
        let input = r#"<a href="//example.com/x">example.com</a>"#;
        assert!(ctx.leaks(input.as_bytes()));
        let once = rewrite(&ctx, input);
        assert_eq!(once, r#"<a href="//example.co/x">example.co</a>"#);
        assert!(!ctx.leaks(once.as_bytes()));
    }

    #[test]
    fn public_hostname_strips_port() {
        let ctx = RewriteContext::new(identity("https://o.example.com", None), "Proxy.Example.com:8443", "https").unwrap();
        assert_eq!(ctx.public_host(), "proxy.example.com:8443");
        assert_eq!(ctx.public_hostname(), "proxy.example.com");

        let ctx = RewriteContext::new(identity("https://o.example.com", None), "[::1]:3000", "https").unwrap();
        assert_eq!(ctx.public_hostname(), "[::1]");
    }

    #[test]
    fn rejects_hosts_that_could_inject_markup() {
        let id = identity("https://origin.example.com", None);
        assert!(matches!(
            RewriteContext::new(id.clone(), "evil.com\"><script>", "https"),
            Err(ProxyError::InvalidHost)
        ));
        assert!(RewriteContext::new(id, "", "https").is_err());
    }

    #[test]
    fn request_direction_points_back_at_upstream() {
        let ctx = context();
        let out = ctx
            .rewrite_to_upstream(b"https://PROXY.example.com/page?q=1")
            .unwrap();
        assert_eq!(out, b"https://origin.example.com/page?q=1");
    }

    #[test]
    fn http_public_scheme_keeps_plain_websocket() {
        let ctx = RewriteContext::new(identity("https://origin.example.com", None), "localhost:3000", "http").unwrap();
        assert_eq!(rewrite(&ctx, "wss://origin.example.com/s"), "ws://localhost:3000/s");
        assert_eq!(rewrite(&ctx, "https://origin.example.com/s"), "http://localhost:3000/s");
    }
}
