//! Upstream transport.
//!
//! A thin wrapper over `reqwest::Client` pinned to the single configured
//! origin. The client keeps its own connection pool; nothing here retries.

use std::sync::Arc;
use std::time::Duration;

use axum::body::{Body, HttpBody as _};
use axum::http::{HeaderMap, Method, Uri};
use reqwest::redirect::Policy;
use url::Url;

use crate::config::ProxyConfig;
use crate::error::ProxyError;
use crate::rewrite::UpstreamIdentity;

#[derive(Debug, Clone)]
pub struct UpstreamClient {
    client: reqwest::Client,
    identity: Arc<UpstreamIdentity>,
    response_timeout: Duration,
}

impl UpstreamClient {
    pub fn new(config: &ProxyConfig, identity: Arc<UpstreamIdentity>) -> Result<Self, reqwest::Error> {
        let redirect = if config.upstream.follow_redirects {
            Policy::limited(config.upstream.max_redirects)
        } else {
            Policy::none()
        };

        let client = reqwest::Client::builder()
            .use_rustls_tls()
            .no_proxy()
            .connect_timeout(Duration::from_secs(config.timeouts.connect_secs))
            .redirect(redirect)
            .build()?;

        Ok(Self {
            client,
            identity,
            response_timeout: Duration::from_secs(config.timeouts.response_secs),
        })
    }

    pub fn identity(&self) -> &Arc<UpstreamIdentity> {
        &self.identity
    }

    /// Map an inbound request target onto the upstream, keeping the base path prefix.
    pub fn target_url(&self, uri: &Uri) -> Url {
        let base = self.identity.base_url();
        let mut url = base.clone();
        let prefix = base.path().trim_end_matches('/');
        url.set_path(&format!("{}{}", prefix, uri.path()));
        url.set_query(uri.query());
        url.set_fragment(None);
        url
    }

    /// Send one request upstream and wait for the response headers.
    ///
    /// The body is streamed, never buffered. Connect and header timeouts both
    /// surface as `ProxyError`.
    pub async fn forward(
        &self,
        method: Method,
        uri: &Uri,
        headers: HeaderMap,
        body: Body,
    ) -> Result<reqwest::Response, ProxyError> {
        let mut request = self
            .client
            .request(method, self.target_url(uri))
            .headers(headers);
        if !body.is_end_stream() {
            request = request.body(reqwest::Body::wrap_stream(body.into_data_stream()));
        }

        match tokio::time::timeout(self.response_timeout, request.send()).await {
            Ok(Ok(response)) => Ok(response),
            Ok(Err(e)) => Err(ProxyError::upstream(e)),
            Err(_) => Err(ProxyError::UpstreamTimeout(self.response_timeout)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rewrite::context::tests::identity;

    fn client(target: &str) -> UpstreamClient {
        let mut config = ProxyConfig::default();
        config.upstream.target_url = target.to_string();
        UpstreamClient::new(&config, identity(target, None)).unwrap()
    }

    #[test]
    fn target_url_keeps_query() {
        let c = client("https://origin.example.com");
        let uri: Uri = "/a/b?x=1&y=2".parse().unwrap();
        assert_eq!(c.target_url(&uri).as_str(), "https://origin.example.com/a/b?x=1&y=2");
    }

    #[test]
    fn target_url_joins_base_path() {
        let c = client("http://127.0.0.1:8080/app/");
        let uri: Uri = "/login".parse().unwrap();
        assert_eq!(c.target_url(&uri).as_str(), "http://127.0.0.1:8080/app/login");

        let uri: Uri = "/".parse().unwrap();
        assert_eq!(c.target_url(&uri).as_str(), "http://127.0.0.1:8080/app/");
    }

    #[tokio::test]
    async fn refused_connection_is_unreachable() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let c = client(&format!("http://{}", addr));
        let err = c
            .forward(Method::GET, &"/".parse().unwrap(), HeaderMap::new(), Body::empty())
            .await
            .unwrap_err();
        assert!(matches!(err, ProxyError::UpstreamUnreachable(_)));
        assert!(!err.to_string().contains(&addr.to_string()));
    }
}
