//! Outbound HTTP for the inventory client.
//!
//! The GitHub client only ever sees [`HttpTransport`]. Production uses
//! [`ReqwestTransport`]; unit tests script responses per URL.

use std::time::Duration;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use thiserror::Error;

/// Response or request headers in arrival order. Lookups ignore ASCII case.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Headers(Vec<(String, String)>);

impl Headers {
    pub fn push(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.0.push((name.into(), value.into()));
    }

    /// First value stored under `name`.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&str> {
        self.0
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for Headers {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect())
    }
}

/// A GET request. Listing repositories never needs another method.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpRequest {
    pub url: String,
    pub headers: Headers,
}

impl HttpRequest {
    pub fn get(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            headers: Headers::default(),
        }
    }

    #[must_use]
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push(name, value);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    pub status: u16,
    pub headers: Headers,
    pub body: Vec<u8>,
}

impl HttpResponse {
    pub fn new(status: u16, body: impl Into<Vec<u8>>) -> Self {
        Self {
            status,
            headers: Headers::default(),
            body: body.into(),
        }
    }

    #[must_use]
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push(name, value);
        self
    }

    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name)
    }

    /// Lossy UTF-8 body, for error messages.
    #[must_use]
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    pub fn json<T: DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        serde_json::from_slice(&self.body)
    }
}

#[derive(Debug, Error)]
pub enum HttpError {
    /// Connection, TLS, DNS or body read failure. Always worth a retry.
    #[error("http transport error: {0}")]
    Transport(String),

    #[error("no response scripted for {url}")]
    Unscripted { url: String },
}

#[async_trait]
pub trait HttpTransport: Send + Sync {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, HttpError>;
}

/// Transport backed by a shared `reqwest::Client`.
#[derive(Clone)]
pub struct ReqwestTransport {
    client: reqwest::Client,
}

impl ReqwestTransport {
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }

    /// Client with a whole-request timeout, covering connect and body read.
    pub fn with_timeout(timeout: Duration) -> Result<Self, HttpError> {
        reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map(Self::new)
            .map_err(|e| HttpError::Transport(e.to_string()))
    }
}

#[async_trait]
impl HttpTransport for ReqwestTransport {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, HttpError> {
        let mut builder = self.client.get(&request.url);
        for (name, value) in request.headers.iter() {
            builder = builder.header(name, value);
        }
        let response = builder
            .send()
            .await
            .map_err(|e| HttpError::Transport(e.to_string()))?;

        let status = response.status().as_u16();
        // Non-ASCII header values are dropped rather than failing the request
        let headers = response
            .headers()
            .iter()
            .filter_map(|(name, value)| Some((name.as_str(), value.to_str().ok()?)))
            .collect();
        let body = response
            .bytes()
            .await
            .map_err(|e| HttpError::Transport(e.to_string()))?;

        Ok(HttpResponse {
            status,
            headers,
            body: body.to_vec(),
        })
    }
}

#[cfg(test)]
pub(crate) use scripted::MockTransport;


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_lookup_ignores_case_and_keeps_first() {
        let headers: Headers = [
            ("X-RateLimit-Remaining", "0"),
            ("x-ratelimit-remaining", "9"),
        ]
        .into_iter()
        .collect();

        assert_eq!(headers.get("X-RATELIMIT-REMAINING"), Some("0"));
        assert_eq!(headers.get("missing"), None);
        assert_eq!(headers.len(), 2);
    }

    #[test]
    fn response_decodes_json_and_reports_status() {
        let ok = HttpResponse::new(200, r#"{"login":"octocat"}"#)
            .with_header("Content-Type", "application/json");
        let user: serde_json::Value = ok.json().unwrap();
        assert_eq!(user["login"], "octocat");
        assert_eq!(ok.header("content-type"), Some("application/json"));

        let broken = HttpResponse::new(502, vec![0xff, b'x']);
        assert!(broken.json::<serde_json::Value>().is_err());
        assert_eq!(broken.text(), "\u{fffd}x");
    }

    #[tokio::test]
    async fn mock_serves_replies_in_order_then_reports_unscripted() {
        let transport = MockTransport::new();
        let url = "https://api.github.com/orgs/acme/repos";
        transport.reply_json(url, 200, &[("X-Test", "first")], "[]");
        transport.fail(url, "connection reset");

        let first = transport.send(HttpRequest::get(url)).await.unwrap();
        assert_eq!(first.header("x-test"), Some("first"));
        assert!(matches!(
            transport.send(HttpRequest::get(url)).await,
            Err(HttpError::Transport(m)) if m == "connection reset"
        ));
        assert!(matches!(
            transport.send(HttpRequest::get(url)).await,
            Err(HttpError::Unscripted { .. })
        ));
        assert_eq!(transport.requests().len(), 3);
    }

    #[tokio::test]
    async fn reqwest_transport_maps_bad_urls_to_transport_errors() {
        let transport = ReqwestTransport::with_timeout(Duration::from_secs(5)).unwrap();
        let err = transport.send(HttpRequest::get("not a url")).await.unwrap_err();
        assert!(matches!(err, HttpError::Transport(_)));
    }
}
