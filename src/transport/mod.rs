//! HTTP transport between the checker and the server under test.
//!
//! [`Transport`] is the seam the runner and predicates talk through;
//! [`HttpTransport`] implements it over a `reqwest` client. Redirects are
//! never followed so predicates observe raw responses.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use bytes::Bytes;
use reqwest::{Client, redirect::Policy};
use thiserror::Error;
use tracing::debug;
use url::Url;

use crate::{api::Method, generator::GeneratedRequest};

/// Delay before the first retry of a refused connection.
const RETRY_DELAY: Duration = Duration::from_millis(50);

/// A fully read HTTP response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    /// Status code.
    pub status: u16,
    /// Header pairs, names in lower case.
    pub headers: Vec<(String, String)>,
    /// Response body.
    pub body: Bytes,
    /// Time between sending the request and reading the full body.
    pub elapsed: Duration,
}

impl Response {
    /// The first value of header `name`, compared case-insensitively.
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    /// MIME essence of the `Content-Type` header, lower-cased.
    #[must_use]
    pub fn content_type(&self) -> Option<String> {
        self.header("content-type")
            .and_then(|value| value.split(';').next())
            .map(|essence| essence.trim().to_ascii_lowercase())
    }

    /// The body parsed as JSON, if it is valid JSON.
    #[must_use]
    pub fn json(&self) -> Option<serde_json::Value> { serde_json::from_slice(&self.body).ok() }

    /// Whether the status is in the 5xx range.
    #[must_use]
    pub const fn is_server_error(&self) -> bool { self.status >= 500 && self.status < 600 }
}

/// Failures to obtain a response from the server.
#[derive(Debug, Error)]
pub enum TransportError {
    /// No response arrived within the per-request timeout.
    #[error("request to {url} timed out after {timeout:?}")]
    Timeout {
        /// Target URL.
        url: String,
        /// The timeout that elapsed.
        timeout: Duration,
    },
    /// The request could not be sent or its response read.
    #[error("request to {url} failed: {source}")]
    Request {
        /// Target URL.
        url: String,
        /// Underlying client error.
        #[source]
        source: reqwest::Error,
    },
    /// The base URL and request path do not form a valid URL.
    #[error("invalid request URL {url}: {source}")]
    InvalidUrl {
        /// The rejected URL text.
        url: String,
        /// Parse failure.
        #[source]
        source: url::ParseError,
    },
    /// The HTTP client could not be built.
    #[error("failed to build HTTP client: {0}")]
    Client(#[source] reqwest::Error),
}

/// Sends generated requests and probes to a server.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Execute `request` against the server rooted at `base`.
    async fn send(&self, base: &Url, request: &GeneratedRequest) -> Result<Response, TransportError>;

    /// Issue a plain `GET` to `url`.
    async fn get(&self, url: &Url) -> Result<Response, TransportError>;
}

/// Join a request's path and query onto `base`, keeping any base path.
///
/// # Errors
///
/// Returns [`TransportError::InvalidUrl`] when the result does not parse.
pub fn request_url(base: &Url, request: &GeneratedRequest) -> Result<Url, TransportError> {
    let text = format!(
        "{}{}",
        base.as_str().trim_end_matches('/'),
        request.path_and_query()
    );
    Url::parse(&text).map_err(|source| TransportError::InvalidUrl { url: text, source })
}

impl From<Method> for reqwest::Method {
    fn from(method: Method) -> Self {
        match method {
            Method::Get => Self::GET,
            Method::Post => Self::POST,
            Method::Put => Self::PUT,
            Method::Delete => Self::DELETE,
            Method::Patch => Self::PATCH,
            Method::Head => Self::HEAD,
            Method::Options => Self::OPTIONS,
        }
    }
}

/// [`Transport`] backed by a `reqwest` client.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: Client,
    timeout: Duration,
    retries: u32,
}

impl HttpTransport {
    /// Client with a per-request `timeout` that retries refused connections
    /// up to `retries` times. Timeouts are never retried.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::Client`] if the client cannot be built.
    pub fn new(timeout: Duration, retries: u32) -> Result<Self, TransportError> {
        let client = Client::builder()
            .timeout(timeout)
            .redirect(Policy::none())
            .build()
            .map_err(TransportError::Client)?;
        Ok(Self {
            client,
            timeout,
            retries,
        })
    }

    /// The per-request timeout.
    #[must_use]
    pub const fn timeout(&self) -> Duration { self.timeout }

    async fn execute<F>(&self, url: &Url, build: F) -> Result<Response, TransportError>
    where
        F: Fn() -> reqwest::RequestBuilder + Send + Sync,
    {
        let mut attempt: u32 = 0;
        loop {
            let started = Instant::now();
            match build().send().await {
                Ok(response) => return self.read(url, response, started).await,
                Err(error) if error.is_connect() && attempt < self.retries => {
                    attempt += 1;
                    debug!(%url, attempt, %error, "connection failed; retrying");
                    tokio::time::sleep(RETRY_DELAY.saturating_mul(attempt)).await;
                }
                Err(error) => return Err(self.classify(url, error)),
            }
        }
    }

    async fn read(
        &self,
        url: &Url,
        response: reqwest::Response,
        started: Instant,
    ) -> Result<Response, TransportError> {
        let status = response.status().as_u16();
        let headers = response
            .headers()
            .iter()
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|text| (name.as_str().to_owned(), text.to_owned()))
            })
            .collect();
        let body = response
            .bytes()
            .await
            .map_err(|error| self.classify(url, error))?;
        Ok(Response {
            status,
            headers,
            body,
            elapsed: started.elapsed(),
        })
    }

    fn classify(&self, url: &Url, error: reqwest::Error) -> TransportError {
        if error.is_timeout() {
            TransportError::Timeout {
                url: url.to_string(),
                timeout: self.timeout,
            }
        } else {
            TransportError::Request {
                url: url.to_string(),
                source: error,
            }
        }
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn send(&self, base: &Url, request: &GeneratedRequest) -> Result<Response, TransportError> {
        let url = request_url(base, request)?;
        self.execute(&url, || {
            let builder = request
                .headers()
                .iter()
                .fold(
                    self.client.request(request.method().into(), url.clone()),
                    |builder, (name, value)| builder.header(name.as_str(), value.as_str()),
                );
            if request.body().is_empty() {
                builder
            } else {
                builder.body(request.body().clone())
            }
        })
        .await
    }

    async fn get(&self, url: &Url) -> Result<Response, TransportError> {
        self.execute(url, || self.client.get(url.clone())).await
    }
}
