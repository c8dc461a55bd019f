//! Live HTTP transport used when a request is not served from a cassette

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use bytes::Bytes;
use http_body_util::{BodyExt, Full};
use hyper::{Method, Request, Uri};
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::client::legacy::Client;
use hyper_util::rt::TokioExecutor;
use tracing::{debug, warn};

use crate::config::Config;
use crate::exception::{ConnectError, Failure, NetworkError, TimeoutError};
use crate::snapshot::{RequestSnapshot, ResponseSnapshot};

/// Future returned by [`Transport::send`]
pub type TransportFuture<'a> =
    Pin<Box<dyn Future<Output = Result<ResponseSnapshot, Failure>> + Send + 'a>>;

/// Something that can execute a request
pub trait Transport: Send + Sync {
    /// Send a request and wait for the full response
    fn send<'a>(&'a self, request: &'a RequestSnapshot) -> TransportFuture<'a>;
}

/// Default live request timeout
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Plain HTTP transport over a pooled hyper client
///
/// Connection failures surface as [`ConnectError`], elapsed timeouts as
/// [`TimeoutError`] and anything else as [`NetworkError`].
pub struct HyperTransport {
    client: Client<HttpConnector, Full<Bytes>>,
    timeout: Duration,
}

impl HyperTransport {
    /// Create a transport with a request timeout
    #[must_use]
    pub fn new(timeout: Duration) -> Self {
        let client = Client::builder(TokioExecutor::new())
            .pool_idle_timeout(Duration::from_secs(90))
            .pool_max_idle_per_host(10)
            .build_http();

        Self { client, timeout }
    }

    /// Create a transport using the configured request timeout
    #[must_use]
    pub fn from_config(config: &Config) -> Self {
        Self::new(config.request_timeout())
    }

    /// Request timeout
    #[must_use]
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    async fn execute(&self, request: &RequestSnapshot) -> Result<ResponseSnapshot, Failure> {
        let url = request.url();
        let uri = url
            .parse::<Uri>()
            .map_err(|e| NetworkError::new(format!("Invalid URI '{url}': {e}")))?;
        let method = request.method.parse::<Method>().map_err(|e| {
            NetworkError::new(format!("Invalid HTTP method '{}': {e}", request.method))
        })?;

        debug!("Sending {} {}", method, uri);

        let mut request_builder = Request::builder().method(method).uri(uri);
        for (name, value) in &request.headers {
            request_builder = request_builder.header(name, value);
        }

        let body = request.body.clone().unwrap_or_default();
        let http_request = request_builder
            .body(Full::new(Bytes::from(body)))
            .map_err(|e| NetworkError::new(format!("Failed to build request: {e}")))?;

        let exchange = async {
            let response = self.client.request(http_request).await.map_err(|e| {
                warn!("Request to {} failed: {}", url, e);
                if e.is_connect() {
                    Box::new(ConnectError::new(format!("Connection to {url} failed: {e}")))
                        as Failure
                } else {
                    Box::new(NetworkError::new(format!("Request failed: {e}")))
                }
            })?;

            let status = response.status().as_u16();
            let headers: Vec<(String, String)> = response
                .headers()
                .iter()
                .map(|(name, value)| {
                    (
                        name.to_string(),
                        String::from_utf8_lossy(value.as_bytes()).into_owned(),
                    )
                })
                .collect();

            let body = response
                .into_body()
                .collect()
                .await
                .map_err(|e| NetworkError::new(format!("Failed to read response body: {e}")))?
                .to_bytes();

            Ok::<_, Failure>(ResponseSnapshot {
                status,
                headers,
                body: Some(body.to_vec()),
            })
        };

        match tokio::time::timeout(self.timeout, exchange).await {
            Ok(result) => result,
            Err(_) => {
                let timeout_ms = u64::try_from(self.timeout.as_millis()).unwrap_or(u64::MAX);
                warn!("Request to {} timed out after {}ms", url, timeout_ms);
                Err(Box::new(TimeoutError::new(
                    format!("Request to {url} timed out"),
                    timeout_ms,
                )))
            }
        }
    }
}

impl Default for HyperTransport {
    fn default() -> Self {
        Self::new(DEFAULT_TIMEOUT)
    }
}

impl Transport for HyperTransport {
    fn send<'a>(&'a self, request: &'a RequestSnapshot) -> TransportFuture<'a> {
        Box::pin(self.execute(request))
    }
}
