//! HTTP Client Implementation using Reqwest

use async_trait::async_trait;
use bridge_traits::{
    error::{BridgeError, Result},
    http::{HttpClient, HttpMethod, HttpRequest, HttpResponse},
};
use reqwest::Client;
use std::collections::HashMap;
use std::time::Duration;
use tracing::{debug, warn};

const DEFAULT_USER_AGENT: &str = concat!("music-core/", env!("CARGO_PKG_VERSION"));

/// Reqwest-based HTTP client implementation
///
/// One attempt per request; retries are left to the caller.
pub struct ReqwestHttpClient {
    client: Client,
    default_timeout: Duration,
}

impl ReqwestHttpClient {
    /// Create a new HTTP client with a 10 second default timeout
    pub fn new() -> Result<Self> {
        Self::with_timeout(Duration::from_secs(10))
    }

    /// Create a new HTTP client with custom default timeout
    pub fn with_timeout(timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .connect_timeout(timeout.min(Duration::from_secs(10)))
            .pool_max_idle_per_host(4)
            .user_agent(DEFAULT_USER_AGENT)
            .build()
            .map_err(|e| BridgeError::OperationFailed(format!("HTTP client init: {}", e)))?;

        Ok(Self {
            client,
            default_timeout: timeout,
        })
    }

    /// Wrap a preconfigured reqwest client
    pub fn with_client(client: Client, default_timeout: Duration) -> Self {
        Self {
            client,
            default_timeout,
        }
    }

    fn convert_method(method: HttpMethod) -> reqwest::Method {
        match method {
            HttpMethod::Get => reqwest::Method::GET,
            HttpMethod::Head => reqwest::Method::HEAD,
            HttpMethod::Post => reqwest::Method::POST,
        }
    }

    fn build_request(&self, request: HttpRequest) -> reqwest::RequestBuilder {
        let mut req = self
            .client
            .request(Self::convert_method(request.method), &request.url);

        if !request.query.is_empty() {
            req = req.query(&request.query);
        }

        for (key, value) in request.headers {
            req = req.header(key, value);
        }

        if let Some(body) = request.body {
            req = req.body(body);
        }

        req.timeout(request.timeout.unwrap_or(self.default_timeout))
    }
}

#[async_trait]
impl HttpClient for ReqwestHttpClient {
    async fn execute(&self, request: HttpRequest) -> Result<HttpResponse> {
        let timeout = request.timeout.unwrap_or(self.default_timeout);
        debug!(url = %request.url, method = ?request.method, "Executing HTTP request");

        let response = self.build_request(request).send().await.map_err(|e| {
            warn!(error = %e, "HTTP request failed");
            if e.is_timeout() {
                BridgeError::Timeout(timeout)
            } else if e.is_connect() {
                BridgeError::OperationFailed(format!("Connection failed: {}", e))
            } else {
                BridgeError::OperationFailed(e.to_string())
            }
        })?;

        let status = response.status().as_u16();
        let headers: HashMap<String, String> = response
            .headers()
            .iter()
            .filter_map(|(k, v)| v.to_str().ok().map(|s| (k.to_string(), s.to_string())))
            .collect();

        let body = response.bytes().await.map_err(|e| {
            if e.is_timeout() {
                BridgeError::Timeout(timeout)
            } else {
                BridgeError::OperationFailed(e.to_string())
            }
        })?;

        debug!(status, size = body.len(), "HTTP response received");
        Ok(HttpResponse {
            status,
            headers,
            body,
        })
    }
}
