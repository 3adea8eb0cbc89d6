//! HTTP transport abstraction.
//!
//! The fetcher only needs "GET this URL, give me status and body". Callers
//! can swap in a proxied client or a test double behind [`Transport`].

use async_trait::async_trait;
use std::time::Duration;
use url::Url;

use crate::config::TransportConfig;
use crate::error::{ConfigError, FetchError, FetchResult};

/// A completed HTTP exchange.
///
/// `body` is only read for 2xx responses; error responses come back empty.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportResponse {
    pub status: u16,
    pub body: Vec<u8>,
}

impl TransportResponse {
    pub fn ok(body: impl Into<Vec<u8>>) -> Self {
        Self {
            status: 200,
            body: body.into(),
        }
    }

    pub fn status(status: u16) -> Self {
        Self {
            status,
            body: Vec::new(),
        }
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Anything that can perform a GET.
///
/// Held by the fetcher as `Arc<dyn Transport>`.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Transport name for logging.
    fn name(&self) -> &str;

    /// Issue a GET. Status codes are reported, not judged; only failures to
    /// obtain a response at all are errors.
    async fn get(&self, url: &Url) -> FetchResult<TransportResponse>;
}

/// `reqwest`-backed transport with optional proxy.
pub struct HttpTransport {
    client: reqwest::Client,
    proxied: bool,
}

impl HttpTransport {
    /// Build a client from the `[transport]` config section.
    pub fn new(config: &TransportConfig) -> Result<Self, ConfigError> {
        let mut builder = reqwest::Client::builder()
            .connect_timeout(Duration::from_millis(config.connect_timeout_ms))
            .user_agent(config.user_agent.as_str());

        let proxy_url = config.proxy.as_deref().and_then(resolve_env_var);
        if let Some(proxy_url) = &proxy_url {
            let proxy = reqwest::Proxy::all(proxy_url.as_str()).map_err(|e| {
                ConfigError::ValidationError(format!("transport.proxy is not a valid URL: {e}"))
            })?;
            builder = builder.proxy(proxy);
        }

        let client = builder
            .build()
            .map_err(|e| ConfigError::ValidationError(format!("HTTP client setup failed: {e}")))?;

        Ok(Self {
            client,
            proxied: proxy_url.is_some(),
        })
    }
}

#[async_trait]
impl Transport for HttpTransport {
    fn name(&self) -> &str {
        if self.proxied {
            "http+proxy"
        } else {
            "http"
        }
    }

    async fn get(&self, url: &Url) -> FetchResult<TransportResponse> {
        let response = self
            .client
            .get(url.clone())
            .send()
            .await
            .map_err(|e| FetchError::Transport(error_chain(&e)))?;

        let status = response.status().as_u16();
        if !response.status().is_success() {
            return Ok(TransportResponse::status(status));
        }

        let body = response
            .bytes()
            .await
            .map_err(|e| FetchError::Transport(error_chain(&e)))?;

        Ok(TransportResponse {
            status,
            body: body.to_vec(),
        })
    }
}

/// Flatten an error and its sources into one line.
///
/// reqwest's top-level message is generic ("error sending request"); the
/// useful part (DNS failure, connection reset) sits in the source chain.
fn error_chain(err: &dyn std::error::Error) -> String {
    let mut message = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        let text = cause.to_string();
        if !message.contains(&text) {
            message.push_str(": ");
            message.push_str(&text);
        }
        source = cause.source();
    }
    message.replace('\n', " ")
}

/// Resolve `${ENV_VAR}` references in config strings.
pub fn resolve_env_var(value: &str) -> Option<String> {
    if value.starts_with("${") && value.ends_with('}') {
        let var_name = &value[2..value.len() - 1];
        std::env::var(var_name).ok().filter(|v| !v.is_empty())
    } else if value.is_empty() {
        None
    } else {
        Some(value.to_string())
    }
}
