use std::time::Duration;

use http::header::{HeaderMap, HeaderValue, ACCEPT, AUTHORIZATION, CONTENT_TYPE};

use crate::config::ServerConfig;
use crate::error::RelayError;

fn build_reqwest_client(config: &ServerConfig) -> Result<reqwest::Client, RelayError> {
    let pool_idle_timeout = if config.http_pool_idle_timeout_secs == 0 {
        None
    } else {
        Some(Duration::from_secs(config.http_pool_idle_timeout_secs))
    };

    // No overall timeout here: every call runs under the request deadline.
    let mut builder = reqwest::Client::builder()
        .pool_max_idle_per_host(config.http_pool_max_idle_per_host.max(1))
        .pool_idle_timeout(pool_idle_timeout)
        .tcp_nodelay(true)
        .connect_timeout(Duration::from_secs(config.connect_timeout_secs))
        .redirect(reqwest::redirect::Policy::none());

    if !config.http_use_env_proxy {
        builder = builder.no_proxy();
    }

    builder
        .build()
        .map_err(|err| RelayError::Config(format!("Failed to build HTTP client: {err}")))
}

/// Sensitive `Authorization: Bearer <credential>` value.
///
/// # Errors
///
/// Returns [`RelayError::Config`] when the credential is not a valid header value.
pub fn bearer_header(credential: &str) -> Result<HeaderValue, RelayError> {
    let mut auth = HeaderValue::from_str(&format!("Bearer {credential}"))
        .map_err(|_| RelayError::Config("OPENAI_API_KEY is not a valid header value".to_string()))?;
    auth.set_sensitive(true);
    Ok(auth)
}

/// `Authorization: Bearer` plus JSON content negotiation.
///
/// # Errors
///
/// Returns [`RelayError::Config`] when the credential is not a valid header value.
pub fn bearer_json_headers(credential: &str, accept: &'static str) -> Result<HeaderMap, RelayError> {
    let mut headers = HeaderMap::with_capacity(3);
    headers.insert(AUTHORIZATION, bearer_header(credential)?);
    headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    headers.insert(ACCEPT, HeaderValue::from_static(accept));
    Ok(headers)
}

/// Pooled HTTP client shared by every request. Read-only after startup.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
}

impl HttpTransport {
    /// Create a transport with connection pooling from the given server config.
    ///
    /// # Errors
    ///
    /// Returns [`RelayError::Config`] when the client cannot be built.
    pub fn new(config: &ServerConfig) -> Result<Self, RelayError> {
        Ok(Self {
            client: build_reqwest_client(config)?,
        })
    }

    /// Issue exactly one `POST` with a JSON body. Never retried.
    ///
    /// The response is returned whatever its status; the caller decides
    /// what a non-success status means.
    ///
    /// # Errors
    ///
    /// Returns [`RelayError::UpstreamFailure`] when the request cannot be sent.
    pub async fn post_json(
        &self,
        url: &str,
        headers: HeaderMap,
        body: bytes::Bytes,
    ) -> Result<reqwest::Response, RelayError> {
        self.client
            .post(url)
            .headers(headers)
            .body(body)
            .send()
            .await
            .map_err(|err| RelayError::UpstreamFailure(format!("Upstream request failed: {err}")))
    }
}
