//! HTTP client for the open transport data platform.
//!
//! Every upstream feed sits behind the same gateway with the same bearer
//! token, so one client is shared by all adapters. Status mapping and
//! concurrency limiting live here. Payload parsing is left to the adapters.

use std::sync::Arc;
use std::time::Duration;

use reqwest::header::{AUTHORIZATION, CONTENT_TYPE, HeaderMap, HeaderValue};
use tokio::sync::Semaphore;

use super::error::UpstreamError;

/// User agent sent with every request.
const USER_AGENT: &str = "SwissTransportApp/1.0";

/// Default maximum concurrent requests.
const DEFAULT_MAX_CONCURRENT: usize = 8;

/// Longest error body kept in an `UpstreamError::Api` message.
const MAX_ERROR_BODY: usize = 500;

/// Configuration for the upstream client.
#[derive(Debug, Clone)]
pub struct OtdConfig {
    /// Bearer token; requests go out unauthenticated when empty
    pub api_key: String,
    /// Per-request timeout
    pub timeout: Duration,
    /// Maximum concurrent requests
    pub max_concurrent: usize,
}

impl OtdConfig {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            timeout: Duration::from_secs(5),
            max_concurrent: DEFAULT_MAX_CONCURRENT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_max_concurrent(mut self, n: usize) -> Self {
        self.max_concurrent = n.max(1);
        self
    }
}

/// Shared upstream HTTP client.
#[derive(Debug, Clone)]
pub struct OtdClient {
    http: reqwest::Client,
    semaphore: Arc<Semaphore>,
}

impl OtdClient {
    pub fn new(config: &OtdConfig) -> Result<Self, UpstreamError> {
        let mut headers = HeaderMap::new();

        if !config.api_key.is_empty() {
            let bearer = HeaderValue::from_str(&format!("Bearer {}", config.api_key)).map_err(
                |_| UpstreamError::Api {
                    status: 0,
                    message: "Invalid API key format".to_string(),
                },
            )?;
            headers.insert(AUTHORIZATION, bearer);
        } else {
            tracing::warn!("OTD_API_KEY is not set; upstream requests will be rejected");
        }

        let http = reqwest::Client::builder()
            .default_headers(headers)
            .user_agent(USER_AGENT)
            .timeout(config.timeout)
            .build()?;

        Ok(Self {
            http,
            semaphore: Arc::new(Semaphore::new(config.max_concurrent)),
        })
    }

    /// GET a resource and return its body.
    pub async fn get_text(
        &self,
        url: &str,
        query: &[(&str, &str)],
    ) -> Result<String, UpstreamError> {
        let _permit = self.permit().await?;
        tracing::debug!(url, "GET");
        let response = self.http.get(url).query(query).send().await?;
        read_body(response).await
    }

    /// POST an XML document and return the response body.
    ///
    /// `soap_action` adds the `SOAPAction` header for SOAP endpoints.
    pub async fn post_xml(
        &self,
        url: &str,
        body: String,
        soap_action: Option<&str>,
    ) -> Result<String, UpstreamError> {
        let _permit = self.permit().await?;
        tracing::debug!(url, bytes = body.len(), "POST");

        let content_type = match soap_action {
            Some(_) => "text/xml; charset=utf-8",
            None => "application/xml; charset=utf-8",
        };
        let mut request = self
            .http
            .post(url)
            .header(CONTENT_TYPE, content_type)
            .body(body);
        if let Some(action) = soap_action {
            request = request.header("SOAPAction", action);
        }

        let response = request.send().await?;
        read_body(response).await
    }

    async fn permit(&self) -> Result<tokio::sync::SemaphorePermit<'_>, UpstreamError> {
        self.semaphore
            .acquire()
            .await
            .map_err(|_| UpstreamError::Api {
                status: 0,
                message: "Semaphore closed".to_string(),
            })
    }
}

async fn read_body(response: reqwest::Response) -> Result<String, UpstreamError> {
    let status = response.status();

    if status == reqwest::StatusCode::UNAUTHORIZED || status == reqwest::StatusCode::FORBIDDEN {
        return Err(UpstreamError::Unauthorized);
    }

    if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
        return Err(UpstreamError::RateLimited);
    }

    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(UpstreamError::Api {
            status: status.as_u16(),
            message: body.chars().take(MAX_ERROR_BODY).collect(),
        });
    }

    Ok(response.text().await?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_defaults() {
        let config = OtdConfig::new("key");
        assert_eq!(config.api_key, "key");
        assert_eq!(config.timeout, Duration::from_secs(5));
        assert_eq!(config.max_concurrent, DEFAULT_MAX_CONCURRENT);
    }

    #[test]
    fn config_builder() {
        let config = OtdConfig::new("key")
            .with_timeout(Duration::from_secs(2))
            .with_max_concurrent(0);
        assert_eq!(config.timeout, Duration::from_secs(2));
        assert_eq!(config.max_concurrent, 1);
    }

    #[test]
    fn client_accepts_empty_key() {
        assert!(OtdClient::new(&OtdConfig::new("")).is_ok());
    }

    #[test]
    fn client_rejects_unprintable_key() {
        let result = OtdClient::new(&OtdConfig::new("bad\nkey"));
        assert!(matches!(result, Err(UpstreamError::Api { status: 0, .. })));
    }
}
