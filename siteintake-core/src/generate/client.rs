//! HTTP client for a remote site builder service
//!
//! Endpoints, relative to `{server_url}{api.version_prefix}`:
//! - `POST /sites/generate`: intake answers in, [`GeneratedSiteConfig`] out
//! - `POST /sites/{session_id}/deploy`: generated site in, public URL out
//!
//! Generation requests carry the session fingerprint as `Idempotency-Key`,
//! so a retried request for the same answers is not billed twice.

use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use serde::{Deserialize, Serialize};

use crate::config::{ApiConfig, GeneratorConfig};
use crate::error::{Error, Result};
use crate::types::{GeneratedSiteConfig, IntakeResponse, IntakeSession};

/// Response from POST /sites/{session_id}/deploy
#[derive(Debug, Deserialize)]
pub struct DeployResponse {
    /// Public URL of the deployed site
    pub url: String,
}

/// A failed request, tagged with whether trying again could help
#[derive(Debug)]
struct RequestFailure {
    message: String,
    retryable: bool,
}

impl RequestFailure {
    fn from_send(err: reqwest::Error) -> Self {
        Self {
            retryable: err.is_timeout() || err.is_connect(),
            message: format!("HTTP request failed: {}", err),
        }
    }

    async fn from_response(response: reqwest::Response) -> Self {
        let status = response.status();
        let error_text = response
            .text()
            .await
            .unwrap_or_else(|_| "unknown".to_string());
        Self {
            retryable: status.is_server_error() || status == reqwest::StatusCode::TOO_MANY_REQUESTS,
            message: format!("API error ({}): {}", status, error_text),
        }
    }
}

/// HTTP client for the site builder API
pub struct GenerationClient {
    config: GeneratorConfig,
    http_client: reqwest::Client,
    base_url: String,
}

impl GenerationClient {
    /// Create a new client from configuration
    ///
    /// Returns an error if the configuration is invalid or missing required fields.
    pub fn new(config: GeneratorConfig, api: &ApiConfig) -> Result<Self> {
        config.validate()?;

        let server_url = config
            .server_url
            .clone()
            .ok_or_else(|| Error::Config("generator.server_url is required".to_string()))?;
        let base_url = format!(
            "{}{}",
            server_url.trim_end_matches('/'),
            api.version_prefix.trim_end_matches('/')
        );

        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        if let Some(api_key) = &config.api_key {
            let auth_value = format!("Bearer {}", api_key);
            headers.insert(
                AUTHORIZATION,
                HeaderValue::from_str(&auth_value)
                    .map_err(|e| Error::Config(format!("invalid api_key: {}", e)))?,
            );
        }

        let http_client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .default_headers(headers)
            .build()
            .map_err(|e| Error::Config(format!("failed to create HTTP client: {}", e)))?;

        Ok(Self {
            config,
            http_client,
            base_url,
        })
    }

    /// Base URL including the API version prefix
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Request a generated site for a completed intake, retrying transient failures
    pub async fn generate(&self, session: &IntakeSession) -> Result<GeneratedSiteConfig> {
        let url = format!("{}/sites/generate", self.base_url);
        let idempotency_key = session.fingerprint();
        let body = GenerateRequest {
            session_id: &session.id,
            responses: &session.responses,
        };

        let (client, url, key, body) = (&self.http_client, &url, idempotency_key.as_str(), &body);
        self.with_retry("generate", || async move {
            let response = client
                .post(url)
                .header("Idempotency-Key", key)
                .json(body)
                .send()
                .await
                .map_err(RequestFailure::from_send)?;

            if !response.status().is_success() {
                return Err(RequestFailure::from_response(response).await);
            }
            response
                .json::<GeneratedSiteConfig>()
                .await
                .map_err(|e| RequestFailure {
                    message: format!("failed to parse response: {}", e),
                    retryable: false,
                })
        })
        .await
        .map_err(Error::GenerationFailure)
    }

    /// Deploy a generated site, retrying transient failures
    pub async fn deploy(
        &self,
        session: &IntakeSession,
        site: &GeneratedSiteConfig,
    ) -> Result<DeployResponse> {
        let url = format!(
            "{}/sites/{}/deploy",
            self.base_url,
            urlencoding::encode(&session.id)
        );
        let body = DeployRequest { site };

        let (client, url, body) = (&self.http_client, &url, &body);
        self.with_retry("deploy", || async move {
            let response = client
                .post(url)
                .json(body)
                .send()
                .await
                .map_err(RequestFailure::from_send)?;

            if !response.status().is_success() {
                return Err(RequestFailure::from_response(response).await);
            }
            response
                .json::<DeployResponse>()
                .await
                .map_err(|e| RequestFailure {
                    message: format!("failed to parse response: {}", e),
                    retryable: false,
                })
        })
        .await
        .map_err(Error::DeploymentFailure)
    }

    /// Check if the builder service is reachable
    pub async fn health_check(&self) -> bool {
        let url = format!("{}/health", self.base_url);
        match self.http_client.get(&url).send().await {
            Ok(response) => response.status().is_success(),
            Err(_) => false,
        }
    }

    /// Run `request`, retrying retryable failures with exponential backoff.
    async fn with_retry<T, F, Fut>(&self, operation: &str, request: F) -> std::result::Result<T, String>
    where
        F: Fn() -> Fut,
        Fut: std::future::Future<Output = std::result::Result<T, RequestFailure>>,
    {
        let mut delay = Duration::from_millis(500);

        for attempt in 0..=self.config.max_retries {
            if attempt > 0 {
                tracing::debug!(
                    "Retrying {} (attempt {}/{}), waiting {:?}",
                    operation,
                    attempt + 1,
                    self.config.max_retries + 1,
                    delay
                );
                tokio::time::sleep(delay).await;
                delay = std::cmp::min(delay * 2, Duration::from_secs(30));
            }

            match request().await {
                Ok(value) => return Ok(value),
                Err(failure) if failure.retryable && attempt < self.config.max_retries => {
                    tracing::warn!("Transient error during {}: {}", operation, failure.message);
                }
                Err(failure) => return Err(failure.message),
            }
        }

        Err(format!("{}: max retries exceeded", operation))
    }
}

/// Request body for POST /sites/generate
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateRequest<'a> {
    session_id: &'a str,
    responses: &'a [IntakeResponse],
}

/// Request body for POST /sites/{session_id}/deploy
#[derive(Serialize)]
struct DeployRequest<'a> {
    site: &'a GeneratedSiteConfig,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ready_config() -> GeneratorConfig {
        GeneratorConfig {
            enabled: true,
            server_url: Some("https://builder.example.com/".to_string()),
            api_key: Some("sk_test".to_string()),
            ..Default::default()
        }
    }

    #[test]
    fn test_client_requires_valid_config() {
        let config = GeneratorConfig {
            enabled: true,
            ..Default::default()
        };
        assert!(GenerationClient::new(config, &ApiConfig::default()).is_err());
    }

    #[test]
    fn test_base_url_includes_version_prefix() {
        let client = GenerationClient::new(ready_config(), &ApiConfig::default()).unwrap();
        assert_eq!(client.base_url(), "https://builder.example.com/api/v1");
    }

    #[test]
    fn test_invalid_api_key_rejected() {
        let config = GeneratorConfig {
            api_key: Some("bad\nkey".to_string()),
            ..ready_config()
        };
        let err = GenerationClient::new(config, &ApiConfig::default()).err().unwrap();
        assert!(err.to_string().contains("invalid api_key"));
    }

    #[test]
    fn test_unreachable_server_fails_generation() {
        let config = GeneratorConfig {
            server_url: Some("http://127.0.0.1:9".to_string()),
            max_retries: 0,
            timeout_secs: 2,
            ..ready_config()
        };
        let client = GenerationClient::new(config, &ApiConfig::default()).unwrap();
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();

        let session = IntakeSession::new();
        let err = runtime.block_on(client.generate(&session)).unwrap_err();
        assert!(matches!(err, Error::GenerationFailure(_)));
        assert!(!runtime.block_on(client.health_check()));
    }
}
