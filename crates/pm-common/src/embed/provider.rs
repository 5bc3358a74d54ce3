//! HTTP client for the external vector provider.
//!
//! The provider itself is opaque: all this module knows is the wire
//! contract (`POST {base}/embed/{text|image}` with a JSON `input`,
//! answered by a JSON `vector`) and the fixed per-modality
//! dimensionality it was configured with.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::{ProviderError, VectorProvider};

#[derive(Debug, Clone)]
pub struct ProviderConfig {
    pub endpoint: String,
    pub api_key: Option<String>,
    pub text_dimension: usize,
    pub image_dimension: usize,
    pub timeout: Duration,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            endpoint: "http://localhost:8100".into(),
            api_key: None,
            text_dimension: 768,
            image_dimension: 512,
            timeout: Duration::from_secs(30),
        }
    }
}

impl ProviderConfig {
    pub fn from_env() -> Self {
        fn parse_usize(key: &str, default: usize) -> usize {
            std::env::var(key)
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(default)
        }

        let defaults = Self::default();
        Self {
            endpoint: std::env::var("PM_VECTOR_ENDPOINT").unwrap_or(defaults.endpoint),
            api_key: std::env::var("PM_VECTOR_API_KEY").ok(),
            text_dimension: parse_usize("PM_VECTOR_TEXT_DIM", defaults.text_dimension),
            image_dimension: parse_usize("PM_VECTOR_IMAGE_DIM", defaults.image_dimension),
            timeout: std::env::var("PM_VECTOR_TIMEOUT_SECONDS")
                .ok()
                .and_then(|v| v.parse().ok())
                .map(Duration::from_secs)
                .unwrap_or(defaults.timeout),
        }
    }
}

#[derive(Serialize)]
struct EmbedRequest<'a> {
    input: &'a str,
}

#[derive(Deserialize)]
struct EmbedResponse {
    vector: Vec<f32>,
}

pub struct HttpVectorProvider {
    client: reqwest::Client,
    config: ProviderConfig,
}

impl HttpVectorProvider {
    pub fn new(config: ProviderConfig) -> Result<Self, ProviderError> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| ProviderError::Transport(e.to_string()))?;
        Ok(Self { client, config })
    }

    async fn request(&self, path: &str, input: &str) -> Result<Vec<f32>, ProviderError> {
        let url = format!("{}/{path}", self.config.endpoint.trim_end_matches('/'));
        let mut request = self.client.post(&url).json(&EmbedRequest { input });
        if let Some(key) = &self.config.api_key {
            request = request.bearer_auth(key);
        }

        let response = request.send().await.map_err(|err| {
            if err.is_timeout() {
                ProviderError::Timeout(self.config.timeout)
            } else {
                ProviderError::Transport(err.to_string())
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ProviderError::Rejected(format!("{status}: {body}")));
        }

        let parsed: EmbedResponse = response
            .json()
            .await
            .map_err(|err| ProviderError::MalformedResponse(err.to_string()))?;
        Ok(parsed.vector)
    }
}

#[async_trait]
impl VectorProvider for HttpVectorProvider {
    fn name(&self) -> &'static str {
        "http"
    }

    fn text_dimension(&self) -> usize {
        self.config.text_dimension
    }

    fn image_dimension(&self) -> usize {
        self.config.image_dimension
    }

    async fn embed_text(&self, text: &str) -> Result<Vec<f32>, ProviderError> {
        self.request("embed/text", text).await
    }

    async fn embed_image(&self, image_ref: &str) -> Result<Vec<f32>, ProviderError> {
        self.request("embed/image", image_ref).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_has_expected_dimensions() {
        let config = ProviderConfig::default();
        assert_eq!(config.text_dimension, 768);
        assert_eq!(config.image_dimension, 512);
        assert_eq!(config.timeout, Duration::from_secs(30));
    }

    #[test]
    fn provider_builds_from_default_config() {
        let provider = HttpVectorProvider::new(ProviderConfig::default()).unwrap();
        assert_eq!(provider.name(), "http");
        assert_eq!(provider.text_dimension(), 768);
    }
}
