//! HTTP oracle speaking a messages-style JSON API.

use super::{render_prompt, ArbitrationOracle, ArbitrationRequest, OracleError};
use crate::config::{ArbitrationConfig, ARBITRATION_API_VERSION};
use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;

/// Oracle backed by a remote reasoning service.
#[derive(Clone)]
pub struct HttpOracle {
    client: reqwest::Client,
    endpoint: String,
    model: String,
    api_key: String,
    max_tokens: u32,
}

impl std::fmt::Debug for HttpOracle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpOracle")
            .field("endpoint", &self.endpoint)
            .field("model", &self.model)
            .finish_non_exhaustive()
    }
}

#[derive(Deserialize)]
struct ContentBlock {
    #[serde(default)]
    text: Option<String>,
}

#[derive(Deserialize)]
struct ApiResponse {
    #[serde(default)]
    content: Vec<ContentBlock>,
}

impl HttpOracle {
    pub fn new(api_key: String, config: &ArbitrationConfig) -> Result<Self, OracleError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self {
            client,
            endpoint: config.endpoint.clone(),
            model: config.model.clone(),
            api_key,
            max_tokens: config.max_tokens,
        })
    }

    /// Create from the API key held in `config.api_key_env`.
    pub fn from_config(config: &ArbitrationConfig) -> Result<Self, OracleError> {
        let api_key = std::env::var(&config.api_key_env).map_err(|_| {
            OracleError::NotConfigured(format!(
                "{} environment variable not set",
                config.api_key_env
            ))
        })?;
        Self::new(api_key, config)
    }

    pub fn model(&self) -> &str {
        &self.model
    }
}

#[async_trait]
impl ArbitrationOracle for HttpOracle {
    async fn decide(&self, request: &ArbitrationRequest) -> Result<String, OracleError> {
        let response = self
            .client
            .post(&self.endpoint)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ARBITRATION_API_VERSION)
            .header("content-type", "application/json")
            .json(&serde_json::json!({
                "model": &self.model,
                "max_tokens": self.max_tokens,
                "messages": [{"role": "user", "content": render_prompt(request)}]
            }))
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(OracleError::Status { status, body });
        }

        let api_response: ApiResponse = response.json().await?;
        api_response
            .content
            .into_iter()
            .find_map(|block| block.text)
            .ok_or(OracleError::MissingContent)
    }

    fn name(&self) -> &str {
        "http"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_oracle() {
        let oracle = HttpOracle::new("test-key".to_string(), &ArbitrationConfig::default()).unwrap();
        assert_eq!(oracle.model(), ArbitrationConfig::default().model);
        assert_eq!(oracle.name(), "http");
        assert!(!format!("{oracle:?}").contains("test-key"));
    }

    #[test]
    fn test_missing_api_key() {
        let config = ArbitrationConfig {
            api_key_env: "CATALINK_TEST_KEY_THAT_IS_NEVER_SET".to_string(),
            ..ArbitrationConfig::default()
        };
        assert!(matches!(
            HttpOracle::from_config(&config),
            Err(OracleError::NotConfigured(_))
        ));
    }
}
