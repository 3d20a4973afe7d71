// HTTP generation endpoint
//
// POSTs the request as JSON and expects
//   {"content": "...", "ai_likeness_score": 0.31, "realism_score": 7.5}

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use std::time::Duration;

use super::{GenerationOutput, GenerationRequest, Generator};
use crate::config::GeneratorConfig;
use crate::errors::{GateError, GateResult, GenerationError};

pub struct HttpGenerator {
    client: Client,
    endpoint: String,
    api_key: Option<String>,
    timeout: Duration,
}

impl HttpGenerator {
    pub fn new(
        endpoint: impl Into<String>,
        timeout: Duration,
        api_key: Option<String>,
    ) -> GateResult<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| GateError::Config(format!("failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            endpoint: endpoint.into(),
            api_key,
            timeout,
        })
    }

    /// Build from the `[generator]` config section. A missing endpoint or a
    /// named-but-unset API key variable is a fatal configuration error.
    pub fn from_config(config: &GeneratorConfig) -> GateResult<Self> {
        let endpoint = config.endpoint.clone().ok_or_else(|| {
            GateError::Config("generator.endpoint is required for the HTTP generator".into())
        })?;

        let api_key = match &config.api_key_env {
            Some(var) => Some(std::env::var(var).map_err(|_| {
                GateError::Config(format!(
                    "generator.api_key_env names {} but it is not set",
                    var
                ))
            })?),
            None => None,
        };

        Self::new(endpoint, config.timeout(), api_key)
    }

    fn classify_send_error(&self, e: reqwest::Error) -> GenerationError {
        if e.is_timeout() {
            GenerationError::Timeout(self.timeout)
        } else if e.is_connect() || e.is_request() {
            GenerationError::Transient(format!("request to {} failed: {}", self.endpoint, e))
        } else {
            GenerationError::Fatal(format!("request to {} failed: {}", self.endpoint, e))
        }
    }
}

/// 429 and 5xx are worth retrying; every other failure status is not.
fn is_retryable_status(status: StatusCode) -> bool {
    status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error()
}

#[async_trait]
impl Generator for HttpGenerator {
    async fn generate(
        &self,
        request: &GenerationRequest,
    ) -> Result<GenerationOutput, GenerationError> {
        tracing::debug!(
            "Requesting generation for {}/{} (attempt {})",
            request.category,
            request.subject_id,
            request.attempt_number
        );

        let mut builder = self
            .client
            .post(&self.endpoint)
            .header("content-type", "application/json")
            .json(request);
        if let Some(key) = &self.api_key {
            builder = builder.header("Authorization", format!("Bearer {}", key));
        }

        let response = builder
            .send()
            .await
            .map_err(|e| self.classify_send_error(e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let message = format!("generation endpoint returned {}: {}", status, body);
            return Err(if is_retryable_status(status) {
                GenerationError::Transient(message)
            } else {
                GenerationError::Fatal(message)
            });
        }

        response.json::<GenerationOutput>().await.map_err(|e| {
            if e.is_timeout() {
                GenerationError::Timeout(self.timeout)
            } else {
                GenerationError::Fatal(format!("malformed generation response: {}", e))
            }
        })
    }

    fn name(&self) -> &str {
        "http"
    }
}
