//! JSON-over-HTTP oracle adapter.
//!
//! Posts an [`OracleRequest`] to a configured endpoint and parses whatever
//! comes back with [`parse_raw_result`]. The endpoint is expected to wrap the
//! actual model call; no vendor protocol is assumed here.

use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use tracing::debug;

use crate::error::OracleError;
use crate::oracle_traits::{GradingOracle, OracleResult};
use crate::parse::parse_raw_result;
use crate::schema::{GradingContext, RawGradingResult};

/// Body sent to the grading endpoint.
#[derive(Debug, Serialize)]
pub struct OracleRequest<'a> {
    pub submission_text: &'a str,
    pub context: &'a GradingContext,
    pub strictness: f64,
    pub approach: &'a str,
}

/// Connection settings for [`HttpOracle`].
#[derive(Debug, Clone)]
pub struct HttpOracleConfig {
    pub endpoint: String,
    pub bearer_token: Option<String>,
    /// Transport timeout; the engine applies its own per-pass deadline on top.
    pub request_timeout: Duration,
}

impl HttpOracleConfig {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            bearer_token: None,
            request_timeout: Duration::from_secs(180),
        }
    }

    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.bearer_token = Some(token.into());
        self
    }
}

/// Oracle backed by an HTTP grading service.
pub struct HttpOracle {
    client: reqwest::Client,
    config: HttpOracleConfig,
}

impl HttpOracle {
    pub fn new(config: HttpOracleConfig) -> OracleResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()?;
        Ok(Self { client, config })
    }

    pub fn endpoint(&self) -> &str {
        &self.config.endpoint
    }
}

#[async_trait]
impl GradingOracle for HttpOracle {
    async fn grade(
        &self,
        submission_text: &str,
        context: &GradingContext,
        strictness: f64,
        approach: &str,
    ) -> OracleResult<RawGradingResult> {
        let body = OracleRequest {
            submission_text,
            context,
            strictness,
            approach,
        };

        let mut request = self.client.post(&self.config.endpoint).json(&body);
        if let Some(token) = &self.config.bearer_token {
            request = request.bearer_auth(token);
        }

        let response = request.send().await?;
        let status = response.status();
        let text = response.text().await?;
        if !status.is_success() {
            return Err(OracleError::Status {
                status: status.as_u16(),
                body: truncate(&text, 512),
            });
        }

        debug!(approach = %approach, bytes = text.len(), "oracle response received");
        let mut raw = parse_raw_result(&text)?;
        if raw.approach_tag.is_empty() {
            raw.approach_tag = approach.to_string();
        }
        Ok(raw)
    }

    fn name(&self) -> &str {
        "http"
    }
}

fn truncate(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        text.to_string()
    } else {
        let mut out: String = text.chars().take(max_chars).collect();
        out.push('…');
        out
    }
}
