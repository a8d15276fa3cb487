//! Vehicle and part research via the external research endpoint
//!
//! One POST per request, no retries. The endpoint either answers with
//! structured JSON (`overview`, `specifications`, ...) or with a chat-style
//! `{ "success": true, "content": "## Overview ..." }` body, which is parsed
//! into the same shape. Anything without an overview is rejected.

use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use restomod_core::{parse_research_text, ResearchQuery, ResearchResult, Subject};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

use crate::config::ResearchConfig;

/// Research fetch failure. `Clone` so one outcome can fan out to every
/// waiter of a shared fetch.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ResearchError {
    #[error("Network error: {0}")]
    Network(String),
    #[error("Research request timed out after {0}s")]
    Timeout(u64),
    #[error("Research API returned HTTP {status}: {body}")]
    Status { status: u16, body: String },
    #[error("Malformed research response: {0}")]
    MalformedResponse(String),
}

/// Anything that can produce research for a query.
#[async_trait]
pub trait ResearchSource: Send + Sync {
    async fn fetch(&self, query: &ResearchQuery) -> Result<ResearchResult, ResearchError>;
}

/// Request body sent to the research endpoint
#[derive(Debug, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
struct ResearchRequest<'a> {
    subject_type: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    model: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    part: Option<&'a str>,
}

/// Response body as the endpoint sends it; everything optional until
/// validated.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawResearch {
    overview: Option<String>,
    market_trends: Option<String>,
    value_range: Option<String>,
    specifications: Option<BTreeMap<String, serde_json::Value>>,
    common_upgrades: Option<Vec<String>>,
    restomod_options: Option<Vec<String>>,
    recommended_parts: Option<Vec<String>>,
    compatibility: Option<String>,
    history: Option<String>,
    factors_affecting_value: Option<Vec<String>>,
    key_moments: Option<Vec<String>>,
    notable_examples: Option<Vec<String>>,
    investment_potential: Option<String>,
    image_url: Option<String>,
    // Chat-style answers
    success: Option<bool>,
    content: Option<String>,
    error: Option<String>,
}

/// HTTP client for the research endpoint
pub struct ResearchClient {
    client: reqwest::Client,
    endpoint: String,
    api_key: Option<String>,
    timeout: Duration,
}

impl ResearchClient {
    /// Create a client from config.
    ///
    /// # Errors
    /// Returns `ResearchError::Network` if the HTTP client cannot be built.
    pub fn new(config: &ResearchConfig) -> Result<Self, ResearchError> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout())
            .build()
            .map_err(|e| ResearchError::Network(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            endpoint: config.endpoint().to_string(),
            api_key: config.api_key.clone().filter(|k| !k.is_empty()),
            timeout: config.timeout(),
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Research a whole vehicle
    pub async fn fetch_vehicle(&self, model: &str) -> Result<ResearchResult, ResearchError> {
        self.send(&ResearchRequest {
            subject_type: "vehicle",
            model: Some(model),
            part: None,
        })
        .await
    }

    /// Research a part, optionally in the context of a vehicle
    pub async fn fetch_part(
        &self,
        part: &str,
        model: Option<&str>,
    ) -> Result<ResearchResult, ResearchError> {
        self.send(&ResearchRequest {
            subject_type: "part",
            model,
            part: Some(part),
        })
        .await
    }

    async fn send(&self, request: &ResearchRequest<'_>) -> Result<ResearchResult, ResearchError> {
        debug!("Research request: {:?}", request);

        let mut builder = self.client.post(&self.endpoint).json(request);
        if let Some(key) = &self.api_key {
            builder = builder.bearer_auth(key);
        }

        let response = builder.send().await.map_err(|e| self.transport_error(e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            warn!("Research API returned HTTP {}", status);
            return Err(ResearchError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let body = response.text().await.map_err(|e| self.transport_error(e))?;
        let raw: RawResearch = serde_json::from_str(&body)
            .map_err(|e| ResearchError::MalformedResponse(format!("Invalid JSON: {}", e)))?;

        normalize(raw)
    }

    fn transport_error(&self, e: reqwest::Error) -> ResearchError {
        if e.is_timeout() {
            ResearchError::Timeout(self.timeout.as_secs())
        } else {
            ResearchError::Network(e.to_string())
        }
    }
}

#[async_trait]
impl ResearchSource for ResearchClient {
    async fn fetch(&self, query: &ResearchQuery) -> Result<ResearchResult, ResearchError> {
        match query.subject() {
            Subject::Vehicle { model } => self.fetch_vehicle(model).await,
            Subject::Part { part, model } => self.fetch_part(part, model.as_deref()).await,
        }
    }
}

/// Validate a raw response and shape it into a `ResearchResult`.
fn normalize(raw: RawResearch) -> Result<ResearchResult, ResearchError> {
    if let Some(error) = raw.error.as_deref().filter(|e| !e.trim().is_empty()) {
        return Err(ResearchError::MalformedResponse(format!(
            "Endpoint reported an error: {}",
            error
        )));
    }
    if raw.success == Some(false) {
        return Err(ResearchError::MalformedResponse(
            "Endpoint reported failure".to_string(),
        ));
    }

    if raw.overview.as_deref().is_some_and(|o| !o.trim().is_empty()) {
        return Ok(structured(raw));
    }

    match raw.content.as_deref().filter(|c| !c.trim().is_empty()) {
        Some(content) => {
            let mut parsed = parse_research_text(content);
            if parsed.overview.trim().is_empty() {
                return Err(ResearchError::MalformedResponse(
                    "Research text has no overview section".to_string(),
                ));
            }
            parsed.image_url = text(raw.image_url);
            Ok(parsed)
        }
        None => Err(ResearchError::MalformedResponse(
            "Missing overview".to_string(),
        )),
    }
}

fn structured(raw: RawResearch) -> ResearchResult {
    let specifications = raw
        .specifications
        .map(|specs| {
            specs
                .into_iter()
                .map(|(k, v)| {
                    let value = match v {
                        serde_json::Value::String(s) => s,
                        other => other.to_string(),
                    };
                    (k, value)
                })
                .collect::<BTreeMap<_, _>>()
        })
        .filter(|specs| !specs.is_empty());

    ResearchResult {
        overview: raw.overview.unwrap_or_default().trim().to_string(),
        market_trends: text(raw.market_trends),
        value_range: text(raw.value_range),
        specifications,
        common_upgrades: list(raw.common_upgrades),
        restomod_options: list(raw.restomod_options),
        recommended_parts: list(raw.recommended_parts),
        compatibility: text(raw.compatibility),
        history: text(raw.history),
        factors_affecting_value: list(raw.factors_affecting_value),
        key_moments: list(raw.key_moments),
        notable_examples: list(raw.notable_examples),
        investment_potential: text(raw.investment_potential),
        image_url: text(raw.image_url),
    }
}

fn text(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

fn list(value: Option<Vec<String>>) -> Option<Vec<String>> {
    value.filter(|v| !v.is_empty())
}
