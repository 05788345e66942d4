//! Delivery of finished records to the downstream consumer.
//!
//! Dispatch never fails from the caller's point of view: every transport or
//! parsing problem is folded into [`DispatchOutcome::Failed`], which is then
//! persisted like any other response.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tracing::{info, instrument, warn};

use enquete_shared::{DispatchConfig, EnqueteError, NewsRecord, Result};

// ---------------------------------------------------------------------------
// Payload and outcome
// ---------------------------------------------------------------------------

/// Body posted to the consumer. `texto` is the field it reads the question from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DispatchPayload {
    pub texto: String,
    pub id: i64,
    pub source_title: String,
    pub question_title: String,
    pub source_url: Option<String>,
    pub author: Option<String>,
}

impl DispatchPayload {
    /// Build the payload for a rewritten record.
    pub fn from_record(record: &NewsRecord) -> Result<Self> {
        let question = record.question_title.clone().ok_or_else(|| {
            EnqueteError::validation(format!("record {} has no question to dispatch", record.id))
        })?;

        Ok(Self {
            texto: question.clone(),
            id: record.id,
            source_title: record.source_title.clone(),
            question_title: question,
            source_url: record.source_url.clone(),
            author: record.author.clone(),
        })
    }
}

/// Result of one delivery attempt.
#[derive(Debug, Clone, PartialEq)]
pub enum DispatchOutcome {
    /// The consumer answered; its body (or a `{status_code, text}` stand-in).
    Delivered(Value),
    /// The request could not be completed.
    Failed { error: String },
}

impl DispatchOutcome {
    /// JSON form persisted as the record's `external_response`.
    pub fn to_json(&self) -> Value {
        match self {
            Self::Delivered(value) => value.clone(),
            Self::Failed { error } => json!({ "error": error }),
        }
    }

    pub fn is_delivered(&self) -> bool {
        matches!(self, Self::Delivered(_))
    }
}

// ---------------------------------------------------------------------------
// Trait
// ---------------------------------------------------------------------------

#[async_trait]
pub trait Dispatcher: Send + Sync {
    async fn send(&self, payload: &DispatchPayload) -> DispatchOutcome;
}

// ---------------------------------------------------------------------------
// ExternalClient
// ---------------------------------------------------------------------------

/// HTTP dispatcher posting to the configured consumer URL.
pub struct ExternalClient {
    client: Client,
    url: Option<String>,
}

impl ExternalClient {
    pub fn new(config: &DispatchConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| EnqueteError::Dispatch(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            url: config.url.clone().filter(|u| !u.trim().is_empty()),
        })
    }

    async fn post(&self, url: &str, payload: &DispatchPayload) -> Result<Value> {
        let response = self
            .client
            .post(url)
            .query(&[("texto", payload.texto.as_str())])
            .json(payload)
            .send()
            .await
            .map_err(|e| EnqueteError::Dispatch(format!("{url}: {e}")))?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| EnqueteError::Dispatch(format!("{url}: {e}")))?;

        Ok(serde_json::from_str(&text).unwrap_or_else(|_| {
            json!({
                "status_code": status.as_u16(),
                "text": text,
            })
        }))
    }
}

#[async_trait]
impl Dispatcher for ExternalClient {
    #[instrument(skip_all, fields(record_id = payload.id))]
    async fn send(&self, payload: &DispatchPayload) -> DispatchOutcome {
        let Some(url) = self.url.as_deref() else {
            warn!("dispatch url not configured");
            return DispatchOutcome::Failed {
                error: "dispatch url not configured".into(),
            };
        };

        match self.post(url, payload).await {
            Ok(value) => {
                info!("payload delivered");
                DispatchOutcome::Delivered(value)
            }
            Err(e) => {
                warn!(error = %e, "dispatch failed");
                DispatchOutcome::Failed {
                    error: e.to_string(),
                }
            }
        }
    }
}
