//! Natural-language network diagnosis.
//!
//! An optional external LLM produces the text; whenever it is absent,
//! errors, or returns nothing, a deterministic rule-based fallback keyed
//! off the spike/loss numbers answers instead. The capability is selected
//! once at startup and tried at most once per request.

use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use serde_json::{json, Value};
use thiserror::Error;

use crate::analyzer::Analysis;

const GEMINI_ENDPOINT: &str =
    "https://generativelanguage.googleapis.com/v1beta/models/gemini-pro:generateContent";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Structured metrics handed to the diagnoser.
#[derive(Debug, Clone, Serialize)]
pub struct NetworkData {
    pub current_latency_ms: f64,
    pub baseline_latency_ms: f64,
    pub latency_increase_percent: f64,
    pub packet_loss_percent: f64,
}

impl From<&Analysis> for NetworkData {
    fn from(analysis: &Analysis) -> Self {
        Self {
            current_latency_ms: analysis.current_latency_ms,
            baseline_latency_ms: analysis.baseline_latency_ms,
            latency_increase_percent: analysis.latency_spike_pct,
            packet_loss_percent: analysis.packet_loss_pct,
        }
    }
}

#[derive(Error, Debug)]
pub enum DiagnosisError {
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("malformed response")]
    BadResponse,
    #[error("empty response")]
    Empty,
}

/// External diagnosis capability.
#[async_trait]
pub trait Diagnoser: Send + Sync {
    async fn diagnose(&self, data: &NetworkData) -> Result<String, DiagnosisError>;
}

/// Gemini-backed diagnoser. One attempt per call; every failure mode is the
/// caller's cue to use the rule-based text.
pub struct GeminiDiagnoser {
    client: reqwest::Client,
    api_key: String,
}

impl GeminiDiagnoser {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::builder()
                .timeout(REQUEST_TIMEOUT)
                .build()
                .unwrap_or_default(),
            api_key: api_key.into(),
        }
    }

    fn prompt(data: &NetworkData) -> String {
        format!(
            "You are a network diagnostics assistant. Based on the following network metrics, \
             provide a brief (2-3 sentence) diagnosis of what's happening with the network:\n\n\
             Network Data:\n\
             - Current Latency: {:.1}ms\n\
             - Baseline Latency: {:.1}ms\n\
             - Latency Increase: {:.1}%\n\
             - Packet Loss: {:.1}%\n\n\
             Provide a natural language explanation of the network health. Keep it concise \
             and actionable. If all metrics are normal, say so briefly.",
            data.current_latency_ms,
            data.baseline_latency_ms,
            data.latency_increase_percent,
            data.packet_loss_percent
        )
    }
}

#[async_trait]
impl Diagnoser for GeminiDiagnoser {
    async fn diagnose(&self, data: &NetworkData) -> Result<String, DiagnosisError> {
        let body = json!({
            "contents": [{ "parts": [{ "text": Self::prompt(data) }] }]
        });

        let response: Value = self
            .client
            .post(GEMINI_ENDPOINT)
            .query(&[("key", self.api_key.as_str())])
            .json(&body)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        let text = response["candidates"][0]["content"]["parts"][0]["text"]
            .as_str()
            .ok_or(DiagnosisError::BadResponse)?
            .trim()
            .to_string();

        if text.is_empty() {
            return Err(DiagnosisError::Empty);
        }
        Ok(text)
    }
}

/// Produce diagnosis text, preferring the configured LLM but always
/// answering. Never surfaces an error to the caller.
pub async fn diagnose_with_fallback(
    diagnoser: Option<&dyn Diagnoser>,
    analysis: &Analysis,
) -> String {
    let data = NetworkData::from(analysis);

    if let Some(diagnoser) = diagnoser {
        match diagnoser.diagnose(&data).await {
            Ok(text) => return text,
            Err(e) => tracing::warn!("LLM diagnosis unavailable, using fallback: {}", e),
        }
    }

    rule_based_diagnosis(&data)
}

/// Deterministic four-tier diagnosis text.
pub fn rule_based_diagnosis(data: &NetworkData) -> String {
    let latency = data.current_latency_ms;
    let baseline = data.baseline_latency_ms;
    let spike = data.latency_increase_percent;
    let loss = data.packet_loss_percent;

    if spike > 50.0 || loss > 5.0 {
        format!(
            "Network degraded significantly. Latency spiked {:.0}% to {:.1}ms \
             (baseline: {:.1}ms), packet loss at {:.1}%. Try pausing bandwidth-heavy tasks.",
            spike, latency, baseline, loss
        )
    } else if spike > 30.0 || loss > 2.0 {
        format!(
            "Network showing congestion signs. Latency up {:.0}% ({:.1}ms), \
             packet loss {:.1}%. Monitor the situation.",
            spike, latency, loss
        )
    } else if spike > 0.0 || loss > 0.0 {
        format!(
            "Network mostly healthy with minor fluctuations. Latency {:.1}ms \
             (baseline: {:.1}ms), packet loss {:.1}%.",
            latency, baseline, loss
        )
    } else {
        format!(
            "Network health is excellent. Latency stable at {:.1}ms, no packet loss detected.",
            latency
        )
    }
}
