// src/pipeline/mod.rs
//! Scrape-and-normalize pipeline: webhook dispatch followed by AI
//! normalization into the fixed profile table.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Mutex;
use tracing::{error, info};

pub mod dispatch;
pub mod normalize;

pub use dispatch::{DispatchOutcome, Dispatcher, WebhookDispatcher};
pub use normalize::{GeminiBackend, GenerateBackend, NormalizationClient};

/// Field list forwarded to the scraping webhook with every submission.
/// The backend matches on these strings verbatim.
pub const REQUESTED_FIELDS: [&str; 17] = [
    "name",
    "linkedinurl",
    "comments",
    "current title",
    "current company",
    "personal loaction",
    "current company linkedin url",
    "follower count",
    "connection count",
    "company Name",
    "Website Url",
    "Industry",
    "Employee count",
    "Follower count",
    "Universal Name",
    "Description",
    "Company Country",
];

/// One submission's worth of input, frozen at submit time.
#[derive(Debug, Clone)]
pub struct ScrapeRequest {
    pub profile_url: String,
    pub caller_api_key: String,
    pub requested_fields: &'static [&'static str],
}

impl ScrapeRequest {
    pub fn new(profile_url: impl Into<String>, caller_api_key: impl Into<String>) -> Self {
        Self {
            profile_url: profile_url.into(),
            caller_api_key: caller_api_key.into(),
            requested_fields: &REQUESTED_FIELDS,
        }
    }
}

/// What came back from one dispatch attempt. Write-once.
#[derive(Debug, Clone, Serialize)]
pub struct WebhookResult {
    pub succeeded: bool,
    pub http_status: u16,
    pub body: serde_json::Value,
}

/// The model's reshaping of the raw webhook payload into the fixed table.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NormalizedProfile {
    pub summary: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub headline: Option<String>,
    #[serde(default)]
    pub key_skills: Vec<String>,
    #[serde(default)]
    pub table_headers: Vec<String>,
    #[serde(default)]
    pub table_rows: Vec<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl NormalizedProfile {
    /// Model backend credential is absent; no network call was made.
    pub fn configuration_error(detail: impl Into<String>) -> Self {
        Self {
            summary: "Configuration Error".to_string(),
            error: Some(detail.into()),
            ..Self::default()
        }
    }

    /// The model call or its output could not be used; the raw webhook data
    /// remains displayable, so this is still a successful normalization
    /// result from the pipeline's point of view.
    pub fn ai_failure(detail: impl Into<String>) -> Self {
        Self {
            summary: "Failed to generate AI summary. The AI model might be overloaded \
                      or the data format is unexpected."
                .to_string(),
            error: Some(detail.into()),
            ..Self::default()
        }
    }

    /// Force every row to the header width: short rows are padded with "-",
    /// long rows truncated. With no headers there is nothing to align rows
    /// against, so rows are dropped.
    pub fn enforce_table_shape(&mut self) {
        let width = self.table_headers.len();
        if width == 0 {
            self.table_rows.clear();
            return;
        }
        for row in &mut self.table_rows {
            row.resize(width, "-".to_string());
        }
    }
}

/// Progress of one submission through the pipeline.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineState {
    #[default]
    Idle,
    DispatchingWebhook,
    NormalizingWithAi,
    Complete,
    Failed,
}

impl PipelineState {
    pub fn in_flight(&self) -> bool {
        matches!(
            self,
            PipelineState::DispatchingWebhook | PipelineState::NormalizingWithAi
        )
    }
}

/// Failures that abort the pipeline before normalization.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PipelineError {
    EmptyProfileUrl,
    Transport { endpoint: String },
    WebhookStatus { status: u16 },
    Busy,
}

impl PipelineError {
    pub fn user_message(&self) -> String {
        match self {
            PipelineError::EmptyProfileUrl => "Please provide the LinkedIn URL.".to_string(),
            PipelineError::Transport { endpoint } => {
                if endpoint.contains("webhook-test") {
                    "Network Error: Could not connect to n8n. 'webhook-test' URLs require \
                     the workflow to be actively executing in the n8n editor."
                        .to_string()
                } else {
                    "Network Error: The server could not be reached. Check CORS or server status."
                        .to_string()
                }
            }
            PipelineError::WebhookStatus { status: 404 } => {
                "Webhook endpoint not found (404).".to_string()
            }
            PipelineError::WebhookStatus { status } => {
                format!("Webhook failed with status: {}", status)
            }
            PipelineError::Busy => {
                "A submission is already being processed. Wait for it to finish.".to_string()
            }
        }
    }

    pub fn error_code(&self) -> &'static str {
        match self {
            PipelineError::EmptyProfileUrl => "VALIDATION_ERROR",
            PipelineError::Transport { .. } => "TRANSPORT_ERROR",
            PipelineError::WebhookStatus { .. } => "WEBHOOK_ERROR",
            PipelineError::Busy => "PIPELINE_BUSY",
        }
    }
}

impl fmt::Display for PipelineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.user_message())
    }
}

/// Everything a completed (or failed) submission produced.
#[derive(Debug, Clone, Serialize)]
pub struct PipelineReport {
    pub sequence: u64,
    pub state: PipelineState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub webhook: Option<WebhookResult>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub profile: Option<NormalizedProfile>,
    pub used_proxy: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct StationStatus {
    pub sequence: u64,
    pub state: PipelineState,
}

#[derive(Default)]
struct StationState {
    sequence: u64,
    state: PipelineState,
    report: Option<PipelineReport>,
}

/// Serializes submissions and owns the shared result slot. Submissions are
/// tagged with a sequence number; a completion whose sequence is no longer
/// current is discarded instead of overwriting newer state.
pub struct PipelineStation {
    dispatcher: Box<dyn Dispatcher>,
    normalizer: NormalizationClient,
    inner: Mutex<StationState>,
}

impl PipelineStation {
    pub fn new(dispatcher: Box<dyn Dispatcher>, normalizer: NormalizationClient) -> Self {
        Self {
            dispatcher,
            normalizer,
            inner: Mutex::new(StationState::default()),
        }
    }

    pub fn status(&self) -> StationStatus {
        let inner = self.inner.lock().expect("station lock poisoned");
        StationStatus {
            sequence: inner.sequence,
            state: inner.state,
        }
    }

    pub fn last_report(&self) -> Option<PipelineReport> {
        let inner = self.inner.lock().expect("station lock poisoned");
        inner.report.clone()
    }

    /// Run one submission through dispatch and normalization.
    pub async fn submit(
        &self,
        profile_url: &str,
        caller_api_key: &str,
    ) -> Result<PipelineReport, PipelineError> {
        if profile_url.trim().is_empty() {
            return Err(PipelineError::EmptyProfileUrl);
        }

        let sequence = {
            let mut inner = self.inner.lock().expect("station lock poisoned");
            if inner.state.in_flight() {
                return Err(PipelineError::Busy);
            }
            inner.sequence += 1;
            inner.state = PipelineState::DispatchingWebhook;
            inner.report = None;
            inner.sequence
        };

        info!("Submission {} dispatching to webhook", sequence);
        let request = ScrapeRequest::new(profile_url, caller_api_key);

        let outcome = match self.dispatcher.dispatch(&request).await {
            Ok(outcome) => outcome,
            Err(e) => {
                error!("Webhook dispatch failed: {:#}", e);
                let err = PipelineError::Transport {
                    endpoint: self.dispatcher.endpoint().to_string(),
                };
                self.store_failure(sequence, None, false, &err);
                return Err(err);
            }
        };

        if !outcome.result.succeeded {
            let err = PipelineError::WebhookStatus {
                status: outcome.result.http_status,
            };
            self.store_failure(sequence, Some(outcome.result), outcome.used_proxy, &err);
            return Err(err);
        }

        self.transition(sequence, PipelineState::NormalizingWithAi);
        info!("Submission {} normalizing with AI", sequence);

        let profile = self.normalizer.normalize(&outcome.result.body).await;

        let report = PipelineReport {
            sequence,
            state: PipelineState::Complete,
            webhook: Some(outcome.result),
            profile: Some(profile),
            used_proxy: outcome.used_proxy,
            error: None,
        };
        self.store(sequence, PipelineState::Complete, report.clone());
        Ok(report)
    }

    fn transition(&self, sequence: u64, state: PipelineState) {
        let mut inner = self.inner.lock().expect("station lock poisoned");
        if inner.sequence == sequence {
            inner.state = state;
        }
    }

    fn store_failure(
        &self,
        sequence: u64,
        webhook: Option<WebhookResult>,
        used_proxy: bool,
        err: &PipelineError,
    ) {
        let report = PipelineReport {
            sequence,
            state: PipelineState::Failed,
            webhook,
            profile: None,
            used_proxy,
            error: Some(err.user_message()),
        };
        self.store(sequence, PipelineState::Failed, report);
    }

    fn store(&self, sequence: u64, state: PipelineState, report: PipelineReport) {
        let mut inner = self.inner.lock().expect("station lock poisoned");
        if inner.sequence != sequence {
            info!(
                "Discarding stale result for submission {} (current is {})",
                sequence, inner.sequence
            );
            return;
        }
        inner.state = state;
        inner.report = Some(report);
    }
}

#[cfg(test)]
mod tests {
    use super::normalize::tests::StubBackend;
    use super::*;
    use anyhow::anyhow;
    use async_trait::async_trait;
    use serde_json::json;

    struct FixedDispatcher {
        endpoint: String,
        outcome: Result<(WebhookResult, bool), String>,
    }

    impl FixedDispatcher {
        fn ok(status: u16, body: serde_json::Value, used_proxy: bool) -> Self {
            Self {
                endpoint: "https://hooks.example.com/scrape".to_string(),
                outcome: Ok((
                    WebhookResult {
                        succeeded: (200..300).contains(&status),
                        http_status: status,
                        body,
                    },
                    used_proxy,
                )),
            }
        }

        fn unreachable(endpoint: &str) -> Self {
            Self {
                endpoint: endpoint.to_string(),
                outcome: Err("connection refused".to_string()),
            }
        }
    }

    #[async_trait]
    impl Dispatcher for FixedDispatcher {
        fn endpoint(&self) -> &str {
            &self.endpoint
        }

        async fn dispatch(&self, _request: &ScrapeRequest) -> anyhow::Result<DispatchOutcome> {
            match &self.outcome {
                Ok((result, used_proxy)) => Ok(DispatchOutcome {
                    result: result.clone(),
                    used_proxy: *used_proxy,
                }),
                Err(msg) => Err(anyhow!(msg.clone())),
            }
        }
    }

    fn station_with(dispatcher: FixedDispatcher) -> PipelineStation {
        let profile_json = json!({
            "summary": "One scraped profile",
            "tableHeaders": ["Name"],
            "tableRows": [["Jane"]],
        })
        .to_string();
        let normalizer = NormalizationClient::new(Box::new(StubBackend::always_ok(profile_json)));
        PipelineStation::new(Box::new(dispatcher), normalizer)
    }

    #[tokio::test]
    async fn empty_url_is_rejected_without_side_effects() {
        let station = station_with(FixedDispatcher::ok(200, json!({}), false));

        let err = station.submit("  ", "").await.unwrap_err();
        assert_eq!(err, PipelineError::EmptyProfileUrl);

        let status = station.status();
        assert_eq!(status.sequence, 0);
        assert_eq!(status.state, PipelineState::Idle);
    }

    #[tokio::test]
    async fn successful_submission_reaches_complete() {
        let station = station_with(FixedDispatcher::ok(200, json!({"name": "Jane"}), true));

        let report = station
            .submit("https://linkedin.com/in/jane", "key-123")
            .await
            .unwrap();

        assert_eq!(report.state, PipelineState::Complete);
        assert_eq!(report.sequence, 1);
        assert!(report.used_proxy);
        assert_eq!(
            report.profile.as_ref().unwrap().summary,
            "One scraped profile"
        );
        assert_eq!(station.status().state, PipelineState::Complete);
    }

    #[tokio::test]
    async fn webhook_404_maps_to_not_found_message() {
        let station = station_with(FixedDispatcher::ok(404, json!({}), false));

        let err = station
            .submit("https://linkedin.com/in/jane", "")
            .await
            .unwrap_err();

        assert!(err.user_message().contains("not found"));
        assert_eq!(station.status().state, PipelineState::Failed);
    }

    #[tokio::test]
    async fn webhook_500_message_carries_the_status_code() {
        let station = station_with(FixedDispatcher::ok(500, json!({}), false));

        let err = station
            .submit("https://linkedin.com/in/jane", "")
            .await
            .unwrap_err();

        assert!(err.user_message().contains("500"));
    }

    #[tokio::test]
    async fn transport_failure_against_test_endpoint_gets_special_message() {
        let station = station_with(FixedDispatcher::unreachable(
            "https://n8n.example.com/webhook-test/abc",
        ));

        let err = station
            .submit("https://linkedin.com/in/jane", "")
            .await
            .unwrap_err();

        assert!(err.user_message().contains("webhook-test"));
        let report = station.last_report().unwrap();
        assert_eq!(report.state, PipelineState::Failed);
        assert!(report.webhook.is_none());
    }

    #[tokio::test]
    async fn in_flight_station_rejects_new_submissions() {
        let station = station_with(FixedDispatcher::ok(200, json!({}), false));
        station
            .inner
            .lock()
            .unwrap()
            .state = PipelineState::DispatchingWebhook;

        let err = station
            .submit("https://linkedin.com/in/jane", "")
            .await
            .unwrap_err();
        assert_eq!(err, PipelineError::Busy);
    }

    #[tokio::test]
    async fn stale_results_do_not_overwrite_newer_state() {
        let station = station_with(FixedDispatcher::ok(200, json!({}), false));

        let report = station
            .submit("https://linkedin.com/in/jane", "")
            .await
            .unwrap();
        assert_eq!(report.sequence, 1);

        // A result tagged with an older sequence must be discarded.
        let stale = PipelineReport {
            sequence: 0,
            state: PipelineState::Failed,
            webhook: None,
            profile: None,
            used_proxy: false,
            error: Some("late arrival".to_string()),
        };
        station.store(0, PipelineState::Failed, stale);

        assert_eq!(station.status().state, PipelineState::Complete);
        assert_eq!(station.last_report().unwrap().sequence, 1);
    }

    #[test]
    fn table_shape_is_enforced_row_by_row() {
        let mut profile = NormalizedProfile {
            summary: "s".to_string(),
            table_headers: vec!["A".to_string(), "B".to_string(), "C".to_string()],
            table_rows: vec![
                vec!["1".to_string()],
                vec![
                    "1".to_string(),
                    "2".to_string(),
                    "3".to_string(),
                    "4".to_string(),
                ],
            ],
            ..NormalizedProfile::default()
        };

        profile.enforce_table_shape();
        assert!(profile.table_rows.iter().all(|r| r.len() == 3));
        assert_eq!(profile.table_rows[0], vec!["1", "-", "-"]);
        assert_eq!(profile.table_rows[1], vec!["1", "2", "3"]);
    }

    #[test]
    fn rows_without_headers_are_dropped() {
        let mut profile = NormalizedProfile {
            summary: "s".to_string(),
            table_rows: vec![vec!["orphan".to_string()]],
            ..NormalizedProfile::default()
        };

        profile.enforce_table_shape();
        assert!(profile.table_rows.is_empty());
    }

    #[test]
    fn requested_field_list_is_stable() {
        let request = ScrapeRequest::new("https://linkedin.com/in/jane", "");
        assert_eq!(request.requested_fields.len(), 17);
        assert_eq!(request.requested_fields[0], "name");
        assert_eq!(request.requested_fields[16], "Company Country");
    }
}
