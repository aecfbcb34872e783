// src/pipeline/normalize.rs
use super::NormalizedProfile;
use crate::config::ServiceConfig;
use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::{json, Value};
use std::time::Duration;
use tracing::{info, warn};

/// Input budget for the model: the serialized payload is silently cut to
/// this many characters before transmission.
pub const MAX_PAYLOAD_CHARS: usize = 30_000;

/// Total attempts against an overloaded backend, first try included.
const MAX_ATTEMPTS: u32 = 4;
const BACKOFF_UNIT_MS: u64 = 2000;

const SYSTEM_INSTRUCTION: &str = "You are a professional data formatter. Your primary goal is \
to convert JSON data into a structured table matching specific user-requested columns. Always \
prefer the requested column names over generic ones.";

const COLUMN_PROMPT: &str = r#"Analyze the following raw data returned from a LinkedIn scraping/webhook service.

The user wants a table with the following specific columns if the data is available.
Map the raw JSON fields to these headers exactly where possible:
1. Name
2. LinkedIn URL
3. Comments
4. Current Title
5. Current Company
6. Personal Location
7. Current Company LinkedIn URL
8. Follower Count (Personal)
9. Connection Count
10. Company Name
11. Website URL
12. Industry
13. Employee Count
14. Follower Count (Company)
15. Universal Name
16. Description
17. Company Country

If the input is a list (array), generate a row for each item.
If a field is missing, leave it empty or put "-"."#;

/// One completion request as handed to the model backend.
#[derive(Debug, Clone)]
pub struct GenerateRequest {
    pub system_instruction: String,
    pub prompt: String,
    pub data: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GenerateErrorKind {
    /// Transient backend-unavailable condition; the only retryable kind.
    Overloaded,
    Http(u16),
    Transport,
    EmptyResponse,
    Malformed,
}

#[derive(Debug, Clone)]
pub struct GenerateError {
    pub kind: GenerateErrorKind,
    pub message: String,
}

impl GenerateError {
    fn new(kind: GenerateErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

#[async_trait]
pub trait GenerateBackend: Send + Sync {
    fn has_credential(&self) -> bool;

    async fn generate(&self, request: &GenerateRequest) -> Result<String, GenerateError>;
}

/// Gemini `generateContent` REST backend with a strict response schema.
pub struct GeminiBackend {
    client: Client,
    api_key: String,
    base_url: String,
    model: String,
}

impl GeminiBackend {
    pub fn new(service: &ServiceConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(service.timeout_seconds))
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            client,
            api_key: service.gemini_api_key.clone(),
            base_url: service.gemini_api_url.trim_end_matches('/').to_string(),
            model: service.gemini_model.clone(),
        })
    }
}

#[async_trait]
impl GenerateBackend for GeminiBackend {
    fn has_credential(&self) -> bool {
        !self.api_key.trim().is_empty()
    }

    async fn generate(&self, request: &GenerateRequest) -> Result<String, GenerateError> {
        let url = format!(
            "{}/v1beta/models/{}:generateContent",
            self.base_url, self.model
        );

        let body = json!({
            "systemInstruction": { "parts": [{ "text": request.system_instruction }] },
            "contents": [{
                "parts": [
                    { "text": request.prompt },
                    { "text": format!("Raw Data:\n{}", request.data) },
                ],
            }],
            "generationConfig": {
                "responseMimeType": "application/json",
                "responseSchema": response_schema(),
            },
        });

        let response = self
            .client
            .post(&url)
            .header("x-goog-api-key", &self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                GenerateError::new(
                    GenerateErrorKind::Transport,
                    format!("Failed to reach model API: {}", e),
                )
            })?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            let kind = if status.as_u16() == 503 {
                GenerateErrorKind::Overloaded
            } else {
                GenerateErrorKind::Http(status.as_u16())
            };
            return Err(GenerateError::new(
                kind,
                format!("Model API returned {}: {}", status, error_text),
            ));
        }

        let payload: GenerateContentResponse = response.json().await.map_err(|e| {
            GenerateError::new(
                GenerateErrorKind::Malformed,
                format!("Failed to parse model API response: {}", e),
            )
        })?;

        payload
            .first_text()
            .ok_or_else(|| GenerateError::new(GenerateErrorKind::EmptyResponse, "No response from AI"))
    }
}

#[derive(Deserialize)]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Deserialize)]
struct Candidate {
    content: Option<CandidateContent>,
}

#[derive(Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<CandidatePart>,
}

#[derive(Deserialize)]
struct CandidatePart {
    text: Option<String>,
}

impl GenerateContentResponse {
    fn first_text(&self) -> Option<String> {
        self.candidates
            .iter()
            .filter_map(|c| c.content.as_ref())
            .flat_map(|content| content.parts.iter())
            .find_map(|part| part.text.as_ref())
            .filter(|text| !text.is_empty())
            .cloned()
    }
}

/// Declared output shape: summary, tableHeaders and tableRows mandatory.
fn response_schema() -> Value {
    json!({
        "type": "OBJECT",
        "properties": {
            "name": {
                "type": "STRING",
                "description": "Title for the dataset (e.g. 'Scraped Profiles')",
            },
            "headline": {
                "type": "STRING",
                "description": "Brief status or count of items found",
            },
            "summary": {
                "type": "STRING",
                "description": "A short summary of what this data represents (max 50 words)",
            },
            "keySkills": {
                "type": "ARRAY",
                "items": { "type": "STRING" },
                "description": "Extract 3-5 key common industries or tags from the list",
            },
            "tableHeaders": {
                "type": "ARRAY",
                "items": { "type": "STRING" },
                "description": "The list of column headers. Use the specific list provided in the prompt (Name, LinkedIn URL, Comments, etc) if data exists.",
            },
            "tableRows": {
                "type": "ARRAY",
                "items": {
                    "type": "ARRAY",
                    "items": { "type": "STRING" },
                },
                "description": "Rows of data. Ensure the order matches tableHeaders exactly.",
            },
        },
        "required": ["summary", "tableHeaders", "tableRows"],
    })
}

/// Cut the serialized payload down to the model's input budget. Applying it
/// to an already-truncated payload is a no-op.
pub fn truncate_payload(raw: &str) -> String {
    raw.chars().take(MAX_PAYLOAD_CHARS).collect()
}

fn backoff_delay(failed_attempt: u32) -> Duration {
    Duration::from_millis(BACKOFF_UNIT_MS * u64::from(failed_attempt))
}

/// Reshapes arbitrary webhook JSON into the fixed profile table. Failures
/// fold into an error-carrying [`NormalizedProfile`] so the caller can still
/// show the raw webhook data.
pub struct NormalizationClient {
    backend: Box<dyn GenerateBackend>,
}

impl NormalizationClient {
    pub fn new(backend: Box<dyn GenerateBackend>) -> Self {
        Self { backend }
    }

    pub async fn normalize(&self, raw_payload: &Value) -> NormalizedProfile {
        if !self.backend.has_credential() {
            return NormalizedProfile::configuration_error(
                "API Key is missing. Set GEMINI_API_KEY in the server environment.",
            );
        }

        let serialized = match serde_json::to_string(raw_payload) {
            Ok(s) => s,
            Err(e) => {
                return NormalizedProfile::ai_failure(format!(
                    "Could not serialize webhook payload: {}",
                    e
                ))
            }
        };

        let request = GenerateRequest {
            system_instruction: SYSTEM_INSTRUCTION.to_string(),
            prompt: COLUMN_PROMPT.to_string(),
            data: truncate_payload(&serialized),
        };

        let mut attempt = 0;
        let text = loop {
            attempt += 1;
            match self.backend.generate(&request).await {
                Ok(text) => break text,
                Err(err) if err.kind == GenerateErrorKind::Overloaded && attempt < MAX_ATTEMPTS => {
                    let wait = backoff_delay(attempt);
                    warn!(
                        "Model API overloaded. Retrying attempt {}/{} in {}ms...",
                        attempt + 1,
                        MAX_ATTEMPTS,
                        wait.as_millis()
                    );
                    tokio::time::sleep(wait).await;
                }
                Err(err) => {
                    warn!("AI normalization failed: {}", err.message);
                    return NormalizedProfile::ai_failure(err.message);
                }
            }
        };

        match serde_json::from_str::<NormalizedProfile>(&text) {
            Ok(mut profile) => {
                profile.enforce_table_shape();
                info!("AI normalization produced {} rows", profile.table_rows.len());
                profile
            }
            Err(e) => NormalizedProfile::ai_failure(format!(
                "Model output was not valid JSON: {}",
                e
            )),
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::{Arc, Mutex};

    pub(crate) struct StubBackend {
        credential: bool,
        script: Mutex<VecDeque<Result<String, GenerateError>>>,
        fallback: Option<String>,
        calls: Arc<AtomicU32>,
    }

    impl StubBackend {
        pub(crate) fn always_ok(text: String) -> Self {
            Self {
                credential: true,
                script: Mutex::new(VecDeque::new()),
                fallback: Some(text),
                calls: Arc::new(AtomicU32::new(0)),
            }
        }

        pub(crate) fn scripted(outcomes: Vec<Result<String, GenerateError>>) -> Self {
            Self {
                credential: true,
                script: Mutex::new(outcomes.into()),
                fallback: None,
                calls: Arc::new(AtomicU32::new(0)),
            }
        }

        pub(crate) fn without_credential() -> Self {
            Self {
                credential: false,
                script: Mutex::new(VecDeque::new()),
                fallback: None,
                calls: Arc::new(AtomicU32::new(0)),
            }
        }

        fn call_counter(&self) -> Arc<AtomicU32> {
            Arc::clone(&self.calls)
        }
    }

    #[async_trait]
    impl GenerateBackend for StubBackend {
        fn has_credential(&self) -> bool {
            self.credential
        }

        async fn generate(&self, _request: &GenerateRequest) -> Result<String, GenerateError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if let Some(outcome) = self.script.lock().unwrap().pop_front() {
                return outcome;
            }
            match &self.fallback {
                Some(text) => Ok(text.clone()),
                None => Err(GenerateError::new(
                    GenerateErrorKind::EmptyResponse,
                    "script exhausted",
                )),
            }
        }
    }

    fn overloaded() -> GenerateError {
        GenerateError::new(GenerateErrorKind::Overloaded, "Model API returned 503")
    }

    fn profile_text() -> String {
        serde_json::json!({
            "summary": "Scraped profile data",
            "tableHeaders": ["Name", "Industry"],
            "tableRows": [["Jane", "Software"]],
        })
        .to_string()
    }

    #[test]
    fn truncation_is_idempotent_and_bounded() {
        let oversized: String = "x".repeat(MAX_PAYLOAD_CHARS + 5000);

        let once = truncate_payload(&oversized);
        let twice = truncate_payload(&once);

        assert_eq!(once.chars().count(), MAX_PAYLOAD_CHARS);
        assert_eq!(once, twice);
    }

    #[test]
    fn short_payloads_pass_through_untouched() {
        assert_eq!(truncate_payload("{\"a\":1}"), "{\"a\":1}");
    }

    #[test]
    fn backoff_schedule_is_linear() {
        assert_eq!(backoff_delay(1), Duration::from_millis(2000));
        assert_eq!(backoff_delay(2), Duration::from_millis(4000));
        assert_eq!(backoff_delay(3), Duration::from_millis(6000));
    }

    #[tokio::test(start_paused = true)]
    async fn overload_retries_until_fourth_attempt_succeeds() {
        let backend = StubBackend::scripted(vec![
            Err(overloaded()),
            Err(overloaded()),
            Err(overloaded()),
            Ok(profile_text()),
        ]);
        let client = NormalizationClient::new(Box::new(backend));

        let start = tokio::time::Instant::now();
        let profile = client.normalize(&serde_json::json!({"k": "v"})).await;

        // Waits of 2s, 4s and 6s precede attempts 2, 3 and 4.
        assert_eq!(start.elapsed(), Duration::from_secs(12));
        assert!(profile.error.is_none());
        assert_eq!(profile.summary, "Scraped profile data");
    }

    #[tokio::test(start_paused = true)]
    async fn overload_budget_exhaustion_folds_into_error_profile() {
        let backend = StubBackend::scripted(vec![
            Err(overloaded()),
            Err(overloaded()),
            Err(overloaded()),
            Err(overloaded()),
        ]);
        let client = NormalizationClient::new(Box::new(backend));

        let profile = client.normalize(&serde_json::json!({})).await;

        assert!(profile.error.as_ref().unwrap().contains("503"));
        assert!(profile.summary.contains("Failed to generate AI summary"));
    }

    #[tokio::test]
    async fn non_overload_error_aborts_without_retry() {
        let backend = StubBackend::scripted(vec![Err(GenerateError::new(
            GenerateErrorKind::Http(400),
            "Model API returned 400: bad request",
        ))]);
        let calls = backend.call_counter();
        let client = NormalizationClient::new(Box::new(backend));

        let profile = client.normalize(&serde_json::json!({})).await;

        assert!(profile.error.as_ref().unwrap().contains("400"));
        // Exactly one call: the non-overload failure consumed no retries.
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn missing_credential_short_circuits_without_backend_calls() {
        let backend = StubBackend::without_credential();
        let calls = backend.call_counter();
        let client = NormalizationClient::new(Box::new(backend));

        let profile = client.normalize(&serde_json::json!({"k": "v"})).await;

        assert_eq!(profile.summary, "Configuration Error");
        assert!(profile.error.as_ref().unwrap().contains("API Key"));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn unparseable_model_output_folds_into_error_profile() {
        let backend = StubBackend::always_ok("this is not json".to_string());
        let client = NormalizationClient::new(Box::new(backend));

        let profile = client.normalize(&serde_json::json!({})).await;

        assert!(profile.error.as_ref().unwrap().contains("not valid JSON"));
    }

    #[tokio::test]
    async fn parsed_profile_rows_are_normalized_to_header_width() {
        let text = serde_json::json!({
            "summary": "ok",
            "tableHeaders": ["Name", "Industry", "Country"],
            "tableRows": [["Jane"], ["Joe", "Retail", "FR", "extra"]],
        })
        .to_string();
        let client = NormalizationClient::new(Box::new(StubBackend::always_ok(text)));

        let profile = client.normalize(&serde_json::json!({})).await;

        assert!(profile.table_rows.iter().all(|r| r.len() == 3));
        assert_eq!(profile.table_rows[0], vec!["Jane", "-", "-"]);
    }
}
