// src/pipeline/dispatch.rs
use super::{ScrapeRequest, WebhookResult};
use crate::config::ServiceConfig;
use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde_json::json;
use tracing::{info, warn};
use url::form_urlencoded;

/// Dispatch result plus whether the CORS-relay fallback carried it.
#[derive(Debug, Clone)]
pub struct DispatchOutcome {
    pub result: WebhookResult,
    pub used_proxy: bool,
}

#[async_trait]
pub trait Dispatcher: Send + Sync {
    fn endpoint(&self) -> &str;

    async fn dispatch(&self, request: &ScrapeRequest) -> Result<DispatchOutcome>;
}

pub struct WebhookDispatcher {
    client: Client,
    endpoint: String,
    proxy_base: String,
}

impl WebhookDispatcher {
    pub fn new(service: &ServiceConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(service.timeout_seconds))
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            client,
            endpoint: service.webhook_url.trim().to_string(),
            proxy_base: service.cors_proxy_url.clone(),
        })
    }
}

#[async_trait]
impl Dispatcher for WebhookDispatcher {
    fn endpoint(&self) -> &str {
        &self.endpoint
    }

    async fn dispatch(&self, request: &ScrapeRequest) -> Result<DispatchOutcome> {
        let payload = json!({
            "linkedin_url": request.profile_url,
            "api_key": request.caller_api_key,
            "filters": request.requested_fields,
        });

        info!("Dispatching scrape request to {}", self.endpoint);

        // Transport-level failure on the direct call gets exactly one retry
        // through the relay; an HTTP error status does not.
        let (response, used_proxy) = match self
            .client
            .post(&self.endpoint)
            .json(&payload)
            .send()
            .await
        {
            Ok(response) => (response, false),
            Err(direct_err) => {
                warn!("Direct webhook call failed, retrying with proxy: {}", direct_err);

                let proxy_url = proxy_target(&self.proxy_base, &self.endpoint);
                let response = self
                    .client
                    .post(&proxy_url)
                    .json(&payload)
                    .send()
                    .await
                    .with_context(|| {
                        format!("Webhook unreachable, also through proxy: {}", self.endpoint)
                    })?;
                (response, true)
            }
        };

        let status = response.status();
        let body = match response.json::<serde_json::Value>().await {
            Ok(value) => value,
            Err(_) => json!({
                "message": "Non-JSON response received",
                "rawText": status.canonical_reason().unwrap_or_default(),
            }),
        };

        Ok(DispatchOutcome {
            result: WebhookResult {
                succeeded: status.is_success(),
                http_status: status.as_u16(),
                body,
            },
            used_proxy,
        })
    }
}

/// Build the relay URL with the original endpoint percent-encoded as the
/// proxy's target parameter.
pub fn proxy_target(proxy_base: &str, endpoint: &str) -> String {
    let encoded: String = form_urlencoded::byte_serialize(endpoint.as_bytes()).collect();
    format!("{}?{}", proxy_base, encoded)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn proxy_target_encodes_the_endpoint() {
        let url = proxy_target(
            "https://corsproxy.io/",
            "https://hooks.example.com/webhook?id=42",
        );
        assert_eq!(
            url,
            "https://corsproxy.io/?https%3A%2F%2Fhooks.example.com%2Fwebhook%3Fid%3D42"
        );
    }
}
