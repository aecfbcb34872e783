use linkdata_formatter::config::ServiceConfig;
use linkdata_formatter::pipeline::{Dispatcher, ScrapeRequest, WebhookDispatcher};
use pretty_assertions::assert_eq;
use serde_json::json;
use wiremock::matchers::{body_partial_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn service_config(webhook_url: String, cors_proxy_url: String) -> ServiceConfig {
    ServiceConfig {
        webhook_url,
        cors_proxy_url,
        gemini_api_url: "https://generativelanguage.googleapis.com".to_string(),
        gemini_model: "gemini-2.5-flash".to_string(),
        gemini_api_key: String::new(),
        admin_email: "admin@gmail.com".to_string(),
        timeout_seconds: 5,
    }
}

fn scrape_request() -> ScrapeRequest {
    ScrapeRequest::new("https://linkedin.com/in/jane", "apify-key-123")
}

#[tokio::test]
async fn direct_dispatch_carries_url_key_and_filters() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/hook"))
        .and(body_partial_json(json!({
            "linkedin_url": "https://linkedin.com/in/jane",
            "api_key": "apify-key-123",
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"profile": "jane"})))
        .mount(&server)
        .await;

    let config = service_config(
        format!("{}/hook", server.uri()),
        "https://corsproxy.invalid/".to_string(),
    );
    let dispatcher = WebhookDispatcher::new(&config).unwrap();

    let outcome = dispatcher.dispatch(&scrape_request()).await.unwrap();

    assert!(outcome.result.succeeded);
    assert!(!outcome.used_proxy);
    assert_eq!(outcome.result.http_status, 200);
    assert_eq!(outcome.result.body, json!({"profile": "jane"}));
}

#[tokio::test]
async fn unreachable_endpoint_falls_back_to_the_proxy() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/relay"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"via": "proxy"})))
        .mount(&server)
        .await;

    // Nothing listens on port 9; the direct call fails at transport level.
    let config = service_config(
        "http://127.0.0.1:9/hook".to_string(),
        format!("{}/relay", server.uri()),
    );
    let dispatcher = WebhookDispatcher::new(&config).unwrap();

    let outcome = dispatcher.dispatch(&scrape_request()).await.unwrap();

    assert!(outcome.used_proxy);
    assert!(outcome.result.succeeded);
    assert_eq!(outcome.result.body, json!({"via": "proxy"}));
}

#[tokio::test]
async fn proxy_failure_propagates_as_transport_error() {
    let config = service_config(
        "http://127.0.0.1:9/hook".to_string(),
        "http://127.0.0.1:9/relay".to_string(),
    );
    let dispatcher = WebhookDispatcher::new(&config).unwrap();

    let err = dispatcher.dispatch(&scrape_request()).await.unwrap_err();
    assert!(err.to_string().contains("also through proxy"));
}

#[tokio::test]
async fn http_error_statuses_are_reported_not_retried() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/hook"))
        .respond_with(ResponseTemplate::new(404).set_body_json(json!({"message": "no workflow"})))
        .expect(1)
        .mount(&server)
        .await;

    let config = service_config(
        format!("{}/hook", server.uri()),
        "https://corsproxy.invalid/".to_string(),
    );
    let dispatcher = WebhookDispatcher::new(&config).unwrap();

    let outcome = dispatcher.dispatch(&scrape_request()).await.unwrap();

    assert!(!outcome.result.succeeded);
    assert!(!outcome.used_proxy);
    assert_eq!(outcome.result.http_status, 404);
}

#[tokio::test]
async fn non_json_bodies_become_the_placeholder_object() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/hook"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>not json</html>"))
        .mount(&server)
        .await;

    let config = service_config(
        format!("{}/hook", server.uri()),
        "https://corsproxy.invalid/".to_string(),
    );
    let dispatcher = WebhookDispatcher::new(&config).unwrap();

    let outcome = dispatcher.dispatch(&scrape_request()).await.unwrap();

    assert!(outcome.result.succeeded);
    assert_eq!(
        outcome.result.body["message"],
        json!("Non-JSON response received")
    );
}
