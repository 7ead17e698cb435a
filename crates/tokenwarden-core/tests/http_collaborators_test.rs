//! Integration tests for the HTTP-backed validator and identity provider.
//!
//! These tests verify:
//! - Introspection fails closed on errors, bad statuses and past expiry
//! - Silent renewal through the refresh grant
//! - Interactive renewal through the device authorization flow

use std::sync::{Arc, Mutex};

use tokenwarden_core::auth::{
    ConsentSurface, CredentialError, HttpIdentityProvider, IdentityProvider,
    IntrospectionValidator, ProviderEndpoints, RenewalClient, RenewalMode, SessionClock,
    TokenRequest, TokenValidator,
};
use wiremock::matchers::{body_string_contains, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

#[derive(Default)]
struct RecordingConsent {
    shown: Mutex<Vec<(String, String)>>,
}

impl ConsentSurface for RecordingConsent {
    fn present(&self, verification_uri: &str, user_code: &str) {
        self.shown
            .lock()
            .unwrap()
            .push((verification_uri.to_string(), user_code.to_string()));
    }
}

fn provider_for(server: &MockServer, consent: Arc<RecordingConsent>) -> HttpIdentityProvider {
    HttpIdentityProvider::new(
        ProviderEndpoints {
            token: Some(format!("{}/token", server.uri())),
            device: Some(format!("{}/device/code", server.uri())),
        },
        None,
        consent,
    )
    .expect("provider should build")
}

fn request(mode: RenewalMode) -> TokenRequest {
    TokenRequest {
        client_id: "client-123".to_string(),
        scope: "https://www.googleapis.com/auth/calendar".to_string(),
        mode,
    }
}

async fn mount_device_code(server: &MockServer) {
    Mock::given(method("POST"))
        .and(path("/device/code"))
        .and(body_string_contains("client_id=client-123"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "device_code": "dev-123",
            "user_code": "ABCD-EFGH",
            "verification_url": "https://www.google.com/device",
            "expires_in": 60,
            "interval": 1
        })))
        .mount(server)
        .await;
}

// ============================================================================
// Introspection
// ============================================================================

#[tokio::test]
async fn test_introspection_accepts_unexpired_token() {
    let server = MockServer::start().await;
    let exp = chrono::Utc::now().timestamp() + 3600;

    Mock::given(method("GET"))
        .and(path("/tokeninfo"))
        .and(query_param("access_token", "good-token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "aud": "client-123",
            "exp": exp.to_string(),
            "expires_in": "3600"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let validator =
        IntrospectionValidator::new(format!("{}/tokeninfo", server.uri()), SessionClock::new()).unwrap();
    assert!(validator.validate("good-token").await);
}

#[tokio::test]
async fn test_introspection_rejects_expired_token() {
    let server = MockServer::start().await;
    let exp = chrono::Utc::now().timestamp() - 10;

    Mock::given(method("GET"))
        .and(path("/tokeninfo"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({ "exp": exp })))
        .mount(&server)
        .await;

    let validator =
        IntrospectionValidator::new(format!("{}/tokeninfo", server.uri()), SessionClock::new()).unwrap();
    assert!(!validator.validate("old-token").await);

    let err = validator.check("old-token").await.unwrap_err();
    assert!(matches!(err, CredentialError::InvalidCredential(_)));
}

#[tokio::test]
async fn test_introspection_rejects_error_body() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/tokeninfo"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "error": "invalid_token",
            "error_description": "Invalid Value"
        })))
        .mount(&server)
        .await;

    let validator =
        IntrospectionValidator::new(format!("{}/tokeninfo", server.uri()), SessionClock::new()).unwrap();
    assert!(!validator.validate("bad-token").await);
}

#[tokio::test]
async fn test_introspection_rejects_non_success_status() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/tokeninfo"))
        .respond_with(ResponseTemplate::new(400).set_body_string("invalid_token"))
        .mount(&server)
        .await;

    let validator =
        IntrospectionValidator::new(format!("{}/tokeninfo", server.uri()), SessionClock::new()).unwrap();
    assert!(!validator.validate("bad-token").await);
}

#[tokio::test]
async fn test_introspection_error_body_is_truncated() {
    let server = MockServer::start().await;
    let page = "<html>".repeat(1000);

    Mock::given(method("GET"))
        .and(path("/tokeninfo"))
        .respond_with(ResponseTemplate::new(502).set_body_string(page.clone()))
        .mount(&server)
        .await;

    let validator =
        IntrospectionValidator::new(format!("{}/tokeninfo", server.uri()), SessionClock::new()).unwrap();
    let err = validator.check("any-token").await.unwrap_err();

    let message = err.to_string();
    assert!(matches!(err, CredentialError::InvalidCredential(_)));
    assert!(message.contains("truncated, 6000 total bytes"));
    assert!(message.len() < 700);
}

#[tokio::test]
async fn test_introspection_network_failure_is_invalid() {
    // Nothing listens on port 1
    let validator =
        IntrospectionValidator::new("http://127.0.0.1:1/tokeninfo", SessionClock::new()).unwrap();
    assert!(!validator.validate("any-token").await);

    let err = validator.check("any-token").await.unwrap_err();
    assert!(matches!(err, CredentialError::NetworkFailure(_)));
    assert!(err.is_retryable());
}

// ============================================================================
// Identity provider
// ============================================================================

#[tokio::test]
async fn test_silent_without_refresh_grant_is_denied() {
    let server = MockServer::start().await;
    let provider = provider_for(&server, Arc::new(RecordingConsent::default()));

    assert!(!provider.has_refresh_grant());
    let err = provider.request_token(&request(RenewalMode::Silent)).await.unwrap_err();
    assert!(matches!(err, CredentialError::RenewalDenied(_)));
}

#[tokio::test]
async fn test_device_flow_then_silent_refresh() {
    let server = MockServer::start().await;
    mount_device_code(&server).await;

    // First poll: user has not approved yet
    Mock::given(method("POST"))
        .and(path("/token"))
        .and(body_string_contains("device_code=dev-123"))
        .respond_with(ResponseTemplate::new(428).set_body_json(serde_json::json!({
            "error": "authorization_pending"
        })))
        .up_to_n_times(1)
        .with_priority(1)
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(path("/token"))
        .and(body_string_contains("device_code=dev-123"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "access_token": "interactive-token",
            "refresh_token": "refresh-1",
            "expires_in": 3599,
            "token_type": "Bearer"
        })))
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(path("/token"))
        .and(body_string_contains("grant_type=refresh_token"))
        .and(body_string_contains("refresh_token=refresh-1"))
        .and(body_string_contains("prompt=none"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "access_token": "silent-token",
            "expires_in": 3599
        })))
        .expect(1)
        .mount(&server)
        .await;

    let consent = Arc::new(RecordingConsent::default());
    let provider = provider_for(&server, consent.clone());

    let grant = provider
        .request_token(&request(RenewalMode::Interactive))
        .await
        .expect("device flow should succeed");
    assert_eq!(grant.access_token.as_deref(), Some("interactive-token"));
    assert!(provider.has_refresh_grant());
    assert_eq!(
        consent.shown.lock().unwrap().as_slice(),
        &[(
            "https://www.google.com/device".to_string(),
            "ABCD-EFGH".to_string()
        )]
    );

    let grant = provider
        .request_token(&request(RenewalMode::Silent))
        .await
        .expect("refresh should succeed");
    assert_eq!(grant.access_token.as_deref(), Some("silent-token"));
}

#[tokio::test]
async fn test_device_flow_denied() {
    let server = MockServer::start().await;
    mount_device_code(&server).await;

    Mock::given(method("POST"))
        .and(path("/token"))
        .respond_with(ResponseTemplate::new(403).set_body_json(serde_json::json!({
            "error": "access_denied",
            "error_description": "The user denied the request"
        })))
        .mount(&server)
        .await;

    let provider = provider_for(&server, Arc::new(RecordingConsent::default()));
    let err = provider
        .request_token(&request(RenewalMode::Interactive))
        .await
        .unwrap_err();

    match err {
        CredentialError::RenewalDenied(message) => assert!(message.contains("access_denied")),
        other => panic!("expected RenewalDenied, got {:?}", other),
    }
}

#[tokio::test]
async fn test_device_code_with_unbounded_lifetime_is_denied() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/device/code"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "device_code": "dev-123",
            "user_code": "ABCD-EFGH",
            "verification_url": "https://www.google.com/device",
            "expires_in": u64::MAX,
            "interval": 1
        })))
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(path("/token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "access_token": "never-issued"
        })))
        .expect(0)
        .mount(&server)
        .await;

    let consent = Arc::new(RecordingConsent::default());
    let provider = Arc::new(provider_for(&server, consent.clone()));
    let client = RenewalClient::new(provider, "client-123", "calendar", SessionClock::new());

    let err = client.renew(RenewalMode::Interactive).await.unwrap_err();
    assert!(matches!(err, CredentialError::RenewalDenied(_)));
    assert!(consent.shown.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_device_code_endpoint_outage_is_unavailable() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/device/code"))
        .respond_with(ResponseTemplate::new(503).set_body_string("try later"))
        .mount(&server)
        .await;

    let provider = provider_for(&server, Arc::new(RecordingConsent::default()));
    let err = provider
        .request_token(&request(RenewalMode::Interactive))
        .await
        .unwrap_err();
    assert!(matches!(err, CredentialError::RenewalUnavailable(_)));
}

#[tokio::test]
async fn test_renewal_client_over_http_provider() {
    let server = MockServer::start().await;
    mount_device_code(&server).await;

    Mock::given(method("POST"))
        .and(path("/token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "access_token": "fresh-token",
            "refresh_token": "refresh-2"
        })))
        .mount(&server)
        .await;

    let clock = SessionClock::new();
    let provider = Arc::new(provider_for(&server, Arc::new(RecordingConsent::default())));
    let client = RenewalClient::new(provider, "client-123", "calendar", clock);

    let before = clock.now();
    let credential = client
        .renew(RenewalMode::Interactive)
        .await
        .expect("renewal should succeed");
    assert_eq!(credential.value, "fresh-token");
    assert!(credential.issued_at >= before);
}

#[tokio::test]
async fn test_renewal_client_surfaces_rejected_refresh() {
    let server = MockServer::start().await;
    mount_device_code(&server).await;

    Mock::given(method("POST"))
        .and(path("/token"))
        .and(body_string_contains("device_code=dev-123"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "access_token": "first",
            "refresh_token": "revoked"
        })))
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(path("/token"))
        .and(body_string_contains("grant_type=refresh_token"))
        .respond_with(ResponseTemplate::new(400).set_body_json(serde_json::json!({
            "error": "invalid_grant"
        })))
        .mount(&server)
        .await;

    let provider = Arc::new(provider_for(&server, Arc::new(RecordingConsent::default())));
    let client = RenewalClient::new(provider, "client-123", "calendar", SessionClock::new());

    client.renew(RenewalMode::Interactive).await.unwrap();
    let err = client.renew(RenewalMode::Silent).await.unwrap_err();
    assert!(matches!(err, CredentialError::RenewalDenied(_)));
}
