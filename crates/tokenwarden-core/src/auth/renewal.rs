//! Credential renewal against an OAuth identity provider.
//!
//! Silent renewal uses the refresh grant obtained during the last
//! interactive renewal. Interactive renewal runs the device authorization
//! flow (RFC 8628): the user is shown a code and a URL, and the provider
//! is polled until they approve or deny.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use super::{Credential, CredentialError, SessionClock};

/// HTTP request timeout in seconds.
const REQUEST_TIMEOUT_SECS: u64 = 30;

/// Lower bound on the device flow polling interval
const MIN_POLL_INTERVAL_SECS: u64 = 1;

/// Extra wait added when the provider answers `slow_down`
const SLOW_DOWN_STEP_SECS: u64 = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenewalMode {
    /// No user interaction; consent UI suppressed.
    Silent,
    /// May show a consent surface to the user.
    Interactive,
}

impl RenewalMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            RenewalMode::Silent => "silent",
            RenewalMode::Interactive => "interactive",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenRequest {
    pub client_id: String,
    pub scope: String,
    pub mode: RenewalMode,
}

/// What the provider hands back on success.
#[derive(Debug, Clone, Deserialize)]
pub struct TokenGrant {
    #[serde(default)]
    pub access_token: Option<String>,
    #[serde(default)]
    pub refresh_token: Option<String>,
}

/// Identity provider client. Implementations never panic; every failure
/// is a `CredentialError`.
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    async fn request_token(&self, request: &TokenRequest) -> Result<TokenGrant, CredentialError>;
}

/// Shows the user where to approve an interactive renewal.
pub trait ConsentSurface: Send + Sync {
    fn present(&self, verification_uri: &str, user_code: &str);
}

/// Consent surface that only logs. Useful when no UI is attached.
#[derive(Debug, Default)]
pub struct LogConsentSurface;

impl ConsentSurface for LogConsentSurface {
    fn present(&self, verification_uri: &str, user_code: &str) {
        info!(verification_uri, user_code, "Approve sign-in in your browser");
    }
}

#[derive(Debug, Clone, Default)]
pub struct ProviderEndpoints {
    pub token: Option<String>,
    pub device: Option<String>,
}

#[derive(Debug, Deserialize)]
struct DeviceCodeResponse {
    device_code: String,
    user_code: String,
    #[serde(alias = "verification_url")]
    verification_uri: String,
    expires_in: u64,
    #[serde(default)]
    interval: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct OAuthErrorBody {
    error: String,
    #[serde(default)]
    error_description: Option<String>,
}

enum PollOutcome {
    Granted(TokenGrant),
    Pending,
    SlowDown,
}

/// OAuth provider over HTTP (refresh grant + device authorization).
pub struct HttpIdentityProvider {
    client: Client,
    endpoints: ProviderEndpoints,
    client_secret: Option<String>,
    consent: Arc<dyn ConsentSurface>,
    refresh_grant: Mutex<Option<String>>,
}

impl HttpIdentityProvider {
    pub fn new(
        endpoints: ProviderEndpoints,
        client_secret: Option<String>,
        consent: Arc<dyn ConsentSurface>,
    ) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()?;

        Ok(Self {
            client,
            endpoints,
            client_secret,
            consent,
            refresh_grant: Mutex::new(None),
        })
    }

    /// Whether a silent renewal has anything to work with.
    pub fn has_refresh_grant(&self) -> bool {
        self.refresh_grant
            .lock()
            .map(|grant| grant.is_some())
            .unwrap_or(false)
    }

    fn remember_refresh_grant(&self, grant: &TokenGrant) {
        if let Some(ref refresh) = grant.refresh_token {
            if let Ok(mut slot) = self.refresh_grant.lock() {
                *slot = Some(refresh.clone());
            }
        }
    }

    fn token_endpoint(&self) -> Result<&str, CredentialError> {
        self.endpoints
            .token
            .as_deref()
            .filter(|url| !url.is_empty())
            .ok_or_else(|| CredentialError::RenewalUnavailable("no token endpoint configured".into()))
    }

    fn device_endpoint(&self) -> Result<&str, CredentialError> {
        self.endpoints
            .device
            .as_deref()
            .filter(|url| !url.is_empty())
            .ok_or_else(|| {
                CredentialError::RenewalUnavailable("no device authorization endpoint configured".into())
            })
    }

    async fn refresh(&self, request: &TokenRequest) -> Result<TokenGrant, CredentialError> {
        let url = self.token_endpoint()?;
        let refresh_token = self
            .refresh_grant
            .lock()
            .ok()
            .and_then(|grant| grant.clone())
            .ok_or_else(|| CredentialError::RenewalDenied("no refresh grant held".into()))?;

        let mut form = vec![
            ("grant_type", "refresh_token"),
            ("client_id", request.client_id.as_str()),
            ("refresh_token", refresh_token.as_str()),
            ("scope", request.scope.as_str()),
            ("prompt", "none"),
        ];
        if let Some(ref secret) = self.client_secret {
            form.push(("client_secret", secret.as_str()));
        }

        let response = self.client.post(url).form(&form).send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(CredentialError::from_status(status, &body));
        }
        Ok(response.json().await?)
    }

    async fn device_authorization(&self, request: &TokenRequest) -> Result<TokenGrant, CredentialError> {
        let device_url = self.device_endpoint()?;
        let token_url = self.token_endpoint()?;

        let response = self
            .client
            .post(device_url)
            .form(&[
                ("client_id", request.client_id.as_str()),
                ("scope", request.scope.as_str()),
            ])
            .send()
            .await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(CredentialError::from_status(status, &body));
        }
        let device: DeviceCodeResponse = response.json().await?;

        let deadline = Instant::now()
            .checked_add(Duration::from_secs(device.expires_in))
            .ok_or_else(|| {
                CredentialError::RenewalDenied(format!(
                    "device code lifetime out of range: {}s",
                    device.expires_in
                ))
            })?;

        self.consent.present(&device.verification_uri, &device.user_code);

        let mut interval =
            Duration::from_secs(device.interval.unwrap_or(MIN_POLL_INTERVAL_SECS).max(MIN_POLL_INTERVAL_SECS));

        while Instant::now() < deadline {
            tokio::time::sleep(interval).await;

            match self.poll_device_token(token_url, request, &device.device_code).await? {
                PollOutcome::Granted(grant) => return Ok(grant),
                PollOutcome::Pending => continue,
                PollOutcome::SlowDown => {
                    interval = interval.saturating_add(Duration::from_secs(SLOW_DOWN_STEP_SECS));
                    debug!(interval_secs = interval.as_secs(), "Provider asked to slow down");
                }
            }
        }

        Err(CredentialError::RenewalDenied("device code expired".into()))
    }

    async fn poll_device_token(
        &self,
        token_url: &str,
        request: &TokenRequest,
        device_code: &str,
    ) -> Result<PollOutcome, CredentialError> {
        let mut form = vec![
            ("grant_type", "urn:ietf:params:oauth:grant-type:device_code"),
            ("client_id", request.client_id.as_str()),
            ("device_code", device_code),
        ];
        if let Some(ref secret) = self.client_secret {
            form.push(("client_secret", secret.as_str()));
        }

        let response = self.client.post(token_url).form(&form).send().await?;
        let status = response.status();
        if status.is_success() {
            return Ok(PollOutcome::Granted(response.json().await?));
        }

        let body = response.text().await.unwrap_or_default();
        match serde_json::from_str::<OAuthErrorBody>(&body) {
            Ok(err) if err.error == "authorization_pending" => Ok(PollOutcome::Pending),
            Ok(err) if err.error == "slow_down" => Ok(PollOutcome::SlowDown),
            Ok(err) => Err(CredentialError::RenewalDenied(
                match err.error_description {
                    Some(description) => format!("{}: {}", err.error, description),
                    None => err.error,
                },
            )),
            Err(_) => Err(CredentialError::from_status(status, &body)),
        }
    }
}

#[async_trait]
impl IdentityProvider for HttpIdentityProvider {
    async fn request_token(&self, request: &TokenRequest) -> Result<TokenGrant, CredentialError> {
        if request.client_id.is_empty() {
            return Err(CredentialError::RenewalUnavailable("no client id configured".into()));
        }

        let grant = match request.mode {
            RenewalMode::Silent => self.refresh(request).await?,
            RenewalMode::Interactive => self.device_authorization(request).await?,
        };
        self.remember_refresh_grant(&grant);
        Ok(grant)
    }
}

/// Turns provider grants into credentials.
pub struct RenewalClient {
    provider: Arc<dyn IdentityProvider>,
    client_id: String,
    scope: String,
    clock: SessionClock,
}

impl RenewalClient {
    pub fn new(
        provider: Arc<dyn IdentityProvider>,
        client_id: impl Into<String>,
        scope: impl Into<String>,
        clock: SessionClock,
    ) -> Self {
        Self {
            provider,
            client_id: client_id.into(),
            scope: scope.into(),
            clock,
        }
    }

    /// Obtain a new credential. The issuance time is stamped when the
    /// provider answers.
    pub async fn renew(&self, mode: RenewalMode) -> Result<Credential, CredentialError> {
        let request = TokenRequest {
            client_id: self.client_id.clone(),
            scope: self.scope.clone(),
            mode,
        };

        debug!(mode = mode.as_str(), "Requesting credential");
        let grant = self.provider.request_token(&request).await?;

        match grant.access_token.filter(|token| !token.is_empty()) {
            Some(token) => {
                info!(mode = mode.as_str(), "Credential renewed");
                Ok(Credential::new(token, self.clock.now()))
            }
            None => {
                warn!(mode = mode.as_str(), "Provider returned no access token");
                Err(CredentialError::RenewalDenied("no access token in response".into()))
            }
        }
    }
}
