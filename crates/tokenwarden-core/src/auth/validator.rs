use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use reqwest::Client;
use serde::{Deserialize, Deserializer};
use tracing::{debug, warn};

use super::{CredentialError, SessionClock};

/// HTTP request timeout in seconds for introspection calls
const REQUEST_TIMEOUT_SECS: u64 = 10;

/// Asks an authority whether a credential is still good.
#[async_trait]
pub trait TokenValidator: Send + Sync {
    /// `true` only when the credential is positively known to be valid.
    async fn validate(&self, token: &str) -> bool;
}

#[derive(Debug, Deserialize)]
struct TokenInfo {
    #[serde(default, deserialize_with = "lenient_epoch")]
    exp: Option<i64>,
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    error_description: Option<String>,
}

/// Google's tokeninfo sends `exp` as a string; other servers send a number.
fn lenient_epoch<'de, D>(deserializer: D) -> std::result::Result<Option<i64>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Epoch {
        Number(i64),
        Text(String),
    }

    Ok(match Option::<Epoch>::deserialize(deserializer)? {
        Some(Epoch::Number(n)) => Some(n),
        Some(Epoch::Text(s)) => s.trim().parse().ok(),
        None => None,
    })
}

/// Validates credentials against a token-info style endpoint
/// (`GET <endpoint>?access_token=<token>`).
///
/// Fails closed: any transport error, non-success status, error body or
/// past expiry means invalid.
#[derive(Clone)]
pub struct IntrospectionValidator {
    client: Client,
    endpoint: String,
    clock: SessionClock,
}

impl IntrospectionValidator {
    pub fn new(endpoint: impl Into<String>, clock: SessionClock) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()?;

        Ok(Self {
            client,
            endpoint: endpoint.into(),
            clock,
        })
    }

    /// Full check with the reason for rejection.
    pub async fn check(&self, token: &str) -> std::result::Result<(), CredentialError> {
        let response = self
            .client
            .get(&self.endpoint)
            .query(&[("access_token", token)])
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(CredentialError::InvalidCredential(format!(
                "Status {}: {}",
                status,
                CredentialError::truncate_body(body.trim())
            )));
        }

        let info: TokenInfo = response.json().await?;
        if let Some(error) = info.error {
            let detail = info.error_description.unwrap_or_default();
            return Err(CredentialError::InvalidCredential(
                format!("{} {}", error, detail).trim().to_string(),
            ));
        }

        if let Some(exp) = info.exp {
            let expires_at: Option<DateTime<Utc>> = Utc.timestamp_opt(exp, 0).single();
            match expires_at {
                Some(at) if at > self.clock.now() => {
                    debug!(expires_at = %at, "Credential validated");
                }
                Some(at) => {
                    return Err(CredentialError::InvalidCredential(format!(
                        "expired at {}",
                        at
                    )));
                }
                None => {
                    return Err(CredentialError::InvalidCredential(format!(
                        "unreadable expiry {}",
                        exp
                    )));
                }
            }
        }

        Ok(())
    }
}

#[async_trait]
impl TokenValidator for IntrospectionValidator {
    async fn validate(&self, token: &str) -> bool {
        match self.check(token).await {
            Ok(()) => true,
            Err(e) => {
                warn!(kind = e.kind(), error = %e, "Credential failed validation");
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_tokeninfo_string_exp() {
        let json = r#"{"azp":"123.apps.googleusercontent.com","exp":"1717000000","expires_in":"3599"}"#;
        let info: TokenInfo = serde_json::from_str(json).expect("tokeninfo should parse");
        assert_eq!(info.exp, Some(1_717_000_000));
        assert!(info.error.is_none());
    }

    #[test]
    fn test_parse_tokeninfo_numeric_exp() {
        let info: TokenInfo = serde_json::from_str(r#"{"exp": 1717000000}"#).unwrap();
        assert_eq!(info.exp, Some(1_717_000_000));
    }

    #[test]
    fn test_parse_tokeninfo_error_body() {
        let json = r#"{"error":"invalid_token","error_description":"Invalid Value"}"#;
        let info: TokenInfo = serde_json::from_str(json).unwrap();
        assert!(info.exp.is_none());
        assert_eq!(info.error.as_deref(), Some("invalid_token"));
    }

    #[test]
    fn test_parse_tokeninfo_garbage_exp_is_none() {
        let info: TokenInfo = serde_json::from_str(r#"{"exp":"soon"}"#).unwrap();
        assert!(info.exp.is_none());
    }
}
