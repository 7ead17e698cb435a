use thiserror::Error;

/// Everything that can go wrong while establishing or renewing a credential.
///
/// None of these reach the UI as distinct errors: the lifecycle coordinator
/// collapses all of them into a logout.
#[derive(Error, Debug)]
pub enum CredentialError {
    #[error("Credential rejected by introspection: {0}")]
    InvalidCredential(String),

    #[error("Identity provider unavailable: {0}")]
    RenewalUnavailable(String),

    #[error("Identity provider returned no credential: {0}")]
    RenewalDenied(String),

    #[error("Network error: {0}")]
    NetworkFailure(#[from] reqwest::Error),
}

/// Maximum length for error response bodies in error messages
const MAX_ERROR_BODY_LENGTH: usize = 500;

impl CredentialError {
    /// Truncate a response body to avoid logging excessive data
    pub(crate) fn truncate_body(body: &str) -> String {
        if body.len() <= MAX_ERROR_BODY_LENGTH {
            body.to_string()
        } else {
            let mut end = MAX_ERROR_BODY_LENGTH;
            while !body.is_char_boundary(end) {
                end -= 1;
            }
            format!("{}... (truncated, {} total bytes)", &body[..end], body.len())
        }
    }

    /// Map a non-success response from the identity provider.
    pub fn from_status(status: reqwest::StatusCode, body: &str) -> Self {
        let truncated = Self::truncate_body(body);
        match status.as_u16() {
            400..=499 => CredentialError::RenewalDenied(format!("Status {}: {}", status, truncated)),
            _ => CredentialError::RenewalUnavailable(format!("Status {}: {}", status, truncated)),
        }
    }

    /// Whether a retry could plausibly succeed.
    ///
    /// Only logged today; every kind still ends in logout.
    pub fn is_retryable(&self) -> bool {
        matches!(self, CredentialError::NetworkFailure(_))
    }

    /// Short label used in structured log fields.
    pub fn kind(&self) -> &'static str {
        match self {
            CredentialError::InvalidCredential(_) => "invalid_credential",
            CredentialError::RenewalUnavailable(_) => "renewal_unavailable",
            CredentialError::RenewalDenied(_) => "renewal_denied",
            CredentialError::NetworkFailure(_) => "network_failure",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::StatusCode;

    #[test]
    fn test_from_status_client_errors_are_denials() {
        let err = CredentialError::from_status(StatusCode::BAD_REQUEST, "invalid_grant");
        assert!(matches!(err, CredentialError::RenewalDenied(_)));
        assert_eq!(err.kind(), "renewal_denied");

        let err = CredentialError::from_status(StatusCode::UNAUTHORIZED, "");
        assert!(matches!(err, CredentialError::RenewalDenied(_)));
    }

    #[test]
    fn test_from_status_server_errors_are_unavailable() {
        let err = CredentialError::from_status(StatusCode::SERVICE_UNAVAILABLE, "down");
        assert!(matches!(err, CredentialError::RenewalUnavailable(_)));
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_truncate_body() {
        let long = "x".repeat(MAX_ERROR_BODY_LENGTH + 20);
        let truncated = CredentialError::truncate_body(&long);
        assert!(truncated.starts_with(&"x".repeat(MAX_ERROR_BODY_LENGTH)));
        assert!(truncated.contains("truncated, 520 total bytes"));

        assert_eq!(CredentialError::truncate_body("short"), "short");
    }

    #[test]
    fn test_truncate_body_respects_char_boundaries() {
        let long = "é".repeat(MAX_ERROR_BODY_LENGTH);
        // Must not panic on a multi-byte boundary
        let truncated = CredentialError::truncate_body(&long);
        assert!(truncated.contains("truncated"));
    }
}
