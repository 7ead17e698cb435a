use std::fmt;

use anyhow::{bail, Result};
use chrono::{DateTime, Duration, Utc};

/// Credential lifetime in seconds.
/// Google access tokens are issued for one hour.
const DEFAULT_LIFETIME_SECS: i64 = 60 * 60;

/// Lead time before expiry at which the user is warned (5 minutes)
const DEFAULT_WARNING_LEAD_SECS: i64 = 5 * 60;

/// Bearer credential plus the moment it was issued.
#[derive(Clone, PartialEq, Eq)]
pub struct Credential {
    pub value: String,
    pub issued_at: DateTime<Utc>,
}

impl Credential {
    pub fn new(value: impl Into<String>, issued_at: DateTime<Utc>) -> Self {
        Self {
            value: value.into(),
            issued_at,
        }
    }
}

// Keep the token itself out of logs and panic messages
impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("value", &format_args!("<{} bytes>", self.value.len()))
            .field("issued_at", &self.issued_at)
            .finish()
    }
}

/// When a credential expires and how early the user is warned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExpiryPolicy {
    lifetime: Duration,
    warning_lead: Duration,
}

impl ExpiryPolicy {
    pub fn new(lifetime: Duration, warning_lead: Duration) -> Result<Self> {
        if lifetime <= Duration::zero() {
            bail!("Credential lifetime must be positive");
        }
        if warning_lead < Duration::zero() || warning_lead >= lifetime {
            bail!(
                "Warning lead time ({}s) must be shorter than the lifetime ({}s)",
                warning_lead.num_seconds(),
                lifetime.num_seconds()
            );
        }
        Ok(Self {
            lifetime,
            warning_lead,
        })
    }

    pub fn lifetime(&self) -> Duration {
        self.lifetime
    }

    pub fn warning_lead(&self) -> Duration {
        self.warning_lead
    }

    pub fn expires_at(&self, issued_at: DateTime<Utc>) -> DateTime<Utc> {
        issued_at + self.lifetime
    }

    /// `issued_at + lifetime - lead`
    pub fn warn_at(&self, issued_at: DateTime<Utc>) -> DateTime<Utc> {
        self.expires_at(issued_at) - self.warning_lead
    }

    /// Time left until the warning deadline, floored at zero.
    pub fn delay_until_warning(&self, issued_at: DateTime<Utc>, now: DateTime<Utc>) -> Duration {
        (self.warn_at(issued_at) - now).max(Duration::zero())
    }

    /// Time left until the credential is dead, floored at zero.
    pub fn delay_until_expiry(&self, issued_at: DateTime<Utc>, now: DateTime<Utc>) -> Duration {
        (self.expires_at(issued_at) - now).max(Duration::zero())
    }
}

impl Default for ExpiryPolicy {
    fn default() -> Self {
        Self {
            lifetime: Duration::seconds(DEFAULT_LIFETIME_SECS),
            warning_lead: Duration::seconds(DEFAULT_WARNING_LEAD_SECS),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, 9, 0, 0).unwrap()
    }

    #[test]
    fn test_default_policy_warns_at_55_minutes() {
        let policy = ExpiryPolicy::default();
        assert_eq!(policy.warn_at(t0()), t0() + Duration::seconds(3300));
        assert_eq!(policy.expires_at(t0()), t0() + Duration::seconds(3600));
    }

    #[test]
    fn test_delay_until_warning_floors_at_zero() {
        let policy = ExpiryPolicy::default();
        assert_eq!(
            policy.delay_until_warning(t0(), t0()),
            Duration::seconds(3300)
        );
        assert_eq!(
            policy.delay_until_warning(t0(), t0() + Duration::hours(2)),
            Duration::zero()
        );
    }

    #[test]
    fn test_delay_until_expiry() {
        let policy = ExpiryPolicy::default();
        assert_eq!(
            policy.delay_until_expiry(t0(), t0() + Duration::seconds(3300)),
            Duration::seconds(300)
        );
        assert_eq!(
            policy.delay_until_expiry(t0(), t0() + Duration::seconds(3600)),
            Duration::zero()
        );
    }

    #[test]
    fn test_policy_rejects_lead_longer_than_lifetime() {
        assert!(ExpiryPolicy::new(Duration::minutes(5), Duration::minutes(5)).is_err());
        assert!(ExpiryPolicy::new(Duration::zero(), Duration::zero()).is_err());
        assert!(ExpiryPolicy::new(Duration::minutes(10), Duration::minutes(-1)).is_err());
        assert!(ExpiryPolicy::new(Duration::minutes(10), Duration::minutes(2)).is_ok());
    }

    #[test]
    fn test_debug_hides_token() {
        let credential = Credential::new("ya29.secret", t0());
        let debug = format!("{:?}", credential);
        assert!(!debug.contains("secret"));
        assert!(debug.contains("11 bytes"));
    }
}
