use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Refresh this long before the provider-reported expiry.
const EXPIRY_SKEW_SECS: i64 = 60;

/// A Google delivery credential, one row per signed-in account.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct OAuthCredential {
    pub account: String,
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub expires_at: DateTime<Utc>,
    pub scope: String,
    pub updated_at: DateTime<Utc>,
}

impl OAuthCredential {
    pub fn needs_refresh(&self, now: DateTime<Utc>) -> bool {
        self.expires_at - Duration::seconds(EXPIRY_SKEW_SECS) <= now
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn credential_expiring_at(expires_at: DateTime<Utc>) -> OAuthCredential {
        OAuthCredential {
            account: "me@example.com".to_string(),
            access_token: "ya29.token".to_string(),
            refresh_token: Some("1//refresh".to_string()),
            expires_at,
            scope: "email".to_string(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn test_fresh_credential_does_not_need_refresh() {
        let now = Utc::now();
        let cred = credential_expiring_at(now + Duration::minutes(30));
        assert!(!cred.needs_refresh(now));
    }

    #[test]
    fn test_credential_inside_skew_window_needs_refresh() {
        let now = Utc::now();
        let cred = credential_expiring_at(now + Duration::seconds(30));
        assert!(cred.needs_refresh(now));
    }

    #[test]
    fn test_expired_credential_needs_refresh() {
        let now = Utc::now();
        let cred = credential_expiring_at(now - Duration::hours(1));
        assert!(cred.needs_refresh(now));
    }
}
