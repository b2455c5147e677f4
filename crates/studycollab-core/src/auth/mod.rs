//! Authenticated identity supplied by the host's auth provider.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::util::normalize_text_option;

/// Sessions this close to expiry are treated as expired.
const EXPIRY_SKEW_MS: i64 = 60_000;

pub const ENV_ACCESS_TOKEN: &str = "STUDYCOLLAB_ACCESS_TOKEN";
pub const ENV_USER_ID: &str = "STUDYCOLLAB_USER_ID";
pub const ENV_USER_EMAIL: &str = "STUDYCOLLAB_USER_EMAIL";

/// Current user and session
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    pub user_id: String,
    pub email: Option<String>,
    pub access_token: String,
    /// Session expiry (Unix ms); `None` for sessions without expiry
    pub expires_at: Option<i64>,
}

impl Identity {
    pub fn new(user_id: impl Into<String>, access_token: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            email: None,
            access_token: access_token.into(),
            expires_at: None,
        }
    }

    #[must_use]
    pub fn with_email(mut self, email: impl Into<String>) -> Self {
        self.email = Some(email.into());
        self
    }

    #[must_use]
    pub const fn with_expires_at(mut self, expires_at: i64) -> Self {
        self.expires_at = Some(expires_at);
        self
    }

    pub fn is_expired(&self, now_ms: i64) -> bool {
        self.expires_at
            .is_some_and(|expires_at| expires_at <= now_ms + EXPIRY_SKEW_MS)
    }

    /// Fail with `Unauthenticated` unless the session is usable at `now_ms`.
    pub fn ensure_valid(&self, now_ms: i64) -> Result<()> {
        if self.user_id.trim().is_empty() || self.access_token.trim().is_empty() {
            return Err(Error::Unauthenticated(
                "identity is missing a user id or access token".to_string(),
            ));
        }
        if self.is_expired(now_ms) {
            return Err(Error::Unauthenticated(format!(
                "session for {} has expired",
                self.user_id
            )));
        }
        Ok(())
    }

    /// Build an identity from the environment; `None` unless both the user id
    /// and access token are set.
    pub fn from_env<F>(lookup: F) -> Option<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let user_id = normalize_text_option(lookup(ENV_USER_ID))?;
        let access_token = normalize_text_option(lookup(ENV_ACCESS_TOKEN))?;
        let mut identity = Self::new(user_id, access_token);
        identity.email = normalize_text_option(lookup(ENV_USER_EMAIL));
        Some(identity)
    }
}

impl fmt::Debug for Identity {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("Identity")
            .field("user_id", &self.user_id)
            .field("email", &self.email)
            .field("access_token", &"[REDACTED]")
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

/// Require a valid identity for queue and broadcast operations.
pub fn require(identity: Option<&Identity>, now_ms: i64) -> Result<&Identity> {
    let identity =
        identity.ok_or_else(|| Error::Unauthenticated("no signed-in user".to_string()))?;
    identity.ensure_valid(now_ms)?;
    Ok(identity)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn identity_debug_redacts_token() {
        let identity = Identity::new("u1", "secret-token").with_email("a@b.c");
        let debug = format!("{identity:?}");
        assert!(!debug.contains("secret-token"));
        assert!(debug.contains("[REDACTED]"));
        assert!(debug.contains("a@b.c"));
    }

    #[test]
    fn ensure_valid_rejects_expired_session() {
        let identity = Identity::new("u1", "token").with_expires_at(100_000);
        assert!(identity.ensure_valid(0).is_ok());
        let error = identity.ensure_valid(50_000).unwrap_err();
        assert!(matches!(error, Error::Unauthenticated(_)));
    }

    #[test]
    fn ensure_valid_rejects_blank_token() {
        let identity = Identity::new("u1", "  ");
        assert!(matches!(
            identity.ensure_valid(0),
            Err(Error::Unauthenticated(_))
        ));
    }

    #[test]
    fn require_rejects_missing_identity() {
        assert!(matches!(require(None, 0), Err(Error::Unauthenticated(_))));
        let identity = Identity::new("u1", "token");
        assert_eq!(require(Some(&identity), 0).unwrap().user_id, "u1");
    }

    #[test]
    fn from_env_needs_user_and_token() {
        let env = HashMap::from([(ENV_USER_ID, "u1"), (ENV_USER_EMAIL, " ")]);
        assert!(Identity::from_env(|key| env.get(key).map(ToString::to_string)).is_none());

        let env = HashMap::from([(ENV_USER_ID, "u1"), (ENV_ACCESS_TOKEN, "t")]);
        let identity = Identity::from_env(|key| env.get(key).map(ToString::to_string)).unwrap();
        assert_eq!(identity.user_id, "u1");
        assert_eq!(identity.email, None);
    }
}
