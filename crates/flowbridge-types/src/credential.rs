//! Cached backend account credentials.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::secret::Redacted;

/// Password and last issued session token for one backend account.
///
/// Keyed by account email in the credential store. The token may be empty
/// (never issued) or stale; validity is always rechecked against the backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CredentialRecord {
    pub password: Redacted,
    #[serde(default)]
    pub token: Redacted,
    #[serde(default = "Utc::now")]
    pub updated_at: DateTime<Utc>,
}

impl CredentialRecord {
    pub fn new(password: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            password: Redacted::new(password),
            token: Redacted::new(token),
            updated_at: Utc::now(),
        }
    }

    /// Copy of this record carrying a freshly issued token.
    pub fn with_token(&self, token: impl Into<String>) -> Self {
        Self {
            password: self.password.clone(),
            token: Redacted::new(token),
            updated_at: Utc::now(),
        }
    }

    pub fn has_token(&self) -> bool {
        !self.token.is_empty()
    }
}
