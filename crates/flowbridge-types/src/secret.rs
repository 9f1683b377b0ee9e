use serde::{Deserialize, Serialize};

use std::fmt;

/// A wrapper that redacts secret values in Debug and Display output.
///
/// Passwords and session tokens travel through this type so a stray
/// `tracing` field or `{:?}` never leaks them. The actual value is
/// accessible via `.expose()`.
#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Redacted(String);

impl Redacted {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// Access the underlying secret value.
    pub fn expose(&self) -> &str {
        &self.0
    }

    /// True when no value has been issued yet.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Show masked representation: last 4 chars visible.
    pub fn masked(&self) -> String {
        let count = self.0.chars().count();
        if count <= 4 {
            return "****".to_string();
        }
        let tail: String = self.0.chars().skip(count - 4).collect();
        format!("****{tail}")
    }
}

impl fmt::Debug for Redacted {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Redacted(\"***\")")
    }
}

impl fmt::Display for Redacted {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "***")
    }
}

impl From<String> for Redacted {
    fn from(value: String) -> Self {
        Self(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_redacted_debug_hides_value() {
        let secret = Redacted::new("tok-abc123xyz");
        let debug = format!("{:?}", secret);
        assert!(!debug.contains("abc123xyz"));
        assert!(debug.contains("***"));
    }

    #[test]
    fn test_redacted_display_hides_value() {
        let secret = Redacted::new("tok-abc123xyz");
        assert_eq!(secret.to_string(), "***");
    }

    #[test]
    fn test_redacted_serializes_plain_value() {
        let secret = Redacted::new("hunter2");
        assert_eq!(serde_json::to_string(&secret).unwrap(), "\"hunter2\"");
        let back: Redacted = serde_json::from_str("\"hunter2\"").unwrap();
        assert_eq!(back.expose(), "hunter2");
    }

    #[test]
    fn test_redacted_masked() {
        assert_eq!(Redacted::new("tok-abc123xyz").masked(), "****3xyz");
        assert_eq!(Redacted::new("ab").masked(), "****");
        assert_eq!(Redacted::new("pässwörd").masked(), "****wörd");
    }

    #[test]
    fn test_redacted_default_is_empty() {
        assert!(Redacted::default().is_empty());
        assert!(!Redacted::new("x").is_empty());
    }
}
