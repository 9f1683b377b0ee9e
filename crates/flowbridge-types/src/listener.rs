//! Event listener types: desired specs derived from workflows and the
//! registrations the host platform actually holds.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

/// Desired event-to-webhook binding extracted from one workflow definition.
///
/// Recomputed every reconciliation cycle; the workflow source is the sole
/// source of truth, so these are never persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ListenerSpec {
    /// Invocation URI the host calls when one of `events` fires.
    pub uri: String,
    /// Canonical event names (leading escape stripped).
    pub events: BTreeSet<String>,
    /// Normalized static filter expression.
    pub filters: serde_json::Value,
}

/// A live webhook registration held by the host platform.
///
/// One record exists per (uri, event) pair.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisteredListener {
    pub id: i64,
    /// Owner-app tag: which application created this registration.
    #[serde(default)]
    pub app_id: Option<String>,
    pub uri: String,
    pub event: String,
    #[serde(default)]
    pub event_filter: serde_json::Value,
}

impl RegisteredListener {
    pub fn is_owned_by(&self, app_id: &str) -> bool {
        self.app_id.as_deref() == Some(app_id)
    }
}
