//! Callbacks the host platform invokes on the application.

use axum::Json;
use axum::extract::{Query, State};
use serde::Deserialize;
use serde_json::{Value, json};

use crate::http::error::AppError;
use crate::state::AppState;

/// GET /heartbeat - Liveness probe.
pub async fn heartbeat() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

/// POST /init - Installation callback. Nothing to prepare.
pub async fn init() -> Json<Value> {
    tracing::info!("init callback received");
    Json(json!({}))
}

#[derive(Debug, Deserialize)]
pub struct EnabledQuery {
    pub enabled: String,
}

/// Accepts the host's `1`/`0` as well as `true`/`false`.
pub fn parse_flag(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// PUT /enabled?enabled=<flag> - Enable or disable the application.
///
/// While disabled the reconciliation loop idles.
pub async fn set_enabled(
    State(state): State<AppState>,
    Query(query): Query<EnabledQuery>,
) -> Result<Json<Value>, AppError> {
    let enabled = parse_flag(&query.enabled)
        .ok_or_else(|| AppError::Validation(format!("invalid enabled flag '{}'", query.enabled)))?;

    state.switch.set(enabled);
    tracing::info!(enabled, "application enabled state changed");
    Ok(Json(json!({ "error": "" })))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_flag() {
        assert_eq!(parse_flag("1"), Some(true));
        assert_eq!(parse_flag("True"), Some(true));
        assert_eq!(parse_flag("0"), Some(false));
        assert_eq!(parse_flag(" false "), Some(false));
        assert_eq!(parse_flag("maybe"), None);
    }
}
