//! Pass-through proxy to the workflow engine.
//!
//! Each request is resolved to an engine session first; when one is found
//! the `token` cookie is replaced with it. Method, path, query, headers (minus
//! `host`) and body are forwarded as-is; status, headers (minus hop-by-hop
//! ones) and body are relayed back. Redirects are relayed, not followed.
//! Every relayed response is made embeddable in the host's iframe.

use axum::body::{Body, Bytes};
use axum::extract::State;
use axum::http::header::{
    ACCESS_CONTROL_ALLOW_ORIGIN, CONNECTION, CONTENT_LENGTH, CONTENT_SECURITY_POLICY, COOKIE, HOST,
    TRANSFER_ENCODING,
};
use axum::http::{HeaderMap, HeaderName, HeaderValue, Method, Uri};
use axum::response::Response;

use flowbridge_core::session::{IDENTITY_HEADER, TOKEN_COOKIE};
use flowbridge_types::secret::Redacted;

use crate::http::error::AppError;
use crate::state::AppState;

/// Not among `http`'s predefined header constants.
const X_PERMITTED_CROSS_DOMAIN_POLICIES: HeaderName =
    HeaderName::from_static("x-permitted-cross-domain-policies");

/// Headers set on every relayed response so the engine UI renders inside
/// the host's iframe.
const EMBED_HEADERS: [(HeaderName, &str); 3] = [
    (
        CONTENT_SECURITY_POLICY,
        "default-src * 'unsafe-inline' 'unsafe-eval' data: blob:;",
    ),
    (ACCESS_CONTROL_ALLOW_ORIGIN, "*"),
    (X_PERMITTED_CROSS_DOMAIN_POLICIES, "all"),
];

/// ANY /api/{*path} - Engine API calls. Never provisions new accounts.
pub async fn proxy_api(
    State(state): State<AppState>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Response, AppError> {
    forward(&state, method, &uri, headers, body, false).await
}

/// ANY other path - Engine UI. First visit provisions the caller's account.
pub async fn proxy_ui(
    State(state): State<AppState>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Response, AppError> {
    forward(&state, method, &uri, headers, body, true).await
}

async fn forward(
    state: &AppState,
    method: Method,
    uri: &Uri,
    headers: HeaderMap,
    body: Bytes,
    allow_missing_creation: bool,
) -> Result<Response, AppError> {
    let identity = headers.get(IDENTITY_HEADER).and_then(|v| v.to_str().ok());
    let presented = cookie_value(&headers, TOKEN_COOKIE);

    let token = state
        .sessions
        .resolve_request(identity, presented.as_deref(), allow_missing_creation)
        .await?;

    let outbound = outbound_headers(&headers, token.as_ref())?;
    let path_and_query = uri.path_and_query().map(|pq| pq.as_str()).unwrap_or("/");
    let target = format!("{}{}", state.backend.engine_url(), path_and_query);

    tracing::debug!(%method, %target, session = token.is_some(), "forwarding to engine");

    let upstream = state
        .backend
        .proxy_client()
        .request(method, &target)
        .headers(outbound)
        .body(body)
        .send()
        .await
        .map_err(|e| AppError::Upstream(e.to_string()))?;

    let status = upstream.status();
    let mut relayed = upstream.headers().clone();
    for name in [TRANSFER_ENCODING, CONNECTION, CONTENT_LENGTH] {
        relayed.remove(name);
    }
    allow_embedding(&mut relayed);
    let bytes = upstream
        .bytes()
        .await
        .map_err(|e| AppError::Upstream(e.to_string()))?;

    let mut response = Response::new(Body::from(bytes));
    *response.status_mut() = status;
    *response.headers_mut() = relayed;
    Ok(response)
}

fn allow_embedding(headers: &mut HeaderMap) {
    for (name, value) in EMBED_HEADERS {
        headers.insert(name, HeaderValue::from_static(value));
    }
}

/// Value of cookie `name` across every `Cookie` header.
pub fn cookie_value(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get_all(COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(key, _)| *key == name)
        .map(|(_, value)| value.to_string())
}

/// Cookie header with `token` set to `token`, other cookies preserved.
pub fn with_token_cookie(headers: &HeaderMap, token: &str) -> String {
    let mut cookies: Vec<String> = headers
        .get_all(COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(';'))
        .map(str::trim)
        .filter(|pair| !pair.is_empty())
        .filter(|pair| pair.split_once('=').map(|(k, _)| k) != Some(TOKEN_COOKIE))
        .map(str::to_string)
        .collect();
    cookies.push(format!("{TOKEN_COOKIE}={token}"));
    cookies.join("; ")
}

fn outbound_headers(headers: &HeaderMap, token: Option<&Redacted>) -> Result<HeaderMap, AppError> {
    let mut outbound = headers.clone();
    outbound.remove(HOST);
    outbound.remove(CONTENT_LENGTH);

    if let Some(token) = token {
        let cookie = HeaderValue::from_str(&with_token_cookie(headers, token.expose()))
            .map_err(|e| AppError::Validation(format!("unusable cookie header: {e}")))?;
        outbound.remove(COOKIE);
        outbound.insert(COOKIE, cookie);
    }

    Ok(outbound)
}
