//! HttpBackend -- concrete [`Backend`] over the workflow engine API and the
//! host platform's webhook listener OCS API.
//!
//! Engine calls authenticate with the `token` cookie. Host calls carry the
//! application headers; the app secret is wrapped in [`SecretString`] and only
//! exposed while building the `AUTHORIZATION-APP-API` header.
//!
//! Every call is bounded by the client timeout and never retried here.

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use reqwest::header::{ACCEPT, COOKIE};
use reqwest::{Method, RequestBuilder, Response, StatusCode};
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::{Value, json};

use flowbridge_core::backend::Backend;
use flowbridge_core::session::TOKEN_COOKIE;
use flowbridge_types::config::BridgeConfig;
use flowbridge_types::error::BackendError;
use flowbridge_types::listener::RegisteredListener;

/// Host route of the webhook listener registry.
const WEBHOOKS_PATH: &str = "/ocs/v2.php/apps/webhook_listeners/api/v1/webhooks";

/// OCS response envelope: `{"ocs": {"meta": ..., "data": ...}}`.
#[derive(Debug, Deserialize)]
struct OcsEnvelope<T> {
    ocs: OcsBody<T>,
}

#[derive(Debug, Deserialize)]
struct OcsBody<T> {
    data: T,
}

/// Backend client for the workflow engine and the host platform.
pub struct HttpBackend {
    http: reqwest::Client,
    proxy: reqwest::Client,
    engine_url: String,
    workspace: String,
    host_url: String,
    app_id: String,
    app_version: String,
    app_secret: SecretString,
}

impl HttpBackend {
    /// Build the clients from configuration.
    ///
    /// Bridge-initiated calls use `request_timeout`. Relayed requests get a
    /// separate client bounded by `proxy_timeout` that never follows
    /// redirects, so 3xx responses reach the browser untouched.
    pub fn new(config: &BridgeConfig) -> Result<Self, BackendError> {
        let http = reqwest::Client::builder()
            .user_agent(concat!("flowbridge/", env!("CARGO_PKG_VERSION")))
            .timeout(config.request_timeout())
            .build()
            .map_err(|e| BackendError::Transport(e.to_string()))?;
        let proxy = reqwest::Client::builder()
            .redirect(reqwest::redirect::Policy::none())
            .timeout(config.proxy_timeout())
            .build()
            .map_err(|e| BackendError::Transport(e.to_string()))?;

        Ok(Self {
            http,
            proxy,
            engine_url: config.engine_url.trim_end_matches('/').to_string(),
            workspace: config.workspace.clone(),
            host_url: config.host_url.trim_end_matches('/').to_string(),
            app_id: config.app_id.clone(),
            app_version: config.app_version.clone(),
            app_secret: SecretString::from(config.app_secret.expose().to_string()),
        })
    }

    /// Client for the pass-through proxy.
    pub fn proxy_client(&self) -> &reqwest::Client {
        &self.proxy
    }

    /// Engine base URL without trailing slash.
    pub fn engine_url(&self) -> &str {
        &self.engine_url
    }

    fn engine(&self, method: Method, path: &str) -> RequestBuilder {
        self.http
            .request(method, format!("{}{}", self.engine_url, path))
    }

    fn engine_authed(&self, method: Method, path: &str, token: &str) -> RequestBuilder {
        self.engine(method, path)
            .header(COOKIE, format!("{TOKEN_COOKIE}={token}"))
    }

    fn workspace_path(&self, rest: &str) -> String {
        format!("/api/w/{}/{}", self.workspace, rest)
    }

    fn host(&self, method: Method, suffix: &str) -> RequestBuilder {
        let auth = BASE64.encode(format!(":{}", self.app_secret.expose_secret()));
        self.http
            .request(method, format!("{}{}{}", self.host_url, WEBHOOKS_PATH, suffix))
            .header("EX-APP-ID", &self.app_id)
            .header("EX-APP-VERSION", &self.app_version)
            .header("AUTHORIZATION-APP-API", auth)
            .header("OCS-APIRequest", "true")
            .header(ACCEPT, "application/json")
    }

    fn listener_body(event: &str, filter: &Value, uri: &str, auth_token: &str) -> Value {
        json!({
            "httpMethod": "POST",
            "uri": uri,
            "event": event,
            "eventFilter": filter,
            "authMethod": "header",
            "authData": { "Authorization": format!("Bearer {auth_token}") },
        })
    }
}

/// Send a request and turn every non-success status into [`BackendError::Status`].
async fn send(request: RequestBuilder) -> Result<Response, BackendError> {
    let response = request
        .send()
        .await
        .map_err(|e| BackendError::Transport(e.to_string()))?;

    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    Err(BackendError::Status {
        status: status.as_u16(),
        body,
    })
}

async fn decode<T: DeserializeOwned>(response: Response) -> Result<T, BackendError> {
    let bytes = response
        .bytes()
        .await
        .map_err(|e| BackendError::Transport(e.to_string()))?;
    serde_json::from_slice(&bytes).map_err(|e| BackendError::Decode(e.to_string()))
}

async fn decode_ocs<T: DeserializeOwned>(response: Response) -> Result<T, BackendError> {
    decode::<OcsEnvelope<T>>(response).await.map(|envelope| envelope.ocs.data)
}

impl Backend for HttpBackend {
    async fn authenticate(&self, email: &str, password: &str) -> Result<String, BackendError> {
        let response = send(
            self.engine(Method::POST, "/api/auth/login")
                .json(&json!({ "email": email, "password": password })),
        )
        .await?;

        response
            .text()
            .await
            .map(|token| token.trim().to_string())
            .map_err(|e| BackendError::Transport(e.to_string()))
    }

    async fn create_account(&self, admin_token: &str, email: &str, password: &str) -> Result<(), BackendError> {
        let name = email.split('@').next().unwrap_or(email);
        send(
            self.engine_authed(Method::POST, "/api/users/create", admin_token)
                .json(&json!({
                    "email": email,
                    "password": password,
                    "super_admin": false,
                    "name": name,
                })),
        )
        .await?;

        send(
            self.engine_authed(
                Method::POST,
                &self.workspace_path("workspaces/add_user"),
                admin_token,
            )
            .json(&json!({ "email": email, "is_admin": false, "operator": false })),
        )
        .await?;

        tracing::debug!(%email, workspace = %self.workspace, "account added to workspace");
        Ok(())
    }

    async fn validate_token(&self, token: &str) -> Result<bool, BackendError> {
        let response = self
            .engine_authed(Method::GET, "/api/users/whoami", token)
            .send()
            .await
            .map_err(|e| BackendError::Transport(e.to_string()))?;

        match response.status() {
            status if status.is_success() => Ok(true),
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Ok(false),
            status => Err(BackendError::Status {
                status: status.as_u16(),
                body: response.text().await.unwrap_or_default(),
            }),
        }
    }

    async fn list_workflow_paths(&self, token: &str) -> Result<Vec<String>, BackendError> {
        let response = send(self.engine_authed(
            Method::GET,
            &self.workspace_path("flows/list_paths"),
            token,
        ))
        .await?;
        decode(response).await
    }

    async fn get_workflow_definition(&self, token: &str, path: &str) -> Result<Value, BackendError> {
        let response = send(self.engine_authed(
            Method::GET,
            &self.workspace_path(&format!("flows/get/{path}")),
            token,
        ))
        .await?;
        decode(response).await
    }

    async fn list_registered_listeners(&self) -> Result<Vec<RegisteredListener>, BackendError> {
        let response = send(self.host(Method::GET, "")).await?;
        decode_ocs(response).await
    }

    async fn register_listener(
        &self,
        event: &str,
        filter: &Value,
        uri: &str,
        auth_token: &str,
    ) -> Result<RegisteredListener, BackendError> {
        let response = send(
            self.host(Method::POST, "")
                .json(&Self::listener_body(event, filter, uri, auth_token)),
        )
        .await?;
        let listener: RegisteredListener = decode_ocs(response).await?;
        tracing::info!(id = listener.id, %uri, %event, "registered listener");
        Ok(listener)
    }

    async fn update_listener(
        &self,
        id: i64,
        event: &str,
        uri: &str,
        filter: &Value,
        auth_token: &str,
    ) -> Result<RegisteredListener, BackendError> {
        let response = send(
            self.host(Method::POST, &format!("/{id}"))
                .json(&Self::listener_body(event, filter, uri, auth_token)),
        )
        .await?;
        let listener: RegisteredListener = decode_ocs(response).await?;
        tracing::info!(id, %uri, %event, "updated listener");
        Ok(listener)
    }

    async fn delete_listener(&self, id: i64) -> Result<bool, BackendError> {
        let response = send(self.host(Method::DELETE, &format!("/{id}"))).await?;
        let deleted: bool = decode_ocs(response).await?;
        if deleted {
            tracing::info!(id, "deleted listener");
        }
        Ok(deleted)
    }
}
