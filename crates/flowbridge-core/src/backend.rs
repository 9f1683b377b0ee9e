//! Backend port: the workflow engine and host platform HTTP surfaces.

use flowbridge_types::error::BackendError;
use flowbridge_types::listener::RegisteredListener;

/// Typed, stateless access to the workflow engine and the host's webhook
/// listener registry.
///
/// Implementations must bound every call with a timeout and must not retry;
/// callers own retry policy (next request, next reconciliation cycle).
/// Any non-success status surfaces as [`BackendError::Status`].
pub trait Backend: Send + Sync {
    /// Log in to the engine and return a session token.
    fn authenticate(
        &self,
        email: &str,
        password: &str,
    ) -> impl std::future::Future<Output = Result<String, BackendError>> + Send;

    /// Create an engine account and make it a member of the managed workspace.
    fn create_account(
        &self,
        admin_token: &str,
        email: &str,
        password: &str,
    ) -> impl std::future::Future<Output = Result<(), BackendError>> + Send;

    /// Check a token against the engine ("whoami").
    ///
    /// `Ok(false)` means the engine rejected the token; transport failures
    /// and other statuses are errors.
    fn validate_token(
        &self,
        token: &str,
    ) -> impl std::future::Future<Output = Result<bool, BackendError>> + Send;

    /// Paths of all workflow definitions in the managed workspace.
    fn list_workflow_paths(
        &self,
        token: &str,
    ) -> impl std::future::Future<Output = Result<Vec<String>, BackendError>> + Send;

    /// Full workflow definition as raw JSON.
    fn get_workflow_definition(
        &self,
        token: &str,
        path: &str,
    ) -> impl std::future::Future<Output = Result<serde_json::Value, BackendError>> + Send;

    /// All webhook listeners registered on the host.
    fn list_registered_listeners(
        &self,
    ) -> impl std::future::Future<Output = Result<Vec<RegisteredListener>, BackendError>> + Send;

    /// Register a listener that calls `uri` with `auth_token` as bearer.
    fn register_listener(
        &self,
        event: &str,
        filter: &serde_json::Value,
        uri: &str,
        auth_token: &str,
    ) -> impl std::future::Future<Output = Result<RegisteredListener, BackendError>> + Send;

    /// Replace the definition of an existing listener.
    fn update_listener(
        &self,
        id: i64,
        event: &str,
        uri: &str,
        filter: &serde_json::Value,
        auth_token: &str,
    ) -> impl std::future::Future<Output = Result<RegisteredListener, BackendError>> + Send;

    /// Remove a listener. `Ok(false)` when the host reports nothing was removed.
    fn delete_listener(
        &self,
        id: i64,
    ) -> impl std::future::Future<Output = Result<bool, BackendError>> + Send;
}
