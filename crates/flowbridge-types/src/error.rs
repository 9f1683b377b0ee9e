use thiserror::Error;

/// Errors from calls to the workflow engine or the host platform.
#[derive(Debug, Clone, Error)]
pub enum BackendError {
    #[error("backend returned HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("backend unreachable: {0}")]
    Transport(String),

    #[error("unexpected backend response: {0}")]
    Decode(String),
}

impl BackendError {
    /// True for 401/403 responses (bad credentials or rejected token).
    pub fn is_unauthorized(&self) -> bool {
        matches!(self, BackendError::Status { status: 401 | 403, .. })
    }
}

/// Errors from the credential store and its persistence.
#[derive(Debug, Clone, Error)]
pub enum CredentialError {
    #[error("credential store io error: {0}")]
    Io(String),

    #[error("credential store is corrupt: {0}")]
    Corrupt(String),
}

/// Errors while resolving a caller to a backend session.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error(transparent)]
    Backend(#[from] BackendError),

    #[error("failed to persist credentials: {0}")]
    Persistence(#[from] CredentialError),

    #[error("backend issued an empty token for '{0}'")]
    EmptyToken(String),
}

/// Errors that abort a whole reconciliation cycle.
#[derive(Debug, Error)]
pub enum ReconcileError {
    #[error("listing failed: {0}")]
    Backend(#[from] BackendError),

    #[error("service session unavailable: {0}")]
    Session(#[from] SessionError),

    #[error("reconciliation cycle panicked: {0}")]
    Panicked(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backend_status_display() {
        let err = BackendError::Status {
            status: 500,
            body: "boom".to_string(),
        };
        assert_eq!(err.to_string(), "backend returned HTTP 500: boom");
    }

    #[test]
    fn test_backend_is_unauthorized() {
        let unauthorized = BackendError::Status {
            status: 401,
            body: String::new(),
        };
        let forbidden = BackendError::Status {
            status: 403,
            body: String::new(),
        };
        let server = BackendError::Status {
            status: 502,
            body: String::new(),
        };
        assert!(unauthorized.is_unauthorized());
        assert!(forbidden.is_unauthorized());
        assert!(!server.is_unauthorized());
        assert!(!BackendError::Transport("timeout".into()).is_unauthorized());
    }

    #[test]
    fn test_session_error_wraps_backend() {
        let err: SessionError = BackendError::Transport("refused".into()).into();
        assert_eq!(err.to_string(), "backend unreachable: refused");
    }
}
