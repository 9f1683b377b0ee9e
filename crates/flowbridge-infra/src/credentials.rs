//! JSON file persistence for the credential store.
//!
//! The file is a pretty-printed JSON object keyed by account email. Saves
//! write a sibling temp file and rename it over the target so a crash never
//! leaves a truncated store behind.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use flowbridge_core::credentials::CredentialPersistence;
use flowbridge_types::credential::CredentialRecord;
use flowbridge_types::error::CredentialError;

/// File-backed [`CredentialPersistence`].
#[derive(Debug, Clone)]
pub struct JsonFileCredentials {
    path: PathBuf,
}

impl JsonFileCredentials {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_else(|| "credentials.json".into());
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}

fn io_error(action: &str, path: &Path, err: std::io::Error) -> CredentialError {
    CredentialError::Io(format!("failed to {action} {}: {err}", path.display()))
}

impl CredentialPersistence for JsonFileCredentials {
    async fn load(&self) -> Result<HashMap<String, CredentialRecord>, CredentialError> {
        let content = match tokio::fs::read_to_string(&self.path).await {
            Ok(content) => content,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = %self.path.display(), "no credential file yet, starting empty");
                return Ok(HashMap::new());
            }
            Err(err) => return Err(io_error("read", &self.path, err)),
        };

        if content.trim().is_empty() {
            return Ok(HashMap::new());
        }

        serde_json::from_str(&content)
            .map_err(|e| CredentialError::Corrupt(format!("{}: {e}", self.path.display())))
    }

    async fn save(&self, records: &HashMap<String, CredentialRecord>) -> Result<(), CredentialError> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| io_error("create", parent, e))?;
        }

        let content = serde_json::to_string_pretty(records)
            .map_err(|e| CredentialError::Corrupt(e.to_string()))?;

        let temp = self.temp_path();
        tokio::fs::write(&temp, content)
            .await
            .map_err(|e| io_error("write", &temp, e))?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            tokio::fs::set_permissions(&temp, std::fs::Permissions::from_mode(0o600))
                .await
                .map_err(|e| io_error("restrict", &temp, e))?;
        }

        tokio::fs::rename(&temp, &self.path)
            .await
            .map_err(|e| io_error("replace", &self.path, e))?;

        tracing::debug!(path = %self.path.display(), accounts = records.len(), "credentials saved");
        Ok(())
    }
}
