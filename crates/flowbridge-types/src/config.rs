//! Configuration types for flowbridge.
//!
//! `BridgeConfig` represents the `config.toml` that points the bridge at the
//! workflow engine and the host platform and tunes the reconciliation loop.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::secret::Redacted;

/// Top-level bridge configuration. All fields have defaults.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BridgeConfig {
    /// Base URL of the workflow engine's HTTP API.
    pub engine_url: String,
    /// Engine URL as reachable from the host platform (used in webhook URIs).
    pub engine_public_url: String,
    /// Engine workspace whose flows are managed.
    pub workspace: String,
    /// Base URL of the host platform.
    pub host_url: String,
    /// This application's id on the host (also the listener owner tag).
    pub app_id: String,
    pub app_version: String,
    /// Shared secret used for host API calls.
    pub app_secret: Redacted,
    /// Domain appended to identities to form backend account emails.
    pub account_domain: String,
    /// Namespace prefix prepended to host usernames.
    pub identity_prefix: String,
    /// Pre-existing engine admin used to create accounts and own listeners.
    pub service_account_email: String,
    pub service_account_password: Redacted,
    /// Credential store file name, relative to the data directory.
    pub credentials_file: String,
    pub poll_interval_secs: u64,
    pub disabled_interval_secs: u64,
    pub error_cooldown_secs: u64,
    pub request_timeout_secs: u64,
    /// Upper bound for requests relayed through the pass-through proxy.
    pub proxy_timeout_secs: u64,
    pub listen_host: String,
    pub listen_port: u16,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            engine_url: "http://127.0.0.1:8000".to_string(),
            engine_public_url: "http://127.0.0.1:8000".to_string(),
            workspace: "nextcloud".to_string(),
            host_url: "http://localhost".to_string(),
            app_id: "flowbridge".to_string(),
            app_version: "1.0.0".to_string(),
            app_secret: Redacted::default(),
            account_domain: "flowbridge.local".to_string(),
            identity_prefix: "nc_".to_string(),
            service_account_email: "admin@windmill.dev".to_string(),
            service_account_password: Redacted::new("changeme"),
            credentials_file: "credentials.json".to_string(),
            poll_interval_secs: 30,
            disabled_interval_secs: 300,
            error_cooldown_secs: 60,
            request_timeout_secs: 15,
            proxy_timeout_secs: 300,
            listen_host: "127.0.0.1".to_string(),
            listen_port: 23000,
        }
    }
}

impl BridgeConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    pub fn disabled_interval(&self) -> Duration {
        Duration::from_secs(self.disabled_interval_secs)
    }

    pub fn error_cooldown(&self) -> Duration {
        Duration::from_secs(self.error_cooldown_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn proxy_timeout(&self) -> Duration {
        Duration::from_secs(self.proxy_timeout_secs)
    }

    /// Prefix under which flows of the managed workspace are invoked.
    pub fn invoke_base(&self) -> String {
        format!(
            "{}/api/w/{}/jobs/run/f",
            self.engine_public_url.trim_end_matches('/'),
            self.workspace
        )
    }
}
