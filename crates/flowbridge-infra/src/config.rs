//! Configuration loader for flowbridge.
//!
//! Reads `config.toml` from the data directory (`~/.flowbridge/` in
//! production) or an explicit path and deserializes it into [`BridgeConfig`].
//! Falls back to defaults when the file is missing or malformed, then applies
//! deployment environment overrides.

use std::path::{Path, PathBuf};

use flowbridge_types::config::BridgeConfig;
use flowbridge_types::secret::Redacted;

/// Default config file name inside the data directory.
pub const CONFIG_FILE: &str = "config.toml";

/// Path of the config file: the explicit one if given, else `{data_dir}/config.toml`.
pub fn config_path(data_dir: &Path, explicit: Option<&Path>) -> PathBuf {
    explicit
        .map(Path::to_path_buf)
        .unwrap_or_else(|| data_dir.join(CONFIG_FILE))
}

/// Load configuration from `path`.
///
/// - If the file does not exist, returns [`BridgeConfig::default()`].
/// - If the file exists but fails to parse, logs a warning and returns the default.
/// - If the file exists and parses successfully, returns the parsed config.
pub async fn load_config(path: &Path) -> BridgeConfig {
    let content = match tokio::fs::read_to_string(path).await {
        Ok(content) => content,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
            tracing::debug!("No config file at {}, using defaults", path.display());
            return BridgeConfig::default();
        }
        Err(err) => {
            tracing::warn!("Failed to read {}: {err}, using defaults", path.display());
            return BridgeConfig::default();
        }
    };

    match toml::from_str::<BridgeConfig>(&content) {
        Ok(config) => config,
        Err(err) => {
            tracing::warn!("Failed to parse {}: {err}, using defaults", path.display());
            BridgeConfig::default()
        }
    }
}

/// Apply deployment overrides (`APP_ID`, `APP_SECRET`, `APP_VERSION`,
/// `NEXTCLOUD_URL`, `ENGINE_URL`) using `lookup` to read variables.
///
/// Empty values are ignored.
pub fn apply_env_overrides(config: &mut BridgeConfig, lookup: impl Fn(&str) -> Option<String>) {
    let get = |key: &str| lookup(key).filter(|v| !v.is_empty());

    if let Some(app_id) = get("APP_ID") {
        config.app_id = app_id;
    }
    if let Some(secret) = get("APP_SECRET") {
        config.app_secret = Redacted::new(secret);
    }
    if let Some(version) = get("APP_VERSION") {
        config.app_version = version;
    }
    if let Some(host_url) = get("NEXTCLOUD_URL") {
        config.host_url = host_url;
    }
    if let Some(engine_url) = get("ENGINE_URL") {
        config.engine_url = engine_url;
    }
}

/// Load from `path` and apply overrides from the process environment.
pub async fn load_config_with_env(path: &Path) -> BridgeConfig {
    let mut config = load_config(path).await;
    apply_env_overrides(&mut config, |key| std::env::var(key).ok());
    config
}
