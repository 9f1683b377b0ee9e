//! Data directory layout.

use std::path::PathBuf;

use flowbridge_types::config::BridgeConfig;

/// Resolve the data directory from environment or platform defaults.
///
/// Priority:
/// 1. `FLOWBRIDGE_DATA_DIR` environment variable
/// 2. `~/.flowbridge`
pub fn resolve_data_dir() -> PathBuf {
    if let Ok(dir) = std::env::var("FLOWBRIDGE_DATA_DIR") {
        return PathBuf::from(dir);
    }

    if let Some(home) = dirs::home_dir() {
        return home.join(".flowbridge");
    }

    // Last resort: current directory
    PathBuf::from(".flowbridge")
}

/// Credential file location. Relative `credentials_file` values resolve
/// against the data directory.
pub fn credentials_path(data_dir: &std::path::Path, config: &BridgeConfig) -> PathBuf {
    data_dir.join(&config.credentials_file)
}
