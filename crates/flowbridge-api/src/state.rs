//! Application state wiring all services together.
//!
//! The session bridge and the reconciliation engine are generic over their
//! ports; AppState pins them to the concrete infra implementations.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use flowbridge_core::credentials::CredentialStore;
use flowbridge_core::reconcile::{AppSwitch, ReconcileEngine, ReconcileSettings};
use flowbridge_core::session::{SessionBridge, SessionSettings};
use flowbridge_infra::backend::HttpBackend;
use flowbridge_infra::config::{config_path, load_config_with_env};
use flowbridge_infra::credentials::JsonFileCredentials;
use flowbridge_infra::filesystem::{credentials_path, resolve_data_dir};
use flowbridge_types::config::BridgeConfig;

/// Concrete type aliases for the service generics pinned to infra implementations.
pub type ConcreteSessionBridge = SessionBridge<HttpBackend, JsonFileCredentials>;

pub type ConcreteReconcileEngine = ReconcileEngine<HttpBackend, JsonFileCredentials>;

/// Shared application state.
///
/// Used by both CLI commands and HTTP handlers.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<BridgeConfig>,
    pub backend: Arc<HttpBackend>,
    pub sessions: Arc<ConcreteSessionBridge>,
    pub reconciler: Arc<ConcreteReconcileEngine>,
    pub switch: Arc<AppSwitch>,
    pub data_dir: PathBuf,
}

impl AppState {
    /// Resolve the data directory, load configuration and wire services.
    pub async fn init(data_dir: Option<PathBuf>, config_file: Option<&Path>) -> anyhow::Result<Self> {
        let data_dir = data_dir.unwrap_or_else(resolve_data_dir);
        tokio::fs::create_dir_all(&data_dir).await?;

        let config = load_config_with_env(&config_path(&data_dir, config_file)).await;
        Self::from_config(config, data_dir).await
    }

    /// Wire services from an already loaded configuration.
    pub async fn from_config(config: BridgeConfig, data_dir: PathBuf) -> anyhow::Result<Self> {
        let backend = Arc::new(HttpBackend::new(&config)?);

        let store_path = credentials_path(&data_dir, &config);
        let store = CredentialStore::open(JsonFileCredentials::new(&store_path)).await?;
        tracing::debug!(path = %store_path.display(), accounts = store.len().await, "credential store loaded");

        let sessions = Arc::new(SessionBridge::new(
            backend.clone(),
            Arc::new(store),
            SessionSettings::from(&config),
        ));

        let switch = Arc::new(AppSwitch::default());
        let reconciler = Arc::new(ReconcileEngine::new(
            backend.clone(),
            sessions.clone(),
            switch.clone(),
            ReconcileSettings::from(&config),
        ));

        Ok(Self {
            config: Arc::new(config),
            backend,
            sessions,
            reconciler,
            switch,
            data_dir,
        })
    }
}
