//! The reconciliation control loop.
//!
//! One cycle: `Listing` (workflow definitions -> desired listener specs),
//! `Diffing` (fetch registrations, compute the plan), `Converging` (apply the
//! plan one mutation at a time), then `Sleeping` until the next tick. Cycles
//! never overlap. Errors and panics inside a cycle are caught at the loop
//! boundary and followed by a cooldown; only cancellation ends the loop.

use std::collections::HashSet;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use futures_util::FutureExt;
use serde::Serialize;
use tokio::sync::{Mutex, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use flowbridge_types::config::BridgeConfig;
use flowbridge_types::error::ReconcileError;
use flowbridge_types::listener::ListenerSpec;

use super::plan::{ListenerMutation, ReconcilePlan, plan};
use crate::backend::Backend;
use crate::credentials::CredentialPersistence;
use crate::listener::extract_listener_spec;
use crate::session::SessionBridge;

/// Where the loop currently is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ReconcilePhase {
    Idle,
    Listing,
    Diffing,
    Converging,
    Sleeping,
}

/// Administrative enabled/disabled state of the owning application.
///
/// Flipped by the host's enable callback; while disabled the loop skips
/// listing, diffing and converging entirely.
#[derive(Debug)]
pub struct AppSwitch(AtomicBool);

impl AppSwitch {
    pub fn new(enabled: bool) -> Self {
        Self(AtomicBool::new(enabled))
    }

    pub fn set(&self, enabled: bool) {
        self.0.store(enabled, Ordering::SeqCst);
    }

    pub fn is_enabled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

impl Default for AppSwitch {
    fn default() -> Self {
        Self::new(true)
    }
}

/// Loop settings derived from [`BridgeConfig`].
#[derive(Debug, Clone)]
pub struct ReconcileSettings {
    /// Owner tag of listeners this system manages.
    pub owner_app_id: String,
    /// Prefix for flow invocation URIs.
    pub invoke_base: String,
    pub poll_interval: Duration,
    pub disabled_interval: Duration,
    pub error_cooldown: Duration,
}

impl From<&BridgeConfig> for ReconcileSettings {
    fn from(config: &BridgeConfig) -> Self {
        Self {
            owner_app_id: config.app_id.clone(),
            invoke_base: config.invoke_base(),
            poll_interval: config.poll_interval(),
            disabled_interval: config.disabled_interval(),
            error_cooldown: config.error_cooldown(),
        }
    }
}

/// Outcome counts for one converge pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ConvergeReport {
    pub created: usize,
    pub updated: usize,
    pub deleted: usize,
    pub failed: usize,
}

impl ConvergeReport {
    pub fn mutations(&self) -> usize {
        self.created + self.updated + self.deleted
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum CycleOutcome {
    /// The application is disabled; nothing was listed or changed.
    Disabled,
    Converged(ConvergeReport),
}

/// Desired listener specs plus the flows whose definitions could not be read.
#[derive(Debug, Clone, Default)]
pub struct DesiredState {
    pub specs: Vec<ListenerSpec>,
    /// Invocation URIs of flows that failed to load; their registrations
    /// must not be treated as orphans.
    pub unreadable_uris: HashSet<String>,
    pub scanned: usize,
}

/// Webhook reconciliation engine.
pub struct ReconcileEngine<B, P> {
    backend: Arc<B>,
    sessions: Arc<SessionBridge<B, P>>,
    switch: Arc<AppSwitch>,
    settings: ReconcileSettings,
    phase: watch::Sender<ReconcilePhase>,
    cycle_lock: Mutex<()>,
}

impl<B, P> ReconcileEngine<B, P>
where
    B: Backend + 'static,
    P: CredentialPersistence + 'static,
{
    pub fn new(
        backend: Arc<B>,
        sessions: Arc<SessionBridge<B, P>>,
        switch: Arc<AppSwitch>,
        settings: ReconcileSettings,
    ) -> Self {
        let (phase, _) = watch::channel(ReconcilePhase::Idle);
        Self {
            backend,
            sessions,
            switch,
            settings,
            phase,
            cycle_lock: Mutex::new(()),
        }
    }

    pub fn settings(&self) -> &ReconcileSettings {
        &self.settings
    }

    pub fn phase(&self) -> ReconcilePhase {
        *self.phase.borrow()
    }

    /// Observe phase transitions.
    pub fn subscribe(&self) -> watch::Receiver<ReconcilePhase> {
        self.phase.subscribe()
    }

    fn set_phase(&self, phase: ReconcilePhase) {
        self.phase.send_replace(phase);
    }

    /// Run one full cycle now. Waits if another cycle is in flight.
    pub async fn run_cycle(&self) -> Result<CycleOutcome, ReconcileError> {
        let _flight = self.cycle_lock.lock().await;
        if !self.switch.is_enabled() {
            tracing::debug!("application disabled, skipping reconciliation");
            return Ok(CycleOutcome::Disabled);
        }

        let result = self.converge_once().await;
        self.set_phase(ReconcilePhase::Idle);
        result
    }

    /// Compute the plan the next cycle would apply, without applying it.
    ///
    /// Returns `None` while the application is disabled.
    pub async fn preview(&self) -> Result<Option<ReconcilePlan>, ReconcileError> {
        let _flight = self.cycle_lock.lock().await;
        if !self.switch.is_enabled() {
            return Ok(None);
        }
        let token = self.sessions.service_session().await?;
        let desired = self.collect_desired(token.expose()).await?;
        let actual = self.backend.list_registered_listeners().await?;
        Ok(Some(plan(
            &desired.specs,
            &actual,
            &self.settings.owner_app_id,
            &desired.unreadable_uris,
        )))
    }

    async fn converge_once(&self) -> Result<CycleOutcome, ReconcileError> {
        self.set_phase(ReconcilePhase::Listing);
        let token = self.sessions.service_session().await?;
        let desired = self.collect_desired(token.expose()).await?;

        self.set_phase(ReconcilePhase::Diffing);
        let actual = self.backend.list_registered_listeners().await?;
        let plan = plan(
            &desired.specs,
            &actual,
            &self.settings.owner_app_id,
            &desired.unreadable_uris,
        );
        tracing::debug!(
            flows = desired.scanned,
            listeners = desired.specs.len(),
            registered = actual.len(),
            creates = plan.creates(),
            updates = plan.updates(),
            deletes = plan.deletes(),
            "reconcile plan computed"
        );

        self.set_phase(ReconcilePhase::Converging);
        let report = self.apply(&plan, token.expose()).await;
        if report.mutations() > 0 || report.failed > 0 {
            tracing::info!(
                created = report.created,
                updated = report.updated,
                deleted = report.deleted,
                failed = report.failed,
                "listeners reconciled"
            );
        }
        Ok(CycleOutcome::Converged(report))
    }

    /// List the managed workspace and extract every declared listener.
    ///
    /// Failing to list is fatal for the cycle; failing to fetch a single
    /// definition only marks that flow unreadable.
    pub async fn collect_desired(&self, token: &str) -> Result<DesiredState, ReconcileError> {
        let paths = self.backend.list_workflow_paths(token).await?;
        let mut desired = DesiredState {
            scanned: paths.len(),
            ..DesiredState::default()
        };

        for path in paths {
            match self.backend.get_workflow_definition(token, &path).await {
                Ok(definition) => {
                    if let Some(spec) =
                        extract_listener_spec(&definition, &path, &self.settings.invoke_base)
                    {
                        desired.specs.push(spec);
                    }
                }
                Err(e) => {
                    tracing::warn!(%path, error = %e, "failed to fetch workflow definition");
                    desired
                        .unreadable_uris
                        .insert(format!("{}/{}", self.settings.invoke_base, path));
                }
            }
        }

        Ok(desired)
    }

    /// Apply a plan one mutation at a time. Failures are logged and counted;
    /// the rest of the plan still runs.
    pub async fn apply(&self, plan: &ReconcilePlan, auth_token: &str) -> ConvergeReport {
        let mut report = ConvergeReport::default();

        for mutation in &plan.mutations {
            let outcome = match mutation {
                ListenerMutation::Create { uri, event, filter } => self
                    .backend
                    .register_listener(event, filter, uri, auth_token)
                    .await
                    .map(|_| report.created += 1),
                ListenerMutation::Update {
                    id,
                    uri,
                    event,
                    filter,
                } => self
                    .backend
                    .update_listener(*id, event, uri, filter, auth_token)
                    .await
                    .map(|_| report.updated += 1),
                ListenerMutation::Delete { id, .. } => match self.backend.delete_listener(*id).await {
                    Ok(true) => {
                        report.deleted += 1;
                        Ok(())
                    }
                    Ok(false) => {
                        tracing::warn!(id, "host reported nothing deleted");
                        report.failed += 1;
                        continue;
                    }
                    Err(e) => Err(e),
                },
            };

            match outcome {
                Ok(()) => tracing::debug!(
                    uri = %mutation.uri(),
                    event = %mutation.event(),
                    ?mutation,
                    "listener mutation applied"
                ),
                Err(e) => {
                    report.failed += 1;
                    tracing::warn!(
                        uri = %mutation.uri(),
                        event = %mutation.event(),
                        error = %e,
                        "listener mutation failed, continuing"
                    );
                }
            }
        }

        report
    }

    /// Run cycles until `cancel` fires.
    pub async fn run(self: Arc<Self>, cancel: CancellationToken) {
        tracing::info!(
            interval_secs = self.settings.poll_interval.as_secs(),
            "reconciliation loop started"
        );

        loop {
            if cancel.is_cancelled() {
                break;
            }

            let pause = match AssertUnwindSafe(self.run_cycle()).catch_unwind().await {
                Ok(Ok(CycleOutcome::Converged(_))) => self.settings.poll_interval,
                Ok(Ok(CycleOutcome::Disabled)) => self.settings.disabled_interval,
                Ok(Err(e)) => {
                    tracing::error!(error = %e, "reconciliation cycle failed");
                    self.settings.error_cooldown
                }
                Err(panic) => {
                    let e = ReconcileError::Panicked(panic_message(panic.as_ref()));
                    tracing::error!(error = %e, "reconciliation cycle failed");
                    self.set_phase(ReconcilePhase::Idle);
                    self.settings.error_cooldown
                }
            };

            self.set_phase(ReconcilePhase::Sleeping);
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(pause) => {}
            }
            self.set_phase(ReconcilePhase::Idle);
        }

        self.set_phase(ReconcilePhase::Idle);
        tracing::info!("reconciliation loop stopped");
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

/// Handle to a spawned reconciliation loop.
pub struct ReconcileHandle {
    cancel: CancellationToken,
    join: JoinHandle<()>,
}

impl ReconcileHandle {
    /// Stop the loop and wait for it to exit.
    pub async fn stop(self) {
        self.cancel.cancel();
        if let Err(e) = self.join.await {
            tracing::error!(error = %e, "reconciliation task ended abnormally");
        }
    }
}

/// Start the loop as a background task.
pub fn spawn<B, P>(engine: Arc<ReconcileEngine<B, P>>) -> ReconcileHandle
where
    B: Backend + 'static,
    P: CredentialPersistence + 'static,
{
    let cancel = CancellationToken::new();
    let join = tokio::spawn(engine.run(cancel.clone()));
    ReconcileHandle { cancel, join }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::credentials::{CredentialStore, MemoryCredentials};
    use crate::mock::MockBackend;
    use crate::session::SessionSettings;
    use flowbridge_types::secret::Redacted;
    use serde_json::json;

    const OWNER: &str = "flowbridge";
    const ADMIN: &str = "admin@windmill.dev";
    const BASE: &str = "http://engine/api/w/nextcloud/jobs/run/f";

    type TestEngine = ReconcileEngine<MockBackend, MemoryCredentials>;

    fn listener_flow(events: &[&str], filters: serde_json::Value) -> serde_json::Value {
        json!({
            "value": {
                "modules": [{
                    "summary": "listen-to-event",
                    "value": { "input_transforms": {
                        "events": {"type": "static", "value": events},
                        "filters": {"type": "static", "value": filters}
                    }}
                }]
            }
        })
    }

    fn settings() -> ReconcileSettings {
        ReconcileSettings {
            owner_app_id: OWNER.to_string(),
            invoke_base: BASE.to_string(),
            poll_interval: Duration::from_millis(10),
            disabled_interval: Duration::from_millis(10),
            error_cooldown: Duration::from_millis(10),
        }
    }

    async fn engine(backend: MockBackend) -> (Arc<TestEngine>, Arc<MockBackend>, Arc<AppSwitch>) {
        let backend = Arc::new(backend.with_account(ADMIN, "changeme"));
        let store = Arc::new(CredentialStore::open(MemoryCredentials::new()).await.unwrap());
        let sessions = Arc::new(SessionBridge::new(
            backend.clone(),
            store,
            SessionSettings {
                account_domain: "flowbridge.local".to_string(),
                identity_prefix: "nc_".to_string(),
                service_account_email: ADMIN.to_string(),
                service_account_password: Redacted::new("changeme"),
                app_secret: Redacted::new("app-secret"),
            },
        ));
        let switch = Arc::new(AppSwitch::new(true));
        let engine = Arc::new(ReconcileEngine::new(
            backend.clone(),
            sessions,
            switch.clone(),
            settings(),
        ));
        (engine, backend, switch)
    }

    fn uri(path: &str) -> String {
        format!("{BASE}/{path}")
    }

    #[tokio::test]
    async fn test_cycle_registers_declared_listeners() {
        let (engine, backend, _) = engine(
            MockBackend::new(OWNER)
                .with_flow("f/orders", listener_flow(&["\\OrderCreated", "OrderPaid"], json!({"status": "new"})))
                .with_flow("f/plain", json!({"value": {"modules": []}})),
        )
        .await;

        let outcome = engine.run_cycle().await.unwrap();

        assert_eq!(
            outcome,
            CycleOutcome::Converged(ConvergeReport {
                created: 2,
                ..ConvergeReport::default()
            })
        );
        let state = backend.snapshot();
        assert_eq!(state.listeners.len(), 2);
        assert!(state.listeners.iter().all(|l| l.uri == uri("f/orders")));
        assert!(state.listeners.iter().any(|l| l.event == "OrderCreated"));
        assert_eq!(engine.phase(), ReconcilePhase::Idle);
    }

    #[tokio::test]
    async fn test_second_cycle_is_idempotent() {
        let (engine, backend, _) = engine(
            MockBackend::new(OWNER)
                .with_flow("f/a", listener_flow(&["E1"], json!(null)))
                .with_flow("f/b", listener_flow(&["E2"], json!({"n": 1}))),
        )
        .await;

        engine.run_cycle().await.unwrap();
        let before = backend.snapshot().mutation_calls();

        let outcome = engine.run_cycle().await.unwrap();

        assert_eq!(outcome, CycleOutcome::Converged(ConvergeReport::default()));
        assert_eq!(backend.snapshot().mutation_calls(), before);
    }

    #[tokio::test]
    async fn test_orphan_is_deleted_and_match_untouched() {
        let (engine, backend, _) = engine(
            MockBackend::new(OWNER)
                .with_flow("f/a", listener_flow(&["E1"], json!({})))
                .with_listener(OWNER, &uri("f/a"), "E1", json!(null))
                .with_listener(OWNER, &uri("f/b"), "E2", json!(null)),
        )
        .await;

        engine.run_cycle().await.unwrap();

        let state = backend.snapshot();
        assert_eq!(state.delete_calls, 1);
        assert_eq!(state.register_calls + state.update_calls, 0);
        assert_eq!(state.listeners.len(), 1);
        assert_eq!(state.listeners[0].id, 1);
    }

    #[tokio::test]
    async fn test_filter_change_updates_in_place() {
        let (engine, backend, _) = engine(
            MockBackend::new(OWNER)
                .with_flow("f/a", listener_flow(&["E1"], json!({"status": "new"})))
                .with_listener(OWNER, &uri("f/a"), "E1", json!({"status": "old"})),
        )
        .await;

        engine.run_cycle().await.unwrap();

        let state = backend.snapshot();
        assert_eq!(state.update_calls, 1);
        assert_eq!(state.listeners[0].event_filter, json!({"status": "new"}));
    }

    #[tokio::test]
    async fn test_one_failed_mutation_does_not_stop_the_rest() {
        let (engine, backend, _) = engine(
            MockBackend::new(OWNER)
                .with_flow("f/a", listener_flow(&["Bad", "Good"], json!([])))
                .with_listener(OWNER, &uri("f/gone"), "E9", json!([])),
        )
        .await;
        backend.snapshot().fail_register_event = Some("Bad".to_string());

        let outcome = engine.run_cycle().await.unwrap();

        assert_eq!(
            outcome,
            CycleOutcome::Converged(ConvergeReport {
                created: 1,
                updated: 0,
                deleted: 1,
                failed: 1,
            })
        );
    }

    #[tokio::test]
    async fn test_unreadable_flow_keeps_its_listeners() {
        let (engine, backend, _) = engine(
            MockBackend::new(OWNER)
                .with_flow("f/a", listener_flow(&["E1"], json!([])))
                .with_listener(OWNER, &uri("f/a"), "E1", json!([])),
        )
        .await;
        backend.snapshot().broken_flows.insert("f/a".to_string());

        let outcome = engine.run_cycle().await.unwrap();

        assert_eq!(outcome, CycleOutcome::Converged(ConvergeReport::default()));
        assert_eq!(backend.snapshot().listeners.len(), 1);
    }

    #[tokio::test]
    async fn test_disabled_app_skips_everything() {
        let (engine, backend, switch) = engine(
            MockBackend::new(OWNER).with_flow("f/a", listener_flow(&["E1"], json!([]))),
        )
        .await;
        switch.set(false);

        assert_eq!(engine.run_cycle().await.unwrap(), CycleOutcome::Disabled);
        assert!(engine.preview().await.unwrap().is_none());
        let state = backend.snapshot();
        assert_eq!(state.authenticate_calls, 0);
        assert!(state.listeners.is_empty());
    }

    #[tokio::test]
    async fn test_listing_failure_aborts_cycle() {
        let (engine, backend, _) = engine(MockBackend::new(OWNER)).await;
        backend.snapshot().fail_listing = true;

        let result = engine.run_cycle().await;

        assert!(matches!(result, Err(ReconcileError::Backend(_))));
        assert_eq!(engine.phase(), ReconcilePhase::Idle);
    }

    #[tokio::test]
    async fn test_preview_does_not_mutate() {
        let (engine, backend, _) = engine(
            MockBackend::new(OWNER).with_flow("f/a", listener_flow(&["E1"], json!([]))),
        )
        .await;

        let plan = engine.preview().await.unwrap().unwrap();

        assert_eq!(plan.creates(), 1);
        assert_eq!(backend.snapshot().mutation_calls(), 0);
    }

    #[tokio::test]
    async fn test_loop_survives_errors_and_stops_on_cancel() {
        let (engine, backend, _) = engine(
            MockBackend::new(OWNER).with_flow("f/a", listener_flow(&["E1"], json!([]))),
        )
        .await;
        backend.snapshot().fail_listing = true;

        let handle = spawn(engine.clone());
        tokio::time::sleep(Duration::from_millis(50)).await;
        backend.snapshot().fail_listing = false;
        tokio::time::sleep(Duration::from_millis(100)).await;
        handle.stop().await;

        let state = backend.snapshot();
        assert_eq!(state.register_calls, 1);
        assert_eq!(state.listeners.len(), 1);
        assert_eq!(engine.phase(), ReconcilePhase::Idle);
    }

    #[tokio::test]
    async fn test_phases_are_published() {
        let (engine, _backend, _) = engine(MockBackend::new(OWNER)).await;
        let mut phases = engine.subscribe();

        let handle = spawn(engine.clone());
        phases
            .wait_for(|p| *p == ReconcilePhase::Sleeping)
            .await
            .unwrap();
        handle.stop().await;

        assert_eq!(*phases.borrow(), ReconcilePhase::Idle);
    }

    #[test]
    fn test_panic_message() {
        let payload: Box<dyn std::any::Any + Send> = Box::new("boom");
        assert_eq!(panic_message(payload.as_ref()), "boom");
        let payload: Box<dyn std::any::Any + Send> = Box::new(String::from("bang"));
        assert_eq!(panic_message(payload.as_ref()), "bang");
        let payload: Box<dyn std::any::Any + Send> = Box::new(42u8);
        assert_eq!(panic_message(payload.as_ref()), "unknown panic");
    }

    #[test]
    fn test_app_switch() {
        let switch = AppSwitch::default();
        assert!(switch.is_enabled());
        switch.set(false);
        assert!(!switch.is_enabled());
    }
}
