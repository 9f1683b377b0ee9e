//! In-memory `Backend` used by the core test suites.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Mutex;

use flowbridge_types::error::BackendError;
use flowbridge_types::listener::RegisteredListener;

use crate::backend::Backend;

#[derive(Default)]
pub(crate) struct MockState {
    pub accounts: HashMap<String, String>,
    pub valid_tokens: HashSet<String>,
    pub flows: BTreeMap<String, serde_json::Value>,
    pub broken_flows: HashSet<String>,
    pub listeners: Vec<RegisteredListener>,
    pub next_token: u64,
    pub next_listener_id: i64,
    pub authenticate_calls: usize,
    pub create_calls: usize,
    pub validate_calls: usize,
    pub register_calls: usize,
    pub update_calls: usize,
    pub delete_calls: usize,
    pub fail_listing: bool,
    pub fail_register_event: Option<String>,
    pub fail_authenticate: HashSet<String>,
}

impl MockState {
    pub fn mutation_calls(&self) -> usize {
        self.register_calls + self.update_calls + self.delete_calls
    }
}

pub(crate) struct MockBackend {
    pub owner: String,
    pub state: Mutex<MockState>,
}

fn status(status: u16, body: &str) -> BackendError {
    BackendError::Status {
        status,
        body: body.to_string(),
    }
}

impl MockBackend {
    pub fn new(owner: &str) -> Self {
        Self {
            owner: owner.to_string(),
            state: Mutex::new(MockState {
                next_listener_id: 1,
                ..MockState::default()
            }),
        }
    }

    pub fn with_account(self, email: &str, password: &str) -> Self {
        self.state
            .lock()
            .unwrap()
            .accounts
            .insert(email.to_string(), password.to_string());
        self
    }

    pub fn with_flow(self, path: &str, definition: serde_json::Value) -> Self {
        self.state
            .lock()
            .unwrap()
            .flows
            .insert(path.to_string(), definition);
        self
    }

    pub fn with_listener(self, app_id: &str, uri: &str, event: &str, filter: serde_json::Value) -> Self {
        {
            let mut state = self.state.lock().unwrap();
            let id = state.next_listener_id;
            state.next_listener_id += 1;
            state.listeners.push(RegisteredListener {
                id,
                app_id: Some(app_id.to_string()),
                uri: uri.to_string(),
                event: event.to_string(),
                event_filter: filter,
            });
        }
        self
    }

    pub fn invalidate_all_tokens(&self) {
        self.state.lock().unwrap().valid_tokens.clear();
    }

    pub fn snapshot(&self) -> std::sync::MutexGuard<'_, MockState> {
        self.state.lock().unwrap()
    }
}

impl Backend for MockBackend {
    async fn authenticate(&self, email: &str, password: &str) -> Result<String, BackendError> {
        tokio::task::yield_now().await;
        let mut state = self.state.lock().unwrap();
        state.authenticate_calls += 1;
        if state.fail_authenticate.contains(email) {
            return Err(BackendError::Transport("connection reset".to_string()));
        }
        match state.accounts.get(email) {
            Some(stored) if stored == password => {
                state.next_token += 1;
                let token = format!("tok-{}", state.next_token);
                state.valid_tokens.insert(token.clone());
                Ok(token)
            }
            _ => Err(status(401, "Invalid login")),
        }
    }

    async fn create_account(&self, admin_token: &str, email: &str, password: &str) -> Result<(), BackendError> {
        tokio::task::yield_now().await;
        let mut state = self.state.lock().unwrap();
        state.create_calls += 1;
        if !state.valid_tokens.contains(admin_token) {
            return Err(status(401, "admin token rejected"));
        }
        if state.accounts.contains_key(email) {
            return Err(status(400, "email already exists"));
        }
        state.accounts.insert(email.to_string(), password.to_string());
        Ok(())
    }

    async fn validate_token(&self, token: &str) -> Result<bool, BackendError> {
        tokio::task::yield_now().await;
        let mut state = self.state.lock().unwrap();
        state.validate_calls += 1;
        Ok(state.valid_tokens.contains(token))
    }

    async fn list_workflow_paths(&self, token: &str) -> Result<Vec<String>, BackendError> {
        let state = self.state.lock().unwrap();
        if !state.valid_tokens.contains(token) {
            return Err(status(401, "unauthorized"));
        }
        if state.fail_listing {
            return Err(BackendError::Transport("connection refused".to_string()));
        }
        Ok(state.flows.keys().cloned().collect())
    }

    async fn get_workflow_definition(&self, _token: &str, path: &str) -> Result<serde_json::Value, BackendError> {
        let state = self.state.lock().unwrap();
        if state.broken_flows.contains(path) {
            return Err(status(500, "internal error"));
        }
        state
            .flows
            .get(path)
            .cloned()
            .ok_or_else(|| status(404, "not found"))
    }

    async fn list_registered_listeners(&self) -> Result<Vec<RegisteredListener>, BackendError> {
        Ok(self.state.lock().unwrap().listeners.clone())
    }

    async fn register_listener(
        &self,
        event: &str,
        filter: &serde_json::Value,
        uri: &str,
        _auth_token: &str,
    ) -> Result<RegisteredListener, BackendError> {
        let mut state = self.state.lock().unwrap();
        state.register_calls += 1;
        if state.fail_register_event.as_deref() == Some(event) {
            return Err(status(500, "register failed"));
        }
        let id = state.next_listener_id;
        state.next_listener_id += 1;
        let listener = RegisteredListener {
            id,
            app_id: Some(self.owner.clone()),
            uri: uri.to_string(),
            event: event.to_string(),
            event_filter: filter.clone(),
        };
        state.listeners.push(listener.clone());
        Ok(listener)
    }

    async fn update_listener(
        &self,
        id: i64,
        event: &str,
        uri: &str,
        filter: &serde_json::Value,
        _auth_token: &str,
    ) -> Result<RegisteredListener, BackendError> {
        let mut state = self.state.lock().unwrap();
        state.update_calls += 1;
        let listener = state
            .listeners
            .iter_mut()
            .find(|l| l.id == id)
            .ok_or_else(|| status(404, "no such webhook"))?;
        listener.event = event.to_string();
        listener.uri = uri.to_string();
        listener.event_filter = filter.clone();
        Ok(listener.clone())
    }

    async fn delete_listener(&self, id: i64) -> Result<bool, BackendError> {
        let mut state = self.state.lock().unwrap();
        state.delete_calls += 1;
        let before = state.listeners.len();
        state.listeners.retain(|l| l.id != id);
        Ok(state.listeners.len() != before)
    }
}
