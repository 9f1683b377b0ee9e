//! Credential store: backend account email -> {password, token}.
//!
//! The in-memory map is the merged view of everything on disk. Every mutation
//! persists the full map through the injected [`CredentialPersistence`] first
//! and only commits in memory once the write succeeded, so a reader never sees
//! a token that could not be reconstructed after a crash.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use tokio::sync::Mutex;

use flowbridge_types::credential::CredentialRecord;
use flowbridge_types::error::CredentialError;

/// Persistence strategy behind the credential store.
pub trait CredentialPersistence: Send + Sync {
    /// Read every stored record. A missing backing file is an empty map.
    fn load(
        &self,
    ) -> impl std::future::Future<Output = Result<HashMap<String, CredentialRecord>, CredentialError>>
    + Send;

    /// Replace the stored records with `records`.
    fn save(
        &self,
        records: &HashMap<String, CredentialRecord>,
    ) -> impl std::future::Future<Output = Result<(), CredentialError>> + Send;
}

/// File-backed (or in-memory) credential cache shared by all request handlers
/// and the reconciliation loop.
pub struct CredentialStore<P> {
    persistence: P,
    records: Mutex<HashMap<String, CredentialRecord>>,
}

impl<P: CredentialPersistence> CredentialStore<P> {
    /// Load the store once at startup.
    pub async fn open(persistence: P) -> Result<Self, CredentialError> {
        let records = persistence.load().await?;
        tracing::debug!(accounts = records.len(), "credential store loaded");
        Ok(Self {
            persistence,
            records: Mutex::new(records),
        })
    }

    pub async fn get(&self, email: &str) -> Option<CredentialRecord> {
        self.records.lock().await.get(email).cloned()
    }

    /// Stored account emails, sorted.
    pub async fn emails(&self) -> Vec<String> {
        let mut emails: Vec<String> = self.records.lock().await.keys().cloned().collect();
        emails.sort();
        emails
    }

    pub async fn len(&self) -> usize {
        self.records.lock().await.len()
    }

    /// Insert or replace one record and rewrite the backing store.
    ///
    /// Entries not touched by this call are written back unchanged. On a
    /// persistence failure the in-memory view is left as it was.
    pub async fn upsert(&self, email: &str, record: CredentialRecord) -> Result<(), CredentialError> {
        let mut records = self.records.lock().await;
        let mut next = records.clone();
        next.insert(email.to_string(), record);
        self.persistence.save(&next).await?;
        *records = next;
        tracing::debug!(%email, "credential record persisted");
        Ok(())
    }
}

/// Process-local persistence, used for tests and dry runs.
#[derive(Default)]
pub struct MemoryCredentials {
    saved: std::sync::Mutex<HashMap<String, CredentialRecord>>,
    saves: AtomicUsize,
    fail_saves: AtomicBool,
}

impl MemoryCredentials {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_records(records: HashMap<String, CredentialRecord>) -> Self {
        Self {
            saved: std::sync::Mutex::new(records),
            ..Self::default()
        }
    }

    /// Make every subsequent `save` fail (simulates a read-only disk).
    pub fn set_fail_saves(&self, fail: bool) {
        self.fail_saves.store(fail, Ordering::SeqCst);
    }

    /// Number of successful saves so far.
    pub fn save_count(&self) -> usize {
        self.saves.load(Ordering::SeqCst)
    }

    /// Snapshot of what is currently "on disk".
    pub fn snapshot(&self) -> HashMap<String, CredentialRecord> {
        self.saved.lock().map(|m| m.clone()).unwrap_or_default()
    }
}

impl CredentialPersistence for MemoryCredentials {
    async fn load(&self) -> Result<HashMap<String, CredentialRecord>, CredentialError> {
        Ok(self.snapshot())
    }

    async fn save(&self, records: &HashMap<String, CredentialRecord>) -> Result<(), CredentialError> {
        if self.fail_saves.load(Ordering::SeqCst) {
            return Err(CredentialError::Io("memory store is read-only".to_string()));
        }
        let mut saved = self
            .saved
            .lock()
            .map_err(|_| CredentialError::Io("memory store poisoned".to_string()))?;
        *saved = records.clone();
        self.saves.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

impl<T: CredentialPersistence> CredentialPersistence for std::sync::Arc<T> {
    fn load(
        &self,
    ) -> impl std::future::Future<Output = Result<HashMap<String, CredentialRecord>, CredentialError>>
    + Send {
        T::load(self)
    }

    fn save(
        &self,
        records: &HashMap<String, CredentialRecord>,
    ) -> impl std::future::Future<Output = Result<(), CredentialError>> + Send {
        T::save(self, records)
    }
}
