//! Session bridge: host caller identity -> workflow engine session token.
//!
//! Resolution order:
//! 1. A token the caller already presents is trusted only after a live
//!    "whoami" check (engine restarts invalidate tokens).
//! 2. Otherwise the identity's account email is looked up in the credential
//!    store. Unknown identities get an engine account on the fly (when the
//!    caller allows it); known ones reuse the cached token if it still
//!    validates, or re-authenticate with the stored password.
//!
//! Every path that issues a token writes it through to the credential store
//! before returning. Calls for the same email are serialized so concurrent
//! first-seen requests create exactly one engine account.

use std::sync::Arc;

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use dashmap::DashMap;
use rand::Rng;
use rand::distributions::Alphanumeric;
use tokio::sync::Mutex;

use flowbridge_types::config::BridgeConfig;
use flowbridge_types::credential::CredentialRecord;
use flowbridge_types::error::SessionError;
use flowbridge_types::identity::Identity;
use flowbridge_types::secret::Redacted;

use crate::backend::Backend;
use crate::credentials::{CredentialPersistence, CredentialStore};

/// Host header carrying base64 `"<username>:<secret>"`.
pub const IDENTITY_HEADER: &str = "authorization-app-api";

/// Cookie under which the engine expects its session token.
pub const TOKEN_COOKIE: &str = "token";

/// Length of generated account passwords.
const PASSWORD_LENGTH: usize = 16;

/// Settings the bridge needs from [`BridgeConfig`].
#[derive(Debug, Clone)]
pub struct SessionSettings {
    pub account_domain: String,
    pub identity_prefix: String,
    pub service_account_email: String,
    pub service_account_password: Redacted,
    /// Secret the host signs identity headers with.
    pub app_secret: Redacted,
}

impl From<&BridgeConfig> for SessionSettings {
    fn from(config: &BridgeConfig) -> Self {
        Self {
            account_domain: config.account_domain.clone(),
            identity_prefix: config.identity_prefix.clone(),
            service_account_email: config.service_account_email.clone(),
            service_account_password: config.service_account_password.clone(),
            app_secret: config.app_secret.clone(),
        }
    }
}

/// Decode the identity header into an [`Identity`].
///
/// Returns `None` for anything malformed (bad base64, non UTF-8, no `:`
/// separator, empty username) and when the secret half does not match
/// `app_secret`.
pub fn identity_from_header(value: &str, prefix: &str, app_secret: &str) -> Option<Identity> {
    let decoded = BASE64.decode(value.trim()).ok()?;
    let decoded = String::from_utf8(decoded).ok()?;
    let (username, secret) = decoded.split_once(':')?;
    if !secrets_match(secret, app_secret) {
        tracing::warn!("identity header carries a wrong app secret");
        return None;
    }
    Identity::from_username(prefix, username)
}

/// Length-independent comparison that does not stop at the first mismatch.
fn secrets_match(presented: &str, expected: &str) -> bool {
    let (a, b) = (presented.as_bytes(), expected.as_bytes());
    let diff = a
        .iter()
        .zip(b)
        .fold(a.len() ^ b.len(), |acc, (x, y)| acc | usize::from(x ^ y));
    diff == 0
}

/// Fixed-length random alphanumeric password.
pub fn generate_password() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(PASSWORD_LENGTH)
        .map(char::from)
        .collect()
}

/// Resolves callers to engine session tokens, provisioning accounts on demand.
pub struct SessionBridge<B, P> {
    backend: Arc<B>,
    store: Arc<CredentialStore<P>>,
    settings: SessionSettings,
    locks: DashMap<String, Arc<Mutex<()>>>,
}

impl<B: Backend, P: CredentialPersistence> SessionBridge<B, P> {
    pub fn new(backend: Arc<B>, store: Arc<CredentialStore<P>>, settings: SessionSettings) -> Self {
        Self {
            backend,
            store,
            settings,
            locks: DashMap::new(),
        }
    }

    pub fn store(&self) -> &Arc<CredentialStore<P>> {
        &self.store
    }

    /// Boundary operation for inbound requests.
    ///
    /// `identity_header` is the raw identity header value, `presented_token`
    /// the caller's `token` cookie. A missing or malformed identity header
    /// yields `Ok(None)` and the caller decides the fallback.
    pub async fn resolve_request(
        &self,
        identity_header: Option<&str>,
        presented_token: Option<&str>,
        allow_missing_creation: bool,
    ) -> Result<Option<Redacted>, SessionError> {
        let Some(identity) = identity_header.and_then(|value| {
            identity_from_header(
                value,
                &self.settings.identity_prefix,
                self.settings.app_secret.expose(),
            )
        }) else {
            tracing::debug!("no usable identity header, leaving request unauthenticated");
            return Ok(None);
        };
        self.resolve(&identity, presented_token, allow_missing_creation)
            .await
    }

    /// Resolve an identity to a valid engine token.
    ///
    /// Returns `Ok(None)` when the identity has never been seen and
    /// `allow_missing_creation` is false, and for identities that map onto the
    /// service account, which is never handed to callers.
    pub async fn resolve(
        &self,
        identity: &Identity,
        presented_token: Option<&str>,
        allow_missing_creation: bool,
    ) -> Result<Option<Redacted>, SessionError> {
        if let Some(token) = presented_token.filter(|t| !t.is_empty()) {
            match self.backend.validate_token(token).await {
                Ok(true) => return Ok(Some(Redacted::new(token))),
                Ok(false) => tracing::debug!(%identity, "presented token rejected"),
                Err(e) => tracing::debug!(%identity, error = %e, "could not verify presented token"),
            }
        }

        let email = identity.account_email(&self.settings.account_domain);
        if email == self.settings.service_account_email {
            tracing::warn!(%identity, "identity maps onto the service account, refusing");
            return Ok(None);
        }

        let lock = self.lock_for(&email);
        let _guard = lock.lock().await;

        match self.store.get(&email).await {
            Some(record) => self.refresh(&email, record).await.map(Some),
            None if !allow_missing_creation => {
                tracing::debug!(%email, "unknown account and creation not allowed");
                Ok(None)
            }
            None => self.provision(&email).await.map(Some),
        }
    }

    /// Token for the service account that creates accounts and owns listeners.
    ///
    /// The account must already exist on the engine; the first call seeds the
    /// store from the configured bootstrap password.
    pub async fn service_session(&self) -> Result<Redacted, SessionError> {
        let email = self.settings.service_account_email.clone();
        let lock = self.lock_for(&email);
        let _guard = lock.lock().await;

        let record = match self.store.get(&email).await {
            Some(record) => record,
            None => CredentialRecord::new(self.settings.service_account_password.expose(), ""),
        };
        self.refresh(&email, record).await
    }

    fn lock_for(&self, email: &str) -> Arc<Mutex<()>> {
        self.locks.entry(email.to_string()).or_default().clone()
    }

    /// Reuse the cached token if the engine still accepts it, otherwise
    /// re-authenticate once with the stored password and persist.
    async fn refresh(&self, email: &str, record: CredentialRecord) -> Result<Redacted, SessionError> {
        if record.has_token() && self.backend.validate_token(record.token.expose()).await? {
            return Ok(record.token);
        }

        tracing::info!(%email, "cached token missing or rejected, re-authenticating");
        let token = self.login(email, record.password.expose()).await?;
        self.store.upsert(email, record.with_token(token.expose())).await?;
        Ok(token)
    }

    /// Create the engine account, then authenticate.
    ///
    /// The password is persisted (with an empty token) as soon as the account
    /// exists so a failed login never orphans the account.
    async fn provision(&self, email: &str) -> Result<Redacted, SessionError> {
        let admin_token = self.service_session().await?;
        let password = generate_password();

        self.backend
            .create_account(admin_token.expose(), email, &password)
            .await?;
        tracing::info!(%email, "engine account created");

        let record = CredentialRecord::new(password, "");
        self.store.upsert(email, record.clone()).await?;

        let token = self.login(email, record.password.expose()).await?;
        self.store.upsert(email, record.with_token(token.expose())).await?;
        Ok(token)
    }

    async fn login(&self, email: &str, password: &str) -> Result<Redacted, SessionError> {
        let token = self.backend.authenticate(email, password).await?;
        let token = token.trim();
        if token.is_empty() {
            return Err(SessionError::EmptyToken(email.to_string()));
        }
        Ok(Redacted::new(token))
    }
}
