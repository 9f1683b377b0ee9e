//! Business logic and port definitions for flowbridge.
//!
//! This crate defines the ports (`Backend`, `CredentialPersistence`) that the
//! infrastructure layer implements, plus everything that runs on top of them:
//! the credential store, the session bridge, the listener spec extractor and
//! the webhook reconciliation engine. It depends only on `flowbridge-types`
//! -- never on `flowbridge-infra` or any HTTP/IO crate.

pub mod backend;
pub mod credentials;
pub mod listener;
pub mod reconcile;
pub mod session;

#[cfg(test)]
pub(crate) mod mock;
