//! Shared domain types for flowbridge.
//!
//! This crate contains the domain types used across the bridge: caller
//! identities, cached backend credentials, listener specs and registrations,
//! configuration, and their associated error types.
//!
//! Zero infrastructure dependencies -- only serde, chrono, thiserror.

pub mod config;
pub mod credential;
pub mod error;
pub mod identity;
pub mod listener;
pub mod secret;
