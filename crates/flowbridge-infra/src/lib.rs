//! Infrastructure layer for flowbridge.
//!
//! Contains implementations of the ports defined in `flowbridge-core`: the
//! reqwest-based backend client for the workflow engine and the host
//! platform, the JSON file credential persistence, plus configuration
//! loading and data directory resolution.

pub mod backend;
pub mod config;
pub mod credentials;
pub mod filesystem;
