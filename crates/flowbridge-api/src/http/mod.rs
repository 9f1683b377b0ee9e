//! HTTP layer for flowbridge.
//!
//! Host lifecycle callbacks (`/heartbeat`, `/init`, `/enabled`) plus the
//! pass-through proxy that fronts the workflow engine with a per-user session.

pub mod error;
pub mod handlers;
pub mod router;
