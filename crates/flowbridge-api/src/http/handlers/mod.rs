//! HTTP request handlers.

pub mod lifecycle;
pub mod proxy;
