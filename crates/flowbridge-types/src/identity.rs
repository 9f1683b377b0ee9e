//! Caller identities and their backend account emails.

use std::fmt;

use serde::{Deserialize, Serialize};

/// A caller's derived principal: namespace prefix + host username.
///
/// Minted once from the identity header and never mutated.
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Identity(String);

impl Identity {
    /// Mint an identity from a host username under the given namespace prefix.
    ///
    /// Returns `None` for an empty username.
    pub fn from_username(prefix: &str, username: &str) -> Option<Self> {
        if username.is_empty() {
            return None;
        }
        Some(Self(format!("{prefix}{username}")))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Backend account email for this identity.
    ///
    /// `%` and whitespace are percent-escaped so two distinct identities can
    /// never map to the same email.
    pub fn account_email(&self, domain: &str) -> String {
        format!("{}@{domain}", escape_local_part(&self.0))
    }
}

impl fmt::Debug for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Identity(\"{}\")", self.0)
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

fn escape_local_part(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for ch in raw.chars() {
        if ch == '%' || ch.is_whitespace() {
            let mut buf = [0u8; 4];
            for byte in ch.encode_utf8(&mut buf).bytes() {
                out.push_str(&format!("%{byte:02X}"));
            }
        } else {
            out.push(ch);
        }
    }
    out
}
