use serde::{Deserialize, Serialize};
use std::fmt;

/// Canonical recipient address on the chat network, `local@domain`.
#[derive(Clone, Debug, Hash, Eq, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Address(String);

impl Address {
    /// Normalize a raw recipient into canonical form.
    ///
    /// Input already containing `@` is trusted as-is (trimmed). Anything else
    /// is reduced to its digits and suffixed with the transport's domain.
    /// Returns `None` when nothing usable remains.
    pub fn normalize(raw: &str, domain: &str) -> Option<Address> {
        let raw = raw.trim();
        if raw.is_empty() {
            return None;
        }
        if let Some((local, host)) = raw.split_once('@') {
            if local.is_empty() || host.is_empty() {
                return None;
            }
            return Some(Address(raw.to_owned()));
        }
        let digits: String = raw.chars().filter(|c| c.is_ascii_digit()).collect();
        if digits.is_empty() {
            return None;
        }
        Some(Address(format!("{digits}@{domain}")))
    }

    /// Wrap a value that is already in canonical form.
    pub fn from_canonical(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for Address {
    fn as_ref(&self) -> &str {
        &self.0
    }
}
