//! Login attempts and secret handling.

use std::fmt;

use serde::{Deserialize, Deserializer};
use zeroize::Zeroizing;

/// A password wiped from memory on drop and hidden from `Debug`.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct Secret(Zeroizing<String>);

impl Secret {
    /// Create a new [`Secret`].
    pub fn new(value: impl Into<String>) -> Self {
        Self(Zeroizing::new(value.into()))
    }

    /// Plaintext value. Never log it.
    pub fn expose(&self) -> &str {
        self.0.as_str()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_empty() {
            f.write_str("\"\"")
        } else {
            f.write_str("\"***\"")
        }
    }
}

impl From<&str> for Secret {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for Secret {
    fn from(value: String) -> Self {
        Self::new(value)
    }
}

impl<'de> Deserialize<'de> for Secret {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        String::deserialize(deserializer).map(Secret::new)
    }
}

/// Login name and credential of one authentication attempt.
#[derive(Debug, Clone)]
pub struct LoginAttempt {
    name: String,
    password: Secret,
}

impl LoginAttempt {
    /// Create a new [`LoginAttempt`].
    pub fn new(name: impl Into<String>, password: impl Into<Secret>) -> Self {
        Self {
            name: name.into(),
            password: password.into(),
        }
    }

    /// Requested login name.
    pub fn name(&self) -> &str {
        &self.name
    }

    pub(crate) fn password(&self) -> &str {
        self.password.expose()
    }

    pub(crate) fn has_password(&self) -> bool {
        !self.password.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_password_is_redacted() {
        let attempt = LoginAttempt::new("alice", "hunter2");
        let debug = format!("{attempt:?}");

        assert!(debug.contains("alice"));
        assert!(!debug.contains("hunter2"));
        assert_eq!(attempt.password(), "hunter2");
    }

    #[test]
    fn test_empty_secret() {
        let attempt = LoginAttempt::new("alice", "");
        assert!(!attempt.has_password());
        assert_eq!(format!("{:?}", Secret::default()), "\"\"");
    }
}
