//! Bind strategy selection.

use crate::config::{PLACEHOLDER, ServerConfig};

/// How a session authenticates before searching users.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BindStrategy {
    /// Bind once with the configured admin DN and password.
    Admin,
    /// Bind as the user through the `%s` bind DN template.
    Single,
    /// Bind without credential.
    Anonymous,
}

impl BindStrategy {
    /// Strategy implied by the configuration.
    pub fn select(config: &ServerConfig) -> Self {
        if !config.bind_password.is_empty() {
            BindStrategy::Admin
        } else if config.bind_dn.contains(PLACEHOLDER) {
            BindStrategy::Single
        } else {
            BindStrategy::Anonymous
        }
    }
}

/// Bind DN of `login` for the single bind strategy.
pub fn single_bind_dn(template: &str, login: &str) -> String {
    template.replace(PLACEHOLDER, &ldap3::dn_escape(login))
}
