//! Several directory servers behind one client.

use std::sync::Arc;

use serde::Serialize;

use crate::config::{Configuration, ServerConfig};
use crate::credentials::LoginAttempt;
use crate::dial::{Connector, Ldap3Connector};
use crate::error::{Error, Result};
use crate::ldap::Ldap;
use crate::user::User;

/// Reachability of one server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ServerStatus {
    pub host: String,
    pub port: u16,
    pub available: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Configured servers, tried in order.
pub struct MultiDirectory {
    servers: Vec<Arc<ServerConfig>>,
    connector: Arc<dyn Connector>,
}

impl MultiDirectory {
    pub fn new(config: Configuration) -> Self {
        Self::with_connector(config, Arc::new(Ldap3Connector))
    }

    pub fn with_connector(config: Configuration, connector: Arc<dyn Connector>) -> Self {
        Self {
            servers: config.servers.into_iter().map(Arc::new).collect(),
            connector,
        }
    }

    fn client(&self, config: &Arc<ServerConfig>) -> Ldap {
        Ldap::with_connector(Arc::clone(config), Arc::clone(&self.connector))
    }

    fn ensure_servers(&self) -> Result<()> {
        if self.servers.is_empty() {
            Err(Error::NoServers)
        } else {
            Ok(())
        }
    }

    /// Authenticate against the first server accepting the credentials.
    ///
    /// Rejections and unreachable servers move on to the next server, any
    /// other failure (bad TLS material included) is returned at once. When no server accepts, the last
    /// dial error wins over a rejection: the unreachable server may have
    /// known the user.
    pub async fn login(&self, attempt: &LoginAttempt) -> Result<User> {
        self.ensure_servers()?;

        let mut unreachable = None;
        for config in &self.servers {
            let mut ldap = self.client(config);
            match ldap.dial().await {
                Ok(()) => {},
                Err(err @ Error::Config(_)) => return Err(err),
                Err(err) => {
                    tracing::warn!(host = %config.host, error = %err, "directory server unreachable, trying next server");
                    unreachable = Some(err);
                    continue;
                },
            }

            let result = ldap.login(attempt).await;
            ldap.close().await;

            match result {
                Ok(user) => return Ok(user),
                Err(err) if err.is_rejection() => {
                    tracing::debug!(host = %config.host, login = %attempt.name(), "login rejected, trying next server");
                },
                Err(err) => return Err(err),
            }
        }

        Err(unreachable.unwrap_or(Error::InvalidCredentials))
    }

    /// Find users on every server.
    pub async fn users<S: AsRef<str> + Sync>(&self, logins: &[S]) -> Result<Vec<User>> {
        self.ensure_servers()?;

        let mut users = Vec::new();
        for config in &self.servers {
            let mut ldap = self.client(config);
            ldap.dial().await?;

            let result = match ldap.bind().await {
                Ok(()) => ldap.users(logins).await,
                Err(err) => Err(err),
            };
            ldap.close().await;

            users.extend(result?);
        }

        Ok(users)
    }

    /// Dial every server and report which ones answer.
    pub async fn ping(&self) -> Result<Vec<ServerStatus>> {
        self.ensure_servers()?;

        let mut statuses = Vec::with_capacity(self.servers.len());
        for config in &self.servers {
            let mut ldap = self.client(config);
            let status = match ldap.dial().await {
                Ok(()) => {
                    ldap.close().await;
                    None
                },
                Err(err) => Some(err.to_string()),
            };

            statuses.push(ServerStatus {
                host: config.host.clone(),
                port: config.port,
                available: status.is_none(),
                error: status,
            });
        }

        Ok(statuses)
    }
}
