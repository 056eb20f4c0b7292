//! LDAP support.
//!
//! [`Ldap`] authenticates users against one directory server. A login goes
//! through `Idle → Connected → Bound → Searched → Verified | Rejected`:
//!
//! 1. [`Ldap::dial`] opens a session on the first reachable host.
//! 2. The session binds as admin, as the user (single bind) or anonymously.
//! 3. The login is searched; no entry rejects with [`Error::UserNotFound`].
//! 4. Unless the single bind already did it, the password is checked by
//!    binding as the entry DN; a refused bind rejects with
//!    [`Error::InvalidCredentials`].

use std::sync::Arc;

use crate::config::ServerConfig;
use crate::connection::{AddRequest, Connection, Entry};
use crate::credentials::LoginAttempt;
use crate::dial::{Connector, Ldap3Connector, dial};
use crate::error::{Error, Result};
use crate::mapper::{DN_ATTRIBUTE, array_attribute, attribute, build_user};
use crate::search::{
    USERS_MAX_REQUEST, batches, group_search_request, user_search_request,
};
use crate::strategy::{BindStrategy, single_bind_dn};
use crate::user::User;

/// Directory client for one server.
///
/// Holds at most one session. It is not shared: every login attempt uses its
/// own [`Ldap`].
pub struct Ldap {
    config: Arc<ServerConfig>,
    connector: Arc<dyn Connector>,
    conn: Option<Box<dyn Connection>>,
}

impl Ldap {
    /// Create a new [`Ldap`] client using `ldap3` sessions.
    pub fn new(config: Arc<ServerConfig>) -> Self {
        Self::with_connector(config, Arc::new(Ldap3Connector))
    }

    /// Create a new [`Ldap`] client opening sessions with `connector`.
    pub fn with_connector(
        config: Arc<ServerConfig>,
        connector: Arc<dyn Connector>,
    ) -> Self {
        Self {
            config,
            connector,
            conn: None,
        }
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// Open a session on the first reachable host.
    ///
    /// A previous session is closed first.
    pub async fn dial(&mut self) -> Result<()> {
        self.close().await;
        self.conn = Some(dial(&self.config, self.connector.as_ref()).await?);
        Ok(())
    }

    /// Close the session. Later operations fail until the next
    /// [`Ldap::dial`].
    pub async fn close(&mut self) {
        if let Some(mut conn) = self.conn.take() {
            if let Err(err) = conn.close().await {
                tracing::debug!(error = %err, "failed to unbind directory session");
            }
        }
    }

    fn conn(&mut self) -> Result<&mut Box<dyn Connection>> {
        self.conn.as_mut().ok_or(Error::NotConnected)
    }

    /// Bind with the admin credentials, or anonymously if there are none.
    pub async fn bind(&mut self) -> Result<()> {
        match BindStrategy::select(&self.config) {
            BindStrategy::Admin => self.admin_bind().await,
            BindStrategy::Single | BindStrategy::Anonymous => {
                self.unauthenticated_bind().await
            },
        }
    }

    /// Bind with the configured admin DN and password.
    ///
    /// A refused admin bind is a configuration problem, never a
    /// [`Error::InvalidCredentials`].
    pub async fn admin_bind(&mut self) -> Result<()> {
        let config = Arc::clone(&self.config);
        self.conn()?
            .bind(&config.bind_dn, config.bind_password.expose())
            .await
            .inspect_err(|err| {
                tracing::error!(error = %err, "cannot authenticate admin user in LDAP");
            })
    }

    /// Bind as `dn` with `password`.
    ///
    /// A refused bind is reported as [`Error::InvalidCredentials`].
    pub async fn user_bind(&mut self, dn: &str, password: &str) -> Result<()> {
        self.conn()?
            .bind(dn, password)
            .await
            .map_err(Error::from_bind)
            .inspect_err(|err| {
                tracing::error!(%dn, error = %err, "cannot bind user with LDAP");
            })
    }

    async fn unauthenticated_bind(&mut self) -> Result<()> {
        let config = Arc::clone(&self.config);
        self.conn()?.unauthenticated_bind(&config.bind_dn).await
    }

    /// Authenticate a user on the current session.
    ///
    /// Unknown logins and wrong passwords are both rejections, see
    /// [`Error::is_rejection`].
    pub async fn login(&mut self, attempt: &LoginAttempt) -> Result<User> {
        let result = self.try_login(attempt).await;
        record_login(&result);
        result
    }

    async fn try_login(&mut self, attempt: &LoginAttempt) -> Result<User> {
        // An empty password turns a bind into an unauthenticated one.
        if !attempt.has_password() {
            return Err(Error::InvalidCredentials);
        }

        let mut verified = false;
        match BindStrategy::select(&self.config) {
            BindStrategy::Admin => self.admin_bind().await?,
            BindStrategy::Single => {
                let dn = single_bind_dn(&self.config.bind_dn, attempt.name());
                self.user_bind(&dn, attempt.password()).await?;
                verified = true;
            },
            BindStrategy::Anonymous => self.unauthenticated_bind().await?,
        }

        let Some(user) = self.users(&[attempt.name()]).await?.into_iter().next()
        else {
            tracing::debug!(login = %attempt.name(), "user not found in LDAP");
            return Err(Error::UserNotFound);
        };

        if !verified {
            self.user_bind(&user.dn, attempt.password()).await?;
        }

        Ok(user)
    }

    /// Dial, log in and close, whatever the outcome.
    pub async fn authenticate(&mut self, attempt: &LoginAttempt) -> Result<User> {
        self.dial().await?;
        let result = self.login(attempt).await;
        self.close().await;
        result
    }

    /// Find users by login.
    ///
    /// Logins are searched in batches of [`USERS_MAX_REQUEST`]. Unknown logins
    /// are skipped.
    pub async fn users<S: AsRef<str> + Sync>(&mut self, logins: &[S]) -> Result<Vec<User>> {
        let mut entries = Vec::new();
        for range in batches(logins.len(), USERS_MAX_REQUEST) {
            entries.extend(self.search_users(&logins[range]).await?);
        }

        let mut users = Vec::with_capacity(entries.len());
        for entry in &entries {
            let groups = self.member_of(entry).await?;
            users.push(build_user(&self.config.attributes, entry, groups));
        }

        tracing::debug!(count = users.len(), ?users, "LDAP users found");
        Ok(users)
    }

    /// Search one batch on every base until one returns entries.
    async fn search_users<S: AsRef<str> + Sync>(&mut self, logins: &[S]) -> Result<Vec<Entry>> {
        let config = Arc::clone(&self.config);
        let conn = self.conn()?;

        for base in &config.search_base_dns {
            let request = user_search_request(&config, base, logins);
            tracing::debug!(base = %request.base_dn, filter = %request.filter, "LDAP search request");

            let entries = conn.search(&request).await?;
            if !entries.is_empty() {
                return Ok(entries);
            }
        }

        Ok(Vec::new())
    }

    /// Groups of an entry, read from an attribute or searched.
    async fn member_of(&mut self, entry: &Entry) -> Result<Vec<String>> {
        if self.config.group_search_filter.is_empty() {
            return Ok(array_attribute(&self.config.attributes.member_of, entry));
        }

        self.request_member_of(entry).await
    }

    /// Search the groups of an entry, for schemas without `memberOf`.
    async fn request_member_of(&mut self, entry: &Entry) -> Result<Vec<String>> {
        let config = Arc::clone(&self.config);
        let conn = self.conn()?;

        let bases = if config.group_search_base_dns.is_empty() {
            &config.search_base_dns
        } else {
            &config.group_search_base_dns
        };

        let member = if config.group_search_filter_user_attribute.is_empty() {
            attribute(&config.attributes.username, entry)
        } else {
            attribute(&config.group_search_filter_user_attribute, entry)
        };

        let id_attribute = match config.attributes.member_of.as_str() {
            "" | "memberOf" => DN_ATTRIBUTE,
            attr => attr,
        };

        let mut groups = Vec::new();
        for base in bases {
            let request = group_search_request(&config, base, member, id_attribute);
            tracing::info!(filter = %request.filter, "searching for user's groups");

            groups.extend(
                conn.search(&request)
                    .await?
                    .iter()
                    .map(|group| attribute(id_attribute, group).to_owned()),
            );
        }

        Ok(groups)
    }

    /// Create an entry.
    pub async fn add(&mut self, request: &AddRequest) -> Result<()> {
        self.conn()?.add(request).await
    }

    /// Delete an entry.
    pub async fn delete(&mut self, dn: &str) -> Result<()> {
        self.conn()?.delete(dn).await
    }
}

/// Count a login outcome in `ldap_login_total`.
fn record_login(result: &Result<User>) {
    let outcome = match result {
        Ok(_) => "success",
        Err(Error::InvalidCredentials) => "invalid_credentials",
        Err(Error::UserNotFound) => "user_not_found",
        Err(_) => "error",
    };
    metrics::counter!("ldap_login_total", "result" => outcome).increment(1);
}
