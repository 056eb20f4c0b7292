//! Directory session abstraction.
//!
//! [`Connection`] is the capability set the client needs from a live LDAP
//! session. [`Ldap3Connection`] implements it on top of `ldap3`.

use std::collections::{HashMap, HashSet};

use async_trait::async_trait;
use ldap3::{Ldap as Ldap3, SearchEntry, SearchOptions};

use crate::error::Result;

/// Search scope.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum Scope {
    Base,
    OneLevel,
    #[default]
    WholeSubtree,
}

/// Alias dereferencing policy.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum DerefAliases {
    #[default]
    Never,
    InSearching,
    FindingBaseObject,
    Always,
}

impl From<Scope> for ldap3::Scope {
    fn from(scope: Scope) -> Self {
        match scope {
            Scope::Base => ldap3::Scope::Base,
            Scope::OneLevel => ldap3::Scope::OneLevel,
            Scope::WholeSubtree => ldap3::Scope::Subtree,
        }
    }
}

impl From<DerefAliases> for ldap3::DerefAliases {
    fn from(deref: DerefAliases) -> Self {
        match deref {
            DerefAliases::Never => ldap3::DerefAliases::Never,
            DerefAliases::InSearching => ldap3::DerefAliases::Searching,
            DerefAliases::FindingBaseObject => ldap3::DerefAliases::Finding,
            DerefAliases::Always => ldap3::DerefAliases::Always,
        }
    }
}

/// One search operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchRequest {
    pub base_dn: String,
    pub scope: Scope,
    pub deref_aliases: DerefAliases,
    pub filter: String,
    pub attributes: Vec<String>,
}

/// Entry creation request.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AddRequest {
    pub dn: String,
    pub attributes: Vec<(String, Vec<String>)>,
}

/// Raw directory entry.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Entry {
    pub dn: String,
    pub attrs: HashMap<String, Vec<String>>,
}

impl Entry {
    /// Create a new [`Entry`] without attributes.
    pub fn new(dn: impl Into<String>) -> Self {
        Self {
            dn: dn.into(),
            attrs: HashMap::new(),
        }
    }

    /// Add an attribute to [`Entry`].
    pub fn with_attr<I, V>(mut self, name: impl Into<String>, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<String>,
    {
        self.attrs
            .insert(name.into(), values.into_iter().map(Into::into).collect());
        self
    }

    /// Values of an attribute. Names are compared exactly first, then without
    /// case as LDAP attribute names are case-insensitive.
    pub fn values(&self, name: &str) -> Option<&[String]> {
        self.attrs
            .get(name)
            .or_else(|| {
                self.attrs
                    .iter()
                    .find(|(key, _)| key.eq_ignore_ascii_case(name))
                    .map(|(_, values)| values)
            })
            .map(Vec::as_slice)
    }
}

impl From<SearchEntry> for Entry {
    fn from(entry: SearchEntry) -> Self {
        Self {
            dn: entry.dn,
            attrs: entry.attrs.into_iter().collect(),
        }
    }
}

/// Live directory session.
///
/// Operations run one at a time; a closed connection must not be used again.
#[async_trait]
pub trait Connection: Send {
    /// Simple bind with a DN and a password.
    async fn bind(&mut self, dn: &str, password: &str) -> Result<()>;

    /// Bind without credential.
    async fn unauthenticated_bind(&mut self, dn: &str) -> Result<()>;

    async fn search(&mut self, request: &SearchRequest) -> Result<Vec<Entry>>;

    async fn add(&mut self, request: &AddRequest) -> Result<()>;

    async fn delete(&mut self, dn: &str) -> Result<()>;

    /// Unbind and release the session.
    async fn close(&mut self) -> Result<()>;
}

/// [`Connection`] backed by an `ldap3` session.
#[derive(Debug)]
pub struct Ldap3Connection {
    conn: Ldap3,
}

impl Ldap3Connection {
    /// Wrap a driven `ldap3` handle.
    pub fn new(conn: Ldap3) -> Self {
        Self { conn }
    }
}

#[async_trait]
impl Connection for Ldap3Connection {
    async fn bind(&mut self, dn: &str, password: &str) -> Result<()> {
        self.conn.simple_bind(dn, password).await?.success()?;
        Ok(())
    }

    async fn unauthenticated_bind(&mut self, dn: &str) -> Result<()> {
        self.conn.simple_bind(dn, "").await?.success()?;
        Ok(())
    }

    async fn search(&mut self, request: &SearchRequest) -> Result<Vec<Entry>> {
        let (entries, _) = self
            .conn
            .with_search_options(
                SearchOptions::new().deref(request.deref_aliases.into()),
            )
            .search(
                &request.base_dn,
                request.scope.into(),
                &request.filter,
                request.attributes.clone(),
            )
            .await?
            .success()?;

        Ok(entries
            .into_iter()
            .map(|entry| SearchEntry::construct(entry).into())
            .collect())
    }

    async fn add(&mut self, request: &AddRequest) -> Result<()> {
        let attrs = request
            .attributes
            .iter()
            .map(|(name, values)| {
                (
                    name.as_str(),
                    values.iter().map(String::as_str).collect::<HashSet<_>>(),
                )
            })
            .collect::<Vec<_>>();

        self.conn.add(&request.dn, attrs).await?.success()?;
        Ok(())
    }

    async fn delete(&mut self, dn: &str) -> Result<()> {
        self.conn.delete(dn).await?.success()?;
        Ok(())
    }

    async fn close(&mut self) -> Result<()> {
        self.conn.unbind().await?;
        Ok(())
    }
}

/// In-memory directory used by tests.
#[cfg(test)]
pub(crate) mod fake {
    use std::collections::HashMap;
    use std::sync::{Arc, Mutex};

    use async_trait::async_trait;
    use ldap3::{LdapError, LdapResult};

    use super::*;
    use crate::dial::{Connector, Endpoint};
    use crate::error::Error;
    use crate::search::escape_filter;

    /// Operation received by the fake directory.
    #[derive(Debug, Clone, PartialEq, Eq)]
    pub enum Call {
        Bind { dn: String, password: String },
        UnauthenticatedBind { dn: String },
        Search(SearchRequest),
        Add(String),
        Delete(String),
        Close,
    }

    #[derive(Default)]
    struct State {
        calls: Vec<Call>,
        passwords: HashMap<String, String>,
        entries: Vec<(String, Entry)>,
        fail_search: bool,
    }

    /// Shared state of the fake directory.
    #[derive(Clone, Default)]
    pub struct Directory(Arc<Mutex<State>>);

    pub fn result_error(rc: u32) -> Error {
        Error::Ldap(LdapError::LdapResult {
            result: LdapResult {
                rc,
                matched: String::new(),
                text: String::new(),
                refs: vec![],
                ctrls: vec![],
            },
        })
    }

    impl Directory {
        /// Accept binds of `dn` with `password`.
        pub fn with_account(self, dn: &str, password: &str) -> Self {
            self.0
                .lock()
                .unwrap()
                .passwords
                .insert(dn.to_owned(), password.to_owned());
            self
        }

        /// Store `entry` under `base`.
        pub fn with_entry(self, base: &str, entry: Entry) -> Self {
            self.0.lock().unwrap().entries.push((base.to_owned(), entry));
            self
        }

        /// Make every search fail.
        pub fn failing_search(self) -> Self {
            self.0.lock().unwrap().fail_search = true;
            self
        }

        pub fn calls(&self) -> Vec<Call> {
            self.0.lock().unwrap().calls.clone()
        }

        pub fn binds(&self) -> Vec<Call> {
            self.calls()
                .into_iter()
                .filter(|call| {
                    matches!(call, Call::Bind { .. } | Call::UnauthenticatedBind { .. })
                })
                .collect()
        }

        pub fn searches(&self) -> Vec<SearchRequest> {
            self.calls()
                .into_iter()
                .filter_map(|call| match call {
                    Call::Search(request) => Some(request),
                    _ => None,
                })
                .collect()
        }

        pub fn connection(&self) -> FakeConnection {
            FakeConnection(self.clone())
        }
    }

    /// An entry matches when one of its `(attr=value)` pairs is in the filter.
    fn matches(entry: &Entry, filter: &str) -> bool {
        entry.attrs.iter().any(|(name, values)| {
            values
                .iter()
                .any(|value| filter.contains(&format!("({name}={})", escape_filter(value))))
        })
    }

    pub struct FakeConnection(Directory);

    #[async_trait]
    impl Connection for FakeConnection {
        async fn bind(&mut self, dn: &str, password: &str) -> Result<()> {
            let mut state = self.0.0.lock().unwrap();
            state.calls.push(Call::Bind {
                dn: dn.to_owned(),
                password: password.to_owned(),
            });

            match state.passwords.get(dn) {
                Some(expected) if expected == password => Ok(()),
                _ => Err(result_error(49)),
            }
        }

        async fn unauthenticated_bind(&mut self, dn: &str) -> Result<()> {
            let mut state = self.0.0.lock().unwrap();
            state.calls.push(Call::UnauthenticatedBind { dn: dn.to_owned() });
            Ok(())
        }

        async fn search(&mut self, request: &SearchRequest) -> Result<Vec<Entry>> {
            let mut state = self.0.0.lock().unwrap();
            state.calls.push(Call::Search(request.clone()));

            if state.fail_search {
                return Err(result_error(1));
            }

            Ok(state
                .entries
                .iter()
                .filter(|(base, entry)| {
                    base == &request.base_dn && matches(entry, &request.filter)
                })
                .map(|(_, entry)| entry.clone())
                .collect())
        }

        async fn add(&mut self, request: &AddRequest) -> Result<()> {
            self.0.0.lock().unwrap().calls.push(Call::Add(request.dn.clone()));
            Ok(())
        }

        async fn delete(&mut self, dn: &str) -> Result<()> {
            self.0.0.lock().unwrap().calls.push(Call::Delete(dn.to_owned()));
            Ok(())
        }

        async fn close(&mut self) -> Result<()> {
            self.0.0.lock().unwrap().calls.push(Call::Close);
            Ok(())
        }
    }

    /// Connector reaching only the listed hosts.
    #[derive(Clone, Default)]
    pub struct FakeConnector {
        pub directory: Directory,
        reachable: Vec<String>,
        attempts: Arc<Mutex<Vec<(Endpoint, bool)>>>,
    }

    impl FakeConnector {
        pub fn new(directory: Directory, reachable: &[&str]) -> Self {
            Self {
                directory,
                reachable: reachable.iter().map(|host| host.to_string()).collect(),
                attempts: Arc::default(),
            }
        }

        pub fn attempts(&self) -> Vec<Endpoint> {
            self.attempts
                .lock()
                .unwrap()
                .iter()
                .map(|(endpoint, _)| endpoint.clone())
                .collect()
        }

        /// Whether each attempt was given a TLS connector.
        pub fn tls_attempts(&self) -> Vec<bool> {
            self.attempts
                .lock()
                .unwrap()
                .iter()
                .map(|(_, tls)| *tls)
                .collect()
        }
    }

    #[async_trait]
    impl Connector for FakeConnector {
        async fn connect(
            &self,
            endpoint: &Endpoint,
            tls: Option<&native_tls::TlsConnector>,
        ) -> Result<Box<dyn Connection>> {
            self.attempts
                .lock()
                .unwrap()
                .push((endpoint.clone(), tls.is_some()));

            if self.reachable.contains(&endpoint.host) {
                Ok(Box::new(self.directory.connection()))
            } else {
                Err(std::io::Error::new(
                    std::io::ErrorKind::ConnectionRefused,
                    format!("{} refused connection", endpoint.url()),
                )
                .into())
            }
        }
    }
}
