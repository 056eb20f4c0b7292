//! Configuration manager for autha-directory.

use std::fs::File;
use std::path::Path;
use std::time::Duration;

use serde::Deserialize;

use crate::credentials::Secret;
use crate::error::{Error, Result};
use crate::search::is_well_formed;

pub const DEFAULT_CONFIG_PATH: &str = "config.yaml";
const DEFAULT_PORT: u16 = 389;
const DEFAULT_SEARCH_FILTER: &str = "(uid=%s)";
/// Placeholder replaced by a login in filters and bind DNs.
pub const PLACEHOLDER: &str = "%s";

/// Every configured directory server.
#[derive(Debug, Default, Clone, PartialEq, Deserialize)]
pub struct Configuration {
    #[serde(default)]
    pub servers: Vec<ServerConfig>,
}

/// Transport security of a directory session.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TlsMode {
    /// Plain `ldap://`.
    #[default]
    None,
    /// `ldaps://`, TLS from the first byte.
    Implicit,
    /// `ldap://` upgraded with the StartTLS extended operation.
    StartTls,
}

/// Connection and lookup facts of one directory server.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Space-separated hosts, tried in order.
    pub host: String,
    pub port: u16,
    pub tls: TlsMode,
    #[serde(alias = "ssl_skip_verify")]
    pub skip_verify: bool,
    /// Space-separated PEM files trusted as root authorities.
    pub root_ca_cert: String,
    pub client_cert: String,
    pub client_key: String,
    /// Admin DN, or a `%s` template for single bind.
    pub bind_dn: String,
    pub bind_password: Secret,
    /// Connect timeout in seconds.
    pub timeout: Option<u64>,

    pub search_filter: String,
    pub search_base_dns: Vec<String>,

    pub group_search_filter: String,
    pub group_search_filter_user_attribute: String,
    pub group_search_base_dns: Vec<String>,

    pub attributes: AttributeMap,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: String::default(),
            port: DEFAULT_PORT,
            tls: TlsMode::default(),
            skip_verify: false,
            root_ca_cert: String::default(),
            client_cert: String::default(),
            client_key: String::default(),
            bind_dn: String::default(),
            bind_password: Secret::default(),
            timeout: None,
            search_filter: DEFAULT_SEARCH_FILTER.to_owned(),
            search_base_dns: Vec::new(),
            group_search_filter: String::default(),
            group_search_filter_user_attribute: String::default(),
            group_search_base_dns: Vec::new(),
            attributes: AttributeMap::default(),
        }
    }
}

/// Directory attribute read for each user field.
///
/// An empty name disables the field: it is neither requested nor extracted.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct AttributeMap {
    pub username: String,
    pub name: String,
    pub surname: String,
    pub email: String,
    pub member_of: String,
}

impl Default for AttributeMap {
    fn default() -> Self {
        Self {
            username: "uid".into(),
            name: "givenName".into(),
            surname: "sn".into(),
            email: "mail".into(),
            member_of: "memberOf".into(),
        }
    }
}

impl Configuration {
    /// Reads the `config.yaml` file from the specified path or the default
    /// location.
    ///
    /// A missing file yields an empty configuration.
    pub fn read(path: Option<&Path>) -> Result<Self> {
        let file_path = path.unwrap_or_else(|| Path::new(DEFAULT_CONFIG_PATH));

        let config: Configuration = match File::open(file_path) {
            Ok(file) => serde_yaml::from_reader(file)?,
            Err(err) => {
                tracing::error!(error = %err, path = %file_path.display(), "configuration file not found");
                return Ok(Self::default());
            },
        };

        config.validate()?;
        Ok(config)
    }

    /// Parse a configuration from a YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let config: Configuration = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        self.servers.iter().try_for_each(ServerConfig::validate)
    }
}

impl ServerConfig {
    /// Hosts in failover order, IPv6 brackets removed.
    pub fn hosts(&self) -> impl Iterator<Item = &str> {
        self.host
            .split_whitespace()
            .map(|host| host.trim_start_matches('[').trim_end_matches(']'))
    }

    pub fn conn_timeout(&self) -> Option<Duration> {
        self.timeout.map(Duration::from_secs)
    }

    /// Check the server is usable before dialing it.
    pub fn validate(&self) -> Result<()> {
        if self.hosts().next().is_none() {
            return Err(Error::Config("`host` must list at least one server".into()));
        }

        if !self.search_filter.contains(PLACEHOLDER) {
            return Err(Error::Config(format!(
                "`search_filter` must contain `{PLACEHOLDER}`"
            )));
        }

        if !is_well_formed(&self.search_filter) {
            return Err(Error::Config(format!(
                "malformed `search_filter` {}",
                self.search_filter
            )));
        }

        if !self.group_search_filter.is_empty()
            && !is_well_formed(&self.group_search_filter)
        {
            return Err(Error::Config(format!(
                "malformed `group_search_filter` {}",
                self.group_search_filter
            )));
        }

        if self.search_base_dns.is_empty() {
            return Err(Error::Config("`search_base_dns` is empty".into()));
        }

        if self.client_cert.is_empty() != self.client_key.is_empty() {
            return Err(Error::Config(
                "both `client_cert` and `client_key` must be set".into(),
            ));
        }

        Ok(())
    }
}
