//! Endpoint resolution and dialing.
//!
//! TLS material is loaded once per dial, then hosts are tried in order until
//! one accepts a session.

use std::time::Duration;

use async_trait::async_trait;
use ldap3::{LdapConnAsync, LdapConnSettings};
use native_tls::{Certificate, Identity, TlsConnector};
use zeroize::Zeroizing;

use crate::config::{ServerConfig, TlsMode};
use crate::connection::{Connection, Ldap3Connection};
use crate::error::{Error, Result};

/// One host of a server, ready to be dialed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    pub host: String,
    pub port: u16,
    pub tls: TlsMode,
    pub skip_verify: bool,
    pub timeout: Option<Duration>,
}

impl Endpoint {
    /// `host:port`, IPv6 literals between brackets.
    pub fn address(&self) -> String {
        join_host_port(&self.host, self.port)
    }

    /// LDAP URL of the endpoint.
    ///
    /// StartTLS starts in clear, so only implicit TLS uses `ldaps`.
    pub fn url(&self) -> String {
        let scheme = match self.tls {
            TlsMode::Implicit => "ldaps",
            TlsMode::None | TlsMode::StartTls => "ldap",
        };
        format!("{scheme}://{}", self.address())
    }
}

/// Join a host and a port, bracketing IPv6 literals.
pub fn join_host_port(host: &str, port: u16) -> String {
    if host.contains(':') {
        format!("[{host}]:{port}")
    } else {
        format!("{host}:{port}")
    }
}

/// Opens directory sessions.
#[async_trait]
pub trait Connector: Send + Sync {
    /// Open a session on `endpoint`. `tls` is set for TLS endpoints.
    async fn connect(
        &self,
        endpoint: &Endpoint,
        tls: Option<&TlsConnector>,
    ) -> Result<Box<dyn Connection>>;
}

/// [`Connector`] using `ldap3`.
#[derive(Debug, Clone, Copy, Default)]
pub struct Ldap3Connector;

#[async_trait]
impl Connector for Ldap3Connector {
    async fn connect(
        &self,
        endpoint: &Endpoint,
        tls: Option<&TlsConnector>,
    ) -> Result<Box<dyn Connection>> {
        let mut settings = LdapConnSettings::new()
            .set_starttls(endpoint.tls == TlsMode::StartTls)
            .set_no_tls_verify(endpoint.skip_verify);

        if let Some(timeout) = endpoint.timeout {
            settings = settings.set_conn_timeout(timeout);
        }

        if let Some(connector) = tls {
            settings = settings.set_connector(connector.clone());
        }

        let (handle, conn) =
            LdapConnAsync::with_settings(settings, &endpoint.url()).await?;
        ldap3::drive!(handle);

        Ok(Box::new(Ldap3Connection::new(conn)))
    }
}

/// Certificates read from the server configuration.
#[derive(Default)]
struct TlsMaterial {
    roots: Vec<Certificate>,
    identity: Option<Identity>,
}

impl TlsMaterial {
    /// Read root authorities and the client identity.
    ///
    /// Any unreadable or invalid file fails the whole load.
    fn load(config: &ServerConfig) -> Result<Self> {
        let mut roots = Vec::new();
        for path in config.root_ca_cert.split_whitespace() {
            let pem = std::fs::read(path).map_err(|err| {
                Error::Config(format!("cannot read CA certificate {path}: {err}"))
            })?;
            let bundle = Certificate::stack_from_pem(&pem).map_err(|err| {
                Error::Config(format!("failed to append CA certificate {path}: {err}"))
            })?;
            if bundle.is_empty() {
                return Err(Error::Config(format!(
                    "failed to append CA certificate {path}: no certificate found"
                )));
            }
            roots.extend(bundle);
        }

        let identity = if !config.client_cert.is_empty() && !config.client_key.is_empty() {
            let read = |path: &str| {
                std::fs::read(path).map_err(|err| {
                    Error::Config(format!("cannot read client certificate {path}: {err}"))
                })
            };
            let cert = read(&config.client_cert)?;
            let key = Zeroizing::new(read(&config.client_key)?);
            let key = pkcs8_key(&key)?;

            Some(Identity::from_pkcs8(&cert, key.as_bytes()).map_err(|err| {
                Error::Config(format!("invalid client certificate or key: {err}"))
            })?)
        } else {
            None
        };

        Ok(Self { roots, identity })
    }

    /// Configured roots replace the platform trust store.
    fn trusts_built_in_roots(&self) -> bool {
        self.roots.is_empty()
    }

    fn into_connector(self, skip_verify: bool) -> Result<TlsConnector> {
        let mut builder = TlsConnector::builder();
        builder
            .danger_accept_invalid_certs(skip_verify)
            .disable_built_in_roots(!self.trusts_built_in_roots());

        for root in self.roots {
            builder.add_root_certificate(root);
        }

        if let Some(identity) = self.identity {
            builder.identity(identity);
        }

        Ok(builder.build()?)
    }
}

/// Body of the first `label` PEM block, armor included.
fn pem_block<'a>(pem: &'a str, label: &str) -> Option<&'a str> {
    let begin = format!("-----BEGIN {label}-----");
    let end = format!("-----END {label}-----");

    let start = pem.find(&begin)?;
    let stop = pem[start..].find(&end)? + start + end.len();
    Some(&pem[start..stop])
}

/// Client key as PKCS#8 PEM.
///
/// PKCS#1 RSA and SEC1 P-256 keys are converted, PKCS#8 keys pass through.
fn pkcs8_key(pem: &[u8]) -> Result<Zeroizing<String>> {
    let invalid = |err: &dyn std::fmt::Display| {
        Error::Config(format!("invalid client certificate or key: {err}"))
    };
    let pem = std::str::from_utf8(pem).map_err(|err| invalid(&err))?;

    if let Some(key) = pem_block(pem, "PRIVATE KEY") {
        Ok(Zeroizing::new(key.to_owned()))
    } else if let Some(key) = pem_block(pem, "RSA PRIVATE KEY") {
        rsa_to_pkcs8(key).map_err(|err| invalid(&err))
    } else if let Some(key) = pem_block(pem, "EC PRIVATE KEY") {
        ec_to_pkcs8(key).map_err(|err| invalid(&err))
    } else {
        Err(invalid(&"no private key found"))
    }
}

fn rsa_to_pkcs8(pem: &str) -> std::result::Result<Zeroizing<String>, Box<dyn std::error::Error>> {
    use rsa::RsaPrivateKey;
    use rsa::pkcs1::DecodeRsaPrivateKey;
    use rsa::pkcs8::{EncodePrivateKey, LineEnding};

    Ok(RsaPrivateKey::from_pkcs1_pem(pem)?.to_pkcs8_pem(LineEnding::LF)?)
}

fn ec_to_pkcs8(pem: &str) -> std::result::Result<Zeroizing<String>, Box<dyn std::error::Error>> {
    use p256::SecretKey;
    use p256::pkcs8::{EncodePrivateKey, LineEnding};

    Ok(SecretKey::from_sec1_pem(pem)?.to_pkcs8_pem(LineEnding::LF)?)
}

/// Open a session on the first reachable host of `config`.
///
/// When every host fails, the last error is returned.
pub async fn dial(
    config: &ServerConfig,
    connector: &dyn Connector,
) -> Result<Box<dyn Connection>> {
    let material = TlsMaterial::load(config)?;
    let tls = match config.tls {
        TlsMode::None => None,
        TlsMode::Implicit | TlsMode::StartTls => {
            Some(material.into_connector(config.skip_verify)?)
        },
    };

    let mut last_error = Error::Config("`host` must list at least one server".into());
    for host in config.hosts() {
        let endpoint = Endpoint {
            host: host.to_owned(),
            port: config.port,
            tls: config.tls,
            skip_verify: config.skip_verify,
            timeout: config.conn_timeout(),
        };

        match connector.connect(&endpoint, tls.as_ref()).await {
            Ok(conn) => {
                tracing::debug!(address = %endpoint.address(), tls = ?endpoint.tls, "directory connected");
                return Ok(conn);
            },
            Err(err) => {
                tracing::warn!(address = %endpoint.address(), error = %err, "directory host unreachable");
                metrics::counter!("ldap_dial_failures_total").increment(1);
                last_error = err;
            },
        }
    }

    Err(last_error)
}
