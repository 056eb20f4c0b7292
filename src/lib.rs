//! Directory (LDAP) authentication for Autha.
//!
//! [`Ldap`] verifies a login and a password against one directory server and
//! maps the matching entry into a [`User`]. [`MultiDirectory`] chains several
//! servers.
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use autha_directory::{Configuration, Ldap, LoginAttempt};
//!
//! # async fn run() -> autha_directory::error::Result<()> {
//! let config = Configuration::read(None)?;
//! for server in config.servers {
//!     let mut ldap = Ldap::new(Arc::new(server));
//!     let user = ldap.authenticate(&LoginAttempt::new("jane", "secret")).await?;
//!     println!("{} <{}>", user.name, user.email);
//! }
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]
#![deny(unused_mut)]

pub mod config;
pub mod connection;
pub mod credentials;
pub mod dial;
pub mod error;
pub mod ldap;
pub mod mapper;
pub mod multi;
pub mod search;
pub mod strategy;
pub mod telemetry;
pub mod user;

pub use config::{Configuration, ServerConfig, TlsMode};
pub use credentials::{LoginAttempt, Secret};
pub use error::{Error, Result};
pub use ldap::Ldap;
pub use multi::{MultiDirectory, ServerStatus};
pub use user::User;
