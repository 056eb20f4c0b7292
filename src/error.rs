//! Error handler for autha-directory.

use ldap3::LdapError;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

/// LDAP result code returned when a bind is refused.
pub const INVALID_CREDENTIALS_CODE: u32 = 49;

/// Enum representing directory client errors.
#[derive(Debug, Error)]
pub enum Error {
    #[error("invalid configuration, {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TLS setup failed: {0}")]
    Tls(#[from] native_tls::Error),

    #[error("failed to deserialize configuration: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error(transparent)]
    Ldap(#[from] LdapError),

    /// The directory answered a bind with `invalidCredentials`.
    #[error("invalid username or password")]
    InvalidCredentials,

    /// Search returned no entry for the requested login.
    #[error("invalid username or password")]
    UserNotFound,

    #[error("no connection to the directory, call `dial` first")]
    NotConnected,

    #[error("no directory server configured")]
    NoServers,
}

impl Error {
    /// Whether the error is a credential rejection.
    ///
    /// Unknown logins and wrong passwords are both rejections, so callers can
    /// answer them identically.
    pub fn is_rejection(&self) -> bool {
        matches!(self, Error::InvalidCredentials | Error::UserNotFound)
    }

    /// LDAP result code carried by the error, if any.
    pub fn result_code(&self) -> Option<u32> {
        match self {
            Error::Ldap(LdapError::LdapResult { result }) => Some(result.rc),
            _ => None,
        }
    }

    /// Turn a refused bind into [`Error::InvalidCredentials`].
    pub(crate) fn from_bind(self) -> Self {
        if self.result_code() == Some(INVALID_CREDENTIALS_CODE) {
            Error::InvalidCredentials
        } else {
            self
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ldap3::LdapResult;

    fn ldap_result(rc: u32) -> Error {
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

    #[test]
    fn test_rejections_look_alike() {
        assert_eq!(
            Error::InvalidCredentials.to_string(),
            Error::UserNotFound.to_string()
        );
        assert!(Error::InvalidCredentials.is_rejection());
        assert!(Error::UserNotFound.is_rejection());
        assert!(!Error::NotConnected.is_rejection());
    }

    #[test]
    fn test_from_bind() {
        assert!(matches!(
            ldap_result(49).from_bind(),
            Error::InvalidCredentials
        ));

        let err = ldap_result(50).from_bind();
        assert_eq!(err.result_code(), Some(50));
        assert!(!err.is_rejection());
    }
}
