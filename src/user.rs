use serde::{Deserialize, Serialize};

/// Where a [`User`] comes from.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuthModule {
    #[default]
    Ldap,
}

/// User as found on the directory.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    /// Display name, first name and surname.
    pub name: String,
    pub login: String,
    pub email: String,
    /// Distinguished name of the entry, used to verify the password.
    pub dn: String,
    pub groups: Vec<String>,
    pub auth_module: AuthModule,
}
