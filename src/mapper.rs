//! Projection of directory entries into [`User`].

use crate::config::AttributeMap;
use crate::connection::Entry;
use crate::user::{AuthModule, User};

/// Attribute name standing for the entry's own DN.
pub const DN_ATTRIBUTE: &str = "dn";

/// First value of an attribute, or an empty string.
pub fn attribute<'a>(name: &str, entry: &'a Entry) -> &'a str {
    if name.eq_ignore_ascii_case(DN_ATTRIBUTE) {
        return &entry.dn;
    }

    if name.is_empty() {
        return "";
    }

    entry
        .values(name)
        .and_then(<[String]>::first)
        .map(String::as_str)
        .unwrap_or_default()
}

/// Every value of an attribute.
pub fn array_attribute(name: &str, entry: &Entry) -> Vec<String> {
    if name.eq_ignore_ascii_case(DN_ATTRIBUTE) {
        return vec![entry.dn.clone()];
    }

    if name.is_empty() {
        return Vec::new();
    }

    entry.values(name).map(<[String]>::to_vec).unwrap_or_default()
}

/// Build a [`User`] from an entry and its resolved groups.
pub fn build_user(attrs: &AttributeMap, entry: &Entry, groups: Vec<String>) -> User {
    let name = format!(
        "{} {}",
        attribute(&attrs.name, entry),
        attribute(&attrs.surname, entry)
    );

    User {
        name: name.trim().to_owned(),
        login: attribute(&attrs.username, entry).to_owned(),
        email: attribute(&attrs.email, entry).to_owned(),
        dn: entry.dn.clone(),
        groups,
        auth_module: AuthModule::Ldap,
    }
}
