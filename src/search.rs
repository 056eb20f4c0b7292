//! Search filters and batching.

use std::fmt::Write;
use std::ops::Range;

use crate::config::{PLACEHOLDER, ServerConfig};
use crate::connection::{DerefAliases, Scope, SearchRequest};

/// Maximum logins requested in one search.
///
/// Many directory servers cap the number of entries a single search returns.
pub const USERS_MAX_REQUEST: usize = 500;

/// Escape a value for use inside a search filter.
///
/// `*`, `(`, `)`, `\`, NUL and non-ASCII bytes become `\xx`.
pub fn escape_filter(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for b in input.bytes() {
        match b {
            b'*' | b'(' | b')' | b'\\' | 0 | 0x80.. => {
                let _ = write!(out, "\\{b:02x}");
            },
            c => out.push(c as char),
        }
    }
    out
}

/// Whether parentheses of a filter are balanced and it is wrapped in one
/// outer group.
pub fn is_well_formed(filter: &str) -> bool {
    if !filter.starts_with('(') || !filter.ends_with(')') {
        return false;
    }

    let mut depth: usize = 0;
    for (i, c) in filter.char_indices() {
        match c {
            '(' => depth += 1,
            ')' => {
                depth = match depth.checked_sub(1) {
                    Some(depth) => depth,
                    None => return false,
                };
                // Outer group closes before the end.
                if depth == 0 && i != filter.len() - 1 {
                    return false;
                }
            },
            _ => {},
        }
    }

    depth == 0
}

/// Replace every placeholder of `template` with the escaped `value`.
pub fn render_filter(template: &str, value: &str) -> String {
    template.replace(PLACEHOLDER, &escape_filter(value))
}

/// Consecutive ranges of at most `max` items covering `0..len`.
///
/// # Panics
///
/// Panics if `max` is zero.
pub fn batches(len: usize, max: usize) -> impl Iterator<Item = Range<usize>> {
    (0..len)
        .step_by(max)
        .map(move |start| start..usize::min(start + max, len))
}

/// Attributes requested for users, skipping disabled ones.
pub fn user_attributes(config: &ServerConfig) -> Vec<String> {
    let attrs = &config.attributes;
    [
        &attrs.username,
        &attrs.surname,
        &attrs.email,
        &attrs.name,
        &attrs.member_of,
        // POSIX schemas resolve groups from this attribute.
        &config.group_search_filter_user_attribute,
    ]
    .into_iter()
    .filter(|attr| !attr.is_empty())
    .cloned()
    .collect()
}

/// Search request matching any of `logins` under `base`.
pub fn user_search_request<S: AsRef<str>>(
    config: &ServerConfig,
    base: &str,
    logins: &[S],
) -> SearchRequest {
    let search = logins
        .iter()
        .map(|login| render_filter(&config.search_filter, login.as_ref()))
        .collect::<String>();

    SearchRequest {
        base_dn: base.to_owned(),
        scope: Scope::WholeSubtree,
        deref_aliases: DerefAliases::Never,
        filter: format!("(|{search})"),
        attributes: user_attributes(config),
    }
}

/// Search request for the groups of a member.
pub fn group_search_request(
    config: &ServerConfig,
    base: &str,
    member: &str,
    id_attribute: &str,
) -> SearchRequest {
    SearchRequest {
        base_dn: base.to_owned(),
        scope: Scope::WholeSubtree,
        deref_aliases: DerefAliases::Never,
        filter: render_filter(&config.group_search_filter, member),
        attributes: vec![id_attribute.to_owned()],
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AttributeMap;

    #[test]
    fn test_escape_filter() {
        assert_eq!(escape_filter("alice"), "alice");
        assert_eq!(escape_filter("*"), r"\2a");
        assert_eq!(escape_filter("a)(uid=*"), r"a\29\28uid=\2a");
        assert_eq!(escape_filter(r"back\slash"), r"back\5cslash");
        assert_eq!(escape_filter("nul\0"), r"nul\00");
        assert_eq!(escape_filter("é"), r"\c3\a9");
    }

    #[test]
    fn test_filter_injection() {
        let config = ServerConfig::default();
        let request =
            user_search_request(&config, "dc=x", &["*)(objectClass=*"]);

        assert_eq!(request.filter, r"(|(uid=\2a\29\28objectClass=\2a))");
        assert!(is_well_formed(&request.filter));
    }

    #[test]
    fn test_is_well_formed() {
        assert!(is_well_formed("(uid=%s)"));
        assert!(is_well_formed("(&(objectClass=person)(uid=%s))"));
        assert!(!is_well_formed("uid=%s"));
        assert!(!is_well_formed("(uid=%s"));
        assert!(!is_well_formed("(uid=%s))"));
        assert!(!is_well_formed("(a)(b)"));
    }

    #[test]
    fn test_batches() {
        let ranges = batches(1200, USERS_MAX_REQUEST).collect::<Vec<_>>();
        assert_eq!(ranges, [0..500, 500..1000, 1000..1200]);

        assert_eq!(batches(500, USERS_MAX_REQUEST).count(), 1);
        assert_eq!(batches(501, USERS_MAX_REQUEST).count(), 2);
        assert_eq!(batches(0, USERS_MAX_REQUEST).count(), 0);
    }

    #[test]
    fn test_user_search_request() {
        let config = ServerConfig {
            search_filter: "(&(objectClass=person)(uid=%s))".into(),
            group_search_filter_user_attribute: "uidNumber".into(),
            attributes: AttributeMap {
                surname: String::new(),
                ..Default::default()
            },
            ..Default::default()
        };
        let request = user_search_request(&config, "ou=people,dc=x", &["alice", "bob"]);

        assert_eq!(request.base_dn, "ou=people,dc=x");
        assert_eq!(request.scope, Scope::WholeSubtree);
        assert_eq!(request.deref_aliases, DerefAliases::Never);
        assert_eq!(
            request.filter,
            "(|(&(objectClass=person)(uid=alice))(&(objectClass=person)(uid=bob)))"
        );
        assert_eq!(
            request.attributes,
            ["uid", "mail", "givenName", "memberOf", "uidNumber"]
        );
    }

    #[test]
    fn test_group_search_request() {
        let config = ServerConfig {
            group_search_filter: "(&(objectClass=posixGroup)(memberUid=%s))".into(),
            ..Default::default()
        };
        let request = group_search_request(&config, "ou=groups,dc=x", "ali*ce", "dn");

        assert_eq!(request.filter, r"(&(objectClass=posixGroup)(memberUid=ali\2ace))");
        assert_eq!(request.attributes, ["dn"]);
    }
}
