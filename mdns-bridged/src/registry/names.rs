//! Name handling shared by the config, the pass builder and the synthesizer.
//!
//! Registry keys are stored relative to both the mDNS `.local` domain and the
//! configured bridge domain, lowercased, without a trailing dot.

use shared::protocol::MDNS_DOMAIN;

const MAX_NAME_LEN: usize = 253;
const MAX_LABEL_LEN: usize = 63;

/// Where a query name falls relative to the bridge domain
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Scope {
    Outside,
    Apex,
    Inside(String),
}

pub fn is_valid_label(label: &str) -> bool {
    !label.is_empty()
        && label.len() <= MAX_LABEL_LEN
        && label
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'_')
}

/// Lowercase, drop one trailing dot and check every label.
/// Returns None for anything that is not a plain host-style name.
pub fn normalize(name: &str) -> Option<String> {
    let name = name.trim();
    let name = name.strip_suffix('.').unwrap_or(name);
    if name.is_empty() || name.len() > MAX_NAME_LEN {
        return None;
    }
    let lower = name.to_ascii_lowercase();
    lower.split('.').all(is_valid_label).then_some(lower)
}

/// Classify `query` against `domain` (already normalized).
pub fn scope(query: &str, domain: &str) -> Scope {
    let Some(name) = normalize(query) else {
        return Scope::Outside;
    };
    if name == domain {
        return Scope::Apex;
    }
    match name
        .strip_suffix(domain)
        .and_then(|rest| rest.strip_suffix('.'))
    {
        Some(relative) if !relative.is_empty() => Scope::Inside(relative.to_string()),
        _ => Scope::Outside,
    }
}

/// Registry key for an advertised host name, e.g. "Alice.local." -> "alice"
pub fn host_label(hostname: &str) -> Option<String> {
    let name = normalize(hostname)?;
    match name.strip_suffix(MDNS_DOMAIN) {
        Some("") => None,
        Some(rest) => match rest.strip_suffix('.') {
            Some(relative) => Some(relative.to_string()),
            None => Some(name),
        },
        None => Some(name),
    }
}

/// Alias key derived from an instance name.
///
/// Workstation instances look like "alice [52:54:00:aa:bb:cc]": the first
/// whitespace-separated token is kept and squeezed into a DNS label.
pub fn alias_label(instance_name: &str) -> Option<String> {
    let token = instance_name.split_whitespace().next()?;
    let mut label: String = token
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' {
                c.to_ascii_lowercase()
            } else {
                '-'
            }
        })
        .collect();
    label = label.trim_matches('-').to_string();
    label.truncate(MAX_LABEL_LEN);
    let label = label.trim_end_matches('-');
    (!label.is_empty()).then(|| label.to_string())
}

/// Absolute name of a registry key under the bridge domain
pub fn fqdn(relative: &str, domain: &str) -> String {
    format!("{relative}.{domain}.")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize() {
        assert_eq!(normalize("Alice.Local."), Some("alice.local".to_string()));
        assert_eq!(normalize("_workstation._tcp.local"), Some("_workstation._tcp.local".to_string()));
        assert_eq!(normalize(""), None);
        assert_eq!(normalize("."), None);
        assert_eq!(normalize("a..local."), None);
        assert_eq!(normalize("bad name.local."), None);
        assert_eq!(normalize(&format!("{}.local", "a".repeat(64))), None);
    }

    #[test]
    fn test_scope() {
        assert_eq!(scope("alice.local.", "local"), Scope::Inside("alice".to_string()));
        assert_eq!(scope("ALICE.example.com", "example.com"), Scope::Inside("alice".to_string()));
        assert_eq!(scope("local.", "local"), Scope::Apex);
        assert_eq!(scope("alice.xlocal.", "local"), Scope::Outside);
        assert_eq!(scope("example.org.", "local"), Scope::Outside);
        assert_eq!(scope("bad..local.", "local"), Scope::Outside);
    }

    #[test]
    fn test_host_label() {
        assert_eq!(host_label("alice.local."), Some("alice".to_string()));
        assert_eq!(host_label("Rack1.Alice.local"), Some("rack1.alice".to_string()));
        assert_eq!(host_label("alice.lan."), Some("alice.lan".to_string()));
        assert_eq!(host_label("local."), None);
        assert_eq!(host_label(""), None);
    }

    #[test]
    fn test_alias_label() {
        assert_eq!(alias_label("master-0 [52:54:00:aa:bb:cc]"), Some("master-0".to_string()));
        assert_eq!(alias_label("My_Printer"), Some("my-printer".to_string()));
        assert_eq!(alias_label("   "), None);
        assert_eq!(alias_label("[]"), None);
    }

    #[test]
    fn test_fqdn() {
        assert_eq!(fqdn("alice", "local"), "alice.local.");
    }
}
