use std::collections::HashMap;
use std::net::{Ipv4Addr, Ipv6Addr};
use serde::Serialize;
use shared::types::ServiceEntry;
use super::names;

/// Addresses answered for one host name
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HostRecord {
    pub ipv4: Vec<Ipv4Addr>,
    pub ipv6: Vec<Ipv6Addr>,
}

impl HostRecord {
    /// Addresses come sorted and deduplicated so a host reads the same
    /// whatever order the responder listed them in.
    fn from_entry(entry: &ServiceEntry) -> Self {
        let mut ipv4: Vec<Ipv4Addr> = entry.ipv4().collect();
        let mut ipv6: Vec<Ipv6Addr> = entry.ipv6().collect();
        ipv4.sort();
        ipv4.dedup();
        ipv6.sort();
        ipv6.dedup();
        Self { ipv4, ipv6 }
    }
}

/// Everything one browse pass learned, keyed like the registry.
#[derive(Debug, Default, Clone)]
pub struct PassOutput {
    pub(crate) hosts: HashMap<String, HostRecord>,
    pub(crate) services: HashMap<String, Vec<ServiceEntry>>,
    pub(crate) aliases: HashMap<String, String>,
    filtered: usize,
}

impl PassOutput {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold one discovered entry into the pass.
    /// Returns false when the entry was filtered out or had no usable host name.
    pub fn ingest(&mut self, entry: ServiceEntry, filter: &str) -> bool {
        if !entry.mentions(filter) {
            tracing::debug!("Filtered out {}", entry.instance_name);
            self.filtered += 1;
            return false;
        }

        let Some(host) = names::host_label(&entry.hostname) else {
            tracing::debug!("Skipping {} - unusable host name {:?}", entry.instance_name, entry.hostname);
            return false;
        };

        self.hosts.insert(host.clone(), HostRecord::from_entry(&entry));

        if let Some(alias) = names::alias_label(&entry.instance_name) {
            if alias != host {
                self.aliases.insert(alias, host);
            }
        }

        self.services
            .entry(entry.service_type.clone())
            .or_default()
            .push(entry);
        true
    }

    pub fn is_empty(&self) -> bool {
        self.hosts.is_empty() && self.services.is_empty() && self.aliases.is_empty()
    }

    pub fn host_count(&self) -> usize {
        self.hosts.len()
    }

    pub fn service_count(&self) -> usize {
        self.services.values().map(Vec::len).sum()
    }

    pub fn alias_count(&self) -> usize {
        self.aliases.len()
    }

    pub fn filtered_count(&self) -> usize {
        self.filtered
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::net::IpAddr;
    use chrono::Utc;

    pub(crate) fn entry(instance: &str, host: &str, port: u16) -> ServiceEntry {
        ServiceEntry {
            service_type: "_workstation._tcp".to_string(),
            instance_name: instance.to_string(),
            hostname: host.to_string(),
            addresses: vec![IpAddr::V4(Ipv4Addr::new(192, 168, 1, port as u8))],
            port,
            txt: Vec::new(),
            interface: None,
            discovered_at: Utc::now(),
        }
    }

    #[test]
    fn test_ingest_builds_all_three_maps() {
        let mut pass = PassOutput::new();
        assert!(pass.ingest(entry("master-0 [52:54:00:00:00:01]", "node1.local.", 9), ""));

        assert_eq!(pass.hosts["node1"].ipv4, vec![Ipv4Addr::new(192, 168, 1, 9)]);
        assert_eq!(pass.services["_workstation._tcp"].len(), 1);
        assert_eq!(pass.aliases["master-0"], "node1");
    }

    #[test]
    fn test_alias_equal_to_host_is_skipped() {
        let mut pass = PassOutput::new();
        pass.ingest(entry("alice [aa]", "alice.local.", 9), "");
        assert!(pass.aliases.is_empty());
    }

    #[test]
    fn test_later_entry_overwrites_host() {
        let mut pass = PassOutput::new();
        pass.ingest(entry("a", "alice.local.", 1), "");
        pass.ingest(entry("b", "alice.local.", 2), "");

        assert_eq!(pass.hosts["alice"].ipv4, vec![Ipv4Addr::new(192, 168, 1, 2)]);
        assert_eq!(pass.service_count(), 2);
    }

    #[test]
    fn test_filter_discards_non_matching() {
        let mut pass = PassOutput::new();
        let mut tagged = entry("worker-1", "w1.local.", 3);
        tagged.txt = vec!["cluster=east".to_string()];

        assert!(!pass.ingest(entry("worker-2", "w2.local.", 4), "east"));
        assert!(pass.ingest(tagged, "east"));

        assert_eq!(pass.host_count(), 1);
        assert!(pass.hosts.contains_key("w1"));
        assert!(!pass.aliases.contains_key("worker-2"));
        assert_eq!(pass.filtered_count(), 1);
    }

    #[test]
    fn test_host_addresses_are_sorted() {
        let mut pass = PassOutput::new();
        let mut e = entry("a", "alice.local.", 1);
        e.addresses = vec![
            IpAddr::V4(Ipv4Addr::new(10, 0, 0, 9)),
            IpAddr::V4(Ipv4Addr::new(10, 0, 0, 3)),
            IpAddr::V4(Ipv4Addr::new(10, 0, 0, 9)),
        ];
        pass.ingest(e, "");
        assert_eq!(
            pass.hosts["alice"].ipv4,
            vec![Ipv4Addr::new(10, 0, 0, 3), Ipv4Addr::new(10, 0, 0, 9)]
        );
    }

    #[test]
    fn test_unusable_host_is_skipped() {
        let mut pass = PassOutput::new();
        assert!(!pass.ingest(entry("x", "", 1), ""));
        assert!(pass.is_empty());
    }
}
