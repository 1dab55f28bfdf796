use std::collections::{BTreeMap, HashMap};
use std::net::IpAddr;
use serde::Serialize;
use sha2::{Sha256, Digest};
use shared::types::ServiceEntry;
use super::pass::HostRecord;

/// Hash only what a resolver could observe. `discovered_at` changes on
/// every pass without the answers changing.
#[derive(Serialize)]
struct EntryView<'a> {
    instance_name: &'a str,
    hostname: &'a str,
    addresses: Vec<IpAddr>,
    port: u16,
}

impl<'a> EntryView<'a> {
    fn of(entry: &'a ServiceEntry) -> Self {
        let mut addresses = entry.addresses.clone();
        addresses.sort();
        Self {
            instance_name: &entry.instance_name,
            hostname: &entry.hostname,
            addresses,
            port: entry.port,
        }
    }

    fn sort_key(&self) -> (&str, &str, u16, &[IpAddr]) {
        (self.instance_name, self.hostname, self.port, &self.addresses)
    }
}

#[derive(Serialize)]
struct SnapshotView<'a> {
    hosts: BTreeMap<&'a str, &'a HostRecord>,
    services: BTreeMap<&'a str, Vec<EntryView<'a>>>,
    aliases: BTreeMap<&'a str, &'a str>,
}

/// SHA-256 over a canonical JSON view of the three maps.
/// Keys, service sets and address lists are all sorted, so neither map
/// iteration order nor the order mDNS resolved things in leaks into the hash.
pub fn compute(
    hosts: &HashMap<String, HostRecord>,
    services: &HashMap<String, Vec<ServiceEntry>>,
    aliases: &HashMap<String, String>,
) -> String {
    let view = SnapshotView {
        hosts: hosts.iter().map(|(k, v)| (k.as_str(), v)).collect(),
        services: services
            .iter()
            .map(|(k, entries)| {
                let mut views: Vec<EntryView<'_>> = entries.iter().map(EntryView::of).collect();
                views.sort_by(|a, b| a.sort_key().cmp(&b.sort_key()));
                (k.as_str(), views)
            })
            .collect(),
        aliases: aliases.iter().map(|(k, v)| (k.as_str(), v.as_str())).collect(),
    };

    let json = serde_json::to_vec(&view)
        .expect("Failed to serialize snapshot for fingerprinting");
    hex::encode(Sha256::digest(&json))
}
