use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};
use chrono::{DateTime, Utc};
use serde::{Serialize, Deserialize};

/// One advertisement seen during a browse pass.
/// Produced fresh by every pass and never mutated afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceEntry {
    /// Service type without the mDNS domain, e.g. "_workstation._tcp"
    pub service_type: String,

    /// Instance label, e.g. "alice [52:54:00:12:34:56]"
    pub instance_name: String,

    /// Fully qualified mDNS host name, e.g. "alice.local."
    pub hostname: String,

    /// Every address advertised for the host
    pub addresses: Vec<IpAddr>,

    /// Service port
    pub port: u16,

    /// TXT strings, "key=value" or a bare "key"
    pub txt: Vec<String>,

    /// Interface or address the browse was bound to, if any
    pub interface: Option<String>,

    /// When the pass that produced this entry saw it
    pub discovered_at: DateTime<Utc>,
}

impl ServiceEntry {
    pub fn ipv4(&self) -> impl Iterator<Item = Ipv4Addr> + '_ {
        self.addresses.iter().filter_map(|addr| match addr {
            IpAddr::V4(v4) => Some(*v4),
            IpAddr::V6(_) => None,
        })
    }

    pub fn ipv6(&self) -> impl Iterator<Item = Ipv6Addr> + '_ {
        self.addresses.iter().filter_map(|addr| match addr {
            IpAddr::V6(v6) => Some(*v6),
            IpAddr::V4(_) => None,
        })
    }

    /// True when the instance name or any TXT string contains `needle`.
    /// An empty needle matches every entry.
    pub fn mentions(&self, needle: &str) -> bool {
        self.instance_name.contains(needle) || self.txt.iter().any(|t| t.contains(needle))
    }
}
