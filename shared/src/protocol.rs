/// Service type browsed when the configuration names none
pub const DEFAULT_SERVICE_TYPE: &str = "_workstation._tcp";

/// Domain every mDNS name lives under
pub const MDNS_DOMAIN: &str = "local";

/// SRV fields used for every synthesized record
pub const SRV_PRIORITY: u16 = 0;
pub const SRV_WEIGHT: u16 = 10;

/// Longest CNAME chain followed before answering NXDOMAIN
pub const MAX_ALIAS_DEPTH: usize = 8;
