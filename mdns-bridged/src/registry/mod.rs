//! Shared store of everything the browse loop has discovered.
//!
//! One writer (the refresher) commits whole passes; any number of query
//! handlers read. Readers take an `Arc<Snapshot>` so one lookup sees the
//! hosts, services and aliases of a single commit.

pub mod fingerprint;
pub mod names;
pub mod pass;

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use chrono::{DateTime, Utc};
use shared::types::ServiceEntry;

pub use pass::{HostRecord, PassOutput};

/// The committed state visible to readers
#[derive(Debug, Clone)]
pub struct Snapshot {
    hosts: HashMap<String, HostRecord>,
    services: HashMap<String, Vec<ServiceEntry>>,
    aliases: HashMap<String, String>,
    min_srv_records: usize,
    generation: u64,
    refreshed_at: Option<DateTime<Utc>>,
    fingerprint: String,
}

impl Snapshot {
    fn empty(min_srv_records: usize) -> Self {
        let hosts = HashMap::new();
        let services = HashMap::new();
        let aliases = HashMap::new();
        let fingerprint = fingerprint::compute(&hosts, &services, &aliases);
        Self {
            hosts,
            services,
            aliases,
            min_srv_records,
            generation: 0,
            refreshed_at: None,
            fingerprint,
        }
    }

    pub fn host(&self, name: &str) -> Option<&HostRecord> {
        self.hosts.get(name)
    }

    /// A service set, but only once it holds at least `min_srv_records`
    /// entries. Anything shorter reads exactly like a missing key.
    pub fn services(&self, key: &str) -> Option<&[ServiceEntry]> {
        self.services
            .get(key)
            .filter(|entries| !entries.is_empty() && entries.len() >= self.min_srv_records)
            .map(Vec::as_slice)
    }

    pub fn alias(&self, name: &str) -> Option<&str> {
        self.aliases.get(name).map(String::as_str)
    }

    pub fn hosts(&self) -> impl Iterator<Item = (&str, &HostRecord)> {
        self.hosts.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Every published service set
    pub fn published_services(&self) -> impl Iterator<Item = (&str, &[ServiceEntry])> {
        self.services
            .keys()
            .filter_map(|key| self.services(key).map(|entries| (key.as_str(), entries)))
    }

    pub fn aliases(&self) -> impl Iterator<Item = (&str, &str)> {
        self.aliases.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn refreshed_at(&self) -> Option<DateTime<Utc>> {
        self.refreshed_at
    }

    pub fn fingerprint(&self) -> &str {
        &self.fingerprint
    }

    /// Replace every key the pass produced; keys it did not mention survive.
    fn merged_with(&self, pass: PassOutput) -> Self {
        let mut next = self.clone();
        next.hosts.extend(pass.hosts);
        next.services.extend(pass.services);
        next.aliases.extend(pass.aliases);
        next.generation += 1;
        next.refreshed_at = Some(Utc::now());
        next.fingerprint = fingerprint::compute(&next.hosts, &next.services, &next.aliases);
        next
    }
}

/// Cloneable handle; every clone shares the same state.
#[derive(Clone)]
pub struct Registry {
    current: Arc<RwLock<Arc<Snapshot>>>,
    writer: Arc<Mutex<()>>,
}

impl Registry {
    pub fn new(min_srv_records: usize) -> Self {
        Self {
            current: Arc::new(RwLock::new(Arc::new(Snapshot::empty(min_srv_records)))),
            writer: Arc::new(Mutex::new(())),
        }
    }

    /// Current snapshot. Holds the read lock only long enough to clone an Arc.
    pub fn snapshot(&self) -> Arc<Snapshot> {
        self.current
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Commit one pass. The merged snapshot is built before the write lock is
    /// taken, so readers only ever wait for a pointer swap.
    pub fn write_snapshot(&self, pass: PassOutput) -> Arc<Snapshot> {
        let _writer = self.writer.lock().unwrap_or_else(PoisonError::into_inner);
        let next = Arc::new(self.snapshot().merged_with(pass));
        {
            let mut guard = self.current.write().unwrap_or_else(PoisonError::into_inner);
            *guard = Arc::clone(&next);
        }
        next
    }

    pub fn read_host(&self, name: &str) -> Option<HostRecord> {
        self.snapshot().host(name).cloned()
    }

    pub fn read_services(&self, key: &str) -> Option<Vec<ServiceEntry>> {
        self.snapshot().services(key).map(<[ServiceEntry]>::to_vec)
    }

    pub fn read_alias(&self, name: &str) -> Option<String> {
        self.snapshot().alias(name).map(str::to_string)
    }
}
