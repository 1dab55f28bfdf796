//! Turns a query name and type into records from one registry snapshot.

use std::collections::HashSet;
use std::net::{Ipv4Addr, Ipv6Addr};
use hickory_proto::rr::RecordType;
use shared::protocol::{MAX_ALIAS_DEPTH, SRV_PRIORITY, SRV_WEIGHT};
use crate::registry::names::{self, Scope};
use crate::registry::{HostRecord, Registry, Snapshot};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecordData {
    A(Ipv4Addr),
    Aaaa(Ipv6Addr),
    Srv {
        priority: u16,
        weight: u16,
        port: u16,
        target: String,
    },
    Cname(String),
}

/// A synthesized resource record; names are absolute with a trailing dot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SynthRecord {
    pub name: String,
    pub ttl: u32,
    pub data: RecordData,
}

/// Outcome of one lookup
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    /// Authoritative positive answer
    Answer {
        answers: Vec<SynthRecord>,
        additionals: Vec<SynthRecord>,
    },
    /// The name exists but has nothing of the asked type
    NoData,
    /// In our domain but unknown
    NxDomain,
    /// Not our domain, hand it to the next handler
    Delegate,
}

pub struct Synthesizer {
    domain: String,
    ttl: u32,
    registry: Registry,
}

impl Synthesizer {
    /// `domain` must already be normalized (see `Config::parse`).
    pub fn new(domain: impl Into<String>, ttl: u32, registry: Registry) -> Self {
        Self {
            domain: domain.into(),
            ttl,
            registry,
        }
    }

    pub fn resolve(&self, qname: &str, qtype: RecordType) -> Resolution {
        let relative = match names::scope(qname, &self.domain) {
            Scope::Outside => return Resolution::Delegate,
            Scope::Apex => return Resolution::NoData,
            Scope::Inside(relative) => relative,
        };

        let snapshot = self.registry.snapshot();

        if let Some(host) = snapshot.host(&relative) {
            let answers = self.address_records(&relative, host, qtype);
            return answer_or_nodata(answers, Vec::new());
        }

        if let Some(entries) = snapshot.services(&relative) {
            if !matches!(qtype, RecordType::SRV | RecordType::ANY) {
                return Resolution::NoData;
            }
            let owner = names::fqdn(&relative, &self.domain);
            let mut answers = Vec::with_capacity(entries.len());
            let mut additionals = Vec::new();
            let mut glued = HashSet::new();
            for entry in entries {
                let Some(target) = names::host_label(&entry.hostname) else {
                    continue;
                };
                answers.push(self.record(
                    &owner,
                    RecordData::Srv {
                        priority: SRV_PRIORITY,
                        weight: SRV_WEIGHT,
                        port: entry.port,
                        target: names::fqdn(&target, &self.domain),
                    },
                ));
                if glued.insert(target.clone()) {
                    if let Some(host) = snapshot.host(&target) {
                        additionals.extend(self.address_records(&target, host, RecordType::ANY));
                    }
                }
            }
            return answer_or_nodata(answers, additionals);
        }

        if snapshot.alias(&relative).is_some() {
            return self.resolve_alias(&snapshot, relative, qtype);
        }

        Resolution::NxDomain
    }

    /// Follow a CNAME chain to a host. Chains that end nowhere, loop, or run
    /// longer than MAX_ALIAS_DEPTH answer NXDOMAIN.
    fn resolve_alias(&self, snapshot: &Snapshot, start: String, qtype: RecordType) -> Resolution {
        let mut answers = Vec::new();
        let mut seen = HashSet::new();
        let mut current = start;

        loop {
            if let Some(host) = snapshot.host(&current) {
                if qtype != RecordType::CNAME {
                    answers.extend(self.address_records(&current, host, qtype));
                }
                return Resolution::Answer {
                    answers,
                    additionals: Vec::new(),
                };
            }

            let Some(target) = snapshot.alias(&current) else {
                tracing::debug!("Alias chain ends at unknown name {}", current);
                return Resolution::NxDomain;
            };
            if answers.len() >= MAX_ALIAS_DEPTH || !seen.insert(current.clone()) {
                tracing::debug!("Alias chain through {} loops or is too long", current);
                return Resolution::NxDomain;
            }

            answers.push(self.record(
                &names::fqdn(&current, &self.domain),
                RecordData::Cname(names::fqdn(target, &self.domain)),
            ));
            current = target.to_string();
        }
    }

    fn address_records(&self, relative: &str, host: &HostRecord, qtype: RecordType) -> Vec<SynthRecord> {
        let owner = names::fqdn(relative, &self.domain);
        let mut records = Vec::new();
        if matches!(qtype, RecordType::A | RecordType::ANY) {
            records.extend(host.ipv4.iter().map(|ip| self.record(&owner, RecordData::A(*ip))));
        }
        if matches!(qtype, RecordType::AAAA | RecordType::ANY) {
            records.extend(host.ipv6.iter().map(|ip| self.record(&owner, RecordData::Aaaa(*ip))));
        }
        records
    }

    fn record(&self, name: &str, data: RecordData) -> SynthRecord {
        SynthRecord {
            name: name.to_string(),
            ttl: self.ttl,
            data,
        }
    }
}

fn answer_or_nodata(answers: Vec<SynthRecord>, additionals: Vec<SynthRecord>) -> Resolution {
    if answers.is_empty() {
        Resolution::NoData
    } else {
        Resolution::Answer { answers, additionals }
    }
}
