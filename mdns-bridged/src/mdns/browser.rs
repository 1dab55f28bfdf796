use std::collections::HashMap;
use std::net::IpAddr;
use std::time::Duration;
use mdns_sd::{IfKind, ServiceDaemon, ServiceEvent, ServiceInfo};
use futures::future::{BoxFuture, FutureExt};
use anyhow::{Context, Result};
use chrono::Utc;
use shared::protocol::MDNS_DOMAIN;
use shared::types::ServiceEntry;
use super::Discovery;

/// Browses through an mdns-sd daemon, one bounded pass per call.
pub struct MdnsBrowser {
    daemon: ServiceDaemon,
    interface: Option<String>,
}

impl MdnsBrowser {
    /// Start the daemon, restricted to `bind_address` when it is non-empty.
    /// The address may be an interface name ("eth0") or an IP.
    pub fn new(bind_address: &str) -> Result<Self> {
        let daemon = ServiceDaemon::new().context("Failed to create mDNS daemon")?;

        let interface = if bind_address.is_empty() {
            None
        } else {
            daemon
                .disable_interface(IfKind::All)
                .context("Failed to disable default interfaces")?;
            let enabled = match bind_address.parse::<IpAddr>() {
                Ok(addr) => daemon.enable_interface(addr),
                Err(_) => daemon.enable_interface(bind_address),
            };
            enabled.with_context(|| format!("Failed to enable interface {}", bind_address))?;
            Some(bind_address.to_string())
        };

        Ok(Self { daemon, interface })
    }

    pub fn shutdown(&self) -> Result<()> {
        self.daemon
            .shutdown()
            .context("Failed to shut down mDNS daemon")?;
        Ok(())
    }

    async fn browse_once(&self, service_type: &str, timeout: Duration) -> Result<Vec<ServiceEntry>> {
        let full_type = format!("{}.{}.", service_type, MDNS_DOMAIN);
        let receiver = self
            .daemon
            .browse(&full_type)
            .with_context(|| format!("Failed to browse {}", full_type))?;

        // The daemon may resolve the same instance more than once per pass;
        // the last resolution wins.
        let mut resolved: HashMap<String, ServiceEntry> = HashMap::new();
        let deadline = tokio::time::Instant::now() + timeout;

        loop {
            match tokio::time::timeout_at(deadline, receiver.recv_async()).await {
                Err(_elapsed) => break,
                Ok(Ok(ServiceEvent::ServiceResolved(info))) => {
                    if let Some(entry) = self.convert_service_info(&info) {
                        tracing::debug!("Resolved service: {}", info.get_fullname());
                        resolved.insert(info.get_fullname().to_string(), entry);
                    }
                }
                Ok(Ok(_)) => {}
                Ok(Err(e)) => {
                    tracing::warn!("Browse receiver for {} disconnected: {}", full_type, e);
                    break;
                }
            }
        }

        if let Err(e) = self.daemon.stop_browse(&full_type) {
            tracing::warn!("Failed to stop browsing {}: {}", full_type, e);
        }

        Ok(resolved.into_values().collect())
    }

    /// Convert an mdns-sd ServiceInfo to our ServiceEntry
    fn convert_service_info(&self, info: &ServiceInfo) -> Option<ServiceEntry> {
        let addresses: Vec<IpAddr> = info.get_addresses().iter().copied().collect();
        if addresses.is_empty() {
            tracing::debug!("Skipping service {} - no addresses", info.get_fullname());
            return None;
        }

        let service_type = strip_domain(info.get_type());
        let instance_name = info
            .get_fullname()
            .strip_suffix(info.get_type())
            .and_then(|rest| rest.strip_suffix('.'))
            .unwrap_or_else(|| info.get_fullname())
            .to_string();

        let txt = info
            .get_properties()
            .iter()
            .map(|prop| {
                let value = prop.val_str();
                if value.is_empty() {
                    prop.key().to_string()
                } else {
                    format!("{}={}", prop.key(), value)
                }
            })
            .collect();

        Some(ServiceEntry {
            service_type,
            instance_name,
            hostname: info.get_hostname().to_string(),
            addresses,
            port: info.get_port(),
            txt,
            interface: self.interface.clone(),
            discovered_at: Utc::now(),
        })
    }
}

impl Discovery for MdnsBrowser {
    fn browse<'a>(
        &'a self,
        service_type: &'a str,
        timeout: Duration,
    ) -> BoxFuture<'a, Result<Vec<ServiceEntry>>> {
        self.browse_once(service_type, timeout).boxed()
    }
}

/// "_workstation._tcp.local." -> "_workstation._tcp"
fn strip_domain(full_type: &str) -> String {
    let trimmed = full_type.strip_suffix('.').unwrap_or(full_type);
    trimmed
        .strip_suffix(MDNS_DOMAIN)
        .and_then(|rest| rest.strip_suffix('.'))
        .unwrap_or(trimmed)
        .to_string()
}
