use std::sync::Arc;
use std::time::Duration;
use anyhow::{anyhow, Result};
use futures::future::join_all;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use shared::types::ServiceEntry;
use crate::config::{BridgeConfig, RefreshConfig};
use crate::mdns::Discovery;
use crate::registry::{PassOutput, Registry};

/// Slack on top of the browse timeout before a pass gives up on an adapter
/// that ignores its own deadline.
const BROWSE_GRACE: Duration = Duration::from_secs(1);

/// What one pass did, mostly for logging and tests
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct PassSummary {
    pub discovered: usize,
    pub ingested: usize,
    pub failed_types: usize,
    pub committed: bool,
}

/// Periodically browses every configured service type and commits the
/// result to the registry. The only writer the registry has.
pub struct Refresher {
    discovery: Arc<dyn Discovery>,
    registry: Registry,
    service_types: Vec<String>,
    filter: String,
    interval: Duration,
    browse_timeout: Duration,
}

impl Refresher {
    pub fn new(
        discovery: Arc<dyn Discovery>,
        registry: Registry,
        bridge: &BridgeConfig,
        refresh: &RefreshConfig,
    ) -> Self {
        Self {
            discovery,
            registry,
            service_types: bridge.types.clone(),
            filter: bridge.filter_text.clone(),
            interval: refresh.interval(),
            browse_timeout: refresh.browse_timeout(),
        }
    }

    pub fn with_timing(mut self, interval: Duration, browse_timeout: Duration) -> Self {
        self.interval = interval;
        self.browse_timeout = browse_timeout;
        self
    }

    /// One browse pass over every service type, committed atomically.
    /// Types that fail or time out are logged and contribute nothing.
    pub async fn refresh_once(&self) -> PassSummary {
        let browses: Vec<_> = self.service_types.iter().map(|t| self.browse_type(t)).collect();
        let results = join_all(browses).await;

        let mut summary = PassSummary::default();
        let mut pass = PassOutput::new();
        for (service_type, result) in self.service_types.iter().zip(results) {
            match result {
                Ok(entries) => {
                    tracing::debug!("Browse of {} returned {} entries", service_type, entries.len());
                    for entry in entries {
                        summary.discovered += 1;
                        if pass.ingest(entry, &self.filter) {
                            summary.ingested += 1;
                        }
                    }
                }
                Err(e) => {
                    tracing::warn!("Browse of {} failed: {:#}", service_type, e);
                    summary.failed_types += 1;
                }
            }
        }

        if pass.is_empty() {
            tracing::debug!("Browse pass found nothing to commit");
            return summary;
        }

        let (hosts, services, aliases) = (pass.host_count(), pass.service_count(), pass.alias_count());
        let filtered = pass.filtered_count();
        let snapshot = self.registry.write_snapshot(pass);
        summary.committed = true;

        tracing::info!(
            generation = snapshot.generation(),
            hosts,
            services,
            aliases,
            filtered,
            "Committed browse pass"
        );
        summary
    }

    async fn browse_type(&self, service_type: &str) -> Result<Vec<ServiceEntry>> {
        let limit = self.browse_timeout + BROWSE_GRACE;
        tokio::time::timeout(limit, self.discovery.browse(service_type, self.browse_timeout))
            .await
            .map_err(|_| anyhow!("no answer from discovery within {:?}", limit))?
    }

    /// Browse, commit, sleep; until `cancel` fires. A pass already in flight
    /// is allowed to finish, which bounds shutdown by the browse timeout.
    pub async fn run(self, cancel: CancellationToken) {
        tracing::info!(
            "Starting refresher for {:?} every {:?}",
            self.service_types,
            self.interval
        );

        loop {
            if cancel.is_cancelled() {
                break;
            }

            let summary = self.refresh_once().await;
            if summary.failed_types == self.service_types.len() {
                tracing::warn!("Every browse failed this pass; serving previous data");
            }
            tracing::debug!(
                "Pass done: {} discovered, {} ingested, committed: {}",
                summary.discovered,
                summary.ingested,
                summary.committed
            );

            tokio::select! {
                _ = tokio::time::sleep(self.interval) => {}
                _ = cancel.cancelled() => break,
            }
        }

        tracing::info!("Refresher shutting down");
    }

    pub fn spawn(self, cancel: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(self.run(cancel))
    }
}
