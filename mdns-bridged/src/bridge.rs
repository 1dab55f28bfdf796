//! Wires configuration, registry, refresher and synthesizer together and
//! exposes the startup/shutdown hooks a host runtime calls.

use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use crate::config::{BridgeConfig, Config};
use crate::dns::handler::{BridgeHandler, Handler};
use crate::dns::synthesizer::Synthesizer;
use crate::mdns::Discovery;
use crate::refresher::Refresher;
use crate::registry::Registry;

pub struct Bridge {
    settings: Arc<BridgeConfig>,
    registry: Registry,
    synthesizer: Arc<Synthesizer>,
    refresher: Option<Refresher>,
    task: Option<JoinHandle<()>>,
    cancel: CancellationToken,
}

impl Bridge {
    pub fn new(config: &Config, discovery: Arc<dyn Discovery>) -> Self {
        let settings = Arc::new(config.bridge.clone());
        let registry = Registry::new(settings.min_srv_records);
        let synthesizer = Arc::new(Synthesizer::new(
            settings.domain.clone(),
            config.refresh.record_ttl_secs,
            registry.clone(),
        ));
        let refresher = Refresher::new(discovery, registry.clone(), &settings, &config.refresh);

        tracing::info!("domain:          {}", settings.domain);
        tracing::info!("types:           {:?}", settings.types);
        tracing::info!("min_srv_records: {}", settings.min_srv_records);
        tracing::info!("filter_text:     {}", settings.filter_text);
        tracing::info!("bind_address:    {}", settings.bind_address);

        Self {
            settings,
            registry,
            synthesizer,
            refresher: Some(refresher),
            task: None,
            cancel: CancellationToken::new(),
        }
    }

    pub fn settings(&self) -> Arc<BridgeConfig> {
        Arc::clone(&self.settings)
    }

    pub fn registry(&self) -> Registry {
        self.registry.clone()
    }

    /// This bridge as a stage in front of `next`
    pub fn handler(&self, next: Arc<dyn Handler>) -> BridgeHandler {
        BridgeHandler::new(Arc::clone(&self.synthesizer), next)
    }

    /// Launch the refresher in the background. Returns immediately.
    pub fn on_startup(&mut self) {
        match self.refresher.take() {
            Some(refresher) => self.task = Some(refresher.spawn(self.cancel.clone())),
            None => tracing::warn!("Bridge already started"),
        }
    }

    /// Ask the refresher to stop. Returns immediately; see `stopped`.
    pub fn on_shutdown(&self) {
        self.cancel.cancel();
    }

    /// Wait for the refresher task to exit after `on_shutdown`.
    pub async fn stopped(&mut self) {
        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                tracing::error!("Refresher task failed: {}", e);
            }
        }
    }
}
