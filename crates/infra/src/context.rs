//! Production wiring of the cache stack
//!
//! [`CacheContext`] builds the SQLite store, the reqwest transport and the
//! connectivity flag from a [`Config`], hands them to the core façade and
//! fetch service, and owns the sweep and replay schedulers.

use std::sync::Arc;

use async_trait::async_trait;
use tiercache_common::{
    ComponentHealth, Lifecycle, ManagerHealth, ManagerStatus, SharedClock, StatusCell, SystemClock,
};
use tiercache_core::{CacheFacade, FetchService, HttpTransport, KeyValueStore};
use tiercache_domain::{CacheError, Config, Result};
use tracing::{info, instrument, warn};

use crate::connectivity::NetworkStatus;
use crate::database::SqliteKeyValueStore;
use crate::http::ReqwestTransport;
use crate::scheduling::{
    ReplayScheduler, ReplaySchedulerConfig, SchedulerError, SweepScheduler, SweepSchedulerConfig,
};

pub struct CacheContext {
    config: Config,
    facade: Arc<CacheFacade>,
    fetch: FetchService,
    network: NetworkStatus,
    sweep: SweepScheduler,
    replay: ReplayScheduler,
    status: StatusCell,
}

impl CacheContext {
    /// Builds the production stack. Nothing touches disk or network until
    /// [`Lifecycle::initialize`].
    ///
    /// # Errors
    /// Returns `CacheError::Config` if the configuration is invalid, or the
    /// transport error if the HTTP client cannot be built.
    pub fn build(config: Config) -> Result<Self> {
        config.validate()?;
        let store = Arc::new(SqliteKeyValueStore::new(config.storage.clone()));
        let transport = Arc::new(ReqwestTransport::from_settings(&config.fetch)?);
        let network = NetworkStatus::online();
        Ok(Self::with_parts(config, store, transport, network, SystemClock::shared()))
    }

    /// Assembles a context from caller-supplied adapters.
    pub fn with_parts(
        config: Config,
        store: Arc<dyn KeyValueStore>,
        transport: Arc<dyn HttpTransport>,
        network: NetworkStatus,
        clock: SharedClock,
    ) -> Self {
        let facade = Arc::new(CacheFacade::new(&config.cache, store, clock.clone()));
        let fetch = FetchService::new(
            Arc::clone(&facade),
            transport,
            Arc::new(network.clone()),
            config.fetch.clone(),
            clock,
        );
        let sweep =
            SweepScheduler::new(Arc::clone(&facade), SweepSchedulerConfig::from(&config.cache));
        let replay = ReplayScheduler::new(
            fetch.clone(),
            Some(network.subscribe()),
            ReplaySchedulerConfig::from(&config.fetch),
        );

        Self { config, facade, fetch, network, sweep, replay, status: StatusCell::default() }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn facade(&self) -> &Arc<CacheFacade> {
        &self.facade
    }

    pub fn fetch(&self) -> &FetchService {
        &self.fetch
    }

    /// Connectivity flag; the host calls `set_online` as the network changes.
    pub fn network(&self) -> &NetworkStatus {
        &self.network
    }
}

fn ignore_not_running(result: std::result::Result<(), SchedulerError>, name: &str) {
    match result {
        Ok(()) | Err(SchedulerError::NotRunning) => {}
        Err(err) => warn!(scheduler = name, error = %err, "scheduler did not stop cleanly"),
    }
}

#[async_trait]
impl Lifecycle for CacheContext {
    type Error = CacheError;

    fn name(&self) -> &'static str {
        "cache_context"
    }

    #[instrument(skip(self))]
    async fn initialize(&self) -> Result<()> {
        if !self.status.transition(
            &[ManagerStatus::Created, ManagerStatus::Shutdown, ManagerStatus::Error],
            ManagerStatus::Initializing,
        ) {
            return Ok(());
        }

        let started = async {
            self.fetch.initialize().await?;
            self.sweep.start().await?;
            self.replay.start().await?;
            Ok::<_, CacheError>(())
        }
        .await;

        match started {
            Ok(()) => {
                self.status.set(ManagerStatus::Running);
                info!(db_path = %self.config.storage.path.display(), "cache context running");
                Ok(())
            }
            Err(err) => {
                ignore_not_running(self.sweep.stop().await, "sweep");
                ignore_not_running(self.replay.stop().await, "replay");
                self.status.set(ManagerStatus::Error);
                Err(err)
            }
        }
    }

    #[instrument(skip(self))]
    async fn shutdown(&self) -> Result<()> {
        if !self.status.transition(&[ManagerStatus::Running], ManagerStatus::ShuttingDown) {
            return Ok(());
        }

        ignore_not_running(self.replay.stop().await, "replay");
        ignore_not_running(self.sweep.stop().await, "sweep");
        self.fetch.shutdown().await?;
        self.facade.shutdown().await?;

        self.status.set(ManagerStatus::Shutdown);
        info!("cache context shut down");
        Ok(())
    }

    async fn health_check(&self) -> ManagerHealth {
        let status = self.status.get();
        if !status.is_running() {
            return ManagerHealth::unhealthy(format!("cache context is {status}"));
        }

        let cache = self.facade.health_check().await;
        let fetch = self.fetch.health_check().await;
        let schedulers = if self.sweep.is_running() && self.replay.is_running() {
            ComponentHealth::healthy("schedulers")
        } else {
            ComponentHealth::unhealthy("schedulers", "a background scheduler has stopped")
        };

        let score = cache.score.min(fetch.score);
        let mut health = if score >= 1.0 && schedulers.is_healthy {
            ManagerHealth::healthy()
        } else {
            let message = fetch.message.clone().or_else(|| cache.message.clone());
            ManagerHealth::degraded(
                score.min(if schedulers.is_healthy { 1.0 } else { 0.8 }),
                message.unwrap_or_else(|| "background scheduler stopped".to_string()),
            )
        };
        for component in cache.components {
            health = health.with_component(component);
        }
        health.with_component(schedulers)
    }

    fn status(&self) -> ManagerStatus {
        self.status.get()
    }
}
