//! The worker: lifecycle hooks plus request handling.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tracing::{debug, info};
use url::Url;

use crate::clients::ClientControl;
use crate::config::WorkerConfig;
use crate::error::{ConfigError, FetchError};
use crate::http::{Request, Response};
use crate::lifecycle::{self, ActivationReport, InstallReport};
use crate::manifest::AssetManifest;
use crate::network::Network;
use crate::router::{Route, Router};
use crate::store::CacheStorage;
use crate::strategy::{PolicyContext, WriteBehind};

/// Worker lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum WorkerState {
    /// Constructed, no lifecycle event seen yet.
    #[default]
    Parsed,
    Installing,
    /// Installed and waiting to be activated.
    Installed,
    Activating,
    /// Active and controlling pages.
    Activated,
}

/// One worker version. Holds its configuration for its whole life; a new
/// configuration means a new worker.
pub struct ServiceWorker {
    config: Arc<WorkerConfig>,
    router: Router,
    policies: PolicyContext,
    clients: Arc<dyn ClientControl>,
    state: watch::Sender<WorkerState>,
}

impl ServiceWorker {
    pub fn new(
        config: WorkerConfig,
        storage: Arc<dyn CacheStorage>,
        network: Arc<dyn Network>,
        clients: Arc<dyn ClientControl>,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        let router = Router::new(&config)?;
        let manifest = AssetManifest::from_config(&config)?;

        let policies = PolicyContext {
            versions: Arc::new(config.versions.clone()),
            manifest: Arc::new(manifest),
            storage,
            network,
            writes: WriteBehind::new(),
        };

        Ok(Self {
            config: Arc::new(config),
            router,
            policies,
            clients,
            state: watch::Sender::new(WorkerState::Parsed),
        })
    }

    pub fn config(&self) -> &WorkerConfig {
        &self.config
    }

    pub fn manifest(&self) -> &AssetManifest {
        &self.policies.manifest
    }

    pub fn state(&self) -> WorkerState {
        *self.state.borrow()
    }

    pub fn subscribe_state(&self) -> watch::Receiver<WorkerState> {
        self.state.subscribe()
    }

    fn set_state(&self, state: WorkerState) {
        debug!(?state, "Worker state change");
        self.state.send_replace(state);
    }

    /// Install hook: pre-populate both caches, then ask to be activated
    /// immediately.
    pub async fn install(&self) -> InstallReport {
        info!(
            static_cache = %self.policies.versions.static_version,
            cdn_cache = %self.policies.versions.cdn_version,
            "Worker installing, caching assets"
        );
        self.set_state(WorkerState::Installing);

        let report = lifecycle::install(&self.policies).await;

        self.set_state(WorkerState::Installed);
        self.clients.skip_waiting().await;
        report
    }

    /// Activate hook: drop old cache generations, then take control of
    /// open pages.
    pub async fn activate(&self) -> ActivationReport {
        info!("Worker activating, cleaning up old caches");
        self.set_state(WorkerState::Activating);

        let report = lifecycle::activate(&self.policies).await;

        self.clients.claim().await;
        self.set_state(WorkerState::Activated);
        report
    }

    pub fn route(&self, url: &Url) -> Route {
        self.router.classify(url)
    }

    /// Fetch hook.
    pub async fn handle_fetch(&self, request: &Request) -> Result<Response, FetchError> {
        let route = self.route(&request.url);
        debug!(url = %request.url, method = %request.method, %route, "Handling fetch");
        self.policies.dispatch(route, request).await
    }

    /// Controller-change hook: a page is now served by this worker.
    pub fn on_controller_change(&self, client_id: &str) {
        info!(
            client = client_id,
            "New worker took control; the application can reload for new features"
        );
    }

    /// Wait for background cache writes started by earlier fetches.
    pub async fn settle(&self) {
        self.policies.writes.settle().await;
    }

    pub fn pending_writes(&self) -> usize {
        self.policies.writes.pending()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clients::{ClientRegistry, WorkerEvent};
    use crate::store::MemoryCacheStorage;
    use crate::strategy::testing::ScriptedNetwork;

    fn worker(network: ScriptedNetwork) -> (ServiceWorker, Arc<ClientRegistry>) {
        let (clients, _rx) = ClientRegistry::new();
        let clients = Arc::new(clients);
        let worker = ServiceWorker::new(
            WorkerConfig::default(),
            Arc::new(MemoryCacheStorage::new()),
            Arc::new(network),
            clients.clone(),
        )
        .unwrap();
        (worker, clients)
    }

    #[tokio::test]
    async fn test_lifecycle_states() {
        let (worker, clients) = worker(ScriptedNetwork::offline());
        let mut states = worker.subscribe_state();
        assert_eq!(worker.state(), WorkerState::Parsed);

        worker.install().await;
        assert_eq!(worker.state(), WorkerState::Installed);
        assert!(states.has_changed().unwrap());
        assert_eq!(*states.borrow_and_update(), WorkerState::Installed);
        assert!(clients.skip_waiting_requested());

        worker.activate().await;
        assert_eq!(worker.state(), WorkerState::Activated);
        assert_eq!(clients.claim_count(), 1);
    }

    #[tokio::test]
    async fn test_offline_install_still_signals_skip_waiting() {
        let (worker, clients) = worker(ScriptedNetwork::offline());

        let report = worker.install().await;

        assert!(report.static_result.is_err());
        assert_eq!(report.cdn_skipped.len(), 2);
        assert!(clients.skip_waiting_requested());
    }

    #[tokio::test]
    async fn test_claim_reaches_open_pages() {
        let (registry, mut rx) = ClientRegistry::new();
        let registry = Arc::new(registry);
        let page = registry.open(Url::parse("http://localhost:8080/").unwrap()).await;
        let worker = ServiceWorker::new(
            WorkerConfig::default(),
            Arc::new(MemoryCacheStorage::new()),
            Arc::new(ScriptedNetwork::offline()),
            registry.clone(),
        )
        .unwrap();

        worker.activate().await;

        assert_eq!(
            rx.try_recv().unwrap(),
            WorkerEvent::ControllerChange { client_id: page.clone() }
        );
        worker.on_controller_change(&page);
    }

    #[test]
    fn test_invalid_config_is_rejected() {
        let (clients, _rx) = ClientRegistry::new();
        let config = WorkerConfig {
            api_hosts: vec![String::new()],
            ..WorkerConfig::default()
        };
        let result = ServiceWorker::new(
            config,
            Arc::new(MemoryCacheStorage::new()),
            Arc::new(ScriptedNetwork::offline()),
            Arc::new(clients),
        );
        assert!(matches!(result, Err(ConfigError::InvalidHost(_))));
    }

    #[tokio::test]
    async fn test_handle_fetch_routes_by_host() {
        let (worker, _clients) = worker(ScriptedNetwork::offline());
        let api = Request::get(Url::parse("https://graphql.anilist.co/").unwrap());

        let response = worker.handle_fetch(&api).await.unwrap();
        assert_eq!(response.status, 503);
        assert_eq!(worker.pending_writes(), 0);
    }
}
