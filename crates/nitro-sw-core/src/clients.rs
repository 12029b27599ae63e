//! Control over the pages a worker serves.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use async_trait::async_trait;
use tokio::sync::{mpsc, RwLock};
use tracing::debug;
use url::Url;

/// What the worker may ask of its host environment.
#[async_trait]
pub trait ClientControl: Send + Sync {
    /// Activate this worker without waiting for the previous one's pages
    /// to close.
    async fn skip_waiting(&self);

    /// Take control of every open page in scope.
    async fn claim(&self);
}

/// Notifications sent to the host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkerEvent {
    SkipWaiting,
    ControllerChange { client_id: String },
}

#[derive(Debug, Clone)]
pub struct Client {
    pub id: String,
    pub url: Url,
    pub controlled: bool,
}

/// In-process client list.
///
/// `claim` marks every uncontrolled client as controlled and emits one
/// `ControllerChange` per client, which the host relays back to the worker's
/// controller-change hook.
pub struct ClientRegistry {
    clients: RwLock<BTreeMap<String, Client>>,
    skip_waiting: AtomicBool,
    claims: AtomicU64,
    next_id: AtomicU64,
    event_tx: mpsc::UnboundedSender<WorkerEvent>,
}

impl ClientRegistry {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<WorkerEvent>) {
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        (
            Self {
                clients: RwLock::new(BTreeMap::new()),
                skip_waiting: AtomicBool::new(false),
                claims: AtomicU64::new(0),
                next_id: AtomicU64::new(1),
                event_tx,
            },
            event_rx,
        )
    }

    /// Register an open page. Returns its id.
    pub async fn open(&self, url: Url) -> String {
        let id = format!("client-{}", self.next_id.fetch_add(1, Ordering::Relaxed));
        let client = Client {
            id: id.clone(),
            url,
            controlled: false,
        };
        self.clients.write().await.insert(id.clone(), client);
        id
    }

    pub async fn get(&self, id: &str) -> Option<Client> {
        self.clients.read().await.get(id).cloned()
    }

    pub fn skip_waiting_requested(&self) -> bool {
        self.skip_waiting.load(Ordering::SeqCst)
    }

    pub fn claim_count(&self) -> u64 {
        self.claims.load(Ordering::SeqCst)
    }

    fn send(&self, event: WorkerEvent) {
        // Receiver gone just means nobody is listening
        if self.event_tx.send(event).is_err() {
            debug!("Worker event dropped, no listener");
        }
    }
}

#[async_trait]
impl ClientControl for ClientRegistry {
    async fn skip_waiting(&self) {
        self.skip_waiting.store(true, Ordering::SeqCst);
        self.send(WorkerEvent::SkipWaiting);
    }

    async fn claim(&self) {
        self.claims.fetch_add(1, Ordering::SeqCst);
        let mut clients = self.clients.write().await;
        for client in clients.values_mut().filter(|c| !c.controlled) {
            client.controlled = true;
            self.send(WorkerEvent::ControllerChange {
                client_id: client.id.clone(),
            });
        }
    }
}
