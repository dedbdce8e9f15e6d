//! Registry of live clients.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use studio_core::GatewayConfig;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, info};

use crate::actor::{ClientHandle, ClientInfo};
use crate::error::GatewayError;

/// Concurrent map from client id to client handle.
///
/// Capacity is enforced with a semaphore: a login reserves a slot before it
/// opens anything on the engine, and the slot is freed when the client is
/// torn down.
#[derive(Clone)]
pub struct ClientRegistry {
    clients: Arc<DashMap<String, ClientHandle>>,
    slots: Arc<Semaphore>,
    sweeping: Arc<AtomicBool>,
    config: Arc<GatewayConfig>,
}

impl ClientRegistry {
    pub fn new(config: Arc<GatewayConfig>) -> Self {
        Self {
            clients: Arc::new(DashMap::new()),
            slots: Arc::new(Semaphore::new(config.max_clients)),
            sweeping: Arc::new(AtomicBool::new(false)),
            config,
        }
    }

    /// Reserve room for one more client.
    pub(crate) fn try_reserve(&self) -> Result<OwnedSemaphorePermit, GatewayError> {
        Arc::clone(&self.slots)
            .try_acquire_owned()
            .map_err(|_| GatewayError::NoIdleConnectionAvailable {
                max: self.config.max_clients,
            })
    }

    /// Insert a client. Above the recycle threshold this also starts a
    /// background sweep, unless one is already running.
    pub(crate) fn register(&self, handle: ClientHandle) {
        self.clients.insert(handle.id().to_string(), handle);
        let live = self.clients.len();
        if live > self.config.recycle_threshold {
            debug!(
                live,
                threshold = self.config.recycle_threshold,
                "Registry above recycle threshold"
            );
            self.spawn_sweep();
        }
    }

    /// Find a client and mark it used.
    pub fn lookup(&self, client_id: &str) -> Result<ClientHandle, GatewayError> {
        let handle = self
            .clients
            .get(client_id)
            .map(|entry| entry.value().clone())
            .ok_or(GatewayError::ClientNotExisted)?;
        if handle.is_closing() {
            return Err(GatewayError::ClientNotExisted);
        }
        handle.touch();
        Ok(handle)
    }

    /// Find a client without refreshing its idle clock.
    pub fn peek(&self, client_id: &str) -> Option<ClientHandle> {
        self.clients.get(client_id).map(|entry| entry.value().clone())
    }

    pub(crate) fn remove(&self, client_id: &str) -> Option<ClientHandle> {
        self.clients.remove(client_id).map(|(_, handle)| handle)
    }

    pub fn len(&self) -> usize {
        self.clients.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.slots.available_permits() == 0
    }

    pub fn list(&self) -> Vec<ClientInfo> {
        let mut clients: Vec<ClientInfo> = self
            .clients
            .iter()
            .map(|entry| entry.value().info())
            .collect();
        clients.sort_by(|a, b| a.logged_in_at.cmp(&b.logged_in_at));
        clients
    }

    /// Close every client idle for longer than the TTL. Returns how many
    /// were signalled.
    pub fn recycle(&self) -> usize {
        let ttl = self.config.client_ttl();
        // Snapshot first: closing must not happen under a map guard.
        let expired: Vec<ClientHandle> = self
            .clients
            .iter()
            .filter(|entry| !entry.value().is_closing() && entry.value().idle_for() > ttl)
            .map(|entry| entry.value().clone())
            .collect();

        for handle in &expired {
            info!(
                client_id = %handle.id(),
                idle_secs = handle.idle_for().as_secs(),
                "Recycling idle client"
            );
            handle.close();
        }
        expired.len()
    }

    fn spawn_sweep(&self) {
        if self.sweeping.swap(true, Ordering::SeqCst) {
            return;
        }
        let registry = self.clone();
        tokio::spawn(async move {
            let recycled = registry.recycle();
            registry.sweeping.store(false, Ordering::SeqCst);
            if recycled > 0 {
                debug!(recycled, remaining = registry.len(), "Opportunistic recycle finished");
            }
        });
    }

    /// Periodic recycle sweep.
    pub(crate) fn spawn_recycler(&self, period: Duration) -> JoinHandle<()> {
        let registry = self.clone();
        tokio::spawn(async move {
            let mut ticker = interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                if registry.sweeping.swap(true, Ordering::SeqCst) {
                    continue;
                }
                let recycled = registry.recycle();
                registry.sweeping.store(false, Ordering::SeqCst);
                if recycled > 0 {
                    debug!(recycled, remaining = registry.len(), "Periodic recycle finished");
                }
            }
        })
    }

    /// Close every client and wait for its resources to be released.
    pub async fn shutdown_all(&self) {
        let handles: Vec<ClientHandle> = self
            .clients
            .iter()
            .map(|entry| entry.value().clone())
            .collect();
        let count = handles.len();
        for handle in handles {
            handle.close();
            handle.teardown().await;
            self.clients.remove(handle.id());
        }
        info!(clients = count, "All clients shut down");
    }
}
