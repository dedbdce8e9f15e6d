//! Client actor.
//!
//! One actor per logged-in client serializes admission of that client's
//! requests. Each admitted batch runs in its own task, so a slow batch never
//! holds up the next one; every batch borrows one session from the client's
//! pool for its whole duration.

use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use futures::FutureExt;
use parking_lot::Mutex;
use serde::Serialize;
use studio_core::{parse_result, GatewayConfig, ParsedResult};
use tokio::sync::{mpsc, oneshot, watch, OwnedSemaphorePermit};
use tracing::{debug, info, warn};

use crate::engine::{namespace_statement, ConnectionPool, HostAddr};
use crate::error::{ErrorBody, GatewayError};
use crate::pool::{Acquired, PoolStats, SessionLease, SessionPool};
use crate::registry::ClientRegistry;

/// Outcome of one statement of a batch.
#[derive(Debug, Clone, PartialEq)]
pub struct StatementResult {
    pub statement: String,
    pub outcome: Result<ParsedResult, GatewayError>,
}

impl StatementResult {
    pub fn is_ok(&self) -> bool {
        self.outcome.is_ok()
    }
}

#[derive(Serialize)]
struct StatementWire<'a> {
    statement: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    data: Option<&'a ParsedResult>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<ErrorBody>,
}

impl Serialize for StatementResult {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let (data, error) = match &self.outcome {
            Ok(parsed) => (Some(parsed), None),
            Err(err) => (None, Some(ErrorBody::from(err))),
        };
        StatementWire {
            statement: &self.statement,
            data,
            error,
        }
        .serialize(serializer)
    }
}

/// Reply to a batch: per-statement results, or one error for the batch.
pub type BatchResponse = Result<Vec<StatementResult>, GatewayError>;

pub(crate) struct ChannelRequest {
    pub namespace: String,
    pub statements: Vec<String>,
    pub reply: oneshot::Sender<BatchResponse>,
}

/// Public view of a live client.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientInfo {
    pub client_id: String,
    pub host: String,
    pub username: String,
    pub logged_in_at: DateTime<Utc>,
    pub idle_secs: u64,
    pub sessions: PoolStats,
}

/// Engine resources owned by one client, torn down exactly once.
struct ClientResources {
    sessions: Arc<SessionPool>,
    physical: Arc<dyn ConnectionPool>,
    torn_down: AtomicBool,
    slot: Mutex<Option<OwnedSemaphorePermit>>,
}

impl ClientResources {
    async fn teardown(&self) {
        if self.torn_down.swap(true, Ordering::SeqCst) {
            return;
        }
        self.sessions.clear_all().await;
        self.physical.close().await;
        self.slot.lock().take();
    }
}

/// Handle to a client actor, stored in the registry.
#[derive(Clone)]
pub struct ClientHandle {
    inner: Arc<HandleInner>,
}

struct HandleInner {
    id: String,
    host: HostAddr,
    username: String,
    logged_in_at: DateTime<Utc>,
    last_used: Mutex<Instant>,
    requests: mpsc::UnboundedSender<ChannelRequest>,
    close_tx: watch::Sender<bool>,
    resources: Arc<ClientResources>,
}

impl ClientHandle {
    pub fn id(&self) -> &str {
        &self.inner.id
    }

    pub(crate) fn touch(&self) {
        *self.inner.last_used.lock() = Instant::now();
    }

    pub fn idle_for(&self) -> Duration {
        self.inner.last_used.lock().elapsed()
    }

    /// Whether the close signal has been raised.
    pub fn is_closing(&self) -> bool {
        *self.inner.close_tx.borrow()
    }

    /// Queue a batch for this client.
    pub(crate) fn submit(
        &self,
        namespace: String,
        statements: Vec<String>,
    ) -> Result<oneshot::Receiver<BatchResponse>, GatewayError> {
        self.touch();
        let (reply, rx) = oneshot::channel();
        self.inner
            .requests
            .send(ChannelRequest {
                namespace,
                statements,
                reply,
            })
            .map_err(|_| GatewayError::ClientNotExisted)?;
        Ok(rx)
    }

    /// Raise the close signal. The actor drains and tears down.
    pub fn close(&self) {
        self.inner.close_tx.send_replace(true);
    }

    /// Release the client's engine resources directly.
    pub(crate) async fn teardown(&self) {
        self.inner.resources.teardown().await;
    }

    pub fn session_stats(&self) -> PoolStats {
        self.inner.resources.sessions.stats()
    }

    pub fn info(&self) -> ClientInfo {
        ClientInfo {
            client_id: self.inner.id.clone(),
            host: self.inner.host.to_string(),
            username: self.inner.username.clone(),
            logged_in_at: self.inner.logged_in_at,
            idle_secs: self.idle_for().as_secs(),
            sessions: self.session_stats(),
        }
    }
}

/// Everything needed to start an actor for a freshly authenticated client.
pub(crate) struct NewClient {
    pub id: String,
    pub host: HostAddr,
    pub username: String,
    pub sessions: Arc<SessionPool>,
    pub physical: Arc<dyn ConnectionPool>,
    pub slot: OwnedSemaphorePermit,
}

pub(crate) struct ClientActor {
    id: String,
    requests: mpsc::UnboundedReceiver<ChannelRequest>,
    close_rx: watch::Receiver<bool>,
    resources: Arc<ClientResources>,
    registry: ClientRegistry,
    config: Arc<GatewayConfig>,
}

impl ClientActor {
    /// Start the actor task and return its handle.
    pub(crate) fn spawn(
        client: NewClient,
        registry: ClientRegistry,
        config: Arc<GatewayConfig>,
    ) -> ClientHandle {
        let (tx, rx) = mpsc::unbounded_channel();
        let (close_tx, close_rx) = watch::channel(false);
        let resources = Arc::new(ClientResources {
            sessions: client.sessions,
            physical: client.physical,
            torn_down: AtomicBool::new(false),
            slot: Mutex::new(Some(client.slot)),
        });

        let handle = ClientHandle {
            inner: Arc::new(HandleInner {
                id: client.id.clone(),
                host: client.host,
                username: client.username,
                logged_in_at: Utc::now(),
                last_used: Mutex::new(Instant::now()),
                requests: tx,
                close_tx,
                resources: Arc::clone(&resources),
            }),
        };

        let actor = ClientActor {
            id: client.id,
            requests: rx,
            close_rx,
            resources,
            registry,
            config,
        };
        tokio::spawn(actor.run());
        handle
    }

    async fn run(mut self) {
        debug!(client_id = %self.id, "Client actor started");

        loop {
            // Close wins over queued requests; those are drained in `stop`.
            tokio::select! {
                biased;
                changed = self.close_rx.changed() => {
                    if changed.is_err() || *self.close_rx.borrow() {
                        debug!(client_id = %self.id, "Client actor received close signal");
                        break;
                    }
                }
                request = self.requests.recv() => {
                    match request {
                        Some(request) => self.dispatch(request),
                        None => {
                            debug!(client_id = %self.id, "All handles dropped, shutting down");
                            break;
                        }
                    }
                }
            }
        }

        self.stop().await;
    }

    fn dispatch(&self, request: ChannelRequest) {
        let sessions = Arc::clone(&self.resources.sessions);
        let config = Arc::clone(&self.config);
        let client_id = self.id.clone();

        tokio::spawn(async move {
            let ChannelRequest {
                namespace,
                statements,
                reply,
            } = request;

            let outcome = AssertUnwindSafe(run_batch(&sessions, &config, &namespace, &statements))
                .catch_unwind()
                .await
                .unwrap_or_else(|_| {
                    warn!(client_id = %client_id, "Recovered from panic while executing batch");
                    Err(GatewayError::SessionLost)
                });

            if reply.send(outcome).is_err() {
                debug!(client_id = %client_id, "Caller went away before the batch finished");
            }
        });
    }

    async fn stop(mut self) {
        self.requests.close();
        let mut rejected = 0usize;
        while let Ok(request) = self.requests.try_recv() {
            let _ = request.reply.send(Err(GatewayError::ConnectionClosed));
            rejected += 1;
        }

        self.resources.teardown().await;
        self.registry.remove(&self.id);
        info!(client_id = %self.id, rejected, "Client closed");
    }
}

/// Run one batch on a single session: switch namespace, then execute the
/// statements in order.
async fn run_batch(
    sessions: &Arc<SessionPool>,
    config: &GatewayConfig,
    namespace: &str,
    statements: &[String],
) -> BatchResponse {
    let mut lease = acquire_session(sessions, config).await?;

    if !namespace.is_empty() {
        lease
            .execute(&namespace_statement(namespace))
            .await
            .map_err(GatewayError::from)?;
    }

    let mut results = Vec::with_capacity(statements.len());
    for statement in statements {
        let outcome = match lease.execute(statement).await {
            Ok(result) => parse_result(&result).map_err(GatewayError::from),
            Err(err) => Err(GatewayError::from(err)),
        };
        if let Err(err) = &outcome {
            debug!(session_id = lease.id(), error = %err, "Statement failed");
        }
        results.push(StatementResult {
            statement: statement.clone(),
            outcome,
        });
    }
    Ok(results)
}

async fn acquire_session(
    sessions: &Arc<SessionPool>,
    config: &GatewayConfig,
) -> Result<SessionLease, GatewayError> {
    for attempt in 0..=config.acquire_max_retries {
        match sessions.acquire().await? {
            Acquired::Ready(lease) => return Ok(lease),
            Acquired::Pending => {
                debug!(attempt, "No session available yet, backing off");
                tokio::time::sleep(config.acquire_backoff()).await;
            }
        }
    }
    warn!(
        retries = config.acquire_max_retries,
        "Gave up waiting for an engine session"
    );
    Err(GatewayError::SessionLost)
}
