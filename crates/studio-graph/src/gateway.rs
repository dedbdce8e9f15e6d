//! Gateway facade: the four operations exposed to the HTTP layer.

use std::fmt;
use std::sync::Arc;

use serde_json::Value as JsonValue;
use studio_core::{GatewayConfig, ParsedResult};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::actor::{ClientActor, ClientInfo, NewClient, StatementResult};
use crate::engine::{Connector, HostAddr, PoolOptions};
use crate::error::GatewayError;
use crate::pool::{Acquired, SessionPool};
use crate::registry::ClientRegistry;

/// Login credentials for one engine endpoint.
#[derive(Clone)]
pub struct Account {
    pub address: String,
    pub port: u16,
    pub username: String,
    pub password: String,
}

impl Account {
    pub fn new(
        address: impl Into<String>,
        port: u16,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        Self {
            address: address.into(),
            port,
            username: username.into(),
            password: password.into(),
        }
    }

    pub fn host(&self) -> HostAddr {
        HostAddr::new(self.address.clone(), self.port)
    }
}

impl fmt::Debug for Account {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Account")
            .field("address", &self.address)
            .field("port", &self.port)
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Session gateway between per-user callers and the graph engine.
///
/// Must be created inside a tokio runtime: construction starts the periodic
/// recycler.
pub struct Gateway {
    connector: Arc<dyn Connector>,
    registry: ClientRegistry,
    config: Arc<GatewayConfig>,
    recycler: JoinHandle<()>,
}

impl Gateway {
    pub fn new(connector: Arc<dyn Connector>, config: GatewayConfig) -> Self {
        let config = Arc::new(config);
        let registry = ClientRegistry::new(Arc::clone(&config));
        let recycler = registry.spawn_recycler(config.recycle_interval());
        Self {
            connector,
            registry,
            config,
            recycler,
        }
    }

    pub fn config(&self) -> &GatewayConfig {
        &self.config
    }

    /// Authenticate against the engine and register a new client.
    ///
    /// Returns the new client id.
    pub async fn login(&self, account: &Account) -> Result<String, GatewayError> {
        let slot = self.registry.try_reserve().map_err(|err| {
            warn!(max = self.config.max_clients, "Refusing login, client cap reached");
            err
        })?;

        let host = account.host();
        let options = PoolOptions {
            idle_timeout: self.config.pool_idle_timeout(),
            max_connections: self.config.pool_max_connections,
        };

        let physical = self
            .connector
            .open_pool(std::slice::from_ref(&host), &options)
            .await
            .map_err(|err| GatewayError::HostUnreachable {
                host: host.to_string(),
                reason: err.to_string(),
            })?;

        if let Err(err) = physical.ping(&host, self.config.ping_timeout()).await {
            warn!(host = %host, error = %err, "Engine host did not answer ping");
            physical.close().await;
            return Err(GatewayError::HostUnreachable {
                host: host.to_string(),
                reason: err.to_string(),
            });
        }

        let client_id = Uuid::new_v4().to_string();
        let sessions = Arc::new(SessionPool::new(
            client_id.clone(),
            account.username.clone(),
            account.password.clone(),
            Arc::clone(&physical),
            self.config.idle_session_grace(),
        ));

        // Opening the first session checks the credentials and leaves one
        // session idle for the first request.
        let first = match sessions.acquire().await {
            Ok(Acquired::Ready(lease)) => Ok(lease),
            Ok(Acquired::Pending) => Err(GatewayError::SessionLost),
            Err(err) => Err(err),
        };
        match first {
            Ok(lease) => drop(lease),
            Err(err) => {
                warn!(host = %host, username = %account.username, error = %err, "Login rejected");
                sessions.clear_all().await;
                physical.close().await;
                return Err(err);
            }
        }

        let handle = ClientActor::spawn(
            NewClient {
                id: client_id.clone(),
                host: host.clone(),
                username: account.username.clone(),
                sessions,
                physical,
                slot,
            },
            self.registry.clone(),
            Arc::clone(&self.config),
        );
        self.registry.register(handle);

        info!(
            client_id = %client_id,
            host = %host,
            username = %account.username,
            clients = self.registry.len(),
            "Client logged in"
        );
        Ok(client_id)
    }

    /// Run a batch of statements for a client, in order, on one session.
    pub async fn execute(
        &self,
        client_id: &str,
        namespace: &str,
        statements: Vec<String>,
    ) -> Result<Vec<StatementResult>, GatewayError> {
        let client = self.registry.lookup(client_id)?;
        if statements.is_empty() && namespace.is_empty() {
            return Ok(Vec::new());
        }

        debug!(
            client_id = %client_id,
            namespace,
            statements = statements.len(),
            "Submitting batch"
        );
        let reply = client.submit(namespace.to_string(), statements)?;
        reply.await.map_err(|_| GatewayError::SessionLost)?
    }

    /// Close a client. Unknown ids are reported, not fatal.
    pub fn logout(&self, client_id: &str) -> Result<(), GatewayError> {
        let client = self
            .registry
            .peek(client_id)
            .ok_or(GatewayError::ClientNotExisted)?;
        info!(client_id = %client_id, "Client logging out");
        client.close();
        Ok(())
    }

    /// List the cluster's hosts as `host:port` strings.
    pub async fn cluster_hosts(&self, client_id: &str) -> Result<Vec<String>, GatewayError> {
        let statement = self.config.hosts_statement.clone();
        let mut results = self.execute(client_id, "", vec![statement]).await?;
        let parsed = match results.pop() {
            Some(result) => result.outcome?,
            None => return Ok(Vec::new()),
        };
        Ok(hosts_from_result(&parsed))
    }

    /// Snapshot of the live clients.
    pub fn clients(&self) -> Vec<ClientInfo> {
        self.registry.list()
    }

    pub fn client_count(&self) -> usize {
        self.registry.len()
    }

    /// Run a recycle sweep now. Returns how many clients were closed.
    pub fn recycle_now(&self) -> usize {
        self.registry.recycle()
    }

    /// Stop the recycler and close every client.
    pub async fn shutdown(&self) {
        self.recycler.abort();
        self.registry.shutdown_all().await;
    }
}

impl Drop for Gateway {
    fn drop(&mut self) {
        self.recycler.abort();
    }
}

fn cell_text(value: &JsonValue) -> Option<String> {
    match value {
        JsonValue::String(s) => Some(s.clone()),
        JsonValue::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Read `Host` and `Port` cells of a host listing.
pub(crate) fn hosts_from_result(parsed: &ParsedResult) -> Vec<String> {
    parsed
        .rows
        .iter()
        .filter_map(|row| {
            let host = row.get("Host").and_then(cell_text)?;
            let port = row.get("Port").and_then(cell_text)?;
            Some(format!("{host}:{port}"))
        })
        .collect()
}
