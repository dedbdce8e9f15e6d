//! Graph engine client seam.
//!
//! The gateway talks to the engine only through these traits: a [`Connector`]
//! opens a physical [`ConnectionPool`], the pool hands out authenticated
//! [`EngineSession`]s, and sessions execute statements. Backends (the Bolt
//! backend, or a scripted engine in tests) implement them.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use studio_core::ResultSet;
use thiserror::Error;

/// Address of one engine host.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct HostAddr {
    pub host: String,
    pub port: u16,
}

impl HostAddr {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }
}

impl fmt::Display for HostAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

/// Options for opening a physical connection pool.
#[derive(Debug, Clone)]
pub struct PoolOptions {
    /// How long an unused physical connection may stay open.
    pub idle_timeout: Duration,
    pub max_connections: usize,
}

/// Errors reported by an engine backend.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum EngineError {
    /// Socket-level failure talking to the engine.
    #[error("{0}")]
    Transport(String),

    /// The engine rejected a statement (syntax, permission, semantic).
    #[error("{message}")]
    Statement { code: i32, message: String },

    /// The engine rejected the credentials.
    #[error("authentication failed: {0}")]
    Auth(String),

    /// Operation on a pool or session that was already closed.
    #[error("{0} is closed")]
    Closed(&'static str),
}

impl EngineError {
    pub fn statement(code: i32, message: impl Into<String>) -> Self {
        Self::Statement {
            code,
            message: message.into(),
        }
    }

    /// Whether this error means the underlying connection is gone.
    pub fn is_connection_fault(&self) -> bool {
        match self {
            EngineError::Transport(message) => is_connection_fault_message(message),
            EngineError::Closed(_) => true,
            _ => false,
        }
    }
}

const CONNECTION_FAULT_MARKERS: [&str; 6] = [
    "broken pipe",
    "connection reset",
    "reset by peer",
    "write failed",
    "failed to write",
    "unexpected eof",
];

/// Recognize transport messages that mean the connection was torn down.
pub fn is_connection_fault_message(message: &str) -> bool {
    let lower = message.to_ascii_lowercase();
    CONNECTION_FAULT_MARKERS
        .iter()
        .any(|marker| lower.contains(marker))
}

/// Opens physical connection pools to the engine.
#[async_trait]
pub trait Connector: Send + Sync + 'static {
    async fn open_pool(
        &self,
        hosts: &[HostAddr],
        options: &PoolOptions,
    ) -> Result<Arc<dyn ConnectionPool>, EngineError>;
}

/// A physical connection pool to one engine cluster.
#[async_trait]
pub trait ConnectionPool: Send + Sync {
    /// Lightweight reachability probe.
    async fn ping(&self, host: &HostAddr, timeout: Duration) -> Result<(), EngineError>;

    /// Open an authenticated session.
    async fn get_session(
        &self,
        username: &str,
        password: &str,
    ) -> Result<Box<dyn EngineSession>, EngineError>;

    /// Close every physical connection. Must be idempotent.
    async fn close(&self);
}

/// An authenticated execution context on the engine.
#[async_trait]
pub trait EngineSession: Send {
    async fn execute(&mut self, statement: &str) -> Result<ResultSet, EngineError>;

    /// Sign the session out and free its connection.
    async fn release(self: Box<Self>);
}

/// Statement that switches the session's namespace.
pub fn namespace_statement(namespace: &str) -> String {
    format!("USE `{}`", namespace.replace('`', "\\`"))
}
