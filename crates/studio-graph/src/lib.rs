//! # Graph Studio Gateway
//!
//! Per-user session gateway between the studio's HTTP layer and the graph
//! engine.
//!
//! A login opens a physical connection pool and authenticates once; the
//! resulting client gets its own actor and session pool. Batches of
//! statements run on a single borrowed session, in order, and come back
//! decoded into [`studio_core::ParsedResult`]s. Idle clients are recycled
//! after a TTL.

pub mod actor;
#[cfg(feature = "neo4j")]
pub mod bolt;
pub mod engine;
pub mod error;
pub mod gateway;
pub mod pool;
pub mod registry;

pub use actor::{BatchResponse, ClientHandle, ClientInfo, StatementResult};
#[cfg(feature = "neo4j")]
pub use bolt::BoltConnector;
pub use engine::{ConnectionPool, Connector, EngineError, EngineSession, HostAddr, PoolOptions};
pub use error::{ErrorBody, GatewayError};
pub use gateway::{Account, Gateway};
pub use pool::{Acquired, PoolStats, SessionLease, SessionPool};
pub use registry::ClientRegistry;
