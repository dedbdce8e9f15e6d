//! Scripted in-memory engine for gateway tests.
//!
//! Statements understood by the scripted session:
//! - `USE \`name\`` switches namespace; unknown names fail
//! - `SHOW HOSTS` lists two storage hosts
//! - a trailing `;` is ignored
//! - `RETURN <int>` yields one row with column `value`
//! - `SLEEP <ms>` waits, then returns the namespace in column `ns`
//! - `PANIC` panics inside the session
//! - `BROKEN` fails with a broken-pipe transport error
//! - `FETCH <vid>` returns a vertex
//! - anything else is a syntax error

#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use studio_core::value::Vertex;
use studio_core::{GatewayConfig, ResultSet, Value};
use studio_graph::{
    Account, ConnectionPool, Connector, EngineError, EngineSession, Gateway, HostAddr,
    PoolOptions,
};

pub const PASSWORD: &str = "nebula";
pub const UNREACHABLE_HOST: &str = "10.255.255.1";

#[derive(Default)]
pub struct EngineStats {
    pub pools_opened: AtomicUsize,
    pub pools_closed: AtomicUsize,
    pub sessions_opened: AtomicUsize,
    pub sessions_released: AtomicUsize,
    pub refuse_sessions: AtomicBool,
}

impl EngineStats {
    pub fn live_sessions(&self) -> usize {
        self.sessions_opened.load(Ordering::SeqCst) - self.sessions_released.load(Ordering::SeqCst)
    }
}

#[derive(Clone, Default)]
pub struct ScriptedEngine {
    pub stats: Arc<EngineStats>,
}

#[async_trait]
impl Connector for ScriptedEngine {
    async fn open_pool(
        &self,
        _hosts: &[HostAddr],
        _options: &PoolOptions,
    ) -> Result<Arc<dyn ConnectionPool>, EngineError> {
        self.stats.pools_opened.fetch_add(1, Ordering::SeqCst);
        Ok(Arc::new(ScriptedPool {
            stats: Arc::clone(&self.stats),
            closed: AtomicBool::new(false),
        }))
    }
}

struct ScriptedPool {
    stats: Arc<EngineStats>,
    closed: AtomicBool,
}

#[async_trait]
impl ConnectionPool for ScriptedPool {
    async fn ping(&self, host: &HostAddr, _timeout: Duration) -> Result<(), EngineError> {
        if host.host == UNREACHABLE_HOST {
            return Err(EngineError::Transport("connection refused".into()));
        }
        Ok(())
    }

    async fn get_session(
        &self,
        _username: &str,
        password: &str,
    ) -> Result<Box<dyn EngineSession>, EngineError> {
        if password != PASSWORD {
            return Err(EngineError::Auth("bad username/password".into()));
        }
        if self.stats.refuse_sessions.load(Ordering::SeqCst) {
            return Err(EngineError::Transport("session limit reached".into()));
        }
        self.stats.sessions_opened.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(ScriptedSession {
            stats: Arc::clone(&self.stats),
            namespace: None,
        }))
    }

    async fn close(&self) {
        if !self.closed.swap(true, Ordering::SeqCst) {
            self.stats.pools_closed.fetch_add(1, Ordering::SeqCst);
        }
    }
}

struct ScriptedSession {
    stats: Arc<EngineStats>,
    namespace: Option<String>,
}

const NAMESPACES: [&str; 2] = ["basketball", "movies"];

fn single(column: &str, value: Value) -> ResultSet {
    ResultSet::table(vec![column.to_string()], vec![vec![value]])
}

#[async_trait]
impl EngineSession for ScriptedSession {
    async fn execute(&mut self, statement: &str) -> Result<ResultSet, EngineError> {
        let statement = statement.trim().trim_end_matches(';').trim();
        let (verb, arg) = statement
            .split_once(' ')
            .map(|(v, a)| (v, a.trim()))
            .unwrap_or((statement, ""));

        let mut result = match verb {
            "USE" => {
                let name = arg.trim_matches('`');
                if !NAMESPACES.contains(&name) {
                    return Err(EngineError::statement(-1005, format!("SpaceNotFound: {name}")));
                }
                self.namespace = Some(name.to_string());
                ResultSet::default()
            }
            "SHOW" if arg == "HOSTS" => ResultSet::table(
                vec!["Host".into(), "Port".into(), "Status".into()],
                vec![
                    vec![Value::string("storaged0"), Value::Int(9779), Value::string("ONLINE")],
                    vec![Value::string("storaged1"), Value::Int(9779), Value::string("ONLINE")],
                ],
            ),
            "RETURN" => match arg.parse::<i64>() {
                Ok(n) => single("value", Value::Int(n)),
                Err(_) => {
                    return Err(EngineError::statement(
                        -1004,
                        format!("SemanticError: `{arg}' is not defined"),
                    ))
                }
            },
            "SLEEP" => {
                let ms = arg.parse::<u64>().unwrap_or(10);
                tokio::time::sleep(Duration::from_millis(ms)).await;
                let ns = self
                    .namespace
                    .clone()
                    .map(Value::String)
                    .unwrap_or(Value::Empty);
                single("ns", ns)
            }
            "PANIC" => panic!("scripted engine panic"),
            "BROKEN" => return Err(EngineError::Transport("write: broken pipe".into())),
            "FETCH" => single(
                "v",
                Value::Vertex(Vertex::new(Value::string(arg)).with_tag(
                    "player",
                    [("name".to_string(), Value::string("Tim Duncan"))]
                        .into_iter()
                        .collect(),
                )),
            ),
            _ => {
                return Err(EngineError::statement(
                    -1004,
                    format!("SyntaxError: syntax error near `{verb}'"),
                ))
            }
        };
        result.namespace = self.namespace.clone();
        result.latency_us = 100;
        Ok(result)
    }

    async fn release(self: Box<Self>) {
        self.stats.sessions_released.fetch_add(1, Ordering::SeqCst);
    }
}

/// Config with timings small enough for tests.
pub fn test_config() -> GatewayConfig {
    GatewayConfig {
        max_clients: 4,
        recycle_threshold: 2,
        client_ttl_secs: 3600,
        recycle_interval_secs: 3600,
        idle_session_grace_ms: 50,
        acquire_backoff_ms: 10,
        acquire_max_retries: 5,
        ping_timeout_ms: 100,
        ..GatewayConfig::default()
    }
}

pub fn account() -> Account {
    Account::new("127.0.0.1", 9669, "root", PASSWORD)
}

pub fn gateway(config: GatewayConfig) -> (Gateway, ScriptedEngine) {
    let engine = ScriptedEngine::default();
    let gateway = Gateway::new(Arc::new(engine.clone()), config);
    (gateway, engine)
}

pub fn statements(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

/// Poll until `check` holds or the deadline passes.
pub async fn eventually<F: Fn() -> bool>(check: F) -> bool {
    for _ in 0..100 {
        if check() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    check()
}
