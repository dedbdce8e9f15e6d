//! Per-client session pool.
//!
//! Each logged-in client owns one pool of authenticated engine sessions.
//! Sessions are created on demand, handed out as [`SessionLease`]s and go
//! back to the idle list when the lease drops. An idle session is closed
//! after a grace period, unless it is the last idle one: a client that has
//! opened a session always keeps one warm.

use std::collections::VecDeque;
use std::sync::{Arc, Weak};
use std::time::Duration;

use parking_lot::Mutex;
use serde::Serialize;
use studio_core::ResultSet;
use tracing::{debug, warn};

use crate::engine::{ConnectionPool, EngineError, EngineSession};
use crate::error::GatewayError;

struct IdleSession {
    id: u64,
    /// Bumped on every release so a stale eviction timer can tell.
    release_seq: u64,
    session: Box<dyn EngineSession>,
}

#[derive(Default)]
struct PoolState {
    idle: VecDeque<IdleSession>,
    active: Vec<u64>,
    next_id: u64,
    next_release: u64,
    closed: bool,
}

/// Snapshot of a pool's counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PoolStats {
    pub idle: usize,
    pub active: usize,
    pub closed: bool,
}

/// Outcome of an acquisition attempt.
pub enum Acquired {
    Ready(SessionLease),
    /// No session could be opened right now but others are in use; retry later.
    Pending,
}

pub struct SessionPool {
    client_id: String,
    username: String,
    password: String,
    physical: Arc<dyn ConnectionPool>,
    grace: Duration,
    state: Mutex<PoolState>,
}

impl SessionPool {
    pub fn new(
        client_id: impl Into<String>,
        username: impl Into<String>,
        password: impl Into<String>,
        physical: Arc<dyn ConnectionPool>,
        grace: Duration,
    ) -> Self {
        Self {
            client_id: client_id.into(),
            username: username.into(),
            password: password.into(),
            physical,
            grace,
            state: Mutex::new(PoolState::default()),
        }
    }

    /// Take an idle session, or open a new one.
    ///
    /// The lock is never held while talking to the engine.
    pub async fn acquire(self: &Arc<Self>) -> Result<Acquired, GatewayError> {
        let reused = {
            let mut state = self.state.lock();
            if state.closed {
                return Err(GatewayError::ConnectionClosed);
            }
            let idle = state.idle.pop_back();
            if let Some(idle) = &idle {
                state.active.push(idle.id);
            }
            idle
        };

        if let Some(idle) = reused {
            return Ok(Acquired::Ready(SessionLease::new(
                Arc::clone(self),
                idle.id,
                idle.session,
            )));
        }

        match self
            .physical
            .get_session(&self.username, &self.password)
            .await
        {
            Ok(session) => {
                let id = {
                    let mut state = self.state.lock();
                    if state.closed {
                        None
                    } else {
                        state.next_id += 1;
                        let id = state.next_id;
                        state.active.push(id);
                        Some(id)
                    }
                };
                match id {
                    Some(id) => {
                        debug!(
                            client_id = %self.client_id,
                            session_id = id,
                            "Opened engine session"
                        );
                        Ok(Acquired::Ready(SessionLease::new(Arc::clone(self), id, session)))
                    }
                    None => {
                        session.release().await;
                        Err(GatewayError::ConnectionClosed)
                    }
                }
            }
            Err(err) => {
                let active = self.state.lock().active.len();
                if active == 0 {
                    warn!(
                        client_id = %self.client_id,
                        error = %err,
                        "Failed to open engine session"
                    );
                    Err(GatewayError::from(err))
                } else {
                    debug!(
                        client_id = %self.client_id,
                        active,
                        error = %err,
                        "Session open failed while others are busy"
                    );
                    Ok(Acquired::Pending)
                }
            }
        }
    }

    /// Return a session to the idle list and arm its eviction timer.
    fn release(self: &Arc<Self>, id: u64, session: Box<dyn EngineSession>) {
        let mut state = self.state.lock();
        state.active.retain(|active| *active != id);
        if state.closed {
            drop(state);
            debug!(
                client_id = %self.client_id,
                session_id = id,
                "Closing session released after shutdown"
            );
            spawn_release(session);
            return;
        }
        state.next_release += 1;
        let seq = state.next_release;
        state.idle.push_back(IdleSession {
            id,
            release_seq: seq,
            session,
        });
        drop(state);
        self.schedule_eviction(id, seq);
    }

    fn schedule_eviction(self: &Arc<Self>, id: u64, seq: u64) {
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            return;
        };
        let pool: Weak<Self> = Arc::downgrade(self);
        let grace = self.grace;
        runtime.spawn(async move {
            tokio::time::sleep(grace).await;
            if let Some(pool) = pool.upgrade() {
                pool.evict(id, seq).await;
            }
        });
    }

    /// Close an idle session whose grace period ran out, unless it was
    /// reacquired since or is the last idle one.
    async fn evict(&self, id: u64, seq: u64) {
        let expired = {
            let mut state = self.state.lock();
            if state.closed || state.idle.len() <= 1 {
                return;
            }
            let Some(pos) = state
                .idle
                .iter()
                .position(|idle| idle.id == id && idle.release_seq == seq)
            else {
                return;
            };
            state.idle.remove(pos)
        };

        if let Some(idle) = expired {
            debug!(client_id = %self.client_id, session_id = id, "Evicting idle session");
            idle.session.release().await;
        }
    }

    /// Close every idle session and mark the pool closed. Sessions still in
    /// use are closed when their lease drops.
    pub async fn clear_all(&self) {
        let (sessions, active) = {
            let mut state = self.state.lock();
            state.closed = true;
            let active = std::mem::take(&mut state.active).len();
            let sessions: Vec<_> = state.idle.drain(..).map(|idle| idle.session).collect();
            (sessions, active)
        };
        debug!(
            client_id = %self.client_id,
            idle = sessions.len(),
            active,
            "Clearing session pool"
        );
        for session in sessions {
            session.release().await;
        }
    }

    pub fn stats(&self) -> PoolStats {
        let state = self.state.lock();
        PoolStats {
            idle: state.idle.len(),
            active: state.active.len(),
            closed: state.closed,
        }
    }

    pub fn is_closed(&self) -> bool {
        self.state.lock().closed
    }
}

fn spawn_release(session: Box<dyn EngineSession>) {
    if let Ok(runtime) = tokio::runtime::Handle::try_current() {
        runtime.spawn(session.release());
    }
}

/// A session checked out of a [`SessionPool`]. Dropping it returns the
/// session to the pool, including when a batch unwinds.
pub struct SessionLease {
    pool: Arc<SessionPool>,
    id: u64,
    session: Option<Box<dyn EngineSession>>,
}

impl SessionLease {
    fn new(pool: Arc<SessionPool>, id: u64, session: Box<dyn EngineSession>) -> Self {
        Self {
            pool,
            id,
            session: Some(session),
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub async fn execute(&mut self, statement: &str) -> Result<ResultSet, EngineError> {
        match self.session.as_mut() {
            Some(session) => session.execute(statement).await,
            None => Err(EngineError::Closed("session")),
        }
    }
}

impl Drop for SessionLease {
    fn drop(&mut self) {
        if let Some(session) = self.session.take() {
            self.pool.release(self.id, session);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::HostAddr;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    #[derive(Default)]
    struct Counters {
        opened: AtomicUsize,
        released: AtomicUsize,
        refuse: AtomicBool,
    }

    struct StubPool(Arc<Counters>);

    struct StubSession(Arc<Counters>);

    #[async_trait]
    impl EngineSession for StubSession {
        async fn execute(&mut self, _statement: &str) -> Result<ResultSet, EngineError> {
            Ok(ResultSet::default())
        }

        async fn release(self: Box<Self>) {
            self.0.released.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[async_trait]
    impl ConnectionPool for StubPool {
        async fn ping(&self, _host: &HostAddr, _timeout: Duration) -> Result<(), EngineError> {
            Ok(())
        }

        async fn get_session(
            &self,
            _username: &str,
            _password: &str,
        ) -> Result<Box<dyn EngineSession>, EngineError> {
            if self.0.refuse.load(Ordering::SeqCst) {
                return Err(EngineError::Transport("too many sessions".into()));
            }
            self.0.opened.fetch_add(1, Ordering::SeqCst);
            Ok(Box::new(StubSession(Arc::clone(&self.0))))
        }

        async fn close(&self) {}
    }

    fn pool(grace: Duration) -> (Arc<SessionPool>, Arc<Counters>) {
        let counters = Arc::new(Counters::default());
        let pool = SessionPool::new(
            "client-1",
            "root",
            "nebula",
            Arc::new(StubPool(Arc::clone(&counters))),
            grace,
        );
        (Arc::new(pool), counters)
    }

    async fn lease(pool: &Arc<SessionPool>) -> SessionLease {
        match pool.acquire().await.unwrap() {
            Acquired::Ready(lease) => lease,
            Acquired::Pending => panic!("expected a session"),
        }
    }

    #[tokio::test]
    async fn test_idle_session_is_reused() {
        let (pool, counters) = pool(Duration::from_secs(60));
        let first = lease(&pool).await;
        let id = first.id();
        drop(first);
        assert_eq!(pool.stats().idle, 1);

        let second = lease(&pool).await;
        assert_eq!(second.id(), id);
        assert_eq!(counters.opened.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_eviction_keeps_last_idle_session() {
        let (pool, counters) = pool(Duration::from_millis(20));
        let a = lease(&pool).await;
        let b = lease(&pool).await;
        let c = lease(&pool).await;
        drop(a);
        drop(b);
        drop(c);
        assert_eq!(pool.stats().idle, 3);

        tokio::time::sleep(Duration::from_millis(120)).await;
        let stats = pool.stats();
        assert_eq!(stats.idle, 1);
        assert_eq!(stats.active, 0);
        assert_eq!(counters.released.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_reacquired_session_is_not_evicted() {
        let (pool, _) = pool(Duration::from_millis(30));
        let a = lease(&pool).await;
        let b = lease(&pool).await;
        drop(a);
        drop(b);

        // Take one back before the grace period runs out and hold it.
        let held = lease(&pool).await;
        tokio::time::sleep(Duration::from_millis(100)).await;
        let stats = pool.stats();
        assert_eq!(stats.active, 1);
        assert_eq!(stats.idle, 1);
        drop(held);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_churn_keeps_one_idle_session() {
        let (pool, counters) = pool(Duration::from_millis(5));
        let workers: Vec<_> = (0..8)
            .map(|worker| {
                let pool = Arc::clone(&pool);
                tokio::spawn(async move {
                    for round in 0..50u64 {
                        let mut lease = match pool.acquire().await.unwrap() {
                            Acquired::Ready(lease) => lease,
                            Acquired::Pending => {
                                tokio::task::yield_now().await;
                                continue;
                            }
                        };
                        lease.execute("RETURN 1").await.unwrap();
                        if (round + worker) % 7 == 0 {
                            tokio::time::sleep(Duration::from_millis(6)).await;
                        }
                        drop(lease);

                        let stats = pool.stats();
                        assert!(stats.idle + stats.active >= 1);
                    }
                })
            })
            .collect();
        for worker in workers {
            worker.await.unwrap();
        }

        tokio::time::sleep(Duration::from_millis(100)).await;
        let stats = pool.stats();
        assert_eq!(stats.idle, 1);
        assert_eq!(stats.active, 0);
        assert_eq!(
            counters.opened.load(Ordering::SeqCst) - counters.released.load(Ordering::SeqCst),
            1
        );
    }

    #[tokio::test]
    async fn test_open_failure_with_nothing_active_is_an_error() {
        let (pool, counters) = pool(Duration::from_secs(60));
        counters.refuse.store(true, Ordering::SeqCst);
        assert!(pool.acquire().await.is_err());
    }

    #[tokio::test]
    async fn test_open_failure_while_busy_is_pending() {
        let (pool, counters) = pool(Duration::from_secs(60));
        let _busy = lease(&pool).await;
        counters.refuse.store(true, Ordering::SeqCst);
        assert!(matches!(pool.acquire().await, Ok(Acquired::Pending)));
    }

    #[tokio::test]
    async fn test_clear_all_closes_idle_and_late_releases() {
        let (pool, counters) = pool(Duration::from_secs(60));
        let idle = lease(&pool).await;
        let busy = lease(&pool).await;
        drop(idle);

        pool.clear_all().await;
        assert_eq!(counters.released.load(Ordering::SeqCst), 1);
        assert!(matches!(
            pool.acquire().await,
            Err(GatewayError::ConnectionClosed)
        ));

        drop(busy);
        tokio::task::yield_now().await;
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(counters.released.load(Ordering::SeqCst), 2);
        assert_eq!(pool.stats().idle, 0);
    }
}
