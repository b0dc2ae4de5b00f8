//! Connection Pool (spec.md §4.2): a bounded set of reusable connections to
//! one endpoint, with health checks, idle/lifetime eviction, and a
//! background sweeper.
//!
//! Concurrency model per spec.md §5: one `Mutex` guards the idle queue and
//! live count; a `Notify` plays the role of the paired condition variable.
//! No network I/O ever runs while the mutex is held — a connection is
//! always removed from the queue (or the slot reserved) before it is
//! probed or created.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use pgschema_diff_types::{DatabaseConfig, PoolHealth};
use tokio::sync::{Mutex, Notify};
use tracing::{debug, instrument};

use crate::error::{Error, Result};
use crate::factory::{self, Connection};
use crate::retry::with_retry;

pub const DEFAULT_MAX_SIZE: u32 = 5;
pub const HARD_CAP: u32 = 20;
pub const DEFAULT_HEALTH_CHECK_INTERVAL: Duration = Duration::from_secs(60);
pub const DEFAULT_IDLE_TIMEOUT: Duration = Duration::from_secs(10 * 60);
pub const DEFAULT_MAX_LIFETIME: Duration = Duration::from_secs(30 * 60);

struct ConnMeta {
    last_used: Instant,
    use_count: u32,
}

struct PooledConnection {
    conn: Connection,
    created_at: Instant,
    meta: Mutex<ConnMeta>,
}

impl PooledConnection {
    fn new(conn: Connection) -> Self {
        let now = Instant::now();
        Self {
            conn,
            created_at: now,
            meta: Mutex::new(ConnMeta {
                last_used: now,
                use_count: 0,
            }),
        }
    }

    async fn touch(&self) {
        let mut meta = self.meta.lock().await;
        meta.last_used = Instant::now();
        meta.use_count += 1;
    }

    async fn is_expired(&self, max_lifetime: Duration) -> bool {
        self.created_at.elapsed() > max_lifetime
    }

    async fn is_idle_too_long(&self, idle_timeout: Duration) -> bool {
        self.meta.lock().await.last_used.elapsed() > idle_timeout
    }
}

#[derive(Default)]
struct Stats {
    created: AtomicU64,
    destroyed: AtomicU64,
    borrowed: AtomicU64,
    returned: AtomicU64,
    health_checks: AtomicU64,
    health_failures: AtomicU64,
}

struct PoolState {
    idle: VecDeque<PooledConnection>,
    count: u32,
}

struct Inner {
    config: DatabaseConfig,
    max_size: u32,
    idle_timeout: Duration,
    max_lifetime: Duration,
    state: Mutex<PoolState>,
    notify: Notify,
    stats: Stats,
    shutdown: AtomicBool,
    last_check: Mutex<chrono::DateTime<Utc>>,
}

/// A bounded pool of connections to one endpoint (source or target).
#[derive(Clone)]
pub struct Pool {
    inner: Arc<Inner>,
    sweeper: Arc<Mutex<Option<tokio::task::JoinHandle<()>>>>,
}

/// A temporary exclusive grant of a pooled connection. Dropping a `Lease`
/// without calling [`Pool::release`] still returns the connection (treated
/// conservatively as needing a fresh health probe), matching the RAII
/// pattern the rest of this codebase uses for resource guards.
pub struct Lease {
    conn: Option<PooledConnection>,
    pool: Arc<Inner>,
}

impl Lease {
    pub async fn client(&self) -> &tokio_postgres::Client {
        &self.conn.as_ref().expect("lease used after release").conn.client
    }
}

impl Drop for Lease {
    fn drop(&mut self) {
        if let Some(conn) = self.conn.take() {
            let pool = self.pool.clone();
            tokio::spawn(async move {
                return_connection(&pool, conn).await;
            });
        }
    }
}

impl Pool {
    pub fn new(config: DatabaseConfig, max_size: u32) -> Self {
        let max_size = max_size.clamp(1, HARD_CAP);
        let inner = Arc::new(Inner {
            config,
            max_size,
            idle_timeout: DEFAULT_IDLE_TIMEOUT,
            max_lifetime: DEFAULT_MAX_LIFETIME,
            state: Mutex::new(PoolState {
                idle: VecDeque::new(),
                count: 0,
            }),
            notify: Notify::new(),
            stats: Stats::default(),
            shutdown: AtomicBool::new(false),
            last_check: Mutex::new(Utc::now()),
        });
        let pool = Self {
            inner,
            sweeper: Arc::new(Mutex::new(None)),
        };
        pool.spawn_sweeper(DEFAULT_HEALTH_CHECK_INTERVAL);
        pool
    }

    fn spawn_sweeper(&self, interval: Duration) {
        let inner = self.inner.clone();
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.tick().await; // first tick fires immediately; skip it
            loop {
                ticker.tick().await;
                if inner.shutdown.load(Ordering::SeqCst) {
                    debug!("sweeper observed shutdown, exiting");
                    return;
                }
                let swept = sweep_stale(&inner).await;
                if swept > 0 {
                    debug!(swept, "sweeper evicted stale connections");
                }
                *inner.last_check.lock().await = Utc::now();
            }
        });
        // Assigning from a sync context: spawn a task to store it, since
        // `new` cannot be async. The mutex is uncontended at construction.
        let slot = self.sweeper.clone();
        tokio::spawn(async move {
            *slot.lock().await = Some(handle);
        });
    }

    /// Acquires a lease, blocking (asynchronously) up to `timeout` if the
    /// pool is at capacity. Tries an idle connection first; on a failed
    /// health probe it is discarded and the next idle connection (or a
    /// freshly created one) is tried instead.
    #[instrument(skip(self), fields(max_size = self.inner.max_size))]
    pub async fn acquire(&self, timeout: Duration) -> Result<Lease> {
        let deadline = Instant::now() + timeout;
        loop {
            if self.inner.shutdown.load(Ordering::SeqCst) {
                return Err(Error::PoolShutdown);
            }

            enum NextStep {
                Probe(PooledConnection),
                Create,
                Wait,
            }

            let step = {
                let mut state = self.inner.state.lock().await;
                if let Some(conn) = state.idle.pop_front() {
                    NextStep::Probe(conn)
                } else if state.count < self.inner.max_size {
                    state.count += 1;
                    NextStep::Create
                } else {
                    NextStep::Wait
                }
            };

            match step {
                NextStep::Probe(conn) => {
                    if probe(&conn).await {
                        conn.touch().await;
                        self.inner.stats.borrowed.fetch_add(1, Ordering::Relaxed);
                        return Ok(Lease {
                            conn: Some(conn),
                            pool: self.inner.clone(),
                        });
                    }
                    self.inner.stats.destroyed.fetch_add(1, Ordering::Relaxed);
                    let mut state = self.inner.state.lock().await;
                    state.count = state.count.saturating_sub(1);
                    drop(state);
                    self.inner.notify.notify_one();
                    // fall through to retry the loop immediately
                }
                NextStep::Create => match self.build_connection().await {
                    Ok(conn) => {
                        conn.touch().await;
                        self.inner.stats.borrowed.fetch_add(1, Ordering::Relaxed);
                        return Ok(Lease {
                            conn: Some(conn),
                            pool: self.inner.clone(),
                        });
                    }
                    Err(err) => {
                        let mut state = self.inner.state.lock().await;
                        state.count = state.count.saturating_sub(1);
                        drop(state);
                        self.inner.notify.notify_one();
                        return Err(err);
                    }
                },
                NextStep::Wait => {
                    let remaining = deadline.saturating_duration_since(Instant::now());
                    if remaining.is_zero() {
                        return Err(Error::PoolTimeout(timeout));
                    }
                    let notified = self.inner.notify.notified();
                    tokio::pin!(notified);
                    if tokio::time::timeout(remaining, notified.as_mut()).await.is_err() {
                        return Err(Error::PoolTimeout(timeout));
                    }
                    // woken: loop back around and re-check state/deadline
                }
            }
        }
    }

    async fn build_connection(&self) -> Result<PooledConnection> {
        let config = self.inner.config.clone();
        let policy = pgschema_diff_types::RetryPolicy::default();
        let conn = with_retry(&policy, "pool.build_connection", || {
            let config = config.clone();
            async move { factory::build(&config).await }
        })
        .await?;
        self.inner.stats.created.fetch_add(1, Ordering::Relaxed);
        Ok(PooledConnection::new(conn))
    }

    /// Returns a lease to the pool explicitly. Equivalent to dropping the
    /// lease, but lets a caller await the health probe and requeue before
    /// moving on (useful in tests and in the Manager's init sequence).
    pub async fn release(&self, mut lease: Lease) {
        if let Some(conn) = lease.conn.take() {
            return_connection(&self.inner, conn).await;
        }
    }

    #[instrument(skip(self))]
    pub async fn health(&self) -> PoolHealth {
        self.inner.stats.health_checks.fetch_add(1, Ordering::Relaxed);
        let state = self.inner.state.lock().await;
        let idle = state.idle.len() as u32;
        let total = state.count;
        let active = total.saturating_sub(idle);
        let mut lived = Vec::with_capacity(state.idle.len());
        for conn in state.idle.iter() {
            lived.push(conn.created_at.elapsed().as_secs_f64());
        }
        drop(state);
        let average_lived_seconds = if lived.is_empty() {
            0.0
        } else {
            lived.iter().sum::<f64>() / lived.len() as f64
        };
        PoolHealth {
            total,
            active,
            idle,
            max: self.inner.max_size,
            healthy_connections: total,
            failed_connections: 0,
            average_lived_seconds,
            last_check: *self.inner.last_check.lock().await,
        }
    }

    pub async fn sweep_stale(&self) -> usize {
        sweep_stale(&self.inner).await
    }

    #[instrument(skip(self))]
    pub async fn close(&self) {
        self.inner.shutdown.store(true, Ordering::SeqCst);
        self.inner.notify.notify_waiters();
        if let Some(handle) = self.sweeper.lock().await.take() {
            handle.abort();
        }
        let mut state = self.inner.state.lock().await;
        let drained = state.idle.drain(..).count();
        state.count = state.count.saturating_sub(drained as u32);
        self.inner.stats.destroyed.fetch_add(drained as u64, Ordering::Relaxed);
        debug!(drained, "pool closed, idle connections destroyed");
    }

    pub fn stats_snapshot(&self) -> PoolStatsSnapshot {
        PoolStatsSnapshot {
            created: self.inner.stats.created.load(Ordering::Relaxed),
            destroyed: self.inner.stats.destroyed.load(Ordering::Relaxed),
            borrowed: self.inner.stats.borrowed.load(Ordering::Relaxed),
            returned: self.inner.stats.returned.load(Ordering::Relaxed),
            health_checks: self.inner.stats.health_checks.load(Ordering::Relaxed),
            health_failures: self.inner.stats.health_failures.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PoolStatsSnapshot {
    pub created: u64,
    pub destroyed: u64,
    pub borrowed: u64,
    pub returned: u64,
    pub health_checks: u64,
    pub health_failures: u64,
}

async fn probe(conn: &PooledConnection) -> bool {
    conn.conn.client.simple_query("SELECT 1").await.is_ok() && !conn.conn.is_closed()
}

async fn return_connection(inner: &Arc<Inner>, conn: PooledConnection) {
    if inner.shutdown.load(Ordering::SeqCst) {
        inner.stats.destroyed.fetch_add(1, Ordering::Relaxed);
        let mut state = inner.state.lock().await;
        state.count = state.count.saturating_sub(1);
        drop(state);
        inner.notify.notify_one();
        return;
    }

    let healthy = probe(&conn).await;
    if !healthy {
        inner.stats.health_failures.fetch_add(1, Ordering::Relaxed);
        inner.stats.destroyed.fetch_add(1, Ordering::Relaxed);
        let mut state = inner.state.lock().await;
        state.count = state.count.saturating_sub(1);
        drop(state);
        inner.notify.notify_one();
        return;
    }

    let mut state = inner.state.lock().await;
    if state.idle.len() as u32 >= inner.max_size {
        // Steady-state race with a concurrent sweep; destroy rather than
        // grow the queue past what `count` tracks.
        drop(state);
        inner.stats.destroyed.fetch_add(1, Ordering::Relaxed);
        let mut state = inner.state.lock().await;
        state.count = state.count.saturating_sub(1);
    } else {
        state.idle.push_back(conn);
        inner.stats.returned.fetch_add(1, Ordering::Relaxed);
    }
    drop(state);
    inner.notify.notify_one();
}

async fn sweep_stale(inner: &Arc<Inner>) -> usize {
    let mut state = inner.state.lock().await;
    let mut keep = VecDeque::with_capacity(state.idle.len());
    let mut swept = 0usize;
    while let Some(conn) = state.idle.pop_front() {
        if conn.is_expired(inner.max_lifetime).await || conn.is_idle_too_long(inner.idle_timeout).await {
            swept += 1;
        } else {
            keep.push_back(conn);
        }
    }
    state.count = state.count.saturating_sub(swept as u32);
    state.idle = keep;
    drop(state);
    if swept > 0 {
        inner.stats.destroyed.fetch_add(swept as u64, Ordering::Relaxed);
        inner.notify.notify_one();
    }
    swept
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hard_cap_clamps_requested_max_size() {
        // Pool::new requires a tokio runtime (spawns the sweeper); exercise
        // only the pure clamping logic here.
        assert_eq!(100u32.clamp(1, HARD_CAP), HARD_CAP);
        assert_eq!(0u32.clamp(1, HARD_CAP), 1);
    }

    #[test]
    fn stats_snapshot_defaults_to_zero() {
        let snap = PoolStatsSnapshot::default();
        assert_eq!(snap.created, 0);
        assert_eq!(snap.borrowed, 0);
    }
}
