//! Database Manager (spec.md §4.3): owns exactly two pools, `source` and
//! `target`, verifies each on `init`, and tears both down on any failure or
//! on shutdown.

use std::time::{Duration, Instant};

use pgschema_diff_types::{DatabaseConfig, HealthSummary, Permissions, PoolHealth, PostgresVersion};
use tracing::{info, instrument};

use crate::error::{Error, Result};
use crate::health::HealthHistory;
use crate::pool::{Lease, Pool};
use crate::version;

const DEFAULT_ACQUIRE_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    Source,
    Target,
}

impl Side {
    fn label(self) -> &'static str {
        match self {
            Side::Source => "source",
            Side::Target => "target",
        }
    }
}

pub struct Manager {
    source: Pool,
    target: Pool,
    source_version: tokio::sync::OnceCell<PostgresVersion>,
    target_version: tokio::sync::OnceCell<PostgresVersion>,
    health_history: tokio::sync::Mutex<HealthHistory>,
}

impl Manager {
    pub fn new(source_config: DatabaseConfig, target_config: DatabaseConfig, max_size: u32) -> Self {
        Self {
            source: Pool::new(source_config, max_size),
            target: Pool::new(target_config, max_size),
            source_version: tokio::sync::OnceCell::new(),
            target_version: tokio::sync::OnceCell::new(),
            health_history: tokio::sync::Mutex::new(HealthHistory::new()),
        }
    }

    /// Probes both sides, verifying they each meet the minimum supported
    /// version and the required permission set. Tears both pools down on
    /// any failure, wrapping the underlying cause in `ManagerInitFailed`.
    #[instrument(skip(self))]
    pub async fn init(&self) -> Result<()> {
        if let Err(err) = self.init_side(Side::Source).await {
            self.close().await;
            return Err(Error::ManagerInitFailed(Box::new(err)));
        }
        if let Err(err) = self.init_side(Side::Target).await {
            self.close().await;
            return Err(Error::ManagerInitFailed(Box::new(err)));
        }
        info!("manager initialized both pools");
        Ok(())
    }

    async fn init_side(&self, side: Side) -> Result<()> {
        let started = Instant::now();
        let result = self.init_side_inner(side).await;
        self.health_history.lock().await.record(result.is_ok(), started.elapsed());
        result
    }

    async fn init_side_inner(&self, side: Side) -> Result<()> {
        let pool = self.pool_for(side);
        let lease = pool.acquire(DEFAULT_ACQUIRE_TIMEOUT).await?;
        lease
            .client()
            .await
            .simple_query("SELECT 1")
            .await
            .map_err(Error::QueryFailed)?;
        let version = read_version(&lease).await?;
        version::validate_minimum(&version)?;
        let permissions = read_permissions(&lease).await?;
        if !permissions.has_required() {
            pool.release(lease).await;
            return Err(Error::InsufficientPrivileges {
                privilege: missing_privilege(&permissions),
            });
        }
        pool.release(lease).await;
        match side {
            Side::Source => {
                let _ = self.source_version.set(version);
            }
            Side::Target => {
                let _ = self.target_version.set(version);
            }
        }
        info!(side = side.label(), "side verified");
        Ok(())
    }

    fn pool_for(&self, side: Side) -> &Pool {
        match side {
            Side::Source => &self.source,
            Side::Target => &self.target,
        }
    }

    pub async fn get_source(&self) -> Result<Lease> {
        self.source.acquire(DEFAULT_ACQUIRE_TIMEOUT).await
    }

    pub async fn get_target(&self) -> Result<Lease> {
        self.target.acquire(DEFAULT_ACQUIRE_TIMEOUT).await
    }

    pub async fn release_source(&self, lease: Lease) {
        self.source.release(lease).await;
    }

    pub async fn release_target(&self, lease: Lease) {
        self.target.release(lease).await;
    }

    pub async fn verify(&self, side: Side) -> Result<()> {
        self.init_side(side).await
    }

    pub fn versions(&self) -> (Option<&PostgresVersion>, Option<&PostgresVersion>) {
        (self.source_version.get(), self.target_version.get())
    }

    pub async fn pool_health(&self) -> (PoolHealth, PoolHealth) {
        (self.source.health().await, self.target.health().await)
    }

    /// Rolling summary of every `init_side`/`verify` probe this manager has
    /// run, across both sides.
    pub async fn health_summary(&self) -> HealthSummary {
        self.health_history.lock().await.summary()
    }

    pub async fn cleanup_stale(&self) -> (usize, usize) {
        (self.source.sweep_stale().await, self.target.sweep_stale().await)
    }

    /// Idempotent: closing an already-closed manager is a no-op on each
    /// pool (`Pool::close` itself tolerates being called more than once).
    #[instrument(skip(self))]
    pub async fn close(&self) {
        self.target.close().await;
        self.source.close().await;
    }
}

async fn read_version(lease: &Lease) -> Result<PostgresVersion> {
    let row = lease
        .client()
        .await
        .query_one("SELECT version()", &[])
        .await
        .map_err(Error::QueryFailed)?;
    let raw: String = row.get(0);
    PostgresVersion::parse(&raw).ok_or_else(|| Error::SchemaParsingFailed(format!("unparsable version string: {raw}")))
}

async fn read_permissions(lease: &Lease) -> Result<Permissions> {
    let client = lease.client().await;
    let connect = true; // reaching this point means the connection already succeeded
    let read_schema: bool = client
        .query_one("SELECT has_schema_privilege(current_user, current_schema(), 'USAGE')", &[])
        .await
        .map_err(Error::QueryFailed)?
        .get(0);
    let read_tables: bool = client
        .query_one(
            "SELECT bool_and(has_table_privilege(current_user, c.oid, 'SELECT')) \
             FROM pg_class c WHERE c.relkind = 'r' AND c.relnamespace = current_schema()::regnamespace",
            &[],
        )
        .await
        .map(|row| row.try_get::<_, Option<bool>>(0).ok().flatten().unwrap_or(true))
        .unwrap_or(true);
    let read_views = read_tables;
    let read_constraints = read_schema;
    let read_indexes = read_schema;
    let usable_schemas = client
        .query(
            "SELECT nspname FROM pg_namespace WHERE has_schema_privilege(current_user, oid, 'USAGE')",
            &[],
        )
        .await
        .map(|rows| rows.iter().map(|r| r.get::<_, String>(0)).collect())
        .unwrap_or_default();
    Ok(Permissions {
        connect,
        read_schema,
        read_tables,
        read_views,
        read_constraints,
        read_indexes,
        usable_schemas,
    })
}

fn missing_privilege(p: &Permissions) -> String {
    let mut missing = Vec::new();
    if !p.connect {
        missing.push("connect");
    }
    if !p.read_schema {
        missing.push("USAGE on schema");
    }
    if !p.read_tables {
        missing.push("SELECT on tables");
    }
    if !p.read_views {
        missing.push("SELECT on views");
    }
    if !p.read_constraints {
        missing.push("read constraints");
    }
    missing.join(", ")
}
