//! Connection metadata value objects reported by the pool and manager.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::version::PostgresVersion;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConnectionStatus {
    Connecting,
    Connected,
    Disconnected,
    Error,
}

/// The permission set a connection's role was observed to have.
///
/// `has_required` is true only when `connect`, `read_schema`,
/// `read_tables`, `read_views`, and `read_constraints` are all true
/// (`read_indexes` is tracked but not part of the minimum bar, matching
/// spec.md §3's wording of the predicate over "the first five").
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Permissions {
    pub connect: bool,
    pub read_schema: bool,
    pub read_tables: bool,
    pub read_views: bool,
    pub read_constraints: bool,
    pub read_indexes: bool,
    pub usable_schemas: Vec<String>,
}

impl Permissions {
    pub fn has_required(&self) -> bool {
        self.connect
            && self.read_schema
            && self.read_tables
            && self.read_views
            && self.read_constraints
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectionInfo {
    pub id: Uuid,
    pub endpoint: String,
    pub status: ConnectionStatus,
    pub version: Option<PostgresVersion>,
    pub permissions: Option<Permissions>,
    pub opened_at: DateTime<Utc>,
    pub last_activity_at: DateTime<Utc>,
    pub last_error: Option<String>,
}

/// A point-in-time health summary for one pool.
///
/// `healthy` ≡ `failed == 0 && utilization < 0.9` where
/// `utilization = active / max` (0 when `max == 0`).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PoolHealth {
    pub total: u32,
    pub active: u32,
    pub idle: u32,
    pub max: u32,
    pub healthy_connections: u32,
    pub failed_connections: u32,
    pub average_lived_seconds: f64,
    pub last_check: DateTime<Utc>,
}

impl PoolHealth {
    pub fn utilization(&self) -> f64 {
        if self.max == 0 {
            0.0
        } else {
            self.active as f64 / self.max as f64
        }
    }

    pub fn is_healthy(&self) -> bool {
        self.failed_connections == 0 && self.utilization() < 0.9
    }
}

/// A rolling summary of `Manager::init_side` probe outcomes, bounded to the
/// most recent window of checks rather than the run's entire lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HealthSummary {
    pub total_checks: u32,
    pub successful_checks: u32,
    pub failed_checks: u32,
    pub average_response_time_ms: f64,
    pub longest_response_time_ms: u64,
    pub shortest_response_time_ms: u64,
}

impl Default for HealthSummary {
    fn default() -> Self {
        Self {
            total_checks: 0,
            successful_checks: 0,
            failed_checks: 0,
            average_response_time_ms: 0.0,
            longest_response_time_ms: 0,
            shortest_response_time_ms: 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn required_permissions_ignore_read_indexes() {
        let mut p = Permissions {
            connect: true,
            read_schema: true,
            read_tables: true,
            read_views: true,
            read_constraints: true,
            read_indexes: false,
            usable_schemas: vec![],
        };
        assert!(p.has_required());
        p.read_constraints = false;
        assert!(!p.has_required());
    }

    #[test]
    fn healthy_requires_no_failures_and_low_utilization() {
        let now = Utc::now();
        let h = PoolHealth {
            total: 10,
            active: 9,
            idle: 1,
            max: 10,
            healthy_connections: 10,
            failed_connections: 0,
            average_lived_seconds: 1.0,
            last_check: now,
        };
        assert!(!h.is_healthy(), "90% utilization is not < 90%");
        let h2 = PoolHealth { active: 8, ..h };
        assert!(h2.is_healthy());
        let h3 = PoolHealth {
            failed_connections: 1,
            ..h2
        };
        assert!(!h3.is_healthy());
    }
}
