//! Value objects shared between the comparison engine and its boundary.
//!
//! Everything here is an immutable value object once constructed: identity
//! is carried by a canonical name (or name tuple), never by memory address.

pub mod config;
pub mod diff;
pub mod error;
pub mod grouped;
pub mod pool;
pub mod schema;
pub mod version;

pub use config::{
    AppConfig, ComparisonConfig, ConfigValidationError, DatabaseConfig, LogLevel, OutputConfig,
    OverwritePolicy, PostgresRequirementsConfig, ReportFormat, SslMode, SystemConfig,
};
pub use diff::{BucketCounts, ChangeSet, DiffResult, DiffSummary, FieldChange, Modified, TableDiff};
pub use error::{ErrorCategory, ErrorContext, ErrorSeverity, RetryPolicy};
pub use grouped::{GroupedDiff, TableGroup};
pub use pool::{ConnectionInfo, ConnectionStatus, HealthSummary, Permissions, PoolHealth};
pub use schema::{
    Column, Constraint, ConstraintKind, Function, FunctionKind, Index, IndexMethod, Role,
    SchemaSnapshot, Sequence, Table, Trigger, TriggerEvent, TriggerTiming, View,
};
pub use version::PostgresVersion;
