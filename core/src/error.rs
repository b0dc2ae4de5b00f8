//! The engine's error taxonomy (spec.md §7). Follows the teacher's
//! `error::Error` shape — a flat `thiserror` enum with `#[from]`
//! conversions for the driver's own error type — extended with the
//! envelope fields (`severity`, `category`, `technical_details`,
//! `recovery_suggestions`, `retriable`, `exit_code`) the spec requires.

use pgschema_diff_types::{ErrorCategory, ErrorContext, ErrorSeverity};

#[derive(Debug, thiserror::Error)]
pub enum Error {
    // -- Database --
    #[error("connection failed: {0}")]
    ConnectionFailed(String),
    #[error("authentication failed for user")]
    AuthFailed,
    #[error("database not found: {0}")]
    DatabaseNotFound(String),
    #[error("schema not found: {0}")]
    SchemaNotFound(String),
    #[error("access denied to schema {schema}: missing USAGE privilege")]
    SchemaAccessDenied { schema: String },
    #[error("insufficient privileges: missing {privilege}")]
    InsufficientPrivileges { privilege: String },
    #[error("query failed: {0}")]
    QueryFailed(#[from] tokio_postgres::Error),
    #[error("query timed out after {0:?}")]
    QueryTimeout(std::time::Duration),
    #[error("server version {found} is below the minimum supported {minimum}")]
    VersionUnsupported { found: String, minimum: String },
    #[error("timed out waiting for a pooled connection after {0:?}")]
    PoolTimeout(std::time::Duration),
    #[error("pool is shut down")]
    PoolShutdown,
    #[error("pool exhausted: all {0} connections in use")]
    PoolExhausted(u32),
    #[error("health check failed: {0}")]
    HealthCheckFailed(String),

    // -- Config --
    #[error("invalid config: {key}={value}, expected {expected}")]
    InvalidConfig {
        key: String,
        value: String,
        expected: String,
    },
    #[error("missing config keys: {0:?}")]
    MissingConfig(Vec<String>),

    // -- Validation --
    #[error("invalid schema: offending items {0:?}")]
    InvalidSchema(Vec<String>),
    #[error("unsupported feature {feature}, requires {required_version}")]
    UnsupportedFeature {
        feature: String,
        required_version: String,
    },

    // -- Processing --
    #[error("schema collection failed for {role} schema '{schema}': {source}")]
    SchemaCollectionFailed {
        role: String,
        schema: String,
        #[source]
        source: Box<Error>,
    },
    #[error("schema parsing failed: {0}")]
    SchemaParsingFailed(String),
    #[error("comparison failed: {0}")]
    ComparisonFailed(String),
    #[error("report generation failed for format {format}: {message}")]
    ReportGenerationFailed { format: String, message: String },

    #[error("manager initialization failed: {0}")]
    ManagerInitFailed(Box<Error>),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    pub fn is_retriable(&self) -> bool {
        matches!(
            self,
            Error::ConnectionFailed(_)
                | Error::QueryFailed(_)
                | Error::QueryTimeout(_)
                | Error::PoolTimeout(_)
                | Error::HealthCheckFailed(_)
        )
    }

    pub fn exit_code(&self) -> i32 {
        match self {
            Error::ConnectionFailed(_) => 10,
            Error::AuthFailed => 11,
            Error::DatabaseNotFound(_) => 12,
            Error::SchemaNotFound(_) => 12,
            Error::SchemaAccessDenied { .. } => 13,
            Error::InsufficientPrivileges { .. } => 13,
            Error::QueryFailed(_) => 14,
            Error::QueryTimeout(_) => 14,
            Error::VersionUnsupported { .. } => 10,
            Error::PoolTimeout(_) => 10,
            Error::PoolShutdown => 10,
            Error::PoolExhausted(_) => 10,
            Error::HealthCheckFailed(_) => 10,
            Error::InvalidConfig { .. } => 21,
            Error::MissingConfig(_) => 20,
            Error::InvalidSchema(_) => 30,
            Error::UnsupportedFeature { .. } => 31,
            Error::SchemaCollectionFailed { .. } => 41,
            Error::SchemaParsingFailed(_) => 40,
            Error::ComparisonFailed(_) => 41,
            Error::ReportGenerationFailed { .. } => 42,
            Error::ManagerInitFailed(_) => 10,
        }
    }

    /// Builds the full envelope spec.md §7 requires every error to expose.
    pub fn context(&self) -> ErrorContext {
        let (code, category, severity): (&'static str, ErrorCategory, ErrorSeverity) = match self {
            Error::ConnectionFailed(_) => ("ConnectionFailed", ErrorCategory::Database, ErrorSeverity::High),
            Error::AuthFailed => ("AuthFailed", ErrorCategory::Database, ErrorSeverity::High),
            Error::DatabaseNotFound(_) => ("DatabaseNotFound", ErrorCategory::Database, ErrorSeverity::High),
            Error::SchemaNotFound(_) => ("SchemaNotFound", ErrorCategory::Database, ErrorSeverity::High),
            Error::SchemaAccessDenied { .. } => {
                ("SchemaAccessDenied", ErrorCategory::Database, ErrorSeverity::High)
            }
            Error::InsufficientPrivileges { .. } => {
                ("InsufficientPrivileges", ErrorCategory::Database, ErrorSeverity::High)
            }
            Error::QueryFailed(_) => ("QueryFailed", ErrorCategory::Database, ErrorSeverity::Medium),
            Error::QueryTimeout(_) => ("QueryTimeout", ErrorCategory::Database, ErrorSeverity::Medium),
            Error::VersionUnsupported { .. } => {
                ("VersionUnsupported", ErrorCategory::Database, ErrorSeverity::Critical)
            }
            Error::PoolTimeout(_) => ("PoolTimeout", ErrorCategory::Database, ErrorSeverity::Medium),
            Error::PoolShutdown => ("PoolShutdown", ErrorCategory::Database, ErrorSeverity::Low),
            Error::PoolExhausted(_) => ("PoolExhausted", ErrorCategory::Database, ErrorSeverity::Medium),
            Error::HealthCheckFailed(_) => ("HealthCheckFailed", ErrorCategory::Database, ErrorSeverity::Medium),
            Error::InvalidConfig { .. } => ("InvalidConfig", ErrorCategory::Config, ErrorSeverity::Critical),
            Error::MissingConfig(_) => ("MissingConfig", ErrorCategory::Config, ErrorSeverity::Critical),
            Error::InvalidSchema(_) => ("InvalidSchema", ErrorCategory::Validation, ErrorSeverity::High),
            Error::UnsupportedFeature { .. } => {
                ("UnsupportedFeature", ErrorCategory::Validation, ErrorSeverity::Medium)
            }
            Error::SchemaCollectionFailed { .. } => {
                ("SchemaCollectionFailed", ErrorCategory::Processing, ErrorSeverity::High)
            }
            Error::SchemaParsingFailed(_) => {
                ("SchemaParsingFailed", ErrorCategory::Processing, ErrorSeverity::High)
            }
            Error::ComparisonFailed(_) => ("ComparisonFailed", ErrorCategory::Processing, ErrorSeverity::High),
            Error::ReportGenerationFailed { .. } => {
                ("ReportGenerationFailed", ErrorCategory::Processing, ErrorSeverity::Medium)
            }
            Error::ManagerInitFailed(_) => ("ManagerInitFailed", ErrorCategory::Database, ErrorSeverity::Critical),
        };

        let mut ctx = ErrorContext::new(code, self.to_string(), severity, category, self.exit_code());
        if self.is_retriable() {
            ctx = ctx.retriable();
        }
        if let Some(source) = std::error::Error::source(self) {
            ctx = ctx.with_cause(source.to_string());
        }
        match self {
            Error::InvalidConfig { key, value, expected } => {
                ctx = ctx
                    .with_detail("key", key.clone())
                    .with_detail("value", value.clone())
                    .with_detail("expected", expected.clone());
            }
            Error::MissingConfig(keys) => {
                ctx = ctx.with_detail("missing_keys", keys.join(","));
            }
            Error::InvalidSchema(items) => {
                ctx = ctx.with_detail("offending_items", items.join(","));
            }
            Error::UnsupportedFeature { feature, required_version } => {
                ctx = ctx
                    .with_detail("feature", feature.clone())
                    .with_detail("required_version", required_version.clone())
                    .with_suggestion(format!("upgrade PostgreSQL to {required_version} or later"));
            }
            Error::VersionUnsupported { found, minimum } => {
                ctx = ctx
                    .with_detail("found_version", found.clone())
                    .with_detail("minimum_version", minimum.clone())
                    .with_suggestion(format!("upgrade PostgreSQL to {minimum} or later"));
            }
            Error::SchemaAccessDenied { schema } => {
                ctx = ctx
                    .with_detail("schema", schema.clone())
                    .with_suggestion(format!("GRANT USAGE ON SCHEMA {schema} TO <role>"));
            }
            _ => {}
        }
        ctx
    }
}
