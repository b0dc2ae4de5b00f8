//! Configuration value objects. These are produced by the CLI/YAML+env
//! boundary and handed to the core read-only — see `cli::config` for the
//! loader that builds one of these.

use std::path::PathBuf;
use std::time::Duration;

use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use strum_macros::{Display, EnumString};

/// One of the six SSL negotiation modes `libpq` understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumString, Display, Serialize, Deserialize)]
#[strum(serialize_all = "kebab-case")]
#[serde(rename_all = "kebab-case")]
pub enum SslMode {
    Disable,
    Allow,
    Prefer,
    Require,
    VerifyCa,
    VerifyFull,
}

impl SslMode {
    pub fn requires_ca(self) -> bool {
        matches!(self, SslMode::VerifyCa | SslMode::VerifyFull)
    }
}

/// Connection parameters for one side (source or target) of a comparison.
///
/// Validated once at construction by [`DatabaseConfig::validate`]; every
/// other component treats an already-built `DatabaseConfig` as trusted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub host: String,
    pub port: u16,
    pub database: String,
    pub username: String,
    pub password: SecretString,
    pub schema: String,
    #[serde(with = "humantime_secs")]
    pub connect_timeout: Duration,
    pub ssl_mode: SslMode,
    pub ssl_cert_path: Option<PathBuf>,
    pub ssl_key_path: Option<PathBuf>,
    pub ssl_ca_path: Option<PathBuf>,
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ConfigValidationError {
    #[error("host must not be empty")]
    EmptyHost,
    #[error("database name must not be empty")]
    EmptyDatabase,
    #[error("username must not be empty")]
    EmptyUsername,
    #[error("port must be in 1..=65535")]
    InvalidPort,
    #[error("connect timeout must be between 1s and 300s")]
    InvalidConnectTimeout,
    #[error("ssl_mode {0} requires ssl_ca_path to be set")]
    MissingCaPath(SslMode),
}

impl DatabaseConfig {
    pub fn validate(&self) -> Result<(), ConfigValidationError> {
        if self.host.trim().is_empty() {
            return Err(ConfigValidationError::EmptyHost);
        }
        if self.database.trim().is_empty() {
            return Err(ConfigValidationError::EmptyDatabase);
        }
        if self.username.trim().is_empty() {
            return Err(ConfigValidationError::EmptyUsername);
        }
        if self.port == 0 {
            return Err(ConfigValidationError::InvalidPort);
        }
        let secs = self.connect_timeout.as_secs();
        if !(1..=300).contains(&secs) {
            return Err(ConfigValidationError::InvalidConnectTimeout);
        }
        if self.ssl_mode.requires_ca() && self.ssl_ca_path.is_none() {
            return Err(ConfigValidationError::MissingCaPath(self.ssl_mode));
        }
        Ok(())
    }
}

/// Output-format selection and rendering behavior.
#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumString, Display, Serialize, Deserialize)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum ReportFormat {
    Html,
    Markdown,
    Json,
    Xml,
}

impl ReportFormat {
    pub fn file_extension(self) -> &'static str {
        match self {
            ReportFormat::Html => ".html",
            ReportFormat::Markdown => ".md",
            ReportFormat::Json => ".json",
            ReportFormat::Xml => ".xml",
        }
    }

    pub fn mime_type(self) -> &'static str {
        match self {
            ReportFormat::Html => "text/html",
            ReportFormat::Markdown => "text/markdown",
            ReportFormat::Json => "application/json",
            ReportFormat::Xml => "application/xml",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumString, Display, Serialize, Deserialize)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum OverwritePolicy {
    Allow,
    Forbid,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputConfig {
    pub formats: Vec<ReportFormat>,
    pub directory: PathBuf,
    pub filename_template: String,
    pub timestamp_format: String,
    pub overwrite_policy: OverwritePolicy,
    pub group_by_table: bool,
    pub include_metadata: bool,
    pub include_summary: bool,
    pub include_details: bool,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            formats: vec![ReportFormat::Json],
            directory: PathBuf::from("."),
            filename_template: "schema_diff_{timestamp}_{format}{ext}".to_string(),
            timestamp_format: "%Y%m%d_%H%M%S".to_string(),
            overwrite_policy: OverwritePolicy::Forbid,
            group_by_table: false,
            include_metadata: true,
            include_summary: true,
            include_details: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComparisonConfig {
    pub include_views: bool,
    pub include_functions: bool,
    pub include_constraints: bool,
    pub include_indexes: bool,
    pub include_triggers: bool,
    pub ignore_case: bool,
    pub exclude_tables: Vec<String>,
    pub exclude_columns: Vec<String>,
    pub max_diff_items: Option<usize>,
}

impl Default for ComparisonConfig {
    fn default() -> Self {
        Self {
            include_views: true,
            include_functions: true,
            include_constraints: true,
            include_indexes: true,
            include_triggers: true,
            ignore_case: false,
            exclude_tables: Vec::new(),
            exclude_columns: Vec::new(),
            max_diff_items: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumString, Display, Serialize, Deserialize)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SystemConfig {
    pub log_level: LogLevel,
    pub timezone: String,
    pub max_connections: u32,
    pub worker_threads: usize,
    pub memory_limit_mb: Option<u64>,
    pub temp_dir: PathBuf,
}

impl Default for SystemConfig {
    fn default() -> Self {
        Self {
            log_level: LogLevel::Info,
            timezone: "UTC".to_string(),
            max_connections: 5,
            worker_threads: 4,
            memory_limit_mb: None,
            temp_dir: std::env::temp_dir(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PostgresRequirementsConfig {
    pub minimum_version: String,
    pub version_check_enabled: bool,
}

impl Default for PostgresRequirementsConfig {
    fn default() -> Self {
        Self {
            minimum_version: "13.0".to_string(),
            version_check_enabled: true,
        }
    }
}

/// The fully-resolved config object the boundary hands the engine. Every
/// field has already been validated and every `${VAR}` interpolated.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub source: DatabaseConfig,
    pub target: DatabaseConfig,
    pub output: OutputConfig,
    pub comparison: ComparisonConfig,
    pub system: SystemConfig,
    pub postgres: PostgresRequirementsConfig,
}

mod humantime_secs {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_secs())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        let secs = u64::deserialize(d)?;
        Ok(Duration::from_secs(secs))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid_config() -> DatabaseConfig {
        DatabaseConfig {
            host: "localhost".to_string(),
            port: 5432,
            database: "app".to_string(),
            username: "app".to_string(),
            password: SecretString::from("secret".to_string()),
            schema: "public".to_string(),
            connect_timeout: Duration::from_secs(10),
            ssl_mode: SslMode::Prefer,
            ssl_cert_path: None,
            ssl_key_path: None,
            ssl_ca_path: None,
        }
    }

    #[test]
    fn accepts_a_well_formed_config() {
        assert!(valid_config().validate().is_ok());
    }

    #[test]
    fn rejects_verify_full_without_ca_path() {
        let mut cfg = valid_config();
        cfg.ssl_mode = SslMode::VerifyFull;
        assert_eq!(
            cfg.validate(),
            Err(ConfigValidationError::MissingCaPath(SslMode::VerifyFull))
        );
    }

    #[test]
    fn rejects_timeout_out_of_range() {
        let mut cfg = valid_config();
        cfg.connect_timeout = Duration::from_secs(301);
        assert_eq!(cfg.validate(), Err(ConfigValidationError::InvalidConnectTimeout));
    }

    #[test]
    fn rejects_empty_host() {
        let mut cfg = valid_config();
        cfg.host = "  ".to_string();
        assert_eq!(cfg.validate(), Err(ConfigValidationError::EmptyHost));
    }
}
