//! The shared error envelope. Concrete error enums (in `pgschema-diff-core`)
//! implement `Into<ErrorContext>`; this module only carries the taxonomy
//! spec.md §7 requires every error to expose.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use strum_macros::{Display, EnumString};

#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumString, Display, Serialize, Deserialize)]
pub enum ErrorSeverity {
    Low,
    Medium,
    High,
    Critical,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumString, Display, Serialize, Deserialize)]
pub enum ErrorCategory {
    Database,
    Config,
    Validation,
    Processing,
}

/// A stable textual code, human message, severity/category classification,
/// optional cause chain, a free-form technical-details map, recovery
/// suggestions, a retriable flag, and the process exit code this error
/// maps to — exactly the envelope spec.md §7 requires every error to carry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorContext {
    pub code: &'static str,
    pub message: String,
    pub severity: ErrorSeverity,
    pub category: ErrorCategory,
    pub cause: Option<String>,
    pub technical_details: BTreeMap<String, String>,
    pub recovery_suggestions: Vec<String>,
    pub retriable: bool,
    pub exit_code: i32,
}

impl ErrorContext {
    pub fn new(
        code: &'static str,
        message: impl Into<String>,
        severity: ErrorSeverity,
        category: ErrorCategory,
        exit_code: i32,
    ) -> Self {
        Self {
            code,
            message: message.into(),
            severity,
            category,
            cause: None,
            technical_details: BTreeMap::new(),
            recovery_suggestions: Vec::new(),
            retriable: false,
            exit_code,
        }
    }

    pub fn with_cause(mut self, cause: impl Into<String>) -> Self {
        self.cause = Some(cause.into());
        self
    }

    pub fn with_detail(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.technical_details.insert(key.into(), value.into());
        self
    }

    pub fn with_suggestion(mut self, suggestion: impl Into<String>) -> Self {
        self.recovery_suggestions.push(suggestion.into());
        self
    }

    pub fn retriable(mut self) -> Self {
        self.retriable = true;
        self
    }
}

/// Exponential backoff with jitter, per spec.md §7: base 1-2s, cap 10-30s,
/// factor 2, ±50% jitter. Only database errors use this by default.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub base: std::time::Duration,
    pub cap: std::time::Duration,
    pub factor: f64,
    pub jitter_ratio: f64,
    pub max_attempts: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            base: std::time::Duration::from_millis(1500),
            cap: std::time::Duration::from_secs(20),
            factor: 2.0,
            jitter_ratio: 0.5,
            max_attempts: 5,
        }
    }
}

impl RetryPolicy {
    /// The un-jittered delay before attempt `attempt` (0-indexed).
    pub fn delay_for(&self, attempt: u32) -> std::time::Duration {
        let scaled = self.base.as_secs_f64() * self.factor.powi(attempt as i32);
        std::time::Duration::from_secs_f64(scaled.min(self.cap.as_secs_f64()))
    }
}
