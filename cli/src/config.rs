//! YAML configuration loader (spec.md §6): reads the on-disk config file,
//! interpolates `${VAR}`/`${VAR:default}` references against the process
//! environment, and deserializes the result into an [`AppConfig`]. The
//! core only ever sees fully-resolved values.

use std::path::Path;

use anyhow::{bail, Context, Result};
use pgschema_diff_types::AppConfig;
use regex::{Captures, Regex};

/// Matches `${VAR}` or `${VAR:default}`. `VAR` must be a valid identifier;
/// the default, when present, is everything up to the closing brace.
fn env_reference_pattern() -> Regex {
    Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_]*)(?::([^}]*))?\}").expect("static pattern is valid")
}

fn interpolate_env(input: &str) -> Result<String> {
    let pattern = env_reference_pattern();
    let mut missing = Vec::new();

    let resolved = pattern.replace_all(input, |caps: &Captures| {
        let name = &caps[1];
        match std::env::var(name) {
            Ok(value) => value,
            Err(_) => match caps.get(2) {
                Some(default) => default.as_str().to_string(),
                None => {
                    missing.push(name.to_string());
                    String::new()
                }
            },
        }
    });

    if !missing.is_empty() {
        bail!("missing required environment variables: {}", missing.join(", "));
    }
    Ok(resolved.into_owned())
}

/// Loads and fully resolves the config file at `path`. Validates both
/// `DatabaseConfig`s before returning so a malformed config fails fast,
/// before the engine ever opens a connection.
pub fn load(path: &Path) -> Result<AppConfig> {
    let raw = std::fs::read_to_string(path).with_context(|| format!("reading config file {}", path.display()))?;
    let resolved = interpolate_env(&raw).with_context(|| format!("resolving environment references in {}", path.display()))?;
    let config: AppConfig =
        serde_yaml::from_str(&resolved).with_context(|| format!("parsing config file {}", path.display()))?;
    config.source.validate().context("source database config")?;
    config.target.validate().context("target database config")?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn substitutes_a_set_variable() {
        std::env::set_var("PGSCHEMA_DIFF_TEST_VAR", "hello");
        let out = interpolate_env("value: ${PGSCHEMA_DIFF_TEST_VAR}").unwrap();
        assert_eq!(out, "value: hello");
        std::env::remove_var("PGSCHEMA_DIFF_TEST_VAR");
    }

    #[test]
    fn falls_back_to_the_declared_default() {
        std::env::remove_var("PGSCHEMA_DIFF_TEST_UNSET");
        let out = interpolate_env("port: ${PGSCHEMA_DIFF_TEST_UNSET:5432}").unwrap();
        assert_eq!(out, "port: 5432");
    }

    #[test]
    fn a_reference_with_no_default_and_no_env_value_is_an_error() {
        std::env::remove_var("PGSCHEMA_DIFF_TEST_REQUIRED");
        assert!(interpolate_env("host: ${PGSCHEMA_DIFF_TEST_REQUIRED}").is_err());
    }
}
