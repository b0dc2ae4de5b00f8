//! Parsed PostgreSQL server versions and the ordering over them.

use std::cmp::Ordering;
use std::fmt;

use serde::{Deserialize, Serialize};

/// A parsed `major.minor.patch` server version, plus the raw string it came
/// from and a single comparable `numeric` value (`major*10000 + minor*100 +
/// patch`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PostgresVersion {
    pub major: u32,
    pub minor: u32,
    pub patch: u32,
    pub raw: String,
    pub numeric: u32,
}

impl PostgresVersion {
    pub fn new(major: u32, minor: u32, patch: u32, raw: impl Into<String>) -> Self {
        Self {
            major,
            minor,
            patch,
            raw: raw.into(),
            numeric: major * 10_000 + minor * 100 + patch,
        }
    }

    /// Parses the leading `N[.N[.N]]` prefix of a `SELECT version()` string,
    /// e.g. `"PostgreSQL 14.9 on x86_64-pc-linux-gnu, ..."` -> `14.9.0`.
    pub fn parse(version_string: &str) -> Option<Self> {
        let digits_and_dots = version_string
            .split_whitespace()
            .find(|tok| tok.chars().next().is_some_and(|c| c.is_ascii_digit()))?;
        let mut parts = digits_and_dots.splitn(3, '.');
        let major: u32 = parts
            .next()
            .and_then(|s| s.split(|c: char| !c.is_ascii_digit()).next())
            .and_then(|s| s.parse().ok())?;
        let minor: u32 = parts
            .next()
            .and_then(|s| s.split(|c: char| !c.is_ascii_digit()).next())
            .and_then(|s| s.parse().ok())
            .unwrap_or(0);
        let patch: u32 = parts
            .next()
            .and_then(|s| s.split(|c: char| !c.is_ascii_digit()).next())
            .and_then(|s| s.parse().ok())
            .unwrap_or(0);
        Some(Self::new(major, minor, patch, version_string))
    }
}

impl PartialOrd for PostgresVersion {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for PostgresVersion {
    fn cmp(&self, other: &Self) -> Ordering {
        self.numeric.cmp(&other.numeric)
    }
}

impl fmt::Display for PostgresVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_full_server_banner() {
        let v = PostgresVersion::parse("PostgreSQL 14.9 on x86_64-pc-linux-gnu, compiled by gcc").unwrap();
        assert_eq!((v.major, v.minor, v.patch), (14, 9, 0));
    }

    #[test]
    fn parses_major_only() {
        let v = PostgresVersion::parse("16devel").unwrap();
        assert_eq!(v.major, 16);
    }

    #[test]
    fn orders_by_numeric() {
        let a = PostgresVersion::new(13, 0, 0, "13.0");
        let b = PostgresVersion::new(14, 0, 0, "14.0");
        assert!(a < b);
    }
}
