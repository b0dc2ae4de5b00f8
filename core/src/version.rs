//! Version Manager (spec.md §4.4): static feature-support knowledge keyed
//! by server major.minor, plus version comparison and per-operation
//! validation.

use pgschema_diff_types::PostgresVersion;

use crate::error::{Error, Result};

pub const MINIMUM_SUPPORTED: (u32, u32) = (13, 0);
pub const RECOMMENDED: (u32, u32) = (14, 0);

/// The feature flags this tool cares about when introspecting or reporting
/// on a catalog. Conservative (all `false`) is the fallback for versions
/// older than anything in [`FEATURE_TABLE`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FeatureSupport {
    pub incremental_sort: bool,
    pub multirange_types: bool,
    pub merge_statement: bool,
}

/// `(major, minor)` -> feature set, ordered ascending. `feature_support`
/// looks up exact major.minor, then falls back to the largest entry with a
/// lower or equal major.minor, then the conservative default.
const FEATURE_TABLE: &[((u32, u32), FeatureSupport)] = &[
    (
        (13, 0),
        FeatureSupport {
            incremental_sort: false,
            multirange_types: false,
            merge_statement: false,
        },
    ),
    (
        (14, 0),
        FeatureSupport {
            incremental_sort: true,
            multirange_types: true,
            merge_statement: false,
        },
    ),
    (
        (15, 0),
        FeatureSupport {
            incremental_sort: true,
            multirange_types: true,
            merge_statement: true,
        },
    ),
];

/// A fixed catalog of operation names to the minimum version they require.
/// Unknown operation names are treated as requiring the absolute minimum.
const OPERATION_MINIMUMS: &[(&str, (u32, u32))] = &[
    ("multirange_introspection", (14, 0)),
    ("merge_statement_introspection", (15, 0)),
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VersionOrder {
    Equal,
    Less,
    Greater,
}

#[derive(Debug, Clone)]
pub struct VersionComparison {
    pub order: VersionOrder,
    pub major_delta: i64,
    pub minor_delta: i64,
    pub patch_delta: i64,
    pub compatibility_concerns: Vec<String>,
}

pub fn feature_support(version: &PostgresVersion) -> FeatureSupport {
    let key = (version.major, version.minor);
    if let Some((_, features)) = FEATURE_TABLE.iter().find(|(k, _)| *k == key) {
        return *features;
    }
    if let Some((_, features)) = FEATURE_TABLE
        .iter()
        .filter(|(k, _)| k.0 == version.major && k.1 <= version.minor)
        .max_by_key(|(k, _)| k.1)
    {
        return *features;
    }
    if let Some((_, features)) = FEATURE_TABLE.iter().filter(|(k, _)| *k < key).max_by_key(|(k, _)| *k) {
        return *features;
    }
    FeatureSupport::default()
}

pub fn compare_versions(a: &PostgresVersion, b: &PostgresVersion) -> VersionComparison {
    let order = match a.numeric.cmp(&b.numeric) {
        std::cmp::Ordering::Equal => VersionOrder::Equal,
        std::cmp::Ordering::Less => VersionOrder::Less,
        std::cmp::Ordering::Greater => VersionOrder::Greater,
    };
    let mut concerns = Vec::new();
    let major_delta = a.major as i64 - b.major as i64;
    if major_delta != 0 {
        concerns.push(format!(
            "major versions differ: {} vs {}",
            a.major, b.major
        ));
    }
    if major_delta.abs() > 2 {
        concerns.push(format!(
            "major versions differ by more than 2: {} vs {}",
            a.major, b.major
        ));
    }
    VersionComparison {
        order,
        major_delta,
        minor_delta: a.minor as i64 - b.minor as i64,
        patch_delta: a.patch as i64 - b.patch as i64,
        compatibility_concerns: concerns,
    }
}

pub fn validate_minimum(version: &PostgresVersion) -> Result<()> {
    let minimum = PostgresVersion::new(MINIMUM_SUPPORTED.0, MINIMUM_SUPPORTED.1, 0, "13.0");
    if version.numeric < minimum.numeric {
        return Err(Error::VersionUnsupported {
            found: version.to_string(),
            minimum: minimum.to_string(),
        });
    }
    Ok(())
}

pub fn validate_for_operation(version: &PostgresVersion, operation: &str) -> Result<()> {
    let (major, minor) = OPERATION_MINIMUMS
        .iter()
        .find(|(name, _)| *name == operation)
        .map(|(_, v)| *v)
        .unwrap_or(MINIMUM_SUPPORTED);
    let required = PostgresVersion::new(major, minor, 0, format!("{major}.{minor}"));
    if version.numeric < required.numeric {
        return Err(Error::UnsupportedFeature {
            feature: operation.to_string(),
            required_version: required.to_string(),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn minimum_version_accepted() {
        let v = PostgresVersion::new(13, 0, 0, "13.0");
        assert!(validate_minimum(&v).is_ok());
    }

    #[test]
    fn below_minimum_rejected() {
        let v = PostgresVersion::new(12, 9, 0, "12.9");
        assert!(matches!(validate_minimum(&v), Err(Error::VersionUnsupported { .. })));
    }

    #[test]
    fn feature_support_exact_match() {
        let v = PostgresVersion::new(14, 0, 0, "14.0");
        let f = feature_support(&v);
        assert!(f.incremental_sort);
        assert!(!f.merge_statement);
    }

    #[test]
    fn feature_support_same_major_fallback() {
        let v = PostgresVersion::new(14, 5, 0, "14.5");
        let f = feature_support(&v);
        assert!(f.incremental_sort);
    }

    #[test]
    fn feature_support_below_table_is_conservative() {
        let v = PostgresVersion::new(9, 6, 0, "9.6");
        let f = feature_support(&v);
        assert!(!f.incremental_sort && !f.multirange_types && !f.merge_statement);
    }

    #[test]
    fn compare_versions_flags_large_major_gap() {
        let a = PostgresVersion::new(17, 0, 0, "17.0");
        let b = PostgresVersion::new(13, 0, 0, "13.0");
        let cmp = compare_versions(&a, &b);
        assert_eq!(cmp.compatibility_concerns.len(), 2);
    }
}
