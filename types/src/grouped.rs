//! The table-oriented re-pivot of a [`crate::diff::DiffResult`] produced by
//! the Grouping Transformer, for renderers that lay out one section per
//! table instead of one section per change type.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::schema::Table;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeType {
    Added,
    Removed,
    Modified,
}

/// One table's worth of changes. `children` maps a bucket name such as
/// `columns_added` or `constraints_modified` to the serialized items in
/// that bucket; only buckets with at least one entry are present.
///
/// Invariant: if `change_type` is `Added` or `Removed`, `children` is
/// always empty — those changes are implied by the table itself and are
/// never duplicated as independent entries.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TableGroup {
    pub table_name: String,
    pub change_type: ChangeType,
    pub table_info: Option<Table>,
    pub children: BTreeMap<String, Vec<Value>>,
}

impl TableGroup {
    pub fn added(table: Table) -> Self {
        Self {
            table_name: table.name.clone(),
            change_type: ChangeType::Added,
            table_info: Some(table),
            children: BTreeMap::new(),
        }
    }

    pub fn removed(table: Table) -> Self {
        Self {
            table_name: table.name.clone(),
            change_type: ChangeType::Removed,
            table_info: Some(table),
            children: BTreeMap::new(),
        }
    }

    pub fn modified(table_name: impl Into<String>) -> Self {
        Self {
            table_name: table_name.into(),
            change_type: ChangeType::Modified,
            table_info: None,
            children: BTreeMap::new(),
        }
    }

    /// Total changes this group represents: the sum of all child bucket
    /// lengths for a `Modified` group, or 1 for `Added`/`Removed`.
    pub fn total_changes(&self) -> usize {
        match self.change_type {
            ChangeType::Added | ChangeType::Removed => 1,
            ChangeType::Modified => self.children.values().map(|v| v.len()).sum(),
        }
    }

    pub fn has_changes(&self) -> bool {
        match self.change_type {
            ChangeType::Added | ChangeType::Removed => true,
            ChangeType::Modified => !self.children.is_empty(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GroupedDiff {
    pub added: Vec<TableGroup>,
    pub removed: Vec<TableGroup>,
    pub modified: Vec<TableGroup>,
}
