//! The structural delta produced by the Differencing Engine.
//!
//! `DiffResult` is immutable after construction: the Grouping Transformer
//! and Report Renderer only ever read it.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::schema::{Column, Constraint, Function, Index, Sequence, Table, Trigger, View};

/// One field's before/after value. Values are kept as [`serde_json::Value`]
/// so that string, boolean, numeric, and list-valued fields all share one
/// representation — this is also exactly the shape the JSON renderer needs,
/// so there is no separate conversion step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldChange {
    pub from: Value,
    pub to: Value,
}

impl FieldChange {
    pub fn new(from: impl Into<Value>, to: impl Into<Value>) -> Self {
        Self {
            from: from.into(),
            to: to.into(),
        }
    }
}

/// An entity present in both snapshots whose field comparator found at
/// least one difference. `item` is the post-state (target-side) object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Modified<T> {
    pub item: T,
    pub changes: BTreeMap<String, FieldChange>,
}

/// The three disjoint outcomes for one entity kind: present only in the
/// target, present only in the source, or present in both with at least
/// one changed field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangeSet<T> {
    pub added: Vec<T>,
    pub removed: Vec<T>,
    pub modified: Vec<Modified<T>>,
}

impl<T> Default for ChangeSet<T> {
    fn default() -> Self {
        Self {
            added: Vec::new(),
            removed: Vec::new(),
            modified: Vec::new(),
        }
    }
}

impl<T> ChangeSet<T> {
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty() && self.modified.is_empty()
    }

    pub fn len(&self) -> usize {
        self.added.len() + self.removed.len() + self.modified.len()
    }

    pub fn counts(&self) -> BucketCounts {
        BucketCounts {
            added: self.added.len(),
            removed: self.removed.len(),
            modified: self.modified.len(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BucketCounts {
    pub added: usize,
    pub removed: usize,
    pub modified: usize,
}

impl BucketCounts {
    pub fn total(&self) -> usize {
        self.added + self.removed + self.modified
    }
}

/// The child-entity changes belonging to one modified table, kept alongside
/// the flat top-level buckets so the Grouping Transformer doesn't need to
/// re-scan every bucket by table name.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TableDiff {
    pub table_name: String,
    pub columns: ChangeSet<Column>,
    pub constraints: ChangeSet<Constraint>,
    pub indexes: ChangeSet<Index>,
    pub triggers: ChangeSet<Trigger>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DiffSummary {
    pub tables: BucketCounts,
    pub columns: BucketCounts,
    pub constraints: BucketCounts,
    pub indexes: BucketCounts,
    pub triggers: BucketCounts,
    pub views: BucketCounts,
    pub sequences: BucketCounts,
    pub functions: BucketCounts,
    pub total_changes: usize,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DiffResult {
    pub tables: ChangeSet<Table>,
    pub columns: ChangeSet<Column>,
    pub constraints: ChangeSet<Constraint>,
    pub indexes: ChangeSet<Index>,
    pub triggers: ChangeSet<Trigger>,
    pub views: ChangeSet<View>,
    pub sequences: ChangeSet<Sequence>,
    pub functions: ChangeSet<Function>,
    /// Per-table child changes, present only for tables in `tables.modified`.
    pub table_diffs: Vec<TableDiff>,
}

impl DiffResult {
    /// Recomputes the summary from the bucket lists. Must never disagree
    /// with a cached value — callers recompute rather than cache this.
    pub fn summary(&self) -> DiffSummary {
        let buckets = [
            self.tables.counts(),
            self.columns.counts(),
            self.constraints.counts(),
            self.indexes.counts(),
            self.triggers.counts(),
            self.views.counts(),
            self.sequences.counts(),
            self.functions.counts(),
        ];
        DiffSummary {
            tables: buckets[0],
            columns: buckets[1],
            constraints: buckets[2],
            indexes: buckets[3],
            triggers: buckets[4],
            views: buckets[5],
            sequences: buckets[6],
            functions: buckets[7],
            total_changes: buckets.iter().map(|b| b.total()).sum(),
        }
    }

    pub fn total_changes(&self) -> usize {
        self.summary().total_changes
    }

    pub fn table_diff(&self, table_name: &str) -> Option<&TableDiff> {
        self.table_diffs.iter().find(|d| d.table_name == table_name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_diff_has_zero_total_changes() {
        let diff = DiffResult::default();
        assert_eq!(diff.total_changes(), 0);
        assert!(diff.tables.is_empty());
    }

    #[test]
    fn summary_matches_bucket_lengths() {
        let mut diff = DiffResult::default();
        diff.tables.added.push(crate::schema::Table {
            name: "t".into(),
            table_type: "BASE TABLE".into(),
            comment: None,
            estimated_rows: None,
            pretty_size: None,
            columns: vec![],
            constraints: vec![],
            indexes: vec![],
            triggers: vec![],
        });
        let summary = diff.summary();
        assert_eq!(summary.tables.added, 1);
        assert_eq!(summary.total_changes, 1);
    }
}
