//! Grouping Transformer (spec.md §4.7): re-pivots a flat [`DiffResult`]
//! into a table-first [`GroupedDiff`] for renderers that want one section
//! per table instead of one section per change type.

use std::collections::{BTreeMap, HashSet};

use pgschema_diff_types::{ChangeSet, DiffResult, GroupedDiff, TableGroup};
use serde::Serialize;

pub fn group(diff: &DiffResult) -> GroupedDiff {
    let added: Vec<TableGroup> = diff.tables.added.iter().cloned().map(TableGroup::added).collect();
    let removed: Vec<TableGroup> = diff.tables.removed.iter().cloned().map(TableGroup::removed).collect();

    let added_names: HashSet<&str> = diff.tables.added.iter().map(|t| t.name.as_str()).collect();
    let removed_names: HashSet<&str> = diff.tables.removed.iter().map(|t| t.name.as_str()).collect();

    let mut modified_groups: BTreeMap<String, TableGroup> = diff
        .tables
        .modified
        .iter()
        .map(|m| (m.item.name.clone(), TableGroup::modified(m.item.name.clone())))
        .collect();

    for modified in &diff.tables.modified {
        if modified.changes.is_empty() {
            continue;
        }
        if let Some(group) = modified_groups.get_mut(&modified.item.name) {
            push(group, "table_modified", modified);
        }
    }

    route(&diff.columns, "columns", |c| &c.table_name, &mut modified_groups, &added_names, &removed_names);
    route(
        &diff.constraints,
        "constraints",
        |c| &c.table_name,
        &mut modified_groups,
        &added_names,
        &removed_names,
    );
    route(&diff.indexes, "indexes", |i| &i.table_name, &mut modified_groups, &added_names, &removed_names);
    route(&diff.triggers, "triggers", |t| &t.table_name, &mut modified_groups, &added_names, &removed_names);

    let modified = modified_groups.into_values().filter(|g| g.has_changes()).collect();

    GroupedDiff { added, removed, modified }
}

fn route<T: Serialize + Clone>(
    changes: &ChangeSet<T>,
    bucket: &str,
    table_name: impl Fn(&T) -> &String,
    groups: &mut BTreeMap<String, TableGroup>,
    added_names: &HashSet<&str>,
    removed_names: &HashSet<&str>,
) {
    let skip = |name: &str| added_names.contains(name) || removed_names.contains(name);

    for item in &changes.added {
        let name = table_name(item);
        if skip(name) {
            continue;
        }
        if let Some(group) = groups.get_mut(name) {
            push(group, &format!("{bucket}_added"), item);
        }
    }
    for item in &changes.removed {
        let name = table_name(item);
        if skip(name) {
            continue;
        }
        if let Some(group) = groups.get_mut(name) {
            push(group, &format!("{bucket}_removed"), item);
        }
    }
    for modified in &changes.modified {
        let name = table_name(&modified.item);
        if skip(name) {
            continue;
        }
        if let Some(group) = groups.get_mut(name) {
            push(group, &format!("{bucket}_modified"), modified);
        }
    }
}

fn push<T: Serialize>(group: &mut TableGroup, bucket: &str, item: &T) {
    let value = serde_json::to_value(item).expect("schema value objects always serialize");
    group.children.entry(bucket.to_string()).or_default().push(value);
}

#[cfg(test)]
mod tests {
    use super::*;
    use pgschema_diff_types::{Column, FieldChange, Modified, Table};
    use std::collections::BTreeMap as Map;

    fn column(table: &str, name: &str) -> Column {
        Column {
            name: name.to_string(),
            table_name: table.to_string(),
            ordinal_position: 1,
            data_type: "text".to_string(),
            is_nullable: true,
            column_default: None,
            character_maximum_length: None,
            numeric_precision: None,
            numeric_scale: None,
            udt_name: "text".to_string(),
            comment: None,
        }
    }

    fn table(name: &str) -> Table {
        Table {
            name: name.to_string(),
            table_type: "BASE TABLE".to_string(),
            comment: None,
            estimated_rows: None,
            pretty_size: None,
            columns: vec![],
            constraints: vec![],
            indexes: vec![],
            triggers: vec![],
        }
    }

    #[test]
    fn modified_table_children_are_routed_by_owning_table() {
        let mut diff = DiffResult::default();
        diff.tables.modified.push(Modified {
            item: table("users"),
            changes: Map::new(),
        });
        diff.columns.added.push(column("users", "email"));

        let grouped = group(&diff);
        assert_eq!(grouped.modified.len(), 1);
        let group = &grouped.modified[0];
        assert_eq!(group.table_name, "users");
        assert_eq!(group.children.get("columns_added").unwrap().len(), 1);
    }

    #[test]
    fn children_of_an_added_table_are_skipped() {
        let mut diff = DiffResult::default();
        diff.tables.added.push(table("comments"));
        diff.columns.added.push(column("comments", "body"));

        let grouped = group(&diff);
        assert_eq!(grouped.added.len(), 1);
        assert!(grouped.modified.is_empty());
    }

    #[test]
    fn groups_with_no_changes_are_dropped() {
        let mut diff = DiffResult::default();
        diff.tables.modified.push(Modified {
            item: table("empty"),
            changes: {
                let mut m = Map::new();
                m.insert("comment".to_string(), FieldChange::new("a", "b"));
                m
            },
        });
        let grouped = group(&diff);
        // table-level scalar changes land in a `table_modified` bucket, so
        // the group survives the has_changes() filter.
        assert_eq!(grouped.modified.len(), 1);
        assert!(grouped.modified[0].children.contains_key("table_modified"));
    }

    #[test]
    fn a_table_group_with_truly_no_changes_has_changes_is_false() {
        let group = TableGroup::modified("ghost");
        assert!(!group.has_changes());
    }
}
