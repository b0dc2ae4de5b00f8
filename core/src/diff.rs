//! Differencing Engine (spec.md §4.6): a pure, deterministic function from
//! two [`SchemaSnapshot`]s to a [`DiffResult`]. No I/O, no async, no
//! mutable shared state — every comparator here is a plain function over
//! value objects.

use std::collections::{BTreeMap, HashMap};

use pgschema_diff_types::{
    ChangeSet, Column, Constraint, ConstraintKind, DiffResult, FieldChange, Function, Index,
    Modified, SchemaSnapshot, Sequence, Table, TableDiff, Trigger, View,
};

/// Computes the structural delta between `source` and `target`. `target`
/// is the post-state: every `modified` entry and every `added` entry
/// carries a `target`-side object.
pub fn diff(source: &SchemaSnapshot, target: &SchemaSnapshot) -> DiffResult {
    let source_tables: HashMap<&str, &Table> = source.tables.iter().map(|t| (t.name.as_str(), t)).collect();
    let target_tables: HashMap<&str, &Table> = target.tables.iter().map(|t| (t.name.as_str(), t)).collect();

    let mut tables_added = Vec::new();
    let mut tables_modified = Vec::new();
    let mut table_diffs = Vec::new();
    let mut columns = ChangeSet::default();
    let mut constraints = ChangeSet::default();
    let mut indexes = ChangeSet::default();
    let mut triggers = ChangeSet::default();

    for table in &target.tables {
        match source_tables.get(table.name.as_str()) {
            None => {
                columns.added.extend(table.columns.iter().cloned());
                constraints.added.extend(table.constraints.iter().cloned());
                indexes.added.extend(table.indexes.iter().cloned());
                triggers.added.extend(table.triggers.iter().cloned());
                tables_added.push(table.clone());
            }
            Some(source_table) => {
                let table_field_changes = compare_table_scalars(source_table, table);
                let column_changes = diff_set(&source_table.columns, &table.columns, |c| c.name.clone(), compare_columns);
                let constraint_changes =
                    diff_set(&source_table.constraints, &table.constraints, |c| c.name.clone(), compare_constraints);
                let index_changes = diff_set(&source_table.indexes, &table.indexes, |i| i.name.clone(), compare_indexes);
                let trigger_changes = diff_set(&source_table.triggers, &table.triggers, |t| t.name.clone(), compare_triggers);

                let has_child_changes = !column_changes.is_empty()
                    || !constraint_changes.is_empty()
                    || !index_changes.is_empty()
                    || !trigger_changes.is_empty();

                if !table_field_changes.is_empty() || has_child_changes {
                    extend_changeset(&mut columns, &column_changes);
                    extend_changeset(&mut constraints, &constraint_changes);
                    extend_changeset(&mut indexes, &index_changes);
                    extend_changeset(&mut triggers, &trigger_changes);

                    tables_modified.push(Modified {
                        item: table.clone(),
                        changes: table_field_changes,
                    });
                    table_diffs.push(TableDiff {
                        table_name: table.name.clone(),
                        columns: column_changes,
                        constraints: constraint_changes,
                        indexes: index_changes,
                        triggers: trigger_changes,
                    });
                }
            }
        }
    }

    let mut tables_removed = Vec::new();
    for table in &source.tables {
        if target_tables.contains_key(table.name.as_str()) {
            continue;
        }
        columns.removed.extend(table.columns.iter().cloned());
        constraints.removed.extend(table.constraints.iter().cloned());
        indexes.removed.extend(table.indexes.iter().cloned());
        triggers.removed.extend(table.triggers.iter().cloned());
        tables_removed.push(table.clone());
    }

    let views = diff_set(&source.views, &target.views, |v| v.name.clone(), compare_views);
    let sequences = diff_set(&source.sequences, &target.sequences, |s| s.name.clone(), compare_sequences);
    let functions = diff_set(&source.functions, &target.functions, |f| f.signature(), compare_functions);

    DiffResult {
        tables: ChangeSet {
            added: tables_added,
            removed: tables_removed,
            modified: tables_modified,
        },
        columns,
        constraints,
        indexes,
        triggers,
        views,
        sequences,
        functions,
        table_diffs,
    }
}

/// Indexes `source`/`target` by `key_fn` and classifies every item as
/// added (present only in `target`), removed (present only in `source`),
/// or modified (present in both with a non-empty `compare_fn` result).
/// `added`/`modified` preserve `target`'s order; `removed` preserves
/// `source`'s order — this is what gives the engine its determinism
/// property when snapshot ordering is stable.
fn diff_set<T, K, FKey, FCmp>(source: &[T], target: &[T], key_fn: FKey, compare_fn: FCmp) -> ChangeSet<T>
where
    T: Clone,
    K: std::hash::Hash + Eq,
    FKey: Fn(&T) -> K,
    FCmp: Fn(&T, &T) -> BTreeMap<String, FieldChange>,
{
    let source_index: HashMap<K, &T> = source.iter().map(|item| (key_fn(item), item)).collect();
    let target_index: HashMap<K, &T> = target.iter().map(|item| (key_fn(item), item)).collect();

    let mut added = Vec::new();
    let mut modified = Vec::new();
    for item in target {
        let key = key_fn(item);
        match source_index.get(&key) {
            None => added.push(item.clone()),
            Some(source_item) => {
                let changes = compare_fn(source_item, item);
                if !changes.is_empty() {
                    modified.push(Modified {
                        item: item.clone(),
                        changes,
                    });
                }
            }
        }
    }

    let removed = source
        .iter()
        .filter(|item| !target_index.contains_key(&key_fn(item)))
        .cloned()
        .collect();

    ChangeSet { added, removed, modified }
}

fn extend_changeset<T: Clone>(target: &mut ChangeSet<T>, source: &ChangeSet<T>) {
    target.added.extend(source.added.iter().cloned());
    target.removed.extend(source.removed.iter().cloned());
    target.modified.extend(source.modified.iter().cloned());
}

fn field<T: PartialEq + Into<serde_json::Value> + Clone>(
    changes: &mut BTreeMap<String, FieldChange>,
    name: &str,
    from: &T,
    to: &T,
) {
    if from != to {
        changes.insert(name.to_string(), FieldChange::new(from.clone(), to.clone()));
    }
}

fn compare_table_scalars(a: &Table, b: &Table) -> BTreeMap<String, FieldChange> {
    let mut changes = BTreeMap::new();
    field(&mut changes, "table_type", &a.table_type, &b.table_type);
    field(&mut changes, "comment", &a.comment, &b.comment);
    field(&mut changes, "estimated_rows", &a.estimated_rows, &b.estimated_rows);
    field(&mut changes, "pretty_size", &a.pretty_size, &b.pretty_size);
    changes
}

/// `ordinal_position` is compared but a difference of exactly 1 is
/// suppressed — treated as incidental reordering from a sibling being
/// added or removed (spec.md's open question: adopted as written).
fn compare_columns(a: &Column, b: &Column) -> BTreeMap<String, FieldChange> {
    let mut changes = BTreeMap::new();
    field(&mut changes, "data_type", &a.data_type, &b.data_type);
    field(&mut changes, "is_nullable", &a.is_nullable, &b.is_nullable);
    field(&mut changes, "column_default", &a.column_default, &b.column_default);
    field(
        &mut changes,
        "character_maximum_length",
        &a.character_maximum_length,
        &b.character_maximum_length,
    );
    field(&mut changes, "numeric_precision", &a.numeric_precision, &b.numeric_precision);
    field(&mut changes, "numeric_scale", &a.numeric_scale, &b.numeric_scale);

    let ordinal_diff = (b.ordinal_position - a.ordinal_position).abs();
    if ordinal_diff != 1 && ordinal_diff != 0 {
        changes.insert(
            "ordinal_position".to_string(),
            FieldChange::new(a.ordinal_position, b.ordinal_position),
        );
    }
    changes
}

fn compare_constraints(a: &Constraint, b: &Constraint) -> BTreeMap<String, FieldChange> {
    let mut changes = BTreeMap::new();
    field(&mut changes, "constraint_type", &a.kind.to_string(), &b.kind.to_string());
    field(&mut changes, "columns", &a.column_names, &b.column_names);
    field(&mut changes, "check_clause", &a.check_clause, &b.check_clause);
    if a.kind == ConstraintKind::ForeignKey || b.kind == ConstraintKind::ForeignKey {
        field(&mut changes, "foreign_table", &a.foreign_table, &b.foreign_table);
        field(&mut changes, "foreign_columns", &a.foreign_columns, &b.foreign_columns);
    }
    changes
}

fn compare_indexes(a: &Index, b: &Index) -> BTreeMap<String, FieldChange> {
    let mut changes = BTreeMap::new();
    field(&mut changes, "method", &a.method.to_string(), &b.method.to_string());
    field(&mut changes, "is_unique", &a.is_unique, &b.is_unique);
    field(&mut changes, "is_primary", &a.is_primary, &b.is_primary);
    field(&mut changes, "columns", &a.column_names, &b.column_names);
    field(&mut changes, "definition", &a.definition, &b.definition);
    changes
}

fn compare_triggers(a: &Trigger, b: &Trigger) -> BTreeMap<String, FieldChange> {
    let mut changes = BTreeMap::new();
    field(&mut changes, "timing", &a.timing.to_string(), &b.timing.to_string());
    let a_events: Vec<String> = a.events.iter().map(|e| e.to_string()).collect();
    let b_events: Vec<String> = b.events.iter().map(|e| e.to_string()).collect();
    field(&mut changes, "events", &a_events, &b_events);
    field(&mut changes, "function_name", &a.function_name, &b.function_name);
    field(&mut changes, "definition", &a.definition, &b.definition);
    changes
}

/// Column sets are compared as a set, not per-column: only the
/// added/removed summary is recorded, never a per-element diff.
fn compare_views(a: &View, b: &View) -> BTreeMap<String, FieldChange> {
    let mut changes = BTreeMap::new();
    field(&mut changes, "definition", &a.definition, &b.definition);
    field(&mut changes, "is_updatable", &a.is_updatable, &b.is_updatable);
    field(&mut changes, "is_insertable_into", &a.is_insertable_into, &b.is_insertable_into);

    let a_set: std::collections::BTreeSet<&String> = a.columns.iter().collect();
    let b_set: std::collections::BTreeSet<&String> = b.columns.iter().collect();
    let added: Vec<&String> = b_set.difference(&a_set).cloned().collect();
    let removed: Vec<&String> = a_set.difference(&b_set).cloned().collect();
    if !added.is_empty() {
        changes.insert(
            "columns_added".to_string(),
            FieldChange::new(Vec::<String>::new(), added.into_iter().cloned().collect::<Vec<_>>()),
        );
    }
    if !removed.is_empty() {
        changes.insert(
            "columns_removed".to_string(),
            FieldChange::new(removed.into_iter().cloned().collect::<Vec<_>>(), Vec::<String>::new()),
        );
    }
    changes
}

fn compare_sequences(a: &Sequence, b: &Sequence) -> BTreeMap<String, FieldChange> {
    let mut changes = BTreeMap::new();
    field(&mut changes, "data_type", &a.data_type, &b.data_type);
    field(&mut changes, "start_value", &a.start_value, &b.start_value);
    field(&mut changes, "min_value", &a.min_value, &b.min_value);
    field(&mut changes, "max_value", &a.max_value, &b.max_value);
    field(&mut changes, "increment", &a.increment, &b.increment);
    field(&mut changes, "cycle", &a.cycle, &b.cycle);
    changes
}

fn compare_functions(a: &Function, b: &Function) -> BTreeMap<String, FieldChange> {
    let mut changes = BTreeMap::new();
    field(&mut changes, "return_type", &a.return_type, &b.return_type);
    field(&mut changes, "kind", &a.kind.to_string(), &b.kind.to_string());
    field(&mut changes, "definition", &a.definition, &b.definition);
    field(&mut changes, "argument_types", &a.argument_types, &b.argument_types);
    changes
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use pgschema_diff_types::Role;

    fn users_column(name: &str, position: i32, max_len: Option<i32>) -> Column {
        Column {
            name: name.to_string(),
            table_name: "users".to_string(),
            ordinal_position: position,
            data_type: "character varying".to_string(),
            is_nullable: false,
            column_default: None,
            character_maximum_length: max_len,
            numeric_precision: None,
            numeric_scale: None,
            udt_name: "varchar".to_string(),
            comment: None,
        }
    }

    fn users_table(columns: Vec<Column>) -> Table {
        Table {
            name: "users".to_string(),
            table_type: "BASE TABLE".to_string(),
            comment: None,
            estimated_rows: None,
            pretty_size: None,
            columns,
            constraints: vec![],
            indexes: vec![],
            triggers: vec![],
        }
    }

    fn snapshot(role: Role, tables: Vec<Table>) -> SchemaSnapshot {
        SchemaSnapshot {
            schema_name: "public".to_string(),
            role,
            collected_at: Utc::now(),
            tables,
            views: vec![],
            sequences: vec![],
            functions: vec![],
        }
    }

    #[test]
    fn diffing_a_snapshot_against_itself_has_zero_changes() {
        let s = snapshot(
            Role::Source,
            vec![users_table(vec![
                users_column("id", 1, None),
                users_column("name", 2, Some(100)),
            ])],
        );
        let result = diff(&s, &s);
        assert_eq!(result.total_changes(), 0);
    }

    #[test]
    fn column_widened_and_column_added() {
        let source = snapshot(
            Role::Source,
            vec![users_table(vec![
                users_column("id", 1, None),
                users_column("name", 2, Some(100)),
            ])],
        );
        let target = snapshot(
            Role::Target,
            vec![users_table(vec![
                users_column("id", 1, None),
                users_column("name", 2, Some(150)),
                users_column("email", 3, Some(255)),
            ])],
        );
        let result = diff(&source, &target);
        assert_eq!(result.columns.added.len(), 1);
        assert_eq!(result.columns.added[0].name, "email");
        assert_eq!(result.columns.modified.len(), 1);
        let modified = &result.columns.modified[0];
        assert_eq!(modified.item.name, "name");
        let change = modified.changes.get("character_maximum_length").unwrap();
        assert_eq!(change.from, serde_json::json!(100));
        assert_eq!(change.to, serde_json::json!(150));
        assert_eq!(result.tables.modified.len(), 1);
    }

    #[test]
    fn table_added_puts_all_its_columns_in_the_added_bucket() {
        let source = snapshot(Role::Source, vec![]);
        let target = snapshot(
            Role::Target,
            vec![Table {
                name: "comments".to_string(),
                table_type: "BASE TABLE".to_string(),
                comment: None,
                estimated_rows: None,
                pretty_size: None,
                columns: vec![
                    users_column("id", 1, None),
                    users_column("post_id", 2, None),
                    users_column("body", 3, None),
                ],
                constraints: vec![],
                indexes: vec![],
                triggers: vec![],
            }],
        );
        let result = diff(&source, &target);
        assert_eq!(result.tables.added.len(), 1);
        assert_eq!(result.tables.added[0].name, "comments");
        // Spec: the flat view still lists the new table's columns as added...
        assert_eq!(result.columns.added.len(), 3);
        // ...but no per-table TableDiff or tables.modified entry is recorded.
        assert!(result.tables.modified.is_empty());
        assert!(result.table_diffs.is_empty());
    }

    #[test]
    fn column_reorder_by_exactly_one_position_is_not_a_change() {
        let source = snapshot(
            Role::Source,
            vec![users_table(vec![
                users_column("a", 1, None),
                users_column("b", 2, None),
                users_column("c", 3, None),
            ])],
        );
        let target = snapshot(
            Role::Target,
            vec![users_table(vec![
                users_column("a", 1, None),
                users_column("c", 2, None),
                users_column("b", 3, None),
            ])],
        );
        let result = diff(&source, &target);
        assert!(result.columns.modified.is_empty());
    }

    #[test]
    fn functions_are_identified_by_name_and_argument_types() {
        use pgschema_diff_types::FunctionKind;
        let f_int = Function {
            name: "f".to_string(),
            kind: FunctionKind::Function,
            return_type: "int".to_string(),
            argument_types: vec!["int".to_string()],
            definition: "CREATE FUNCTION f(int) RETURNS int ...".to_string(),
        };
        let mut f_int_bigint = f_int.clone();
        f_int_bigint.return_type = "bigint".to_string();
        let f_bigint_arg = Function {
            name: "f".to_string(),
            kind: FunctionKind::Function,
            return_type: "bigint".to_string(),
            argument_types: vec!["bigint".to_string()],
            definition: "CREATE FUNCTION f(bigint) RETURNS bigint ...".to_string(),
        };

        let source = SchemaSnapshot {
            schema_name: "public".to_string(),
            role: Role::Source,
            collected_at: Utc::now(),
            tables: vec![],
            views: vec![],
            sequences: vec![],
            functions: vec![f_int],
        };
        let target = SchemaSnapshot {
            schema_name: "public".to_string(),
            role: Role::Target,
            collected_at: Utc::now(),
            tables: vec![],
            views: vec![],
            sequences: vec![],
            functions: vec![f_int_bigint, f_bigint_arg],
        };

        let result = diff(&source, &target);
        assert_eq!(result.functions.modified.len(), 1);
        assert_eq!(result.functions.modified[0].item.argument_types, vec!["int".to_string()]);
        assert_eq!(result.functions.added.len(), 1);
        assert_eq!(result.functions.added[0].argument_types, vec!["bigint".to_string()]);
    }

    #[test]
    fn added_and_removed_are_antisymmetric() {
        let source = snapshot(Role::Source, vec![users_table(vec![users_column("id", 1, None)])]);
        let target = snapshot(Role::Target, vec![]);
        let forward = diff(&source, &target);
        let backward = diff(&target, &source);
        assert_eq!(forward.tables.removed.len(), 1);
        assert_eq!(backward.tables.added.len(), 1);
        assert_eq!(forward.tables.removed[0].name, backward.tables.added[0].name);
    }
}
