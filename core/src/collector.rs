//! Schema Collector (spec.md §4.5): runs a fixed catalog of introspection
//! queries over one leased connection and assembles a [`SchemaSnapshot`].
//!
//! Every query is ordered so that two collections over an unchanged schema
//! produce byte-identical snapshots (spec.md §5's ordering guarantee,
//! tested by [`crate::diff`]'s determinism property).

use std::collections::HashMap;
use std::time::{Duration, Instant};

use chrono::Utc;
use pgschema_diff_types::{
    Column, Constraint, ConstraintKind, Function, FunctionKind, Index, IndexMethod, Role,
    SchemaSnapshot, Sequence, Table, Trigger, TriggerEvent, TriggerTiming, View,
};
use postgres_from_row::FromRow;
use tokio::sync::Mutex;
use tokio_postgres::Client;
use tracing::instrument;

use crate::error::{Error, Result};
use crate::pool::Lease;

const CACHE_TTL: Duration = Duration::from_secs(5 * 60);

#[derive(FromRow)]
struct TableRow {
    table_name: String,
    table_type: String,
    comment: Option<String>,
    estimated_rows: Option<i64>,
    pretty_size: Option<String>,
}

#[derive(FromRow)]
struct ColumnRow {
    table_name: String,
    column_name: String,
    ordinal_position: i32,
    data_type: String,
    is_nullable: bool,
    column_default: Option<String>,
    character_maximum_length: Option<i32>,
    numeric_precision: Option<i32>,
    numeric_scale: Option<i32>,
    udt_name: String,
    comment: Option<String>,
}

#[derive(FromRow)]
struct ConstraintRow {
    name: String,
    table_name: String,
    kind: String,
    column_names: Vec<String>,
    foreign_table: Option<String>,
    foreign_columns: Vec<String>,
    definition: String,
}

#[derive(FromRow)]
struct IndexRow {
    name: String,
    table_name: String,
    method: String,
    is_unique: bool,
    is_primary: bool,
    column_names: Vec<String>,
    definition: String,
}

#[derive(FromRow)]
struct TriggerRow {
    name: String,
    table_name: String,
    function_name: String,
    definition: String,
    tgtype: i16,
}

#[derive(FromRow)]
struct ViewRow {
    name: String,
    definition: Option<String>,
    is_updatable: bool,
    is_insertable_into: bool,
}

#[derive(FromRow)]
struct ViewColumnRow {
    table_name: String,
    column_name: String,
}

#[derive(FromRow)]
struct SequenceRow {
    name: String,
    data_type: String,
    start_value: i64,
    min_value: i64,
    max_value: i64,
    increment: i64,
    cycle: bool,
}

#[derive(FromRow)]
struct FunctionRow {
    name: String,
    kind: String,
    return_type: Option<String>,
    argument_types: Option<Vec<String>>,
    definition: String,
}

struct CacheEntry {
    snapshot: SchemaSnapshot,
    collected_at: Instant,
}

/// Runs the fixed introspection queries and assembles snapshots. Stateless
/// apart from the memoization cache, so one `Collector` can be shared
/// across concurrent source/target collections.
pub struct Collector {
    cache: Mutex<HashMap<(Role, String), CacheEntry>>,
}

impl Default for Collector {
    fn default() -> Self {
        Self::new()
    }
}

impl Collector {
    pub fn new() -> Self {
        Self {
            cache: Mutex::new(HashMap::new()),
        }
    }

    pub async fn clear_cache(&self) {
        self.cache.lock().await.clear();
    }

    /// Collects a full snapshot for `schema_name` on `role`'s side, using
    /// `lease`'s connection for every query. Holds the lease for the whole
    /// call and never yields it between sub-queries, guaranteeing a
    /// consistent view against one backend transaction snapshot.
    #[instrument(skip(self, lease), fields(role = %role, schema = %schema_name))]
    pub async fn collect(&self, role: Role, schema_name: &str, lease: &Lease, allow_cache: bool) -> Result<SchemaSnapshot> {
        if allow_cache {
            let cache = self.cache.lock().await;
            if let Some(entry) = cache.get(&(role, schema_name.to_string())) {
                if entry.collected_at.elapsed() < CACHE_TTL {
                    return Ok(entry.snapshot.clone());
                }
            }
        }

        let client = lease.client().await;
        verify_usage(client, schema_name).await?;

        let snapshot = collect_uncached(client, role, schema_name)
            .await
            .map_err(|source| Error::SchemaCollectionFailed {
                role: role.to_string(),
                schema: schema_name.to_string(),
                source: Box::new(source),
            })?;

        if allow_cache {
            let mut cache = self.cache.lock().await;
            cache.insert(
                (role, schema_name.to_string()),
                CacheEntry {
                    snapshot: snapshot.clone(),
                    collected_at: Instant::now(),
                },
            );
        }

        Ok(snapshot)
    }
}

async fn verify_usage(client: &Client, schema_name: &str) -> Result<()> {
    let row = client
        .query_one(
            "SELECT has_schema_privilege(current_user, $1, 'USAGE')",
            &[&schema_name],
        )
        .await
        .map_err(Error::QueryFailed)?;
    let usable: bool = row.get(0);
    if !usable {
        return Err(Error::SchemaAccessDenied {
            schema: schema_name.to_string(),
        });
    }
    Ok(())
}

async fn collect_uncached(client: &Client, role: Role, schema_name: &str) -> Result<SchemaSnapshot> {
    let table_rows = query_tables(client, schema_name).await?;
    let mut columns_by_table = query_columns(client, schema_name).await?;
    let mut constraints_by_table = query_constraints(client, schema_name).await?;
    let mut indexes_by_table = query_indexes(client, schema_name).await?;
    let mut triggers_by_table = query_triggers(client, schema_name).await?;

    let tables = table_rows
        .into_iter()
        .map(|row| Table {
            columns: columns_by_table.remove(&row.table_name).unwrap_or_default(),
            constraints: constraints_by_table.remove(&row.table_name).unwrap_or_default(),
            indexes: indexes_by_table.remove(&row.table_name).unwrap_or_default(),
            triggers: triggers_by_table.remove(&row.table_name).unwrap_or_default(),
            name: row.table_name,
            table_type: row.table_type,
            comment: row.comment,
            estimated_rows: row.estimated_rows,
            pretty_size: row.pretty_size,
        })
        .collect();

    let views = query_views(client, schema_name).await?;
    let sequences = query_sequences(client, schema_name).await?;
    let functions = query_functions(client, schema_name).await?;

    Ok(SchemaSnapshot {
        schema_name: schema_name.to_string(),
        role,
        collected_at: Utc::now(),
        tables,
        views,
        sequences,
        functions,
    })
}

async fn query_tables(client: &Client, schema_name: &str) -> Result<Vec<TableRow>> {
    const SQL: &str = "
        SELECT c.relname AS table_name,
               CASE c.relkind
                   WHEN 'f' THEN 'FOREIGN'
                   WHEN 'm' THEN 'MATERIALIZED VIEW'
                   ELSE 'BASE TABLE'
               END AS table_type,
               obj_description(c.oid, 'pg_class') AS comment,
               NULLIF(c.reltuples, -1)::bigint AS estimated_rows,
               pg_size_pretty(pg_total_relation_size(c.oid)) AS pretty_size
        FROM pg_catalog.pg_class c
        JOIN pg_catalog.pg_namespace n ON n.oid = c.relnamespace
        WHERE n.nspname = $1 AND c.relkind IN ('r', 'f', 'm')
        ORDER BY c.relname";
    let rows = client.query(SQL, &[&schema_name]).await.map_err(Error::QueryFailed)?;
    rows.iter().map(|r| TableRow::try_from_row(r).map_err(Error::QueryFailed)).collect()
}

async fn query_columns(client: &Client, schema_name: &str) -> Result<HashMap<String, Vec<Column>>> {
    const SQL: &str = "
        SELECT c.relname AS table_name,
               a.attname AS column_name,
               a.attnum::int AS ordinal_position,
               format_type(a.atttypid, a.atttypmod) AS data_type,
               NOT a.attnotnull AS is_nullable,
               pg_get_expr(ad.adbin, ad.adrelid) AS column_default,
               information_schema._pg_char_max_length(a.atttypid, a.atttypmod) AS character_maximum_length,
               information_schema._pg_numeric_precision(a.atttypid, a.atttypmod) AS numeric_precision,
               information_schema._pg_numeric_scale(a.atttypid, a.atttypmod) AS numeric_scale,
               t.typname AS udt_name,
               col_description(c.oid, a.attnum) AS comment
        FROM pg_catalog.pg_attribute a
        JOIN pg_catalog.pg_class c ON c.oid = a.attrelid
        JOIN pg_catalog.pg_namespace n ON n.oid = c.relnamespace
        JOIN pg_catalog.pg_type t ON t.oid = a.atttypid
        LEFT JOIN pg_catalog.pg_attrdef ad ON ad.adrelid = a.attrelid AND ad.adnum = a.attnum
        WHERE n.nspname = $1 AND a.attnum > 0 AND NOT a.attisdropped AND c.relkind IN ('r', 'f', 'm')
        ORDER BY c.relname, a.attnum";
    let rows = client.query(SQL, &[&schema_name]).await.map_err(Error::QueryFailed)?;
    let mut by_table: HashMap<String, Vec<Column>> = HashMap::new();
    for row in &rows {
        let row = ColumnRow::try_from_row(row).map_err(Error::QueryFailed)?;
        by_table.entry(row.table_name.clone()).or_default().push(Column {
            name: row.column_name,
            table_name: row.table_name,
            ordinal_position: row.ordinal_position,
            data_type: row.data_type,
            is_nullable: row.is_nullable,
            column_default: row.column_default,
            character_maximum_length: row.character_maximum_length,
            numeric_precision: row.numeric_precision,
            numeric_scale: row.numeric_scale,
            udt_name: row.udt_name,
            comment: row.comment,
        });
    }
    Ok(by_table)
}

async fn query_constraints(client: &Client, schema_name: &str) -> Result<HashMap<String, Vec<Constraint>>> {
    const SQL: &str = "
        SELECT con.conname AS name,
               c.relname AS table_name,
               CASE con.contype
                   WHEN 'p' THEN 'PRIMARY KEY'
                   WHEN 'f' THEN 'FOREIGN KEY'
                   WHEN 'u' THEN 'UNIQUE'
                   WHEN 'c' THEN 'CHECK'
                   ELSE 'NOT NULL'
               END AS kind,
               COALESCE((SELECT array_agg(a.attname ORDER BY k.ord)
                         FROM unnest(con.conkey) WITH ORDINALITY AS k(attnum, ord)
                         JOIN pg_attribute a ON a.attrelid = con.conrelid AND a.attnum = k.attnum), '{}') AS column_names,
               ft.relname AS foreign_table,
               COALESCE((SELECT array_agg(a.attname ORDER BY k.ord)
                         FROM unnest(con.confkey) WITH ORDINALITY AS k(attnum, ord)
                         JOIN pg_attribute a ON a.attrelid = con.confrelid AND a.attnum = k.attnum), '{}') AS foreign_columns,
               pg_get_constraintdef(con.oid) AS definition
        FROM pg_catalog.pg_constraint con
        JOIN pg_catalog.pg_class c ON c.oid = con.conrelid
        JOIN pg_catalog.pg_namespace n ON n.oid = c.relnamespace
        LEFT JOIN pg_catalog.pg_class ft ON ft.oid = con.confrelid
        WHERE n.nspname = $1
        ORDER BY c.relname, con.conname";
    let rows = client.query(SQL, &[&schema_name]).await.map_err(Error::QueryFailed)?;
    let mut by_table: HashMap<String, Vec<Constraint>> = HashMap::new();
    for row in &rows {
        let row = ConstraintRow::try_from_row(row).map_err(Error::QueryFailed)?;
        let kind: ConstraintKind = parse_constraint_kind(&row.kind)?;
        let check_clause = matches!(kind, ConstraintKind::Check).then(|| row.definition.clone());
        by_table.entry(row.table_name.clone()).or_default().push(Constraint {
            name: row.name,
            table_name: row.table_name,
            kind,
            column_names: row.column_names,
            foreign_table: row.foreign_table,
            foreign_columns: row.foreign_columns,
            check_clause,
        });
    }
    Ok(by_table)
}

fn parse_constraint_kind(raw: &str) -> Result<ConstraintKind> {
    use std::str::FromStr;
    ConstraintKind::from_str(raw).map_err(|_| Error::SchemaParsingFailed(format!("unknown constraint kind: {raw}")))
}

async fn query_indexes(client: &Client, schema_name: &str) -> Result<HashMap<String, Vec<Index>>> {
    const SQL: &str = "
        SELECT i.relname AS name,
               t.relname AS table_name,
               am.amname AS method,
               ix.indisunique AS is_unique,
               ix.indisprimary AS is_primary,
               COALESCE((SELECT array_agg(a.attname ORDER BY k.ord)
                         FROM unnest(ix.indkey) WITH ORDINALITY AS k(attnum, ord)
                         JOIN pg_attribute a ON a.attrelid = ix.indrelid AND a.attnum = k.attnum), '{}') AS column_names,
               pg_get_indexdef(ix.indexrelid) AS definition
        FROM pg_catalog.pg_index ix
        JOIN pg_catalog.pg_class i ON i.oid = ix.indexrelid
        JOIN pg_catalog.pg_class t ON t.oid = ix.indrelid
        JOIN pg_catalog.pg_namespace n ON n.oid = t.relnamespace
        JOIN pg_catalog.pg_am am ON am.oid = i.relam
        WHERE n.nspname = $1
        ORDER BY t.relname, i.relname";
    let rows = client.query(SQL, &[&schema_name]).await.map_err(Error::QueryFailed)?;
    let mut by_table: HashMap<String, Vec<Index>> = HashMap::new();
    for row in &rows {
        let row = IndexRow::try_from_row(row).map_err(Error::QueryFailed)?;
        let method = parse_index_method(&row.method)?;
        by_table.entry(row.table_name.clone()).or_default().push(Index {
            name: row.name,
            table_name: row.table_name,
            method,
            is_unique: row.is_unique,
            is_primary: row.is_primary,
            column_names: row.column_names,
            definition: row.definition,
        });
    }
    Ok(by_table)
}

fn parse_index_method(raw: &str) -> Result<IndexMethod> {
    use std::str::FromStr;
    IndexMethod::from_str(raw).map_err(|_| Error::SchemaParsingFailed(format!("unknown index method: {raw}")))
}

const TRIGGER_TYPE_BEFORE: i16 = 1 << 1;
const TRIGGER_TYPE_INSERT: i16 = 1 << 2;
const TRIGGER_TYPE_DELETE: i16 = 1 << 3;
const TRIGGER_TYPE_UPDATE: i16 = 1 << 4;
const TRIGGER_TYPE_TRUNCATE: i16 = 1 << 5;
const TRIGGER_TYPE_INSTEAD: i16 = 1 << 6;

async fn query_triggers(client: &Client, schema_name: &str) -> Result<HashMap<String, Vec<Trigger>>> {
    const SQL: &str = "
        SELECT t.tgname AS name,
               c.relname AS table_name,
               p.proname AS function_name,
               pg_get_triggerdef(t.oid) AS definition,
               t.tgtype::int2 AS tgtype
        FROM pg_catalog.pg_trigger t
        JOIN pg_catalog.pg_class c ON c.oid = t.tgrelid
        JOIN pg_catalog.pg_namespace n ON n.oid = c.relnamespace
        JOIN pg_catalog.pg_proc p ON p.oid = t.tgfoid
        WHERE n.nspname = $1 AND NOT t.tgisinternal
        ORDER BY c.relname, t.tgname";
    let rows = client.query(SQL, &[&schema_name]).await.map_err(Error::QueryFailed)?;
    let mut by_table: HashMap<String, Vec<Trigger>> = HashMap::new();
    for row in &rows {
        let row = TriggerRow::try_from_row(row).map_err(Error::QueryFailed)?;
        let timing = if row.tgtype & TRIGGER_TYPE_INSTEAD != 0 {
            TriggerTiming::InsteadOf
        } else if row.tgtype & TRIGGER_TYPE_BEFORE != 0 {
            TriggerTiming::Before
        } else {
            TriggerTiming::After
        };
        let mut events = Vec::new();
        if row.tgtype & TRIGGER_TYPE_INSERT != 0 {
            events.push(TriggerEvent::Insert);
        }
        if row.tgtype & TRIGGER_TYPE_UPDATE != 0 {
            events.push(TriggerEvent::Update);
        }
        if row.tgtype & TRIGGER_TYPE_DELETE != 0 {
            events.push(TriggerEvent::Delete);
        }
        if row.tgtype & TRIGGER_TYPE_TRUNCATE != 0 {
            events.push(TriggerEvent::Truncate);
        }
        by_table.entry(row.table_name.clone()).or_default().push(Trigger {
            name: row.name,
            table_name: row.table_name,
            timing,
            events,
            function_name: row.function_name,
            definition: row.definition,
        });
    }
    Ok(by_table)
}

async fn query_views(client: &Client, schema_name: &str) -> Result<Vec<View>> {
    const SQL: &str = "
        SELECT table_name AS name,
               view_definition AS definition,
               is_updatable = 'YES' AS is_updatable,
               is_insertable_into = 'YES' AS is_insertable_into
        FROM information_schema.views
        WHERE table_schema = $1
        ORDER BY table_name";
    let rows = client.query(SQL, &[&schema_name]).await.map_err(Error::QueryFailed)?;
    let view_rows: Vec<ViewRow> = rows
        .iter()
        .map(|r| ViewRow::try_from_row(r).map_err(Error::QueryFailed))
        .collect::<Result<_>>()?;

    const COLUMNS_SQL: &str = "
        SELECT table_name, column_name
        FROM information_schema.columns
        WHERE table_schema = $1
        ORDER BY table_name, ordinal_position";
    let column_rows = client.query(COLUMNS_SQL, &[&schema_name]).await.map_err(Error::QueryFailed)?;
    let mut columns_by_view: HashMap<String, Vec<String>> = HashMap::new();
    for row in &column_rows {
        let row = ViewColumnRow::try_from_row(row).map_err(Error::QueryFailed)?;
        columns_by_view.entry(row.table_name).or_default().push(row.column_name);
    }

    Ok(view_rows
        .into_iter()
        .map(|row| View {
            columns: columns_by_view.remove(&row.name).unwrap_or_default(),
            name: row.name,
            definition: row.definition.unwrap_or_default(),
            is_updatable: row.is_updatable,
            is_insertable_into: row.is_insertable_into,
        })
        .collect())
}

async fn query_sequences(client: &Client, schema_name: &str) -> Result<Vec<Sequence>> {
    const SQL: &str = "
        SELECT sequence_name AS name,
               data_type,
               start_value::bigint AS start_value,
               minimum_value::bigint AS min_value,
               maximum_value::bigint AS max_value,
               increment::bigint AS increment,
               cycle_option = 'YES' AS cycle
        FROM information_schema.sequences
        WHERE sequence_schema = $1
        ORDER BY sequence_name";
    let rows = client.query(SQL, &[&schema_name]).await.map_err(Error::QueryFailed)?;
    rows.iter()
        .map(|r| {
            SequenceRow::try_from_row(r).map_err(Error::QueryFailed).map(|row| Sequence {
                name: row.name,
                data_type: row.data_type,
                start_value: row.start_value,
                min_value: row.min_value,
                max_value: row.max_value,
                increment: row.increment,
                cycle: row.cycle,
            })
        })
        .collect()
}

async fn query_functions(client: &Client, schema_name: &str) -> Result<Vec<Function>> {
    const SQL: &str = "
        SELECT p.proname AS name,
               CASE WHEN p.prokind = 'p' THEN 'PROCEDURE' ELSE 'FUNCTION' END AS kind,
               pg_get_function_result(p.oid) AS return_type,
               (SELECT array_agg(format_type(u.t, NULL) ORDER BY u.ord)
                FROM unnest(p.proargtypes) WITH ORDINALITY AS u(t, ord)) AS argument_types,
               pg_get_functiondef(p.oid) AS definition
        FROM pg_catalog.pg_proc p
        JOIN pg_catalog.pg_namespace n ON n.oid = p.pronamespace
        WHERE n.nspname = $1
        ORDER BY p.proname, p.oid";
    let rows = client.query(SQL, &[&schema_name]).await.map_err(Error::QueryFailed)?;
    rows.iter()
        .map(|r| {
            FunctionRow::try_from_row(r).map_err(Error::QueryFailed).and_then(|row| {
                let kind = if row.kind == "PROCEDURE" {
                    FunctionKind::Procedure
                } else {
                    FunctionKind::Function
                };
                Ok(Function {
                    name: row.name,
                    kind,
                    return_type: row.return_type.unwrap_or_default(),
                    argument_types: row.argument_types.unwrap_or_default(),
                    definition: row.definition,
                })
            })
        })
        .collect()
}
