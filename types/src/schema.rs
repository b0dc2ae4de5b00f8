//! Catalog value objects assembled by the Schema Collector into a
//! [`SchemaSnapshot`]. Everything here is immutable after construction;
//! identity across two snapshots is by name (or, for functions, by
//! `(name, argument_types)`) — never by memory identity.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum_macros::{Display, EnumString};

#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumString, Display, Serialize, Deserialize)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Source,
    Target,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Column {
    pub name: String,
    pub table_name: String,
    pub ordinal_position: i32,
    pub data_type: String,
    pub is_nullable: bool,
    pub column_default: Option<String>,
    pub character_maximum_length: Option<i32>,
    pub numeric_precision: Option<i32>,
    pub numeric_scale: Option<i32>,
    pub udt_name: String,
    pub comment: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumString, Display, Serialize, Deserialize)]
#[strum(serialize_all = "UPPERCASE")]
#[serde(rename_all = "UPPERCASE")]
pub enum ConstraintKind {
    #[strum(serialize = "PRIMARY KEY")]
    #[serde(rename = "PRIMARY KEY")]
    PrimaryKey,
    #[strum(serialize = "FOREIGN KEY")]
    #[serde(rename = "FOREIGN KEY")]
    ForeignKey,
    Unique,
    Check,
    #[strum(serialize = "NOT NULL")]
    #[serde(rename = "NOT NULL")]
    NotNull,
}

/// Re-architected per spec.md's open question: carries an ordered
/// `column_names` list instead of a single `column_name`, so composite
/// primary/unique/foreign keys are fully representable.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Constraint {
    pub name: String,
    pub table_name: String,
    pub kind: ConstraintKind,
    pub column_names: Vec<String>,
    pub foreign_table: Option<String>,
    pub foreign_columns: Vec<String>,
    pub check_clause: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumString, Display, Serialize, Deserialize)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum IndexMethod {
    Btree,
    Hash,
    Gin,
    Gist,
    Spgist,
    Brin,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Index {
    pub name: String,
    pub table_name: String,
    pub method: IndexMethod,
    pub is_unique: bool,
    pub is_primary: bool,
    pub column_names: Vec<String>,
    pub definition: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumString, Display, Serialize, Deserialize)]
#[strum(serialize_all = "UPPERCASE")]
#[serde(rename_all = "UPPERCASE")]
pub enum TriggerTiming {
    Before,
    After,
    #[strum(serialize = "INSTEAD OF")]
    #[serde(rename = "INSTEAD OF")]
    InsteadOf,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumString, Display, Serialize, Deserialize)]
#[strum(serialize_all = "UPPERCASE")]
#[serde(rename_all = "UPPERCASE")]
pub enum TriggerEvent {
    Insert,
    Update,
    Delete,
    Truncate,
}

/// Re-architected per spec.md's open question: `events` is an ordered list
/// instead of a scalar, since PostgreSQL triggers can fire on more than one
/// event (`CREATE TRIGGER ... BEFORE INSERT OR UPDATE ...`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Trigger {
    pub name: String,
    pub table_name: String,
    pub timing: TriggerTiming,
    pub events: Vec<TriggerEvent>,
    pub function_name: String,
    pub definition: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct View {
    pub name: String,
    pub definition: String,
    pub is_updatable: bool,
    pub is_insertable_into: bool,
    pub columns: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Sequence {
    pub name: String,
    pub data_type: String,
    pub start_value: i64,
    pub min_value: i64,
    pub max_value: i64,
    pub increment: i64,
    pub cycle: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumString, Display, Serialize, Deserialize)]
#[strum(serialize_all = "UPPERCASE")]
#[serde(rename_all = "UPPERCASE")]
pub enum FunctionKind {
    Function,
    Procedure,
}

/// Identity across snapshots is `(name, argument_types)` — two overloads of
/// the same name are distinct entities.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Function {
    pub name: String,
    pub kind: FunctionKind,
    pub return_type: String,
    pub argument_types: Vec<String>,
    pub definition: String,
}

impl Function {
    /// The canonical identity key the Differencing Engine indexes on.
    pub fn signature(&self) -> (String, Vec<String>) {
        (self.name.clone(), self.argument_types.clone())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Table {
    pub name: String,
    pub table_type: String,
    pub comment: Option<String>,
    pub estimated_rows: Option<i64>,
    pub pretty_size: Option<String>,
    pub columns: Vec<Column>,
    pub constraints: Vec<Constraint>,
    pub indexes: Vec<Index>,
    pub triggers: Vec<Trigger>,
}

/// The immutable record of one schema at one point in time, as read from
/// the catalogs. Positional ordering of each collection is
/// presentation-only; identity is always by name.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchemaSnapshot {
    pub schema_name: String,
    pub role: Role,
    pub collected_at: DateTime<Utc>,
    pub tables: Vec<Table>,
    pub views: Vec<View>,
    pub sequences: Vec<Sequence>,
    pub functions: Vec<Function>,
}

impl SchemaSnapshot {
    pub fn object_count(&self) -> usize {
        let table_children: usize = self
            .tables
            .iter()
            .map(|t| t.columns.len() + t.constraints.len() + t.indexes.len() + t.triggers.len())
            .sum();
        self.tables.len() + self.views.len() + self.sequences.len() + self.functions.len()
            + table_children
    }
}
