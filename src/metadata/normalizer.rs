//! Metadata Normalizer
//!
//! Resolves canonical roles (schema, table, column, ...) against whatever
//! header spelling a catalog query produced, then turns frames into typed
//! records and lookup indices. Every role is an explicit list of candidate
//! token groups tried in priority order; a header matches a group when it
//! contains every token of the group, case-insensitively.

use super::frame::{Cell, MetadataFrame};
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use std::fmt;
use thiserror::Error;

/// Canonical field roles a metadata frame can carry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Schema,
    Table,
    Column,
    DataType,
    Nullable,
    CharLength,
    NumericPrecision,
    NumericScale,
    Ordinal,
    Constraint,
    ChildSchema,
    ChildTable,
    ChildColumn,
    ParentSchema,
    ParentTable,
    ParentColumn,
    Index,
    IndexColumns,
    Unique,
    RowCount,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Role::Schema => "schema",
            Role::Table => "table",
            Role::Column => "column",
            Role::DataType => "data type",
            Role::Nullable => "nullable",
            Role::CharLength => "character length",
            Role::NumericPrecision => "numeric precision",
            Role::NumericScale => "numeric scale",
            Role::Ordinal => "ordinal",
            Role::Constraint => "constraint",
            Role::ChildSchema => "child schema",
            Role::ChildTable => "child table",
            Role::ChildColumn => "child column",
            Role::ParentSchema => "parent schema",
            Role::ParentTable => "parent table",
            Role::ParentColumn => "parent column",
            Role::Index => "index name",
            Role::IndexColumns => "index columns",
            Role::Unique => "uniqueness",
            Role::RowCount => "row count",
        };
        f.write_str(name)
    }
}

/// Candidate tokens for one role plus the exact header used when no token matches
#[derive(Debug, Clone, Copy)]
pub struct RoleSpec {
    pub role: Role,
    pub candidates: &'static [&'static [&'static str]],
    pub default: &'static str,
}

impl RoleSpec {
    fn of(
        role: Role,
        candidates: &'static [&'static [&'static str]],
        default: &'static str,
    ) -> Self {
        Self {
            role,
            candidates,
            default,
        }
    }
}

impl Role {
    pub fn spec(self) -> RoleSpec {
        match self {
            Role::Schema => RoleSpec::of(self, &[&["schema"]], "schema"),
            Role::Table => RoleSpec::of(self, &[&["table", "name"], &["table"]], "table_name"),
            Role::Column => RoleSpec::of(self, &[&["column", "name"], &["column"]], "column_name"),
            Role::DataType => RoleSpec::of(self, &[&["data", "type"], &["type"]], "data_type"),
            Role::Nullable => RoleSpec::of(self, &[&["nullable"], &["null"]], "is_nullable"),
            Role::CharLength => RoleSpec::of(self, &[&["char", "len"]], "char_len"),
            Role::NumericPrecision => RoleSpec::of(self, &[&["precision"]], "num_precision"),
            Role::NumericScale => RoleSpec::of(self, &[&["scale"]], "num_scale"),
            Role::Ordinal => RoleSpec::of(self, &[&["ordinal"], &["position"], &["seq"]], "ordinal_position"),
            Role::Constraint => RoleSpec::of(self, &[&["constraint"]], "constraint_name"),
            Role::ChildSchema => RoleSpec::of(self, &[&["child", "schema"]], "child_schema"),
            Role::ChildTable => RoleSpec::of(self, &[&["child", "table"]], "child_table"),
            Role::ChildColumn => RoleSpec::of(self, &[&["child", "column"]], "child_column"),
            Role::ParentSchema => RoleSpec::of(self, &[&["parent", "schema"], &["referenced", "schema"]], "parent_schema"),
            Role::ParentTable => RoleSpec::of(self, &[&["parent", "table"], &["referenced", "table", "name"]], "parent_table"),
            Role::ParentColumn => RoleSpec::of(self, &[&["parent", "column"], &["referenced", "column"]], "parent_column"),
            Role::Index => RoleSpec::of(self, &[&["index", "name"], &["key", "name"]], "index_name"),
            Role::IndexColumns => RoleSpec::of(self, &[&["column"]], "index_columns"),
            Role::Unique => RoleSpec::of(self, &[&["unique"]], "non_unique"),
            Role::RowCount => RoleSpec::of(self, &[&["count"], &["rows"]], "row_count"),
        }
    }
}

/// Raised when a required role has no matching header
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("could not resolve the {role} column among headers {headers:?}")]
pub struct MissingRoleError {
    pub role: Role,
    pub headers: Vec<String>,
}

/// Resolve a role to a header position. Pure; None when nothing matches.
pub fn resolve(headers: &[String], role: Role) -> Option<usize> {
    let spec = role.spec();
    let lowered: Vec<String> = headers.iter().map(|h| h.to_lowercase()).collect();

    for group in spec.candidates {
        if let Some(idx) = lowered
            .iter()
            .position(|h| group.iter().all(|token| h.contains(token)))
        {
            return Some(idx);
        }
    }

    lowered.iter().position(|h| h == spec.default)
}

/// Resolve a role or fail with the headers that were available
pub fn require(headers: &[String], role: Role) -> Result<usize, MissingRoleError> {
    resolve(headers, role).ok_or_else(|| MissingRoleError {
        role,
        headers: headers.to_vec(),
    })
}

/// A (schema, table) pair, the join key across every metadata frame
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct TableRef {
    pub schema: String,
    pub table: String,
}

impl TableRef {
    pub fn new(schema: impl Into<String>, table: impl Into<String>) -> Self {
        Self {
            schema: schema.into(),
            table: table.into(),
        }
    }

    /// Node key used by the graph: "schema.table"
    pub fn qualified(&self) -> String {
        format!("{}.{}", self.schema, self.table)
    }
}

impl fmt::Display for TableRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.schema, self.table)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ColumnRecord {
    pub schema: String,
    pub table: String,
    pub name: String,
    pub data_type: String,
    pub is_nullable: bool,
    pub char_length: Option<i64>,
    pub numeric_precision: Option<i64>,
    pub numeric_scale: Option<i64>,
}

impl ColumnRecord {
    pub fn table_ref(&self) -> TableRef {
        TableRef::new(&self.schema, &self.table)
    }

    /// Type with length or precision/scale, e.g. `varchar(255)`, `decimal(10,2)`
    pub fn type_detail(&self) -> String {
        let positive = |v: Option<i64>| v.filter(|n| *n != 0);
        if let Some(len) = positive(self.char_length) {
            format!("{}({})", self.data_type, len)
        } else if let Some(precision) = positive(self.numeric_precision) {
            match positive(self.numeric_scale) {
                Some(scale) => format!("{}({},{})", self.data_type, precision, scale),
                None => format!("{}({})", self.data_type, precision),
            }
        } else {
            self.data_type.clone()
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PrimaryKeyRecord {
    pub schema: String,
    pub table: String,
    pub column: String,
    pub ordinal: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ForeignKeyRecord {
    pub constraint_name: String,
    pub child_schema: String,
    pub child_table: String,
    pub child_column: String,
    pub parent_schema: String,
    pub parent_table: String,
    pub parent_column: String,
}

impl ForeignKeyRecord {
    pub fn child_ref(&self) -> TableRef {
        TableRef::new(&self.child_schema, &self.child_table)
    }

    pub fn parent_ref(&self) -> TableRef {
        TableRef::new(&self.parent_schema, &self.parent_table)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IndexRecord {
    pub schema: String,
    pub table: String,
    pub name: String,
    pub columns: Vec<String>,
    pub unique: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RowCountRecord {
    pub schema: String,
    pub table: String,
    pub rows: i64,
}

/// Raw frames for one ERD generation request
#[derive(Debug, Clone, Default)]
pub struct MetadataFrames {
    pub columns: MetadataFrame,
    pub primary_keys: MetadataFrame,
    pub foreign_keys: MetadataFrame,
    pub indexes: MetadataFrame,
    pub row_counts: MetadataFrame,
}

/// Typed records produced from [`MetadataFrames`]
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NormalizedMetadata {
    pub columns: Vec<ColumnRecord>,
    pub primary_keys: Vec<PrimaryKeyRecord>,
    pub foreign_keys: Vec<ForeignKeyRecord>,
    pub indexes: Vec<IndexRecord>,
    pub row_counts: Vec<RowCountRecord>,
}

impl NormalizedMetadata {
    /// Normalize every frame; an empty frame yields no records
    pub fn from_frames(frames: &MetadataFrames) -> Result<Self, MissingRoleError> {
        Ok(Self {
            columns: columns(&frames.columns)?,
            primary_keys: primary_keys(&frames.primary_keys)?,
            foreign_keys: foreign_keys(&frames.foreign_keys)?,
            indexes: indexes(&frames.indexes)?,
            row_counts: row_counts(&frames.row_counts)?,
        })
    }

    /// Distinct (schema, table) pairs of the column frame, sorted
    pub fn table_universe(&self) -> Vec<TableRef> {
        let mut tables: Vec<TableRef> = self
            .columns
            .iter()
            .map(ColumnRecord::table_ref)
            .collect::<HashSet<_>>()
            .into_iter()
            .collect();
        tables.sort();
        tables
    }

    /// Restrict every record set to the kept tables (FKs by child table)
    pub fn restrict_to(&self, kept: &HashSet<TableRef>) -> Self {
        let has = |schema: &str, table: &str| kept.contains(&TableRef::new(schema, table));
        Self {
            columns: self
                .columns
                .iter()
                .filter(|c| has(&c.schema, &c.table))
                .cloned()
                .collect(),
            primary_keys: self
                .primary_keys
                .iter()
                .filter(|p| has(&p.schema, &p.table))
                .cloned()
                .collect(),
            foreign_keys: self
                .foreign_keys
                .iter()
                .filter(|f| has(&f.child_schema, &f.child_table))
                .cloned()
                .collect(),
            indexes: self
                .indexes
                .iter()
                .filter(|i| has(&i.schema, &i.table))
                .cloned()
                .collect(),
            row_counts: self
                .row_counts
                .iter()
                .filter(|r| has(&r.schema, &r.table))
                .cloned()
                .collect(),
        }
    }
}

fn text(frame: &MetadataFrame, row: usize, col: usize) -> String {
    frame.cell(row, col).as_text().unwrap_or_default()
}

fn optional_int(frame: &MetadataFrame, row: usize, col: Option<usize>) -> Option<i64> {
    col.and_then(|c| frame.cell(row, c).as_i64())
}

fn truthy(cell: &Cell) -> bool {
    match cell {
        Cell::Int(v) => *v != 0,
        Cell::Float(v) => *v != 0.0,
        Cell::Text(s) => matches!(s.trim().to_lowercase().as_str(), "1" | "yes" | "true" | "y"),
        _ => false,
    }
}

/// Column frame to records. `is_nullable` reads "NO" as NOT NULL.
pub fn columns(frame: &MetadataFrame) -> Result<Vec<ColumnRecord>, MissingRoleError> {
    if frame.is_empty() {
        return Ok(Vec::new());
    }
    let h = &frame.headers;
    let schema = require(h, Role::Schema)?;
    let table = require(h, Role::Table)?;
    let column = require(h, Role::Column)?;
    let data_type = require(h, Role::DataType)?;
    let nullable = resolve(h, Role::Nullable);
    let char_len = resolve(h, Role::CharLength);
    let precision = resolve(h, Role::NumericPrecision);
    let scale = resolve(h, Role::NumericScale);

    Ok((0..frame.len())
        .map(|r| ColumnRecord {
            schema: text(frame, r, schema),
            table: text(frame, r, table),
            name: text(frame, r, column),
            data_type: text(frame, r, data_type),
            is_nullable: nullable
                .map(|c| !text(frame, r, c).eq_ignore_ascii_case("NO"))
                .unwrap_or(true),
            char_length: optional_int(frame, r, char_len),
            numeric_precision: optional_int(frame, r, precision),
            numeric_scale: optional_int(frame, r, scale),
        })
        .collect())
}

/// Primary-key frame to records, in frame order
pub fn primary_keys(frame: &MetadataFrame) -> Result<Vec<PrimaryKeyRecord>, MissingRoleError> {
    if frame.is_empty() {
        return Ok(Vec::new());
    }
    let h = &frame.headers;
    let schema = require(h, Role::Schema)?;
    let table = require(h, Role::Table)?;
    let column = require(h, Role::Column)?;
    let ordinal = resolve(h, Role::Ordinal);

    Ok((0..frame.len())
        .map(|r| PrimaryKeyRecord {
            schema: text(frame, r, schema),
            table: text(frame, r, table),
            column: text(frame, r, column),
            ordinal: optional_int(frame, r, ordinal),
        })
        .collect())
}

/// Foreign-key frame to records, one per column pair
pub fn foreign_keys(frame: &MetadataFrame) -> Result<Vec<ForeignKeyRecord>, MissingRoleError> {
    if frame.is_empty() {
        return Ok(Vec::new());
    }
    let h = &frame.headers;
    let constraint = require(h, Role::Constraint)?;
    let child_schema = require(h, Role::ChildSchema)?;
    let child_table = require(h, Role::ChildTable)?;
    let child_column = require(h, Role::ChildColumn)?;
    let parent_schema = require(h, Role::ParentSchema)?;
    let parent_table = require(h, Role::ParentTable)?;
    let parent_column = require(h, Role::ParentColumn)?;

    Ok((0..frame.len())
        .map(|r| ForeignKeyRecord {
            constraint_name: text(frame, r, constraint),
            child_schema: text(frame, r, child_schema),
            child_table: text(frame, r, child_table),
            child_column: text(frame, r, child_column),
            parent_schema: text(frame, r, parent_schema),
            parent_table: text(frame, r, parent_table),
            parent_column: text(frame, r, parent_column),
        })
        .collect())
}

/// Index frame to records. Column lists are comma separated in sequence
/// order; a header containing "non" inverts the uniqueness flag.
pub fn indexes(frame: &MetadataFrame) -> Result<Vec<IndexRecord>, MissingRoleError> {
    if frame.is_empty() {
        return Ok(Vec::new());
    }
    let h = &frame.headers;
    let schema = require(h, Role::Schema)?;
    let table = require(h, Role::Table)?;
    let name = require(h, Role::Index)?;
    let cols = require(h, Role::IndexColumns)?;
    let unique = resolve(h, Role::Unique);
    let inverted = unique.map_or(true, |u| h[u].to_lowercase().contains("non"));

    Ok((0..frame.len())
        .map(|r| {
            let flag = unique.map(|u| truthy(frame.cell(r, u))).unwrap_or(true);
            IndexRecord {
                schema: text(frame, r, schema),
                table: text(frame, r, table),
                name: text(frame, r, name),
                columns: text(frame, r, cols)
                    .split(',')
                    .map(|c| c.trim().to_string())
                    .filter(|c| !c.is_empty())
                    .collect(),
                unique: if inverted { !flag } else { flag },
            }
        })
        .collect())
}

/// Row-count frame to records; NULL counts read as zero
pub fn row_counts(frame: &MetadataFrame) -> Result<Vec<RowCountRecord>, MissingRoleError> {
    if frame.is_empty() {
        return Ok(Vec::new());
    }
    let h = &frame.headers;
    let schema = require(h, Role::Schema)?;
    let table = require(h, Role::Table)?;
    let count = require(h, Role::RowCount)?;

    Ok((0..frame.len())
        .map(|r| RowCountRecord {
            schema: text(frame, r, schema),
            table: text(frame, r, table),
            rows: frame.cell(r, count).as_i64().unwrap_or(0),
        })
        .collect())
}

/// Lookup structures the graph builder consults per table and column
#[derive(Debug, Clone, Default)]
pub struct MetadataIndex {
    /// (schema, table, column) in some primary key
    pub pk_set: HashSet<(String, String, String)>,
    /// child (schema, table, column) -> parent (schema, table, column)
    pub fk_map: HashMap<(String, String, String), (String, String, String)>,
    pub index_map: HashMap<TableRef, Vec<IndexRecord>>,
    pub row_counts: HashMap<TableRef, i64>,
}

impl MetadataIndex {
    pub fn build(metadata: &NormalizedMetadata) -> Self {
        let pk_set = metadata
            .primary_keys
            .iter()
            .map(|p| (p.schema.clone(), p.table.clone(), p.column.clone()))
            .collect();

        let fk_map = metadata
            .foreign_keys
            .iter()
            .map(|f| {
                (
                    (f.child_schema.clone(), f.child_table.clone(), f.child_column.clone()),
                    (f.parent_schema.clone(), f.parent_table.clone(), f.parent_column.clone()),
                )
            })
            .collect();

        let mut index_map: HashMap<TableRef, Vec<IndexRecord>> = HashMap::new();
        for idx in &metadata.indexes {
            index_map
                .entry(TableRef::new(&idx.schema, &idx.table))
                .or_default()
                .push(idx.clone());
        }

        let row_counts = metadata
            .row_counts
            .iter()
            .map(|r| (TableRef::new(&r.schema, &r.table), r.rows))
            .collect();

        Self {
            pk_set,
            fk_map,
            index_map,
            row_counts,
        }
    }

    pub fn is_primary(&self, schema: &str, table: &str, column: &str) -> bool {
        self.pk_set
            .contains(&(schema.to_string(), table.to_string(), column.to_string()))
    }

    pub fn is_foreign(&self, schema: &str, table: &str, column: &str) -> bool {
        self.fk_map
            .contains_key(&(schema.to_string(), table.to_string(), column.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn headers(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_resolve_by_token_priority() {
        let h = headers(&["TABLE_SCHEMA", "TABLE_NAME", "COLUMN_NAME", "COLUMN_DEFAULT"]);
        assert_eq!(resolve(&h, Role::Schema), Some(0));
        assert_eq!(resolve(&h, Role::Table), Some(1));
        assert_eq!(resolve(&h, Role::Column), Some(2));
    }

    #[test]
    fn test_resolve_falls_back_to_default_name() {
        let h = headers(&["idx", "non_unique"]);
        assert_eq!(resolve(&h, Role::Unique), Some(1));
        assert_eq!(resolve(&h, Role::Constraint), None);
    }

    #[test]
    fn test_require_names_missing_role() {
        let frame = MetadataFrame::from_rows(&["foo", "bar"], vec![vec!["a", "b"]]);
        let err = primary_keys(&frame).unwrap_err();
        assert_eq!(err.role, Role::Schema);
        assert_eq!(err.headers, headers(&["foo", "bar"]));
    }

    #[test]
    fn test_empty_frame_needs_no_roles() {
        assert!(columns(&MetadataFrame::default()).unwrap().is_empty());
    }

    #[test]
    fn test_columns_with_length_and_precision() {
        let frame = MetadataFrame::from_rows(
            &["schema", "table_name", "column_name", "data_type", "is_nullable", "char_len", "num_precision", "num_scale"],
            vec![
                vec!["app", "orders", "code", "varchar", "NO", "32", "", ""],
                vec!["app", "orders", "total", "decimal", "YES", "", "10", "2"],
                vec!["app", "orders", "qty", "int", "YES", "", "10", "0"],
            ],
        );
        let cols = columns(&frame).unwrap();
        assert!(!cols[0].is_nullable);
        assert_eq!(cols[0].type_detail(), "varchar(32)");
        assert_eq!(cols[1].type_detail(), "decimal(10,2)");
        assert_eq!(cols[2].type_detail(), "int(10)");
    }

    #[test]
    fn test_index_uniqueness_polarity() {
        let frame = MetadataFrame::from_rows(
            &["schema", "table_name", "index_name", "index_columns", "non_unique"],
            vec![
                vec!["app", "users", "PRIMARY", "id", "0"],
                vec!["app", "users", "idx_name", "last, first", "1"],
            ],
        );
        let idx = indexes(&frame).unwrap();
        assert!(idx[0].unique);
        assert!(!idx[1].unique);
        assert_eq!(idx[1].columns, vec!["last", "first"]);
    }

    #[test]
    fn test_foreign_keys_with_referenced_headers() {
        let frame = MetadataFrame::from_rows(
            &[
                "CONSTRAINT_NAME",
                "child_schema",
                "child_table",
                "child_column",
                "REFERENCED_TABLE_SCHEMA",
                "REFERENCED_TABLE_NAME",
                "REFERENCED_COLUMN_NAME",
            ],
            vec![vec!["fk_o_u", "app", "orders", "user_id", "app", "users", "id"]],
        );
        let fks = foreign_keys(&frame).unwrap();
        assert_eq!(fks[0].parent_ref(), TableRef::new("app", "users"));
        assert_eq!(fks[0].parent_column, "id");
    }

    #[test]
    fn test_restrict_filters_fk_by_child() {
        let metadata = NormalizedMetadata {
            foreign_keys: vec![
                ForeignKeyRecord {
                    constraint_name: "a".into(),
                    child_schema: "s".into(),
                    child_table: "kept".into(),
                    child_column: "x".into(),
                    parent_schema: "s".into(),
                    parent_table: "other".into(),
                    parent_column: "id".into(),
                },
                ForeignKeyRecord {
                    constraint_name: "b".into(),
                    child_schema: "s".into(),
                    child_table: "gone".into(),
                    child_column: "y".into(),
                    parent_schema: "s".into(),
                    parent_table: "kept".into(),
                    parent_column: "id".into(),
                },
            ],
            ..Default::default()
        };
        let kept: HashSet<_> = [TableRef::new("s", "kept")].into_iter().collect();
        let restricted = metadata.restrict_to(&kept);
        assert_eq!(restricted.foreign_keys.len(), 1);
        assert_eq!(restricted.foreign_keys[0].constraint_name, "a");
    }
}
