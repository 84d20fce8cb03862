//! Unused-Table Filter
//!
//! Keeps enum/lookup tables unconditionally and excludes every other table
//! whose last-update timestamp is missing, NULL or a textual null sentinel.
//! This is a heuristic proxy for "table is in use": static tables that are
//! still read get excluded, stale lookup tables get kept.

use super::format::{format_size, format_thousands, timestamp_prefix};
use crate::metadata::{Cell, TableRef};
use crate::snapshot::TableInfo;
use serde::Serialize;
use std::collections::HashMap;
use std::fmt;

/// Built-in name substrings marking enum/lookup tables. Includes the
/// misspelled table names that exist in deployed schemas.
pub const DEFAULT_ENUM_KEYWORDS: &[&str] = &[
    "status",
    "type",
    "category",
    "enum",
    "lookup",
    "reference",
    "config",
    "setting",
    "option",
    "code",
    "list",
    "reason",
    "complete_by",
    "job_truck_unit",
    "dispath_ordrer",
    "attribiute",
    "transcription_field",
    "entity_note",
];

/// Extra keywords the active/unused table split treats as lookup tables.
/// The ERD filter does not use them.
pub const ACTIVITY_EXTRA_KEYWORDS: &[&str] = &["dispatch_order", "attribute", "equipment_attribute"];

/// Timestamp strings that mean "never updated"
pub const NULL_SENTINELS: &[&str] = &["nat", "none", "null", "unknown"];

/// Name-pattern allowlist for enum/lookup tables
#[derive(Debug, Clone)]
pub struct EnumTablePolicy {
    keywords: Vec<String>,
}

impl EnumTablePolicy {
    pub fn new<I, S>(keywords: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            keywords: keywords
                .into_iter()
                .map(|k| k.as_ref().trim().to_lowercase())
                .filter(|k| !k.is_empty())
                .collect(),
        }
    }

    /// True iff the lowercased table name contains any keyword
    pub fn is_enum_table(&self, table: &str) -> bool {
        let lowered = table.to_lowercase();
        self.keywords.iter().any(|k| lowered.contains(k.as_str()))
    }

    pub fn keywords(&self) -> &[String] {
        &self.keywords
    }

    /// This policy plus `extra`, skipping keywords already present
    pub fn extended<I, S>(&self, extra: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut keywords = self.keywords.clone();
        for keyword in Self::new(extra).keywords {
            if !keywords.contains(&keyword) {
                keywords.push(keyword);
            }
        }
        Self { keywords }
    }
}

impl Default for EnumTablePolicy {
    fn default() -> Self {
        Self::new(DEFAULT_ENUM_KEYWORDS)
    }
}

/// Why a table was excluded
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum ExclusionReason {
    /// No statistics row, or no UPDATE_TIME column
    NoMetadata,
    /// UPDATE_TIME is NULL
    NullTimestamp,
    /// UPDATE_TIME holds a textual null sentinel
    Sentinel { raw: String },
}

impl fmt::Display for ExclusionReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExclusionReason::NoMetadata => write!(f, "No UPDATE_TIME metadata (non-enum table)"),
            ExclusionReason::NullTimestamp => write!(f, "UPDATE_TIME is NaT (non-enum table)"),
            ExclusionReason::Sentinel { raw } => {
                write!(f, "UPDATE_TIME is '{}' (non-enum table)", raw)
            }
        }
    }
}

/// Outcome of classifying one table
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Classification {
    Keep,
    Exclude(ExclusionReason),
}

impl Classification {
    pub fn is_kept(&self) -> bool {
        matches!(self, Classification::Keep)
    }
}

/// Classify a table by name and statistics
pub fn classify(policy: &EnumTablePolicy, table: &str, info: Option<&TableInfo>) -> Classification {
    if policy.is_enum_table(table) {
        return Classification::Keep;
    }

    match info.and_then(|i| i.last_update.as_ref()) {
        None => Classification::Exclude(ExclusionReason::NoMetadata),
        Some(Cell::Null) => Classification::Exclude(ExclusionReason::NullTimestamp),
        Some(value) => {
            let raw = value.to_string();
            if NULL_SENTINELS.contains(&raw.trim().to_lowercase().as_str()) {
                Classification::Exclude(ExclusionReason::Sentinel { raw })
            } else {
                Classification::Keep
            }
        }
    }
}

/// Report row for one excluded table
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExclusionRecord {
    pub table: String,
    pub reason: ExclusionReason,
    pub reason_text: String,
    pub size: String,
    pub rows: String,
    pub created: String,
    pub last_updated: String,
}

impl ExclusionRecord {
    pub fn new(table: &TableRef, info: Option<&TableInfo>, reason: ExclusionReason) -> Self {
        let default = TableInfo::default();
        let info = info.unwrap_or(&default);
        Self {
            table: table.qualified(),
            reason_text: reason.to_string(),
            reason,
            size: format_size(info.total_size()),
            rows: format_thousands(info.rows),
            created: timestamp_prefix(info.created.as_ref()),
            last_updated: "None".to_string(),
        }
    }
}

/// Kept tables plus one exclusion record per filtered-out table
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FilterOutcome {
    pub kept: Vec<TableRef>,
    pub excluded: Vec<ExclusionRecord>,
}

/// Applies [`classify`] across a table list
#[derive(Debug, Clone, Default)]
pub struct UnusedTableFilter {
    policy: EnumTablePolicy,
}

impl UnusedTableFilter {
    pub fn new(policy: EnumTablePolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> &EnumTablePolicy {
        &self.policy
    }

    /// Partition tables, preserving input order in both outputs
    pub fn apply(&self, tables: &[TableRef], table_info: &HashMap<TableRef, TableInfo>) -> FilterOutcome {
        let mut outcome = FilterOutcome::default();
        for table in tables {
            let info = table_info.get(table);
            match classify(&self.policy, &table.table, info) {
                Classification::Keep => outcome.kept.push(table.clone()),
                Classification::Exclude(reason) => {
                    outcome.excluded.push(ExclusionRecord::new(table, info, reason))
                }
            }
        }
        tracing::debug!(
            "Unused-table filter kept {} of {} tables",
            outcome.kept.len(),
            tables.len()
        );
        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use pretty_assertions::assert_eq;

    fn info(last_update: Option<Cell>) -> TableInfo {
        TableInfo {
            last_update,
            created: Some(Cell::from("2023-01-02 03:04:05.000000")),
            rows: 1234567,
            data_size: 3 * 1024 * 1024,
            index_size: 1024 * 1024,
        }
    }

    fn updated() -> Cell {
        Cell::DateTime(
            NaiveDate::from_ymd_opt(2024, 5, 1)
                .and_then(|d| d.and_hms_opt(10, 0, 0))
                .unwrap(),
        )
    }

    #[test]
    fn test_enum_tables_always_kept() {
        let policy = EnumTablePolicy::default();
        assert!(classify(&policy, "Order_Status", None).is_kept());
        assert!(classify(&policy, "dispath_ordrer_x", Some(&info(Some(Cell::Null)))).is_kept());
    }

    #[test]
    fn test_exclusion_reasons() {
        let policy = EnumTablePolicy::default();
        assert_eq!(
            classify(&policy, "orders", None),
            Classification::Exclude(ExclusionReason::NoMetadata)
        );
        assert_eq!(
            classify(&policy, "orders", Some(&info(None))),
            Classification::Exclude(ExclusionReason::NoMetadata)
        );
        assert_eq!(
            classify(&policy, "orders", Some(&info(Some(Cell::Null)))),
            Classification::Exclude(ExclusionReason::NullTimestamp)
        );
        assert_eq!(
            classify(&policy, "orders", Some(&info(Some(Cell::from("NaT"))))),
            Classification::Exclude(ExclusionReason::Sentinel { raw: "NaT".into() })
        );
        assert!(classify(&policy, "orders", Some(&info(Some(updated())))).is_kept());
    }

    #[test]
    fn test_attribute_tables_without_timestamp_are_excluded() {
        let policy = EnumTablePolicy::default();
        assert_eq!(
            classify(&policy, "equipment_attribute", Some(&info(Some(Cell::Null)))),
            Classification::Exclude(ExclusionReason::NullTimestamp)
        );
        assert!(!classify(&policy, "dispatch_order", Some(&info(Some(Cell::from("None"))))).is_kept());
        assert!(classify(&policy, "equipment_attribiute", Some(&info(Some(Cell::Null)))).is_kept());
    }

    #[test]
    fn test_extended_policy_adds_activity_keywords() {
        let policy = EnumTablePolicy::default().extended(ACTIVITY_EXTRA_KEYWORDS);
        assert!(policy.is_enum_table("equipment_attribute"));
        assert!(policy.is_enum_table("dispatch_order"));
        assert_eq!(
            policy.keywords().len(),
            DEFAULT_ENUM_KEYWORDS.len() + ACTIVITY_EXTRA_KEYWORDS.len()
        );
    }

    #[test]
    fn test_custom_policy_replaces_keywords() {
        let policy = EnumTablePolicy::new(["ledger"]);
        assert!(policy.is_enum_table("GL_LEDGER"));
        assert!(!policy.is_enum_table("order_status"));
    }

    #[test]
    fn test_filter_partitions_and_is_idempotent() {
        let tables = vec![
            TableRef::new("app", "orders"),
            TableRef::new("app", "order_status"),
            TableRef::new("app", "legacy"),
            TableRef::new("app", "ghost"),
        ];
        let mut table_info = HashMap::new();
        table_info.insert(TableRef::new("app", "orders"), info(Some(updated())));
        table_info.insert(TableRef::new("app", "legacy"), info(Some(Cell::Null)));

        let filter = UnusedTableFilter::default();
        let outcome = filter.apply(&tables, &table_info);
        assert_eq!(
            outcome.kept,
            vec![TableRef::new("app", "orders"), TableRef::new("app", "order_status")]
        );
        assert_eq!(outcome.excluded.len(), 2);

        let again = filter.apply(&outcome.kept, &table_info);
        assert_eq!(again.kept, outcome.kept);
        assert!(again.excluded.is_empty());
    }

    #[test]
    fn test_exclusion_record_fields() {
        let record = ExclusionRecord::new(
            &TableRef::new("app", "legacy"),
            Some(&info(Some(Cell::Null))),
            ExclusionReason::NullTimestamp,
        );
        assert_eq!(record.table, "app.legacy");
        assert_eq!(record.reason_text, "UPDATE_TIME is NaT (non-enum table)");
        assert_eq!(record.size, "4.00 MB");
        assert_eq!(record.rows, "1,234,567");
        assert_eq!(record.created, "2023-01-02 03:04:05");
        assert_eq!(record.last_updated, "None");

        let missing = ExclusionRecord::new(&TableRef::new("app", "ghost"), None, ExclusionReason::NoMetadata);
        assert_eq!(missing.size, "0.00 MB");
        assert_eq!(missing.created, "Unknown");
    }
}
