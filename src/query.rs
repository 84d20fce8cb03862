//! Query Runner
//!
//! Ad-hoc SQL against one environment and schema, with an automatic row
//! limit for bare SELECTs, CSV rendering and `table.` column suggestions.

use crate::error::AppError;
use crate::metadata::{queries, Cell, MetadataFrame};
use crate::snapshot::SchemaSnapshot;
use csv::WriterBuilder;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;
use sqlx::{Executor, MySqlPool};
use std::time::Instant;
use tracing::{debug, info};

pub const DEFAULT_LIMIT: u32 = 100;
pub const MAX_LIMIT: u32 = 10_000;
const MAX_SUGGESTIONS: usize = 10;

static TRAILING_TABLE_DOT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b(\w+)\.$").expect("valid suggestion regex"));

/// Rows returned by one execution
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryResult {
    pub environment: String,
    pub schema: String,
    /// The statement as executed, limit included
    pub sql: String,
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Cell>>,
    pub row_count: usize,
    /// Seconds, rounded to milliseconds
    pub execution_time: f64,
}

impl QueryResult {
    /// Render as CSV with a header row; NULL becomes an empty field
    pub fn to_csv(&self) -> Result<String, AppError> {
        let mut writer = WriterBuilder::new().has_headers(true).from_writer(Vec::new());

        writer
            .write_record(&self.columns)
            .map_err(|e| AppError::Internal(format!("CSV write failed: {}", e)))?;
        for row in &self.rows {
            writer
                .write_record(row.iter().map(|c| c.to_string()))
                .map_err(|e| AppError::Internal(format!("CSV write failed: {}", e)))?;
        }

        let bytes = writer
            .into_inner()
            .map_err(|e| AppError::Internal(format!("CSV flush failed: {}", e)))?;
        String::from_utf8(bytes).map_err(|e| AppError::Internal(e.to_string()))
    }

    /// Download name used for CSV exports
    pub fn csv_file_name(&self) -> String {
        format!("query_results_{}.csv", self.schema)
    }
}

/// Columns offered after a trailing `table.`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Suggestion {
    pub table: Option<String>,
    pub columns: Vec<String>,
    /// More columns exist than were returned
    pub truncated: bool,
}

pub struct QueryRunner;

impl QueryRunner {
    /// Append ` LIMIT n` to a SELECT that has none. `limit` must be in
    /// 1..=10000.
    pub fn prepare(sql: &str, limit: u32) -> Result<String, AppError> {
        if !(1..=MAX_LIMIT).contains(&limit) {
            return Err(AppError::Validation(format!(
                "limit must be between 1 and {}",
                MAX_LIMIT
            )));
        }
        let trimmed = sql.trim();
        if trimmed.is_empty() {
            return Err(AppError::Validation("Query must not be empty".to_string()));
        }

        let lowered = trimmed.to_lowercase();
        if lowered.starts_with("select") && !lowered.contains("limit") {
            let body = trimmed.trim_end_matches(';').trim_end();
            Ok(format!("{} LIMIT {}", body, limit))
        } else {
            Ok(trimmed.to_string())
        }
    }

    /// Execute in `schema`. The connection is switched with `USE` first so
    /// unqualified table names resolve against the selected schema.
    pub async fn execute(
        pool: &MySqlPool,
        environment: &str,
        schema: &str,
        sql: &str,
        limit: u32,
    ) -> Result<QueryResult, AppError> {
        let prepared = Self::prepare(sql, limit)?;
        debug!("Running query on {}.{}: {}", environment, schema, prepared);

        let started = Instant::now();
        let mut conn = pool.acquire().await?;
        let use_schema = queries::use_schema(schema);
        conn.execute(sqlx::raw_sql(&use_schema)).await?;
        let rows = conn.fetch_all(sqlx::raw_sql(&prepared)).await?;
        let elapsed = started.elapsed().as_secs_f64();

        let frame = MetadataFrame::from_mysql(&rows);
        let result = QueryResult {
            environment: environment.to_string(),
            schema: schema.to_string(),
            sql: prepared,
            row_count: frame.len(),
            columns: frame.headers,
            rows: frame.rows,
            execution_time: (elapsed * 1000.0).round() / 1000.0,
        };

        info!(
            "Query on {}.{} returned {} rows in {}s",
            environment, schema, result.row_count, result.execution_time
        );
        Ok(result)
    }

    /// Suggest columns when the last line of the draft ends in `ident.`
    pub fn suggest(snapshot: &SchemaSnapshot, draft: &str) -> Suggestion {
        let last_line = draft.lines().last().unwrap_or("");
        let Some(table) = TRAILING_TABLE_DOT
            .captures(last_line)
            .and_then(|c| c.get(1))
            .map(|m| m.as_str().to_string())
        else {
            return Suggestion::default();
        };

        match snapshot.columns.get(&table) {
            Some(cols) => {
                let mut sorted = cols.clone();
                sorted.sort();
                let truncated = sorted.len() > MAX_SUGGESTIONS;
                sorted.truncate(MAX_SUGGESTIONS);
                Suggestion {
                    table: Some(table),
                    columns: sorted,
                    truncated,
                }
            }
            None => Suggestion::default(),
        }
    }

    /// Short hint naming a few `table.column` pairs from the snapshot
    pub fn help_text(snapshot: &SchemaSnapshot) -> String {
        if snapshot.tables.is_empty() {
            return "Select schema first to see available tables and columns".to_string();
        }
        let mut tables = snapshot.tables.clone();
        tables.sort();
        let samples: Vec<String> = tables
            .iter()
            .take(3)
            .map(|t| {
                let mut cols = snapshot.columns_of(t).to_vec();
                cols.sort();
                match cols.first() {
                    Some(c) => format!("{}.{}", t, c),
                    None => t.clone(),
                }
            })
            .collect();
        format!(
            "Available: {}... (Type table_name. to see columns)",
            samples.join(", ")
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::collections::BTreeMap;

    fn snapshot() -> SchemaSnapshot {
        let mut columns = BTreeMap::new();
        columns.insert(
            "orders".to_string(),
            (0..12).map(|i| format!("col_{:02}", 11 - i)).collect::<Vec<_>>(),
        );
        columns.insert("users".to_string(), vec!["name".to_string(), "id".to_string()]);
        SchemaSnapshot::new("app", vec!["users".to_string(), "orders".to_string()], columns)
    }

    #[test]
    fn test_prepare_appends_limit() {
        assert_eq!(
            QueryRunner::prepare("  SELECT * FROM users;  ", 100).unwrap(),
            "SELECT * FROM users LIMIT 100"
        );
        assert_eq!(
            QueryRunner::prepare("select id from t limit 5", 100).unwrap(),
            "select id from t limit 5"
        );
        assert_eq!(
            QueryRunner::prepare("SHOW TABLES", 100).unwrap(),
            "SHOW TABLES"
        );
    }

    #[test]
    fn test_prepare_rejects_bad_limits() {
        assert!(matches!(QueryRunner::prepare("select 1", 0), Err(AppError::Validation(_))));
        assert!(matches!(
            QueryRunner::prepare("select 1", MAX_LIMIT + 1),
            Err(AppError::Validation(_))
        ));
        assert!(matches!(QueryRunner::prepare("   ", 10), Err(AppError::Validation(_))));
    }

    #[test]
    fn test_suggest_columns_for_trailing_table() {
        let suggestion = QueryRunner::suggest(&snapshot(), "SELECT *\nFROM users u WHERE users.");
        assert_eq!(suggestion.table.as_deref(), Some("users"));
        assert_eq!(suggestion.columns, vec!["id", "name"]);
        assert!(!suggestion.truncated);

        let capped = QueryRunner::suggest(&snapshot(), "select orders.");
        assert_eq!(capped.columns.len(), 10);
        assert_eq!(capped.columns[0], "col_00");
        assert!(capped.truncated);

        assert_eq!(QueryRunner::suggest(&snapshot(), "select users.id"), Suggestion::default());
        assert_eq!(QueryRunner::suggest(&snapshot(), "select ghost."), Suggestion::default());
    }

    #[test]
    fn test_help_text_lists_sample_columns() {
        assert_eq!(
            QueryRunner::help_text(&snapshot()),
            "Available: orders.col_00, users.id... (Type table_name. to see columns)"
        );
    }

    #[test]
    fn test_csv_rendering() {
        let result = QueryResult {
            environment: "QA".into(),
            schema: "app".into(),
            sql: "select".into(),
            columns: vec!["id".into(), "note".into()],
            rows: vec![
                vec![Cell::Int(1), Cell::from("a,b")],
                vec![Cell::Int(2), Cell::Null],
            ],
            row_count: 2,
            execution_time: 0.01,
        };
        assert_eq!(result.to_csv().unwrap(), "id,note\n1,\"a,b\"\n2,\n");
        assert_eq!(result.csv_file_name(), "query_results_app.csv");
    }
}
