//! SQL query constants
//!
//! MySQL `information_schema` queries. Every per-schema query binds the
//! schema name as its only parameter.

/// All user schemas visible to the login
pub const SHOW_DATABASES: &str = "SHOW DATABASES";

/// Schemas that never appear in schema pickers
pub const SYSTEM_SCHEMAS: &[&str] = &["information_schema", "performance_schema", "mysql", "sys"];

/// Connectivity probe
pub const PING: &str = "SELECT 1";

/// Column metadata in ordinal order
pub const COLUMNS: &str = r#"
    SELECT table_schema AS `schema`,
           table_name,
           column_name,
           data_type,
           is_nullable,
           character_maximum_length AS char_len,
           numeric_precision AS num_precision,
           numeric_scale AS num_scale,
           column_default
    FROM information_schema.columns
    WHERE table_schema = ?
    ORDER BY table_name, ordinal_position
"#;

/// Primary key members with their position in the key
pub const PRIMARY_KEYS: &str = r#"
    SELECT k.table_schema AS `schema`,
           k.table_name,
           k.column_name,
           k.ordinal_position
    FROM information_schema.table_constraints t
    JOIN information_schema.key_column_usage k
      ON t.constraint_name = k.constraint_name
     AND t.table_schema = k.table_schema
     AND t.table_name = k.table_name
    WHERE t.constraint_type = 'PRIMARY KEY'
      AND k.table_schema = ?
    ORDER BY k.table_name, k.ordinal_position
"#;

/// One row per foreign-key column pair
pub const FOREIGN_KEYS: &str = r#"
    SELECT k.table_schema            AS child_schema,
           k.table_name              AS child_table,
           k.column_name             AS child_column,
           k.referenced_table_schema AS parent_schema,
           k.referenced_table_name   AS parent_table,
           k.referenced_column_name  AS parent_column,
           k.constraint_name
    FROM information_schema.key_column_usage k
    WHERE k.referenced_table_name IS NOT NULL
      AND k.table_schema = ?
    ORDER BY k.table_name, k.constraint_name, k.ordinal_position
"#;

/// Indexes grouped per name with their columns in sequence order
pub const INDEXES: &str = r#"
    SELECT table_schema AS `schema`,
           table_name,
           index_name,
           GROUP_CONCAT(column_name ORDER BY seq_in_index) AS index_columns,
           MIN(non_unique) AS non_unique
    FROM information_schema.statistics
    WHERE table_schema = ?
    GROUP BY table_schema, table_name, index_name
    ORDER BY table_name, index_name
"#;

/// Estimated row counts from table statistics
pub const ROW_COUNTS: &str = r#"
    SELECT table_schema AS `schema`,
           table_name,
           table_rows AS row_count
    FROM information_schema.tables
    WHERE table_schema = ?
      AND table_type = 'BASE TABLE'
"#;

/// Per-table statistics driving the unused-table filter and size report
pub const TABLE_STATS: &str = r#"
    SELECT t.TABLE_NAME,
           t.UPDATE_TIME,
           t.CREATE_TIME,
           t.TABLE_ROWS,
           t.DATA_LENGTH,
           t.INDEX_LENGTH
    FROM information_schema.tables t
    WHERE t.table_schema = ?
      AND t.table_type = 'BASE TABLE'
    ORDER BY t.TABLE_NAME
"#;

/// Column names per table for snapshots
pub const TABLE_COLUMNS: &str = r#"
    SELECT TABLE_NAME, COLUMN_NAME
    FROM information_schema.columns
    WHERE table_schema = ?
    ORDER BY TABLE_NAME, ORDINAL_POSITION
"#;

/// Build `SHOW TABLES FROM <schema>` with the identifier quoted
pub fn show_tables(schema: &str) -> String {
    format!("SHOW TABLES FROM {}", quote_identifier(schema))
}

/// Build `USE <schema>` with the identifier quoted
pub fn use_schema(schema: &str) -> String {
    format!("USE {}", quote_identifier(schema))
}

/// Backtick-quote an identifier, doubling embedded backticks
pub fn quote_identifier(name: &str) -> String {
    format!("`{}`", name.replace('`', "``"))
}

/// True for schemas hidden from users
pub fn is_system_schema(name: &str) -> bool {
    SYSTEM_SCHEMAS
        .iter()
        .any(|s| s.eq_ignore_ascii_case(name))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quote_identifier_escapes_backticks() {
        assert_eq!(quote_identifier("app"), "`app`");
        assert_eq!(quote_identifier("we`ird"), "`we``ird`");
        assert_eq!(use_schema("app"), "USE `app`");
    }

    #[test]
    fn test_system_schemas() {
        assert!(is_system_schema("INFORMATION_SCHEMA"));
        assert!(is_system_schema("sys"));
        assert!(!is_system_schema("orders"));
    }
}
