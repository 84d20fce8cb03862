//! Reference pattern batteries
//!
//! Fixed regex sets for finding a table or column in source text. Names
//! are escaped before interpolation and every pattern is case-insensitive.
//! The SQL clause patterns are line-greedy, not statement-aware.

use regex::{Regex, RegexBuilder};
use serde::{Deserialize, Serialize};

/// What a scan looks for
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum Target {
    Table { table: String },
    Column { table: String, column: String },
}

impl Target {
    pub fn describe(&self) -> String {
        match self {
            Target::Table { table } => table.clone(),
            Target::Column { table, column } => format!("{}.{}", table, column),
        }
    }
}

/// One labelled pattern
#[derive(Debug, Clone)]
pub struct Pattern {
    pub label: &'static str,
    pub regex: Regex,
}

/// Ordered list of patterns run against every file
#[derive(Debug, Clone)]
pub struct PatternBattery {
    patterns: Vec<Pattern>,
}

fn compile(label: &'static str, source: String) -> Result<Pattern, regex::Error> {
    let regex = RegexBuilder::new(&source).case_insensitive(true).build()?;
    Ok(Pattern { label, regex })
}

impl PatternBattery {
    pub fn for_target(target: &Target) -> Result<Self, regex::Error> {
        match target {
            Target::Table { table } => Self::for_table(table),
            Target::Column { table, column } => Self::for_column(table, column),
        }
    }

    pub fn for_table(table: &str) -> Result<Self, regex::Error> {
        let t = regex::escape(table);
        let patterns = vec![
            compile("Word match", format!(r"\b{t}\b"))?,
            compile("FROM clause", format!(r"FROM\s+{t}\b"))?,
            compile("JOIN clause", format!(r"JOIN\s+{t}\b"))?,
            compile("UPDATE statement", format!(r"UPDATE\s+{t}\b"))?,
            compile("INSERT INTO statement", format!(r"INSERT\s+INTO\s+{t}\b"))?,
            compile("DELETE FROM statement", format!(r"DELETE\s+FROM\s+{t}\b"))?,
            compile("@Table annotation", format!(r#"@Table\s*\(\s*name\s*=\s*["']{t}["']\s*\)"#))?,
            compile("table_name assignment", format!(r#"table_name\s*=\s*["']{t}["']"#))?,
        ];
        Ok(Self { patterns })
    }

    pub fn for_column(table: &str, column: &str) -> Result<Self, regex::Error> {
        let t = regex::escape(table);
        let c = regex::escape(column);
        let patterns = vec![
            compile("Word match", format!(r"\b{c}\b"))?,
            compile("SELECT clause", format!(r"SELECT.*{c}\b"))?,
            compile("WHERE clause", format!(r"WHERE.*{c}\b"))?,
            compile("ORDER BY clause", format!(r"ORDER\s+BY.*{c}\b"))?,
            compile("GROUP BY clause", format!(r"GROUP\s+BY.*{c}\b"))?,
            compile("@Column annotation", format!(r#"@Column\s*\(\s*name\s*=\s*["']{c}["']\s*\)"#))?,
            compile("column assignment", format!(r#"column\s*=\s*["']{c}["']"#))?,
            compile("Qualified reference", format!(r"{t}\.{c}\b"))?,
        ];
        Ok(Self { patterns })
    }

    pub fn patterns(&self) -> &[Pattern] {
        &self.patterns
    }

    pub fn len(&self) -> usize {
        self.patterns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }
}
