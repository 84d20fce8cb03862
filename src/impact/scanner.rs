//! Code-Reference Scanner
//!
//! Runs a pattern battery over an ordered corpus and aggregates matches per
//! file, or computes which known tables and columns never occur at all.

use super::patterns::PatternBattery;
use serde::Serialize;

/// Cap on the unused-column list
pub const UNUSED_COLUMN_CAP: usize = 100;

/// One file of source text
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceFile {
    pub path: String,
    pub content: String,
}

impl SourceFile {
    pub fn new(path: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            content: content.into(),
        }
    }
}

/// Ordered (path, content) pairs
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Corpus {
    pub files: Vec<SourceFile>,
}

impl Corpus {
    pub fn new(files: Vec<SourceFile>) -> Self {
        Self { files }
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    /// Keep only files whose path ends with one of `extensions`
    pub fn retain_extensions(&mut self, extensions: &[String]) {
        self.files.retain(|f| has_extension(&f.path, extensions));
    }

    pub fn extend(&mut self, other: Corpus) {
        self.files.extend(other.files);
    }
}

/// Suffix test against an extension allow-list
pub fn has_extension(path: &str, extensions: &[String]) -> bool {
    extensions.iter().any(|ext| path.ends_with(ext.as_str()))
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchRecord {
    /// 1-based
    pub line: usize,
    /// The whole source line, trimmed
    pub content: String,
    pub pattern: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FileImpact {
    pub path: String,
    pub matches: Vec<MatchRecord>,
    pub count: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ImpactResult {
    pub target: String,
    /// Only files with at least one match
    pub files: Vec<FileImpact>,
    pub total_references: usize,
    pub files_scanned: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UnusedReport {
    pub unused_tables: Vec<String>,
    /// At most [`UNUSED_COLUMN_CAP`] entries
    pub unused_columns: Vec<String>,
    pub total_tables: usize,
    pub total_columns: usize,
}

/// Byte offsets of every newline, for line lookups
struct LineIndex<'a> {
    text: &'a str,
    newlines: Vec<usize>,
}

impl<'a> LineIndex<'a> {
    fn new(text: &'a str) -> Self {
        Self {
            text,
            newlines: text.match_indices('\n').map(|(i, _)| i).collect(),
        }
    }

    /// Newlines before `offset`, plus one
    fn line_of(&self, offset: usize) -> usize {
        self.newlines.partition_point(|&nl| nl < offset) + 1
    }

    fn line_text(&self, line: usize) -> &'a str {
        let start = if line == 1 { 0 } else { self.newlines[line - 2] + 1 };
        let end = self.newlines.get(line - 1).copied().unwrap_or(self.text.len());
        self.text[start..end].trim()
    }
}

pub struct Scanner;

impl Scanner {
    /// All matches of every pattern in one text, grouped by pattern order
    pub fn scan_text(text: &str, battery: &PatternBattery) -> Vec<MatchRecord> {
        let index = LineIndex::new(text);
        let mut matches = Vec::new();
        for pattern in battery.patterns() {
            for m in pattern.regex.find_iter(text) {
                let line = index.line_of(m.start());
                matches.push(MatchRecord {
                    line,
                    content: index.line_text(line).to_string(),
                    pattern: pattern.label.to_string(),
                });
            }
        }
        matches
    }

    /// Reference mode over a whole corpus
    pub fn scan(corpus: &Corpus, battery: &PatternBattery, target: &str) -> ImpactResult {
        let mut result = ImpactResult {
            target: target.to_string(),
            files_scanned: corpus.len(),
            ..Default::default()
        };

        for file in &corpus.files {
            let matches = Self::scan_text(&file.content, battery);
            if matches.is_empty() {
                continue;
            }
            result.total_references += matches.len();
            result.files.push(FileImpact {
                path: file.path.clone(),
                count: matches.len(),
                matches,
            });
        }

        tracing::info!(
            "Scanned {} files for {}: {} references in {} files",
            result.files_scanned,
            target,
            result.total_references,
            result.files.len()
        );
        result
    }

    /// Unused-objects mode. A name counts as used if its last dotted segment
    /// occurs anywhere in the lowercased corpus, even inside a longer token.
    pub fn find_unused(corpus: &Corpus, tables: &[String], columns: &[String]) -> UnusedReport {
        let mut blob = String::new();
        for file in &corpus.files {
            blob.push_str(&file.content.to_lowercase());
            blob.push('\n');
        }

        let unused = |name: &String| {
            let bare = name.rsplit('.').next().unwrap_or(name).to_lowercase();
            !blob.contains(&bare)
        };

        let unused_tables: Vec<String> = tables.iter().filter(|t| unused(t)).cloned().collect();
        let unused_columns: Vec<String> = columns
            .iter()
            .filter(|c| unused(c))
            .take(UNUSED_COLUMN_CAP)
            .cloned()
            .collect();

        tracing::info!(
            "Unused scan over {} files: {} of {} tables, {} columns (capped) unused",
            corpus.len(),
            unused_tables.len(),
            tables.len(),
            unused_columns.len()
        );

        UnusedReport {
            unused_tables,
            unused_columns,
            total_tables: tables.len(),
            total_columns: columns.len(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn corpus(files: &[(&str, &str)]) -> Corpus {
        Corpus::new(files.iter().map(|(p, c)| SourceFile::new(*p, *c)).collect())
    }

    #[test]
    fn test_from_clause_on_first_line() {
        let battery = PatternBattery::for_table("orders").unwrap();
        let result = Scanner::scan(
            &corpus(&[("dao/orders.sql", "SELECT id FROM orders WHERE id = 5")]),
            &battery,
            "orders",
        );

        assert_eq!(result.files.len(), 1);
        let file = &result.files[0];
        let from: Vec<&MatchRecord> = file.matches.iter().filter(|m| m.pattern == "FROM clause").collect();
        assert_eq!(from.len(), 1);
        assert_eq!(from[0].line, 1);
        assert_eq!(from[0].content, "SELECT id FROM orders WHERE id = 5");
        assert_eq!(file.count, 2);
        assert_eq!(result.total_references, 2);
    }

    #[test]
    fn test_line_numbers_and_trimmed_content() {
        let battery = PatternBattery::for_table("users").unwrap();
        let text = "package x;\n\n    // load\n    String q = \"SELECT * FROM users\";\n";
        let matches = Scanner::scan_text(text, &battery);
        assert!(matches.iter().all(|m| m.line == 4));
        assert_eq!(matches[0].content, "String q = \"SELECT * FROM users\";");
    }

    #[test]
    fn test_files_without_matches_are_omitted() {
        let battery = PatternBattery::for_table("orders").unwrap();
        let result = Scanner::scan(
            &corpus(&[("a.py", "print('hi')"), ("b.py", "db.query('orders')")]),
            &battery,
            "orders",
        );
        assert_eq!(result.files_scanned, 2);
        assert_eq!(result.files.len(), 1);
        assert_eq!(result.files[0].path, "b.py");
        assert_eq!(result.total_references, result.files.iter().map(|f| f.count).sum::<usize>());
    }

    #[test]
    fn test_find_unused_uses_substring_semantics() {
        let report = Scanner::find_unused(
            &corpus(&[("a.sql", "SELECT * FROM Orders_Detail")]),
            &["app.orders".to_string(), "app.invoices".to_string()],
            &["app.orders.detail".to_string(), "app.orders.total".to_string()],
        );
        // "orders" is only present inside "orders_detail" and still counts as used
        assert_eq!(report.unused_tables, vec!["app.invoices"]);
        assert_eq!(report.unused_columns, vec!["app.orders.total"]);
        assert_eq!(report.total_tables, 2);
        assert_eq!(report.total_columns, 2);
    }

    #[test]
    fn test_unused_columns_are_capped() {
        let columns: Vec<String> = (0..150).map(|i| format!("s.t.zz_col_{}", i)).collect();
        let report = Scanner::find_unused(&Corpus::default(), &[], &columns);
        assert_eq!(report.unused_columns.len(), UNUSED_COLUMN_CAP);
        assert_eq!(report.total_columns, 150);
    }

    #[test]
    fn test_extension_filter() {
        let mut c = corpus(&[("a.py", ""), ("b.rs", ""), ("c.sql", "")]);
        c.retain_extensions(&[".py".to_string(), ".sql".to_string()]);
        let paths: Vec<&str> = c.files.iter().map(|f| f.path.as_str()).collect();
        assert_eq!(paths, vec!["a.py", "c.sql"]);
    }
}
