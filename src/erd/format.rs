//! Display helpers shared by ERD labels and reports

use crate::metadata::Cell;

const MIB: f64 = 1024.0 * 1024.0;
const GIB: f64 = MIB * 1024.0;

/// Human size: MB below 1024 MB, GB above, two decimals
pub fn format_size(bytes: i64) -> String {
    let mb = bytes.max(0) as f64 / MIB;
    if mb >= 1024.0 {
        format!("{:.2} GB", mb / 1024.0)
    } else {
        format!("{:.2} MB", mb)
    }
}

/// Bytes as megabytes, two decimals, no unit
pub fn megabytes(bytes: i64) -> f64 {
    round2(bytes.max(0) as f64 / MIB)
}

/// Bytes as gigabytes, two decimals, no unit
pub fn gigabytes(bytes: i64) -> f64 {
    round2(bytes.max(0) as f64 / GIB)
}

fn round2(v: f64) -> f64 {
    (v * 100.0).round() / 100.0
}

/// Integer with comma thousands separators
pub fn format_thousands(n: i64) -> String {
    let digits = n.unsigned_abs().to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3 + 1);
    if n < 0 {
        out.push('-');
    }
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(ch);
    }
    out
}

/// First 19 characters of a timestamp (`YYYY-MM-DD HH:MM:SS`), or "Unknown"
pub fn timestamp_prefix(value: Option<&Cell>) -> String {
    match value.and_then(Cell::as_text) {
        Some(text) if !text.is_empty() => text.chars().take(19).collect(),
        _ => "Unknown".to_string(),
    }
}

/// Escape text for Graphviz HTML-like labels
pub fn html_escape(s: &str) -> String {
    s.replace('&', "&amp;").replace('<', "&lt;").replace('>', "&gt;")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_size_switches_units() {
        assert_eq!(format_size(0), "0.00 MB");
        assert_eq!(format_size(512 * 1024 * 1024), "512.00 MB");
        assert_eq!(format_size(3 * 1024 * 1024 * 1024), "3.00 GB");
    }

    #[test]
    fn test_format_thousands() {
        assert_eq!(format_thousands(0), "0");
        assert_eq!(format_thousands(999), "999");
        assert_eq!(format_thousands(1000), "1,000");
        assert_eq!(format_thousands(-1234567), "-1,234,567");
    }

    #[test]
    fn test_timestamp_prefix() {
        assert_eq!(timestamp_prefix(None), "Unknown");
        assert_eq!(timestamp_prefix(Some(&Cell::Null)), "Unknown");
        assert_eq!(
            timestamp_prefix(Some(&Cell::from("2024-01-02 03:04:05.123"))),
            "2024-01-02 03:04:05"
        );
    }

    #[test]
    fn test_html_escape() {
        assert_eq!(html_escape("a<b>&c"), "a&lt;b&gt;&amp;c");
    }
}
