//! Reading back the markdown table produced by the metrics chain.

use regex::Regex;
use std::sync::OnceLock;
use thiserror::Error;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum ReportError {
    #[error("no '| Metric Name | Value |' table found")]
    MissingHeader,
    #[error("table header is not followed by a separator row")]
    MissingSeparator,
    #[error("row {row} has {cells} cells, expected 2")]
    Malformed { row: usize, cells: usize },
}

/// One data row of the metrics table.
#[derive(Debug, Clone, PartialEq)]
pub struct MetricRow {
    pub name: String,
    pub value: String,
}

impl MetricRow {
    /// First number in the value cell, ignoring thousands separators.
    pub fn numeric(&self) -> Option<f64> {
        static NUMBER: OnceLock<Regex> = OnceLock::new();
        let re = NUMBER.get_or_init(|| Regex::new(r"-?\d[\d,]*(?:\.\d+)?").unwrap());
        re.find(&self.value)?.as_str().replace(',', "").parse().ok()
    }
}

fn cells(line: &str) -> Option<Vec<String>> {
    let line = line.trim();
    if !line.starts_with('|') {
        return None;
    }
    let inner = line.trim_start_matches('|');
    let inner = inner.strip_suffix('|').unwrap_or(inner);
    Some(inner.split('|').map(|c| c.trim().to_string()).collect())
}

fn is_separator(cells: &[String]) -> bool {
    static SEPARATOR: OnceLock<Regex> = OnceLock::new();
    let re = SEPARATOR.get_or_init(|| Regex::new(r"^:?-{3,}:?$").unwrap());
    !cells.is_empty() && cells.iter().all(|c| re.is_match(c))
}

/// Parses the first `| Metric Name | Value |` table in `markdown`, fenced or not.
/// A table with a header and no rows yields an empty list.
pub fn parse_table(markdown: &str) -> Result<Vec<MetricRow>, ReportError> {
    let mut lines = markdown.lines();

    loop {
        let line = lines.next().ok_or(ReportError::MissingHeader)?;
        if let Some(header) = cells(line) {
            let is_header = header.len() == 2
                && header[0].eq_ignore_ascii_case("metric name")
                && header[1].eq_ignore_ascii_case("value");
            if is_header {
                break;
            }
        }
    }

    match lines.next().and_then(cells) {
        Some(sep) if is_separator(&sep) => {}
        _ => return Err(ReportError::MissingSeparator),
    }

    let mut rows = Vec::new();
    for (idx, line) in lines.enumerate() {
        let Some(row) = cells(line) else {
            break;
        };
        if row.len() != 2 {
            return Err(ReportError::Malformed {
                row: idx + 1,
                cells: row.len(),
            });
        }
        let mut row = row.into_iter();
        rows.push(MetricRow {
            name: row.next().unwrap_or_default(),
            value: row.next().unwrap_or_default(),
        });
    }
    Ok(rows)
}

/// Whether the numeric values never increase from one row to the next.
/// Rows without a number are ignored.
pub fn is_sorted_descending(rows: &[MetricRow]) -> bool {
    let values: Vec<f64> = rows.iter().filter_map(MetricRow::numeric).collect();
    values.windows(2).all(|w| w[0] >= w[1])
}
