//! The fixed-order cleaning pipeline.
//!
//! Steps always run in the same sequence: header normalization, column
//! selection, fully-empty-row removal, missing-value handling,
//! deduplication, text-case formatting. Each step consumes the previous
//! step's output; a table leaving any step still satisfies the rectangular
//! invariant.

use crate::error::{Result, ScrubError};
use crate::table::{Cell, Table};
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashSet;
use std::str::FromStr;
use tracing::{debug, info};

/// Duplicate-column artifacts from upstream tools arrive as `name.1`,
/// `name.2`; one trailing suffix is stripped during normalization.
static HEADER_SUFFIX: Lazy<Regex> = Lazy::new(|| Regex::new(r"\.\d+$").unwrap());

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MissingValueStrategy {
    #[default]
    Fill,
    Drop,
}

impl FromStr for MissingValueStrategy {
    type Err = ScrubError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "fill" => Ok(Self::Fill),
            "drop" => Ok(Self::Drop),
            other => Err(ScrubError::BadRequest(format!(
                "missing_value_strategy must be 'fill' or 'drop', got '{other}'"
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TextCase {
    #[default]
    Lower,
    Upper,
    Capitalize,
}

impl FromStr for TextCase {
    type Err = ScrubError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "lowercase" => Ok(Self::Lower),
            "uppercase" => Ok(Self::Upper),
            "capitalize" => Ok(Self::Capitalize),
            other => Err(ScrubError::BadRequest(format!(
                "text_format must be 'lowercase', 'uppercase' or 'capitalize', got '{other}'"
            ))),
        }
    }
}

/// Per-request cleaning options. Immutable once built.
#[derive(Debug, Clone)]
pub struct CleanOptions {
    /// Restrict output to these columns (matched after header
    /// normalization). `None` or empty keeps every column.
    pub columns: Option<Vec<String>>,
    pub missing: MissingValueStrategy,
    pub dedup: bool,
    pub text_case: TextCase,
}

impl Default for CleanOptions {
    fn default() -> Self {
        Self {
            columns: None,
            missing: MissingValueStrategy::Fill,
            dedup: true,
            text_case: TextCase::Lower,
        }
    }
}

/// The cleaned table plus row accounting for the response body.
#[derive(Debug)]
pub struct CleanOutcome {
    pub table: Table,
    pub original_rows: usize,
    pub cleaned_rows: usize,
}

pub fn clean(table: Table, options: &CleanOptions) -> Result<CleanOutcome> {
    let original_rows = table.row_count();
    metrics::histogram!(crate::metrics::CLEAN_INPUT_ROWS).record(original_rows as f64);

    let mut table = table;
    normalize_headers(&mut table);

    if let Some(subset) = options.columns.as_deref().filter(|c| !c.is_empty()) {
        table = select_columns(table, subset)?;
    }

    drop_fully_empty_rows(&mut table);

    match options.missing {
        MissingValueStrategy::Drop => drop_rows_with_missing(&mut table),
        MissingValueStrategy::Fill => fill_missing(&mut table),
    }

    if options.dedup {
        dedup_rows(&mut table);
    }

    apply_text_case(&mut table, options.text_case);

    if table.row_count() == 0 {
        metrics::counter!(crate::metrics::CLEAN_FAILURES).increment(1);
        return Err(ScrubError::EmptyResult);
    }

    let cleaned_rows = table.row_count();
    metrics::counter!(crate::metrics::CLEAN_RUNS).increment(1);
    metrics::histogram!(crate::metrics::CLEAN_OUTPUT_ROWS).record(cleaned_rows as f64);
    info!(original_rows, cleaned_rows, "cleaning pipeline finished");

    Ok(CleanOutcome {
        table,
        original_rows,
        cleaned_rows,
    })
}

/// Trim, lowercase, and strip a trailing `.<digits>` suffix from every
/// column name. Idempotent: a second pass is a no-op.
fn normalize_headers(table: &mut Table) {
    for name in &mut table.headers {
        let trimmed = name.trim().to_lowercase();
        *name = HEADER_SUFFIX.replace(&trimmed, "").into_owned();
    }
}

/// Restrict to the requested columns, in the requested order. Every
/// requested name must exist; a partial match is an error, not a guess.
fn select_columns(table: Table, subset: &[String]) -> Result<Table> {
    let wanted: Vec<String> = subset.iter().map(|c| c.trim().to_lowercase()).collect();

    let mut indices = Vec::with_capacity(wanted.len());
    let mut missing = Vec::new();
    for name in &wanted {
        match table.headers.iter().position(|h| h == name) {
            Some(i) => indices.push(i),
            None => missing.push(name.clone()),
        }
    }
    if !missing.is_empty() {
        return Err(ScrubError::ColumnSelectionMismatch(missing));
    }

    let rows = table
        .rows
        .into_iter()
        .map(|row| indices.iter().map(|&i| row[i].clone()).collect())
        .collect();

    Table::new(wanted, rows)
}

fn drop_fully_empty_rows(table: &mut Table) {
    table.rows.retain(|row| !row.iter().all(Cell::is_missing));
}

fn drop_rows_with_missing(table: &mut Table) {
    let before = table.row_count();
    table.rows.retain(|row| !row.iter().any(Cell::is_missing));
    debug!(dropped = before - table.row_count(), "dropped rows with missing cells");
}

/// Numeric columns get 0, everything else the literal "Unknown".
fn fill_missing(table: &mut Table) {
    let numeric = table.numeric_columns();
    for row in &mut table.rows {
        for (col, cell) in row.iter_mut().enumerate() {
            if cell.is_missing() {
                *cell = if numeric[col] {
                    Cell::Num(0.0)
                } else {
                    Cell::Str("Unknown".to_string())
                };
            }
        }
    }
}

/// Drop exact-duplicate rows, keeping the first occurrence in place.
fn dedup_rows(table: &mut Table) {
    let mut seen: HashSet<String> = HashSet::new();
    table.rows.retain(|row| {
        let key = row
            .iter()
            .map(|c| c.canonical())
            .collect::<Vec<_>>()
            .join("\u{1f}");
        seen.insert(key)
    });
}

fn apply_text_case(table: &mut Table, case: TextCase) {
    for row in &mut table.rows {
        for cell in row.iter_mut() {
            if let Cell::Str(s) = cell {
                *s = match case {
                    TextCase::Lower => s.to_lowercase(),
                    TextCase::Upper => s.to_uppercase(),
                    TextCase::Capitalize => capitalize(s),
                };
            }
        }
    }
}

/// First character uppercased, remainder lowercased.
fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().collect::<String>() + &chars.as_str().to_lowercase(),
        None => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table(headers: &[&str], rows: Vec<Vec<Cell>>) -> Table {
        Table::new(headers.iter().map(|h| h.to_string()).collect(), rows).unwrap()
    }

    #[test]
    fn header_normalization_is_idempotent() {
        let mut t = table(
            &["Name ", " PRICE.1", "city"],
            vec![vec![Cell::Null, Cell::Null, Cell::Null]],
        );
        normalize_headers(&mut t);
        assert_eq!(t.headers, vec!["name", "price", "city"]);
        let once = t.headers.clone();
        normalize_headers(&mut t);
        assert_eq!(t.headers, once);
    }

    #[test]
    fn selection_mismatch_names_the_missing_columns() {
        let t = table(&["name", "price"], vec![]);
        let err = select_columns(t, &["name".to_string(), "ghost".to_string()]).unwrap_err();
        match err {
            ScrubError::ColumnSelectionMismatch(missing) => {
                assert_eq!(missing, vec!["ghost".to_string()])
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn selection_preserves_requested_order() {
        let t = table(
            &["a", "b", "c"],
            vec![vec![Cell::Num(1.0), Cell::Num(2.0), Cell::Num(3.0)]],
        );
        let picked = select_columns(t, &["c".to_string(), "a".to_string()]).unwrap();
        assert_eq!(picked.headers, vec!["c", "a"]);
        assert_eq!(picked.rows[0], vec![Cell::Num(3.0), Cell::Num(1.0)]);
    }

    #[test]
    fn fill_respects_numeric_columns() {
        let mut t = table(
            &["name", "price"],
            vec![
                vec![Cell::Str("Bob".into()), Cell::Num(10.0)],
                vec![Cell::Null, Cell::Null],
            ],
        );
        fill_missing(&mut t);
        assert_eq!(t.rows[1], vec![Cell::Str("Unknown".into()), Cell::Num(0.0)]);
    }

    #[test]
    fn drop_strategy_removes_rows_with_any_missing_cell() {
        let mut t = table(
            &["name", "price"],
            vec![
                vec![Cell::Str("Bob".into()), Cell::Num(10.0)],
                vec![Cell::Str("".into()), Cell::Num(5.0)],
            ],
        );
        drop_rows_with_missing(&mut t);
        assert_eq!(t.row_count(), 1);
        assert_eq!(t.rows[0][0], Cell::Str("Bob".into()));
    }

    #[test]
    fn dedup_keeps_first_occurrence_and_order() {
        let mut t = table(
            &["x"],
            vec![
                vec![Cell::Str("a".into())],
                vec![Cell::Str("b".into())],
                vec![Cell::Str("a".into())],
            ],
        );
        dedup_rows(&mut t);
        assert_eq!(t.row_count(), 2);
        assert_eq!(t.rows[0][0], Cell::Str("a".into()));
        assert_eq!(t.rows[1][0], Cell::Str("b".into()));
    }

    #[test]
    fn capitalize_handles_unicode_and_empties() {
        assert_eq!(capitalize("bOB"), "Bob");
        assert_eq!(capitalize(""), "");
        assert_eq!(capitalize("über"), "Über");
    }

    #[test]
    fn empty_output_is_an_error() {
        let t = table(&["x"], vec![vec![Cell::Null]]);
        let err = clean(t, &CleanOptions::default()).unwrap_err();
        assert!(matches!(err, ScrubError::EmptyResult));
    }

    #[test]
    fn blank_name_is_filled_then_lowercased() {
        // "Name , Price" with a blank name filled then lowercased
        let t = table(
            &["Name ", " Price"],
            vec![
                vec![Cell::Str("".into()), Cell::Num(10.0)],
                vec![Cell::Str("Bob".into()), Cell::Num(10.0)],
            ],
        );
        let out = clean(t, &CleanOptions::default()).unwrap();
        assert_eq!(out.table.headers, vec!["name", "price"]);
        assert_eq!(out.cleaned_rows, 2);
        assert_eq!(out.table.rows[0][0], Cell::Str("unknown".into()));
        assert_eq!(out.table.rows[1][0], Cell::Str("bob".into()));
    }
}
