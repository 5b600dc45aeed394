use crate::error::{Result, ScrubError};
use serde_json::{Map, Value};

/// A single scalar cell. The model is deliberately narrow: strings, numbers
/// and nulls are the only shapes the cleaning pipeline reasons about.
#[derive(Debug, Clone, PartialEq)]
pub enum Cell {
    Str(String),
    Num(f64),
    Null,
}

impl Cell {
    /// Missing means null, empty, or whitespace-only text.
    pub fn is_missing(&self) -> bool {
        match self {
            Cell::Null => true,
            Cell::Str(s) => s.trim().is_empty(),
            Cell::Num(_) => false,
        }
    }

    /// Stable textual form used for duplicate detection and CSV output.
    pub fn canonical(&self) -> String {
        match self {
            Cell::Str(s) => s.clone(),
            Cell::Num(n) => format_number(*n),
            Cell::Null => String::new(),
        }
    }

    pub fn to_json(&self) -> Value {
        match self {
            Cell::Str(s) => Value::String(s.clone()),
            Cell::Num(n) => serde_json::Number::from_f64(*n)
                .map(Value::Number)
                .unwrap_or(Value::Null),
            Cell::Null => Value::Null,
        }
    }
}

/// Render whole-valued floats without a trailing `.0` so `10.0` round-trips
/// as `10` in CSV output.
fn format_number(n: f64) -> String {
    if n.fract() == 0.0 && n.abs() < 1e15 {
        format!("{}", n as i64)
    } else {
        format!("{n}")
    }
}

/// In-memory tabular data: named columns over row-major cells.
///
/// Invariant: every row holds exactly `headers.len()` cells. Construction and
/// every pipeline step preserve it.
#[derive(Debug, Clone, PartialEq)]
pub struct Table {
    pub headers: Vec<String>,
    pub rows: Vec<Vec<Cell>>,
}

impl Table {
    /// Builds a table, verifying the rectangular invariant.
    pub fn new(headers: Vec<String>, rows: Vec<Vec<Cell>>) -> Result<Self> {
        let width = headers.len();
        if let Some(bad) = rows.iter().position(|r| r.len() != width) {
            return Err(ScrubError::Internal(format!(
                "row {} has {} cells, expected {}",
                bad,
                rows[bad].len(),
                width
            )));
        }
        Ok(Self { headers, rows })
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    pub fn column_count(&self) -> usize {
        self.headers.len()
    }

    /// One flag per column: true when the column has at least one non-missing
    /// cell and every non-missing cell is numeric.
    pub fn numeric_columns(&self) -> Vec<bool> {
        (0..self.headers.len())
            .map(|col| {
                let mut saw_value = false;
                for row in &self.rows {
                    match &row[col] {
                        cell if cell.is_missing() => {}
                        Cell::Num(_) => saw_value = true,
                        _ => return false,
                    }
                }
                saw_value
            })
            .collect()
    }

    /// Serializes to CSV with a header row; the stored-file representation
    /// and the download payload.
    pub fn to_csv_bytes(&self) -> Result<Vec<u8>> {
        let mut writer = csv::Writer::from_writer(Vec::new());
        writer.write_record(&self.headers)?;
        for row in &self.rows {
            writer.write_record(row.iter().map(|c| c.canonical()))?;
        }
        writer
            .into_inner()
            .map_err(|e| ScrubError::Internal(format!("csv writer flush failed: {e}")))
    }

    /// The first `limit` rows as JSON records, for response previews.
    pub fn to_records(&self, limit: usize) -> Vec<Map<String, Value>> {
        self.rows
            .iter()
            .take(limit)
            .map(|row| {
                self.headers
                    .iter()
                    .zip(row.iter())
                    .map(|(name, cell)| (name.clone(), cell.to_json()))
                    .collect()
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_covers_null_empty_and_whitespace() {
        assert!(Cell::Null.is_missing());
        assert!(Cell::Str(String::new()).is_missing());
        assert!(Cell::Str("   ".to_string()).is_missing());
        assert!(!Cell::Str("x".to_string()).is_missing());
        assert!(!Cell::Num(0.0).is_missing());
    }

    #[test]
    fn ragged_rows_are_rejected() {
        let err = Table::new(
            vec!["a".into(), "b".into()],
            vec![vec![Cell::Null, Cell::Null], vec![Cell::Null]],
        )
        .unwrap_err();
        assert!(matches!(err, ScrubError::Internal(_)));
    }

    #[test]
    fn whole_floats_serialize_without_fraction() {
        assert_eq!(Cell::Num(10.0).canonical(), "10");
        assert_eq!(Cell::Num(10.5).canonical(), "10.5");
    }

    #[test]
    fn csv_round_trips_headers_and_cells() {
        let table = Table::new(
            vec!["name".into(), "price".into()],
            vec![
                vec![Cell::Str("Bob".into()), Cell::Num(10.0)],
                vec![Cell::Null, Cell::Num(2.5)],
            ],
        )
        .unwrap();
        let bytes = table.to_csv_bytes().unwrap();
        let text = String::from_utf8(bytes).unwrap();
        assert_eq!(text, "name,price\nBob,10\n,2.5\n");
    }
}
