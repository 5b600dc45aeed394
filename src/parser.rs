//! Turns uploaded bytes plus a declared filename into a [`Table`].
//!
//! Format is chosen by extension alone: `csv` is comma-delimited, `tsv` and
//! `txt` are tab-delimited, `json` is an array of flat records. Anything
//! else is rejected before any bytes are inspected.

use crate::error::{Result, ScrubError};
use crate::table::{Cell, Table};
use serde_json::Value;
use std::collections::HashSet;

pub fn parse_table(bytes: &[u8], filename: &str) -> Result<Table> {
    let extension = filename
        .rsplit('.')
        .next()
        .filter(|ext| !ext.is_empty() && ext.len() < filename.len())
        .map(|ext| ext.to_ascii_lowercase())
        .unwrap_or_default();

    match extension.as_str() {
        "csv" => parse_delimited(bytes, b',', "csv"),
        "tsv" | "txt" => parse_delimited(bytes, b'\t', "tsv"),
        "json" => parse_json(bytes),
        other => Err(ScrubError::UnsupportedFormat(other.to_string())),
    }
}

fn parse_delimited(bytes: &[u8], delimiter: u8, format: &'static str) -> Result<Table> {
    let text = std::str::from_utf8(bytes)?;

    let mut reader = csv::ReaderBuilder::new()
        .delimiter(delimiter)
        .from_reader(text.as_bytes());

    let headers: Vec<String> = reader
        .headers()
        .map_err(|e| parse_error(format, e))?
        .iter()
        .map(|h| h.to_string())
        .collect();
    if headers.is_empty() {
        return Err(ScrubError::Parse {
            format,
            message: "no header row".to_string(),
        });
    }

    let mut rows = Vec::new();
    for record in reader.records() {
        let record = record.map_err(|e| parse_error(format, e))?;
        rows.push(record.iter().map(infer_cell).collect());
    }

    Table::new(headers, rows)
}

/// A trimmed field that parses as a float is numeric; an empty field is
/// null; everything else stays text verbatim.
fn infer_cell(field: &str) -> Cell {
    let trimmed = field.trim();
    if trimmed.is_empty() {
        return if field.is_empty() {
            Cell::Null
        } else {
            // Whitespace-only is kept as text so downstream fill still sees
            // the original value; it counts as missing either way.
            Cell::Str(field.to_string())
        };
    }
    match trimmed.parse::<f64>() {
        Ok(n) if n.is_finite() => Cell::Num(n),
        _ => Cell::Str(field.to_string()),
    }
}

/// JSON input must be an array of flat objects. The column set is the union
/// of keys in first-seen order; absent keys become nulls.
fn parse_json(bytes: &[u8]) -> Result<Table> {
    let text = std::str::from_utf8(bytes)?;
    let value: Value = serde_json::from_str(text).map_err(|e| parse_error("json", e))?;

    let records = match value {
        Value::Array(items) => items,
        _ => {
            return Err(ScrubError::Parse {
                format: "json",
                message: "expected an array of record objects".to_string(),
            })
        }
    };

    let mut headers: Vec<String> = Vec::new();
    let mut seen: HashSet<String> = HashSet::new();
    let mut objects = Vec::with_capacity(records.len());
    for (i, item) in records.into_iter().enumerate() {
        match item {
            Value::Object(map) => {
                for key in map.keys() {
                    if seen.insert(key.clone()) {
                        headers.push(key.clone());
                    }
                }
                objects.push(map);
            }
            other => {
                return Err(ScrubError::Parse {
                    format: "json",
                    message: format!("record {i} is not an object: {other}"),
                })
            }
        }
    }

    let mut rows = Vec::with_capacity(objects.len());
    for (i, map) in objects.into_iter().enumerate() {
        let mut row = Vec::with_capacity(headers.len());
        for name in &headers {
            row.push(match map.get(name) {
                None | Some(Value::Null) => Cell::Null,
                Some(Value::String(s)) => Cell::Str(s.clone()),
                Some(Value::Number(n)) => {
                    let n = n.as_f64().ok_or_else(|| ScrubError::Parse {
                        format: "json",
                        message: format!("record {i} field '{name}' is out of range"),
                    })?;
                    Cell::Num(n)
                }
                Some(Value::Bool(b)) => Cell::Str(b.to_string()),
                Some(nested) => {
                    return Err(ScrubError::Parse {
                        format: "json",
                        message: format!("record {i} field '{name}' is nested: {nested}"),
                    })
                }
            });
        }
        rows.push(row);
    }

    Table::new(headers, rows)
}

fn parse_error(format: &'static str, err: impl std::fmt::Display) -> ScrubError {
    ScrubError::Parse {
        format,
        message: err.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn csv_infers_numbers_and_nulls() {
        let table = parse_table(b"name,price\nBob,10\n,2.5\n", "data.csv").unwrap();
        assert_eq!(table.headers, vec!["name", "price"]);
        assert_eq!(table.rows[0], vec![Cell::Str("Bob".into()), Cell::Num(10.0)]);
        assert_eq!(table.rows[1], vec![Cell::Null, Cell::Num(2.5)]);
    }

    #[test]
    fn txt_is_tab_delimited() {
        let table = parse_table(b"a\tb\n1\tx\n", "data.txt").unwrap();
        assert_eq!(table.headers, vec!["a", "b"]);
        assert_eq!(table.rows[0], vec![Cell::Num(1.0), Cell::Str("x".into())]);
    }

    #[test]
    fn unknown_extension_is_rejected() {
        let err = parse_table(b"a,b\n", "data.xlsx").unwrap_err();
        assert!(matches!(err, ScrubError::UnsupportedFormat(ext) if ext == "xlsx"));
    }

    #[test]
    fn invalid_utf8_is_a_decode_error() {
        let err = parse_table(&[0xff, 0xfe, 0x00], "data.csv").unwrap_err();
        assert!(matches!(err, ScrubError::Decode(_)));
    }

    #[test]
    fn ragged_csv_is_a_parse_error() {
        let err = parse_table(b"a,b\n1,2,3\n", "data.csv").unwrap_err();
        assert!(matches!(err, ScrubError::Parse { format: "csv", .. }));
    }

    #[test]
    fn json_records_union_keys_in_first_seen_order() {
        let body = br#"[{"a": 1, "b": "x"}, {"b": "y", "c": null}]"#;
        let table = parse_table(body, "data.json").unwrap();
        assert_eq!(table.headers, vec!["a", "b", "c"]);
        assert_eq!(
            table.rows[1],
            vec![Cell::Null, Cell::Str("y".into()), Cell::Null]
        );
    }

    #[test]
    fn json_scalars_only() {
        let err = parse_table(br#"[{"a": {"nested": true}}]"#, "data.json").unwrap_err();
        assert!(matches!(err, ScrubError::Parse { format: "json", .. }));
    }

    #[test]
    fn json_booleans_become_text() {
        let table = parse_table(br#"[{"flag": true}]"#, "data.json").unwrap();
        assert_eq!(table.rows[0], vec![Cell::Str("true".into())]);
    }
}
