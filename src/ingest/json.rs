//! JSON / NDJSON loading with `json_normalize`-style flattening.

use color_eyre::Result;
use polars::prelude::*;
use serde_json::{Map, Value as JsonValue};
use std::collections::HashSet;

use crate::core::types::JsonImportOptions;
use crate::error::DataQueryError;
use crate::jmes;

fn load_error(name: &str, reason: impl Into<String>) -> color_eyre::Report {
    DataQueryError::LoadFailed {
        name: name.to_string(),
        reason: reason.into(),
    }
    .report()
}

/// Parse a JSON document (or NDJSON stream) into a flat table.
pub fn read_json(name: &str, bytes: &[u8], options: &JsonImportOptions) -> Result<DataFrame> {
    let text = std::str::from_utf8(bytes)
        .map_err(|e| load_error(name, format!("JSON is not valid UTF-8: {e}")))?;
    let text = text.trim_start_matches('\u{feff}');

    let document = if options.ndjson {
        let mut values = Vec::new();
        for (idx, line) in text.lines().enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            let value: JsonValue = serde_json::from_str(line)
                .map_err(|e| load_error(name, format!("line {}: {e}", idx + 1)))?;
            values.push(value);
        }
        JsonValue::Array(values)
    } else {
        serde_json::from_str(text).map_err(|e| load_error(name, format!("failed to parse JSON: {e}")))?
    };

    let selected = jmes::search(&options.records_expr, document)
        .map_err(|e| load_error(name, e.to_string()))?;
    let records = into_records(name, selected)?;
    records_to_frame(&records).map_err(|e| load_error(name, e.to_string()))
}

/// Work out the record list from the shape of the document.
fn into_records(name: &str, value: JsonValue) -> Result<Vec<Map<String, JsonValue>>> {
    match value {
        JsonValue::Array(items) => Ok(items
            .into_iter()
            .map(|item| match item {
                JsonValue::Object(map) => map,
                scalar => {
                    let mut map = Map::new();
                    map.insert("value".to_string(), scalar);
                    map
                }
            })
            .collect()),
        JsonValue::Object(map) => {
            if let Some(len) = column_oriented_len(&map) {
                let mut records = vec![Map::new(); len];
                for (key, column) in map {
                    if let JsonValue::Array(cells) = column {
                        for (record, cell) in records.iter_mut().zip(cells) {
                            record.insert(key.clone(), cell);
                        }
                    }
                }
                Ok(records)
            } else {
                Ok(vec![map])
            }
        }
        JsonValue::Null => Ok(Vec::new()),
        _ => Err(load_error(name, "top-level JSON must be an object or an array")),
    }
}

/// `{"a": [..], "b": [..]}` with equally long arrays is read column-wise.
fn column_oriented_len(map: &Map<String, JsonValue>) -> Option<usize> {
    let mut len = None;
    for value in map.values() {
        let n = value.as_array()?.len();
        match len {
            None => len = Some(n),
            Some(prev) if prev != n => return None,
            _ => {}
        }
    }
    len
}

/// Flatten nested objects into dotted keys; arrays stay as JSON text.
fn flatten_into(prefix: Option<&str>, map: Map<String, JsonValue>, out: &mut Vec<(String, JsonValue)>) {
    for (key, value) in map {
        let full = match prefix {
            Some(p) => format!("{p}.{key}"),
            None => key,
        };
        match value {
            JsonValue::Object(inner) if !inner.is_empty() => flatten_into(Some(&full), inner, out),
            other => out.push((full, other)),
        }
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
enum JsonColType {
    Unknown,
    Boolean,
    Int64,
    Float64,
    Utf8,
}

fn value_type(value: &JsonValue) -> Option<JsonColType> {
    Some(match value {
        JsonValue::Null => return None,
        JsonValue::Bool(_) => JsonColType::Boolean,
        JsonValue::Number(n) if n.is_i64() => JsonColType::Int64,
        JsonValue::Number(_) => JsonColType::Float64,
        _ => JsonColType::Utf8,
    })
}

fn records_to_frame(records: &[Map<String, JsonValue>]) -> PolarsResult<DataFrame> {
    let flat: Vec<Vec<(String, JsonValue)>> = records
        .iter()
        .map(|r| {
            let mut out = Vec::new();
            flatten_into(None, r.clone(), &mut out);
            out
        })
        .collect();

    // Column order follows first appearance across records
    let mut seen = HashSet::new();
    let mut keys: Vec<String> = Vec::new();
    for row in &flat {
        for (k, _) in row {
            if seen.insert(k.clone()) {
                keys.push(k.clone());
            }
        }
    }

    let mut columns: Vec<Column> = Vec::with_capacity(keys.len());
    for key in &keys {
        let cells: Vec<Option<&JsonValue>> = flat
            .iter()
            .map(|row| row.iter().find(|(k, _)| k == key).map(|(_, v)| v))
            .collect();
        let col_type = cells.iter().flatten().filter_map(|v| value_type(v)).fold(
            JsonColType::Unknown,
            |acc, t| match (acc, t) {
                (JsonColType::Unknown, t) => t,
                (a, b) if a == b => a,
                (JsonColType::Int64, JsonColType::Float64) | (JsonColType::Float64, JsonColType::Int64) => {
                    JsonColType::Float64
                }
                _ => JsonColType::Utf8,
            },
        );
        let name: PlSmallStr = key.as_str().into();
        let series = match col_type {
            JsonColType::Boolean => {
                let data: Vec<Option<bool>> = cells.iter().map(|c| c.and_then(|v| v.as_bool())).collect();
                Series::new(name, data)
            }
            JsonColType::Int64 => {
                let data: Vec<Option<i64>> = cells.iter().map(|c| c.and_then(|v| v.as_i64())).collect();
                Series::new(name, data)
            }
            JsonColType::Float64 => {
                let data: Vec<Option<f64>> = cells.iter().map(|c| c.and_then(|v| v.as_f64())).collect();
                Series::new(name, data)
            }
            JsonColType::Unknown | JsonColType::Utf8 => {
                let data: Vec<Option<String>> = cells
                    .iter()
                    .map(|c| match c {
                        None | Some(JsonValue::Null) => None,
                        Some(JsonValue::String(s)) => Some(s.clone()),
                        Some(other) => Some(other.to_string()),
                    })
                    .collect();
                Series::new(name, data)
            }
        };
        columns.push(series.into());
    }
    if columns.is_empty() {
        return Ok(DataFrame::empty());
    }
    DataFrame::new(columns)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn names(df: &DataFrame) -> Vec<String> {
        df.get_column_names().iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_array_of_records_is_flattened() {
        let data = br#"[{"id": 1, "user": {"name": "a", "age": 3}}, {"id": 2, "user": {"name": "b"}, "tags": [1, 2]}]"#;
        let df = read_json("r.json", data, &JsonImportOptions::default()).unwrap();
        assert_eq!(names(&df), vec!["id", "user.name", "user.age", "tags"]);
        assert_eq!(df.column("id").unwrap().dtype(), &DataType::Int64);
        assert_eq!(df.column("user.age").unwrap().null_count(), 1);
        let tags = df.column("tags").unwrap().str().unwrap().get(1).map(|s| s.to_string());
        assert_eq!(tags.as_deref(), Some("[1,2]"));
    }

    #[test]
    fn test_column_oriented_object() {
        let data = br#"{"a": [1, 2, 3], "b": ["x", "y", "z"]}"#;
        let df = read_json("c.json", data, &JsonImportOptions::default()).unwrap();
        assert_eq!(df.shape(), (3, 2));
    }

    #[test]
    fn test_single_object_is_one_row() {
        let data = br#"{"a": 1, "b": {"c": true}}"#;
        let df = read_json("o.json", data, &JsonImportOptions::default()).unwrap();
        assert_eq!(df.shape(), (1, 2));
        assert_eq!(df.column("b.c").unwrap().dtype(), &DataType::Boolean);
    }

    #[test]
    fn test_ndjson_and_records_expression() {
        let data = b"{\"a\": 1}\n\n{\"a\": 2.5}\n";
        let opts = JsonImportOptions { ndjson: true, ..Default::default() };
        let df = read_json("n.jsonl", data, &opts).unwrap();
        assert_eq!(df.shape(), (2, 1));
        assert_eq!(df.column("a").unwrap().dtype(), &DataType::Float64);

        let nested = br#"{"meta": {}, "items": [{"a": 1}, {"a": 2}]}"#;
        let opts = JsonImportOptions { records_expr: "items".into(), ..Default::default() };
        let df = read_json("n.json", nested, &opts).unwrap();
        assert_eq!(df.shape(), (2, 1));
    }

    #[test]
    fn test_scalar_document_is_rejected() {
        assert!(read_json("s.json", b"42", &JsonImportOptions::default()).is_err());
        assert!(read_json("bad.json", b"{", &JsonImportOptions::default()).is_err());
    }
}
