//! XML loading: each child of the root element is a row.
//!
//! Row attributes and the text of direct child elements become columns, which
//! is the shape tabular XML exports usually have.

use color_eyre::Result;
use polars::prelude::*;
use quick_xml::encoding::Decoder;
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use std::collections::{HashMap, HashSet};

use super::infer::text_column;
use crate::error::DataQueryError;

fn load_error(name: &str, reason: impl Into<String>) -> color_eyre::Report {
    DataQueryError::LoadFailed {
        name: name.to_string(),
        reason: reason.into(),
    }
    .report()
}

#[derive(Default)]
struct RowCollector {
    keys: Vec<String>,
    seen: HashSet<String>,
    rows: Vec<HashMap<String, String>>,
}

impl RowCollector {
    fn set(&mut self, row: &mut HashMap<String, String>, key: String, value: String) {
        if self.seen.insert(key.clone()) {
            self.keys.push(key.clone());
        }
        row.insert(key, value);
    }
}

fn local_name(start: &BytesStart<'_>) -> String {
    String::from_utf8_lossy(start.local_name().as_ref()).into_owned()
}

fn attributes(name: &str, start: &BytesStart<'_>, decoder: Decoder) -> Result<Vec<(String, String)>> {
    let mut out = Vec::new();
    for attr in start.attributes() {
        let attr = attr.map_err(|e| load_error(name, format!("bad attribute: {e}")))?;
        let key = String::from_utf8_lossy(attr.key.local_name().as_ref()).into_owned();
        let value = attr
            .decode_and_unescape_value(decoder)
            .map_err(|e| load_error(name, format!("bad attribute value: {e}")))?
            .into_owned();
        out.push((key, value));
    }
    Ok(out)
}

/// Parse an XML document into a table.
pub fn read_xml(name: &str, bytes: &[u8]) -> Result<DataFrame> {
    let mut reader = Reader::from_reader(bytes);
    reader.config_mut().trim_text(true);

    let mut collector = RowCollector::default();
    let mut buf = Vec::new();
    let mut depth = 0usize;
    let mut current_row: Option<HashMap<String, String>> = None;
    let mut current_field: Option<String> = None;
    let mut saw_root = false;

    loop {
        let event = reader
            .read_event_into(&mut buf)
            .map_err(|e| load_error(name, format!("XML parse error at {}: {e}", reader.buffer_position())))?;
        match event {
            Event::Start(start) => {
                depth += 1;
                match depth {
                    1 => saw_root = true,
                    2 => {
                        let mut row = HashMap::new();
                        for (k, v) in attributes(name, &start, reader.decoder())? {
                            collector.set(&mut row, k, v);
                        }
                        current_row = Some(row);
                    }
                    3 => {
                        let field = local_name(&start);
                        if let Some(row) = current_row.as_mut() {
                            for (k, v) in attributes(name, &start, reader.decoder())? {
                                collector.set(row, format!("{field}.{k}"), v);
                            }
                            // Present but possibly empty
                            collector.set(row, field.clone(), String::new());
                        }
                        current_field = Some(field);
                    }
                    _ => {}
                }
            }
            Event::Empty(start) => match depth + 1 {
                1 => saw_root = true,
                2 => {
                    let mut row = HashMap::new();
                    for (k, v) in attributes(name, &start, reader.decoder())? {
                        collector.set(&mut row, k, v);
                    }
                    collector.rows.push(row);
                }
                3 => {
                    let field = local_name(&start);
                    if let Some(row) = current_row.as_mut() {
                        for (k, v) in attributes(name, &start, reader.decoder())? {
                            collector.set(row, format!("{field}.{k}"), v);
                        }
                        collector.set(row, field, String::new());
                    }
                }
                _ => {}
            },
            Event::Text(text) => {
                if depth == 3
                    && let (Some(row), Some(field)) = (current_row.as_mut(), current_field.as_ref())
                {
                    let value = text
                        .unescape()
                        .map_err(|e| load_error(name, format!("bad text: {e}")))?
                        .into_owned();
                    let entry = row.entry(field.clone()).or_default();
                    entry.push_str(&value);
                }
            }
            Event::CData(data) => {
                if depth == 3
                    && let (Some(row), Some(field)) = (current_row.as_mut(), current_field.as_ref())
                {
                    let value = String::from_utf8_lossy(data.as_ref()).into_owned();
                    row.entry(field.clone()).or_default().push_str(&value);
                }
            }
            Event::End(_) => {
                match depth {
                    2 => {
                        if let Some(row) = current_row.take() {
                            collector.rows.push(row);
                        }
                    }
                    3 => current_field = None,
                    _ => {}
                }
                depth = depth.saturating_sub(1);
            }
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }

    if !saw_root {
        return Err(load_error(name, "document has no root element"));
    }

    let RowCollector { keys, rows, .. } = collector;
    let mut columns: Vec<Column> = Vec::with_capacity(keys.len());
    for key in &keys {
        let values: Vec<Option<String>> = rows.iter().map(|r| r.get(key).cloned()).collect();
        columns.push(text_column(key, values).into());
    }
    if columns.is_empty() {
        return Ok(DataFrame::empty());
    }
    DataFrame::new(columns).map_err(|e| load_error(name, e.to_string()))
}
