//! Delimited text (csv, txt) loading.

use color_eyre::Result;
use lazy_static::lazy_static;
use polars::prelude::*;
use regex::Regex;
use std::borrow::Cow;
use std::collections::BTreeSet;
use std::io::Cursor;
use tracing::{debug, info};

use crate::core::naming::positional_column_names;
use crate::core::types::CsvImportOptions;
use crate::error::DataQueryError;

const MAX_COERCION_ATTEMPTS: usize = 256;

lazy_static! {
    static ref FAILED_DTYPE: Regex =
        Regex::new(r"as dtype `([^`]+)` at column '([^']+)' \(column number \d+\)").expect("static regex");
    static ref FAILED_COLUMN: Regex = Regex::new(r"at column '([^']+)'").expect("static regex");
}

/// Decode raw bytes into UTF-8 according to the configured encoding label.
pub fn decode_text<'a>(name: &str, bytes: &'a [u8], encoding: &str) -> Result<Cow<'a, [u8]>> {
    let enc = encoding_rs::Encoding::for_label(encoding.trim().as_bytes()).ok_or_else(|| {
        DataQueryError::InvalidOption {
            option: "encoding".into(),
            reason: format!("unknown encoding label '{encoding}'"),
        }
        .report()
    })?;
    if enc == encoding_rs::UTF_8 {
        let (text, had_errors) = encoding_rs::UTF_8.decode_with_bom_removal(bytes);
        if had_errors {
            return Err(DataQueryError::ParseSettings {
                name: name.to_string(),
                reason: "file is not valid UTF-8; set an encoding".into(),
            }
            .report());
        }
        return Ok(match text {
            Cow::Borrowed(s) => Cow::Borrowed(s.as_bytes()),
            Cow::Owned(s) => Cow::Owned(s.into_bytes()),
        });
    }
    let (text, used, had_errors) = enc.decode(bytes);
    if had_errors {
        debug!("Lossy decode of {} as {}", name, used.name());
    }
    Ok(Cow::Owned(text.into_owned().into_bytes()))
}

/// Read a delimited text file held in memory.
///
/// Columns whose dtype inference fails are coerced to strings one by one and the
/// parse is retried. Returns the frame and an optional warning listing coerced columns.
pub fn read_delimited(
    name: &str,
    bytes: &[u8],
    options: &CsvImportOptions,
    infer_schema_length: usize,
) -> Result<(DataFrame, Option<String>)> {
    let separator = options.delimiter_byte()?;
    let quote = options.quote_byte()?;
    let data = decode_text(name, bytes, &options.encoding)?.into_owned();
    if data.iter().all(|b| b.is_ascii_whitespace()) {
        return Err(DataQueryError::LoadFailed {
            name: name.to_string(),
            reason: "no columns to parse from file".into(),
        }
        .report());
    }

    let mut coerced = BTreeSet::<String>::new();
    let mut attempts = 0usize;
    let mut df = loop {
        attempts += 1;
        if attempts > MAX_COERCION_ATTEMPTS {
            return Err(DataQueryError::ParseSettings {
                name: name.to_string(),
                reason: "exceeded maximum dtype coercion attempts".into(),
            }
            .report());
        }

        let overwrite = if coerced.is_empty() {
            None
        } else {
            let schema = Schema::from_iter(
                coerced
                    .iter()
                    .map(|c| Field::new(c.as_str().into(), DataType::String)),
            );
            Some(Arc::new(schema))
        };

        let result = CsvReadOptions::default()
            .with_has_header(options.has_header)
            .with_infer_schema_length(Some(infer_schema_length))
            .with_schema_overwrite(overwrite)
            .map_parse_options(|parse| parse.with_separator(separator).with_quote_char(quote))
            .into_reader_with_file_handle(Cursor::new(data.clone()))
            .finish();

        match result {
            Ok(df) => break df,
            Err(e) => {
                let msg = e.to_string();
                let column = FAILED_DTYPE
                    .captures(&msg)
                    .and_then(|caps| caps.get(2))
                    .or_else(|| FAILED_COLUMN.captures(&msg).and_then(|caps| caps.get(1)))
                    .map(|m| m.as_str().to_string());
                match column {
                    Some(col) if coerced.insert(col.clone()) => {
                        info!("dtype inference failed for column '{}' in {}; coercing to string and retrying", col, name);
                        continue;
                    }
                    _ => {
                        return Err(DataQueryError::ParseSettings {
                            name: name.to_string(),
                            reason: msg,
                        }
                        .report());
                    }
                }
            }
        }
    };

    if !options.has_header {
        df.set_column_names(positional_column_names(df.width()))?;
    }

    let warning = if coerced.is_empty() {
        None
    } else {
        Some(format!(
            "{}: dtype inference failed; coerced columns to text: {}",
            name,
            coerced.into_iter().collect::<Vec<_>>().join(", ")
        ))
    };
    Ok((df, warning))
}
