//! Serialize a result frame into a downloadable file.

mod excel;
mod text;
mod xml;

use color_eyre::Result;
use polars::io::avro::AvroWriter;
use polars::prelude::*;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use strum::{AsRefStr, EnumIter, EnumString};
use tracing::info;

use crate::core::types::{FileFormat, QuoteStyle};
use crate::error::DataQueryError;

pub use xml::xml_name;

/// Formats a result can be exported to (every loadable format except archives).
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, EnumString, EnumIter, AsRefStr,
)]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
#[serde(rename_all = "lowercase")]
pub enum ExportFormat {
    Avro,
    #[default]
    Csv,
    Json,
    Parquet,
    Txt,
    Xlsx,
    Xml,
}

impl ExportFormat {
    pub fn file_format(&self) -> FileFormat {
        match self {
            Self::Avro => FileFormat::Avro,
            Self::Csv => FileFormat::Csv,
            Self::Json => FileFormat::Json,
            Self::Parquet => FileFormat::Parquet,
            Self::Txt => FileFormat::Txt,
            Self::Xlsx => FileFormat::Xlsx,
            Self::Xml => FileFormat::Xml,
        }
    }

    pub fn extension(&self) -> &'static str {
        self.file_format().extension()
    }

    /// Detect from a path or file name extension.
    pub fn from_file_name(name: &str) -> Option<Self> {
        let (_, ext) = name.rsplit_once('.')?;
        Self::from_str(ext).ok()
    }

    /// Whether `ExportOptions::header` is honoured.
    pub fn uses_header(&self) -> bool {
        matches!(self, Self::Csv | Self::Txt | Self::Xlsx)
    }
}

impl TryFrom<FileFormat> for ExportFormat {
    type Error = DataQueryError;

    fn try_from(value: FileFormat) -> Result<Self, Self::Error> {
        Self::from_str(value.extension()).map_err(|_| DataQueryError::ExportUnavailable {
            format: value.to_string(),
            reason: "archives cannot be exported".into(),
        })
    }
}

impl fmt::Display for ExportFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

/// Writer options. `header` applies to csv/txt/xlsx; the rest to csv/txt only.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExportOptions {
    pub header: bool,
    pub delimiter: char,
    pub quoting: QuoteStyle,
    pub quote_char: char,
}

impl Default for ExportOptions {
    fn default() -> Self {
        Self {
            header: true,
            delimiter: ',',
            quoting: QuoteStyle::Minimal,
            quote_char: '"',
        }
    }
}

/// `query_result.<ext>`
pub fn file_name(format: ExportFormat) -> String {
    format!("query_result.{}", format.extension())
}

pub fn mime_type(format: ExportFormat) -> &'static str {
    match format {
        ExportFormat::Csv => "text/csv",
        ExportFormat::Xlsx => "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet",
        ExportFormat::Json => "application/json",
        ExportFormat::Xml => "application/xml",
        ExportFormat::Parquet | ExportFormat::Avro | ExportFormat::Txt => "application/octet-stream",
    }
}

pub(crate) fn unavailable(format: ExportFormat, reason: impl fmt::Display) -> color_eyre::Report {
    DataQueryError::ExportUnavailable {
        format: format.to_string(),
        reason: reason.to_string(),
    }
    .report()
}

/// Serialize `frame` in `format`.
pub fn export(frame: &DataFrame, format: ExportFormat, options: &ExportOptions) -> Result<Vec<u8>> {
    let mut df = frame.clone();
    let bytes = match format {
        ExportFormat::Csv | ExportFormat::Txt => text::write_delimited(&mut df, format, options)?,
        ExportFormat::Xlsx => excel::write_workbook(&df, options.header)?,
        ExportFormat::Xml => xml::write_xml(&df)?,
        ExportFormat::Json => {
            let mut buf = Vec::new();
            JsonWriter::new(&mut buf)
                .with_json_format(JsonFormat::Json)
                .finish(&mut df)
                .map_err(|e| unavailable(format, e))?;
            buf
        }
        ExportFormat::Parquet => {
            let mut buf = Vec::new();
            ParquetWriter::new(&mut buf)
                .finish(&mut df)
                .map_err(|e| unavailable(format, e))?;
            buf
        }
        ExportFormat::Avro => {
            let mut buf = Vec::new();
            AvroWriter::new(&mut buf)
                .finish(&mut df)
                .map_err(|e| unavailable(format, e))?;
            buf
        }
    };
    info!("Exported {} rows as {} ({} bytes)", frame.height(), format, bytes.len());
    Ok(bytes)
}
