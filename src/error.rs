//! User-facing failure categories.
//!
//! Public functions return `color_eyre::Result`; the variants below are the
//! ones a front end needs to tell apart, recovered with
//! `report.downcast_ref::<DataQueryError>()`.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum DataQueryError {
    #[error("File {name} not loaded. Unsupported file format.")]
    UnsupportedFormat { name: String },

    #[error("{name} not loaded. Please check file settings. ({reason})")]
    ParseSettings { name: String, reason: String },

    #[error("Error loading file {name}: {reason}")]
    LoadFailed { name: String, reason: String },

    #[error("Invalid option '{option}': {reason}")]
    InvalidOption { option: String, reason: String },

    #[error("Please enter a SQL query.")]
    EmptyQuery,

    #[error("Table not existing. Please check table names in your query.")]
    TableNotFound { detail: String },

    #[error("Update not available. Please consider a different select statement and the edit mode.")]
    UpdateNotAvailable,

    #[error("Error executing query: {0}")]
    QueryFailed(String),

    #[error("Table '{0}' is not registered")]
    UnknownTable(String),

    #[error("Cell ({row}, {column}) is out of range")]
    CellOutOfRange { row: usize, column: String },

    #[error("Value '{value}' does not fit column '{column}' of type {dtype}")]
    InvalidCellValue {
        column: String,
        value: String,
        dtype: String,
    },

    #[error("Special character found in the data. Please select a different quoting option.")]
    NeedsEscape,

    #[error("{format} export not available for your data. Please select a different format. ({reason})")]
    ExportUnavailable { format: String, reason: String },
}

impl DataQueryError {
    /// Wrap into the report type used across the crate.
    pub fn report(self) -> color_eyre::Report {
        color_eyre::Report::new(self)
    }
}

/// Classify a report produced anywhere in the crate.
pub fn classify(report: &color_eyre::Report) -> Option<&DataQueryError> {
    report.downcast_ref::<DataQueryError>()
}
