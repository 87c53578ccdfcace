pub mod config;
pub mod core;
pub mod dataframe;
pub mod error;
pub mod export;
pub mod ingest;
pub mod jmes;
pub mod logging;
pub mod registry;
pub mod services;
pub mod sql;

// Re-export commonly used types
pub use core::{CsvImportOptions, FileFormat, ImportOptions, ImportSettings, QuoteStyle};
pub use dataframe::{ResultEditor, SortColumn};
pub use error::DataQueryError;
pub use export::{ExportFormat, ExportOptions};
pub use ingest::{LoadReport, SourceFile};
pub use registry::{TableOrigin, TableRegistry};
pub use services::DataService;
pub use sql::QueryEngine;
