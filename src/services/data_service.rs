use color_eyre::Result;
use polars::prelude::DataFrame;
use tracing::{info, warn};

use crate::config::Config;
use crate::core::types::ImportSettings;
use crate::dataframe::ResultEditor;
use crate::error::DataQueryError;
use crate::export::{self, ExportFormat, ExportOptions};
use crate::ingest::{self, LoadReport, SourceDescriptor, SourceFile};
use crate::registry::{TableOrigin, TableRegistry};
use crate::sql::QueryEngine;

/// DataService ties uploads, the table registry and the current query result together
///
/// This service is responsible for:
/// - Loading uploaded files into named tables
/// - Dropping the tables of uploads that went away
/// - Running SQL over every registered table
/// - Holding the latest result and its edits, and exporting it
pub struct DataService {
    registry: TableRegistry,
    editor: Option<ResultEditor>,
    config: Config,
}

impl Default for DataService {
    fn default() -> Self {
        Self::new(Config::default())
    }
}

impl DataService {
    pub fn new(config: Config) -> Self {
        Self {
            registry: TableRegistry::new(),
            editor: None,
            config,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn registry(&self) -> &TableRegistry {
        &self.registry
    }

    /// Import settings seeded from the configuration.
    pub fn import_settings(&self) -> ImportSettings {
        self.config.import_settings()
    }

    /// Inspect a file before uploading it (sheets, archive members).
    pub fn describe(&self, source: &SourceFile) -> Result<SourceDescriptor> {
        ingest::describe(source)
    }

    /// Forget every upload not named in `current`. Returns the removed upload names.
    pub fn sync_uploads<S: AsRef<str>>(&mut self, current: &[S]) -> Vec<String> {
        let mut removed = Vec::new();
        for upload in self.registry.uploads() {
            if current.iter().any(|c| c.as_ref() == upload) {
                continue;
            }
            let tables = self.registry.remove_upload(&upload);
            warn!("Removed file: {} and its associated tables ({})", upload, tables.join(", "));
            removed.push(upload);
        }
        removed
    }

    /// Load a file and register its tables.
    ///
    /// A previous upload with the same name is replaced. The returned report
    /// carries the names the tables were registered under.
    pub fn upload(&mut self, source: &SourceFile, settings: &ImportSettings) -> Result<LoadReport> {
        let mut report = ingest::load_source(source, settings)?;
        let replaced = self.registry.remove_upload(&source.name);
        if !replaced.is_empty() {
            info!("Replacing {} table(s) of {}", replaced.len(), source.name);
        }
        for table in &mut report.tables {
            let origin = TableOrigin {
                upload: source.name.clone(),
                member: table.member.clone(),
                sheet: table.sheet.clone(),
            };
            table.name = self.registry.register(&table.name, table.frame.clone(), origin);
        }
        Ok(report)
    }

    /// Registered table names, sorted.
    pub fn tables(&self) -> Vec<String> {
        self.registry.names()
    }

    /// First configured rows of a table, numbered from 1.
    pub fn preview(&self, name: &str) -> Result<DataFrame> {
        self.registry.preview(name, self.config.preview_rows)
    }

    /// Run a query; the result replaces any previous result and its edits.
    pub fn run_query(&mut self, sql: &str) -> Result<&DataFrame> {
        self.editor = None;
        let frame = QueryEngine::run(&self.registry, sql)?;
        let editor = self.editor.insert(ResultEditor::new(frame));
        Ok(editor.original())
    }

    pub fn editor(&self) -> Option<&ResultEditor> {
        self.editor.as_ref()
    }

    pub fn editor_mut(&mut self) -> Option<&mut ResultEditor> {
        self.editor.as_mut()
    }

    /// Serialize the current result (edited copy first) to bytes.
    pub fn export(&self, format: ExportFormat, options: &ExportOptions) -> Result<Vec<u8>> {
        let editor = self.editor.as_ref().ok_or_else(|| {
            DataQueryError::ExportUnavailable {
                format: format.to_string(),
                reason: "no query result to export".into(),
            }
            .report()
        })?;
        export::export(editor.export_frame(), format, options)
    }

    /// Drop every upload, the result and its edits.
    pub fn reset(&mut self) {
        self.registry.clear();
        self.editor = None;
        info!("Cleared all uploads");
    }
}
