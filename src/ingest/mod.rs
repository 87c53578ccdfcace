//! File loading: format dispatch, option plumbing and archive/sheet expansion.
//!
//! `load_source` turns one uploaded file into zero or more named tables. Plain
//! files yield one table, workbooks one per sheet, and zip archives expand each
//! supported member as if it had been uploaded on its own.

pub mod archive;
pub mod binary;
pub mod excel;
pub mod infer;
pub mod json;
pub mod text;
pub mod xml;

use color_eyre::Result;
use polars::prelude::DataFrame;
use rayon::prelude::*;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::core::naming::table_name_for;
use crate::core::types::{FileFormat, ImportSettings};
use crate::error::DataQueryError;

/// An uploaded file held fully in memory.
#[derive(Debug, Clone)]
pub struct SourceFile {
    pub name: String,
    pub bytes: Arc<[u8]>,
    /// Format to use instead of the one implied by the extension
    pub format: Option<FileFormat>,
}

impl SourceFile {
    pub fn new(name: impl Into<String>, bytes: impl Into<Arc<[u8]>>) -> Self {
        Self {
            name: name.into(),
            bytes: bytes.into(),
            format: None,
        }
    }

    pub fn with_format(mut self, format: FileFormat) -> Self {
        self.format = Some(format);
        self
    }

    /// Read a file from disk, keeping only its file name.
    pub fn from_path(path: &Path) -> Result<Self> {
        let bytes = std::fs::read(path)?;
        let name = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("unnamed")
            .to_string();
        Ok(Self::new(name, bytes))
    }

    pub fn format(&self) -> Option<FileFormat> {
        self.format.or_else(|| FileFormat::from_file_name(&self.name))
    }
}

/// One table produced by a load.
#[derive(Debug, Clone)]
pub struct LoadedTable {
    /// Proposed registry name (before collision handling)
    pub name: String,
    pub frame: DataFrame,
    pub format: FileFormat,
    /// Member file name when the table came out of an archive
    pub member: Option<String>,
    /// Worksheet name for spreadsheet tables
    pub sheet: Option<String>,
}

/// Everything a single upload produced.
#[derive(Debug, Clone, Default)]
pub struct LoadReport {
    pub upload: String,
    pub tables: Vec<LoadedTable>,
    pub warnings: Vec<String>,
    /// Archive members skipped because of their format
    pub excluded: Vec<String>,
    /// Archive members that failed to load
    pub failures: Vec<String>,
}

impl LoadReport {
    pub fn table_names(&self) -> Vec<&str> {
        self.tables.iter().map(|t| t.name.as_str()).collect()
    }

    /// One "Loaded ... as table(s): ..." line per file (or archive member).
    pub fn loaded_messages(&self) -> Vec<String> {
        let mut groups: Vec<(Option<&str>, Vec<&str>)> = Vec::new();
        for table in &self.tables {
            let member = table.member.as_deref();
            match groups.last_mut() {
                Some((last, names)) if *last == member => names.push(table.name.as_str()),
                _ => groups.push((member, vec![table.name.as_str()])),
            }
        }
        groups
            .into_iter()
            .map(|(member, names)| match member {
                Some(m) => format!("Loaded {} - {} as table(s): {}", self.upload, m, names.join(", ")),
                None => format!("Loaded {} as table(s): {}", self.upload, names.join(", ")),
            })
            .collect()
    }

    /// Excluded members, failures and coercion warnings, in that order.
    pub fn warning_messages(&self) -> Vec<String> {
        self.excluded
            .iter()
            .chain(&self.failures)
            .chain(&self.warnings)
            .cloned()
            .collect()
    }
}

/// What options a source accepts, discovered before loading it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceDescriptor {
    pub name: String,
    pub format: FileFormat,
    /// Worksheet names, for spreadsheets
    pub sheets: Vec<String>,
    /// Loadable members, for archives
    pub members: Vec<SourceDescriptor>,
    /// Skipped member paths, for archives
    pub excluded: Vec<String>,
}

impl SourceDescriptor {
    /// Whether the user can tune parsing for this file (delimited text or sheets).
    pub fn has_options(&self) -> bool {
        self.format.is_delimited() || self.format == FileFormat::Xlsx
    }
}

fn detect_format(source: &SourceFile) -> Result<FileFormat> {
    source.format().ok_or_else(|| {
        DataQueryError::UnsupportedFormat {
            name: source.name.clone(),
        }
        .report()
    })
}

/// Inspect a source without loading its data.
pub fn describe(source: &SourceFile) -> Result<SourceDescriptor> {
    let format = detect_format(source)?;
    let mut descriptor = SourceDescriptor {
        name: source.name.clone(),
        format,
        sheets: Vec::new(),
        members: Vec::new(),
        excluded: Vec::new(),
    };
    match format {
        FileFormat::Xlsx => descriptor.sheets = excel::sheet_names(&source.name, &source.bytes)?,
        FileFormat::Zip => {
            let contents = archive::read_members(&source.name, &source.bytes)?;
            for member in &contents.members {
                descriptor.members.push(describe(member)?);
            }
            descriptor.excluded = contents.excluded.into_iter().map(|(p, _)| p).collect();
        }
        _ => {}
    }
    Ok(descriptor)
}

/// Load an uploaded file into tables.
///
/// A plain file that cannot be read is an error. Inside an archive a failing
/// member is recorded in the report and the remaining members still load.
pub fn load_source(source: &SourceFile, settings: &ImportSettings) -> Result<LoadReport> {
    let format = detect_format(source)?;
    let mut report = LoadReport {
        upload: source.name.clone(),
        ..Default::default()
    };

    if format.is_archive() {
        let contents = archive::read_members(&source.name, &source.bytes)?;
        for (path, reason) in contents.excluded {
            report.excluded.push(format!("{} - {} not loaded. {}", source.name, path, reason));
        }
        let results: Vec<(String, Result<(Vec<LoadedTable>, Option<String>)>)> = contents
            .members
            .par_iter()
            .map(|member| {
                (
                    member.name.clone(),
                    load_file(member, settings, Some(&source.name)),
                )
            })
            .collect();
        for (member_name, result) in results {
            match result {
                Ok((tables, warning)) => {
                    report.tables.extend(tables);
                    report.warnings.extend(warning);
                }
                Err(e) => {
                    warn!("Member {} of {} failed to load: {}", member_name, source.name, e);
                    report.failures.push(format!("{} - {}", source.name, e));
                }
            }
        }
    } else {
        let (tables, warning) = load_file(source, settings, None)?;
        report.tables = tables;
        report.warnings.extend(warning);
    }

    info!(
        "Loaded {} as {} table(s): {}",
        source.name,
        report.tables.len(),
        report.table_names().join(", ")
    );
    Ok(report)
}

/// Load one non-archive file. `archive` names the enclosing upload, if any.
fn load_file(
    source: &SourceFile,
    settings: &ImportSettings,
    archive: Option<&str>,
) -> Result<(Vec<LoadedTable>, Option<String>)> {
    let format = detect_format(source)?;
    let name = source.name.as_str();
    let member = archive.map(|_| name.to_string());
    debug!("Dispatching {} as {}", name, format);

    let single = |frame: DataFrame| LoadedTable {
        name: table_name_for(name, archive, None),
        frame,
        format,
        member: member.clone(),
        sheet: None,
    };

    let mut warning = None;
    let tables = match format {
        FileFormat::Csv | FileFormat::Txt => {
            let opts = settings.text_for(name);
            let (df, w) = text::read_delimited(name, &source.bytes, &opts, settings.infer_schema_length)?;
            warning = w;
            vec![single(df)]
        }
        FileFormat::Xlsx => {
            let opts = settings.excel_for(name);
            excel::read_workbook(name, &source.bytes, &opts)?
                .into_iter()
                .map(|(sheet, frame)| LoadedTable {
                    name: table_name_for(name, archive, Some(&sheet)),
                    frame,
                    format,
                    member: member.clone(),
                    sheet: Some(sheet),
                })
                .collect()
        }
        FileFormat::Parquet => vec![single(binary::read_parquet(name, &source.bytes)?)],
        FileFormat::Avro => vec![single(binary::read_avro(name, &source.bytes)?)],
        FileFormat::Json => {
            let opts = settings.json_for(name);
            vec![single(json::read_json(name, &source.bytes, &opts)?)]
        }
        FileFormat::Xml => vec![single(xml::read_xml(name, &source.bytes)?)],
        FileFormat::Zip => {
            return Err(DataQueryError::UnsupportedFormat { name: name.to_string() }.report());
        }
    };
    Ok((tables, warning))
}

#[cfg(test)]
mod tests {
    use super::archive::test_support::zip_bytes;
    use super::*;
    use crate::core::types::{CsvImportOptions, ImportOptions, SheetOptions, XlsxImportOptions};
    use pretty_assertions::assert_eq;
    use rust_xlsxwriter::Workbook;

    fn xlsx_bytes() -> Vec<u8> {
        let mut wb = Workbook::new();
        let ws = wb.add_worksheet();
        ws.set_name("Jan").unwrap();
        ws.write_string(0, 0, "v").unwrap();
        ws.write_number(1, 0, 1.0).unwrap();
        let ws = wb.add_worksheet();
        ws.set_name("Feb").unwrap();
        ws.write_number(0, 0, 7.0).unwrap();
        wb.save_to_buffer().unwrap()
    }

    #[test]
    fn test_unsupported_extension() {
        let src = SourceFile::new("notes.pdf", b"%PDF".to_vec());
        let err = load_source(&src, &ImportSettings::default()).unwrap_err();
        assert!(matches!(
            crate::error::classify(&err),
            Some(DataQueryError::UnsupportedFormat { .. })
        ));
    }

    #[test]
    fn test_forced_format() {
        let src = SourceFile::new("data.tsv", b"a\tb\n1\t2\n".to_vec()).with_format(FileFormat::Txt);
        let mut settings = ImportSettings::default();
        settings.text_defaults.delimiter = '\t';
        let report = load_source(&src, &settings).unwrap();
        assert_eq!(report.table_names(), vec!["data_tsv"]);
        assert_eq!(report.tables[0].frame.shape(), (1, 2));
    }

    #[test]
    fn test_single_csv_table_name() {
        let src = SourceFile::new("My Data.csv", b"a,b\n1,2\n".to_vec());
        let report = load_source(&src, &ImportSettings::default()).unwrap();
        assert_eq!(report.table_names(), vec!["mydata_csv"]);
        assert_eq!(report.tables[0].frame.shape(), (1, 2));
    }

    #[test]
    fn test_workbook_yields_table_per_sheet() {
        let mut xlsx = XlsxImportOptions::default();
        xlsx.sheets.insert("Feb".into(), SheetOptions { has_header: false });
        let settings = ImportSettings::default().with("book.xlsx", ImportOptions::Excel(xlsx));
        let src = SourceFile::new("book.xlsx", xlsx_bytes());
        let report = load_source(&src, &settings).unwrap();
        assert_eq!(report.table_names(), vec!["book_xlsx_jan", "book_xlsx_feb"]);
        assert_eq!(report.tables[1].sheet.as_deref(), Some("Feb"));
        assert_eq!(report.tables[1].frame.shape(), (1, 1));
    }

    #[test]
    fn test_archive_expands_members() {
        let xlsx = xlsx_bytes();
        let bytes = zip_bytes(&[
            ("in/a.txt", b"1|2\n3|4\n"),
            ("book.xlsx", &xlsx),
            ("readme.md", b"hi"),
            ("bad.json", b"{"),
        ]);
        let opts = CsvImportOptions { has_header: false, delimiter: '|', ..Default::default() };
        let settings = ImportSettings::default().with("a.txt", ImportOptions::Text(opts));
        let report = load_source(&SourceFile::new("pack.v1.zip", bytes), &settings).unwrap();

        assert_eq!(
            report.table_names(),
            vec!["pack_v1_zip_a_txt", "pack_v1_zip_book_xlsx_jan", "pack_v1_zip_book_xlsx_feb"]
        );
        assert_eq!(report.tables[0].member.as_deref(), Some("a.txt"));
        assert_eq!(report.tables[0].frame.shape(), (2, 2));
        assert_eq!(report.excluded.len(), 1);
        assert!(report.excluded[0].contains("readme.md"));
        assert_eq!(report.failures.len(), 1);
        assert!(report.failures[0].contains("bad.json"));
    }

    #[test]
    fn test_describe_reports_sheets_and_members() {
        let xlsx = xlsx_bytes();
        let d = describe(&SourceFile::new("book.xlsx", xlsx.clone())).unwrap();
        assert_eq!(d.sheets, vec!["Jan", "Feb"]);
        assert!(d.has_options());

        let bytes = zip_bytes(&[("x/book.xlsx", &xlsx), ("y.parquet", b""), ("z.exe", b"")]);
        let d = describe(&SourceFile::new("b.zip", bytes)).unwrap();
        assert_eq!(d.members.len(), 2);
        assert_eq!(d.members[0].sheets, vec!["Jan", "Feb"]);
        assert!(!d.members[1].has_options());
        assert_eq!(d.excluded, vec!["z.exe"]);
    }
}
