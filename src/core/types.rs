use color_eyre::Result;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::str::FromStr;
use strum::{AsRefStr, EnumIter, EnumString};

use crate::error::DataQueryError;

/// File formats understood by the loader. `Zip` is a container only.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, EnumString, EnumIter, AsRefStr,
)]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
#[serde(rename_all = "lowercase")]
pub enum FileFormat {
    Avro,
    Csv,
    Json,
    Parquet,
    Txt,
    Xlsx,
    Xml,
    Zip,
}

impl FileFormat {
    /// Detect the format from the extension of a file name.
    pub fn from_file_name(name: &str) -> Option<Self> {
        let (_, ext) = name.rsplit_once('.')?;
        Self::from_str(ext).ok()
    }

    pub fn extension(&self) -> &'static str {
        match self {
            Self::Avro => "avro",
            Self::Csv => "csv",
            Self::Json => "json",
            Self::Parquet => "parquet",
            Self::Txt => "txt",
            Self::Xlsx => "xlsx",
            Self::Xml => "xml",
            Self::Zip => "zip",
        }
    }

    /// Delimited text formats that take `CsvImportOptions`.
    pub fn is_delimited(&self) -> bool {
        matches!(self, Self::Csv | Self::Txt)
    }

    /// Formats whose files can be expanded into members.
    pub fn is_archive(&self) -> bool {
        matches!(self, Self::Zip)
    }
}

impl fmt::Display for FileFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

/// Quoting behaviour for delimited text, named after the classic csv module constants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, EnumIter)]
#[serde(try_from = "String", into = "String")]
pub enum QuoteStyle {
    All,
    #[default]
    Minimal,
    NonNumeric,
    None,
}

impl QuoteStyle {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::All => "QUOTE_ALL",
            Self::Minimal => "QUOTE_MINIMAL",
            Self::NonNumeric => "QUOTE_NONNUMERIC",
            Self::None => "QUOTE_NONE",
        }
    }
}

impl fmt::Display for QuoteStyle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for QuoteStyle {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lowered = s.trim().to_ascii_lowercase();
        let key = lowered.strip_prefix("quote_").unwrap_or(&lowered);
        match key {
            "all" => Ok(Self::All),
            "minimal" => Ok(Self::Minimal),
            "nonnumeric" | "non_numeric" => Ok(Self::NonNumeric),
            "none" => Ok(Self::None),
            _ => Err(format!("Unknown quoting style: {s}")),
        }
    }
}

impl TryFrom<String> for QuoteStyle {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::from_str(&value)
    }
}

impl From<QuoteStyle> for String {
    fn from(value: QuoteStyle) -> Self {
        value.as_str().to_string()
    }
}

/// Delimited text import options
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CsvImportOptions {
    pub has_header: bool,
    pub delimiter: char,
    pub quote_char: char,
    pub quoting: QuoteStyle,
    pub encoding: String,
}

impl Default for CsvImportOptions {
    fn default() -> Self {
        Self {
            has_header: true,
            delimiter: ',',
            quote_char: '"',
            quoting: QuoteStyle::Minimal,
            encoding: "utf-8".to_string(),
        }
    }
}

impl CsvImportOptions {
    /// Delimiter as the single byte the parser expects.
    pub fn delimiter_byte(&self) -> Result<u8> {
        ascii_byte("delimiter", self.delimiter)
    }

    /// Quote byte, or `None` when quoting is switched off.
    ///
    /// QUOTE_ALL and QUOTE_NONNUMERIC read like QUOTE_MINIMAL: quoted fields are
    /// unquoted and unquoted ones keep the inferred column type.
    pub fn quote_byte(&self) -> Result<Option<u8>> {
        if self.quoting == QuoteStyle::None {
            return Ok(None);
        }
        ascii_byte("quote_char", self.quote_char).map(Some)
    }
}

/// Per-sheet options for spreadsheets
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SheetOptions {
    pub has_header: bool,
}

impl Default for SheetOptions {
    fn default() -> Self {
        Self { has_header: true }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct XlsxImportOptions {
    pub sheets: BTreeMap<String, SheetOptions>,
}

impl XlsxImportOptions {
    pub fn sheet(&self, name: &str) -> SheetOptions {
        self.sheets.get(name).cloned().unwrap_or_default()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct JsonImportOptions {
    /// Treat the file as NDJSON (one JSON value per line)
    pub ndjson: bool,
    /// JMESPath expression that yields the records to load (default: "@")
    pub records_expr: String,
}

impl Default for JsonImportOptions {
    fn default() -> Self {
        Self { ndjson: false, records_expr: "@".to_string() }
    }
}

/// Options attached to a single file or archive member.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ImportOptions {
    Text(CsvImportOptions),
    Excel(XlsxImportOptions),
    Json(JsonImportOptions),
    /// parquet, avro and xml carry their own schema
    None,
}

/// Settings for one upload: defaults plus overrides keyed by file or member name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportSettings {
    pub text_defaults: CsvImportOptions,
    pub excel_defaults: XlsxImportOptions,
    pub json_defaults: JsonImportOptions,
    pub infer_schema_length: usize,
    overrides: HashMap<String, ImportOptions>,
}

impl Default for ImportSettings {
    fn default() -> Self {
        Self {
            text_defaults: CsvImportOptions::default(),
            excel_defaults: XlsxImportOptions::default(),
            json_defaults: JsonImportOptions::default(),
            infer_schema_length: 100_000,
            overrides: HashMap::new(),
        }
    }
}

impl ImportSettings {
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach options to a file name (or the base name of an archive member).
    pub fn with(mut self, file_name: impl Into<String>, options: ImportOptions) -> Self {
        self.set(file_name, options);
        self
    }

    pub fn set(&mut self, file_name: impl Into<String>, options: ImportOptions) {
        self.overrides.insert(file_name.into(), options);
    }

    pub fn text_for(&self, file_name: &str) -> CsvImportOptions {
        match self.overrides.get(file_name) {
            Some(ImportOptions::Text(opts)) => opts.clone(),
            _ => self.text_defaults.clone(),
        }
    }

    pub fn excel_for(&self, file_name: &str) -> XlsxImportOptions {
        match self.overrides.get(file_name) {
            Some(ImportOptions::Excel(opts)) => opts.clone(),
            _ => self.excel_defaults.clone(),
        }
    }

    pub fn json_for(&self, file_name: &str) -> JsonImportOptions {
        match self.overrides.get(file_name) {
            Some(ImportOptions::Json(opts)) => opts.clone(),
            _ => self.json_defaults.clone(),
        }
    }
}

/// Parse user-entered delimiter text. `\t`, `tab`, `comma`, `pipe`, `space` or a single char.
pub fn parse_delimiter(text: &str) -> Result<char> {
    let lowered = text.to_ascii_lowercase();
    let c = match lowered.as_str() {
        "\\t" | "\t" | "tab" => '\t',
        "comma" => ',',
        "pipe" | "|" => '|',
        "semicolon" => ';',
        "space" | " " => ' ',
        _ => {
            let mut chars = text.chars();
            match (chars.next(), chars.next()) {
                (Some(c), None) => c,
                _ => {
                    return Err(DataQueryError::InvalidOption {
                        option: "delimiter".into(),
                        reason: format!("'{text}' must be a single character"),
                    }
                    .report());
                }
            }
        }
    };
    ascii_byte("delimiter", c)?;
    Ok(c)
}

fn ascii_byte(option: &str, c: char) -> Result<u8> {
    if c.is_ascii() {
        Ok(c as u8)
    } else {
        Err(DataQueryError::InvalidOption {
            option: option.to_string(),
            reason: format!("'{c}' is not a single-byte character"),
        }
        .report())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_detection() {
        assert_eq!(FileFormat::from_file_name("sales.CSV"), Some(FileFormat::Csv));
        assert_eq!(FileFormat::from_file_name("a.b.parquet"), Some(FileFormat::Parquet));
        assert_eq!(FileFormat::from_file_name("bundle.zip"), Some(FileFormat::Zip));
        assert_eq!(FileFormat::from_file_name("notes.pdf"), None);
        assert_eq!(FileFormat::from_file_name("README"), None);
    }

    #[test]
    fn test_quote_style_parsing() {
        assert_eq!("QUOTE_ALL".parse::<QuoteStyle>().unwrap(), QuoteStyle::All);
        assert_eq!("nonnumeric".parse::<QuoteStyle>().unwrap(), QuoteStyle::NonNumeric);
        assert_eq!("Quote_None".parse::<QuoteStyle>().unwrap(), QuoteStyle::None);
        assert!("sometimes".parse::<QuoteStyle>().is_err());
    }

    #[test]
    fn test_delimiter_parsing() {
        assert_eq!(parse_delimiter("\\t").unwrap(), '\t');
        assert_eq!(parse_delimiter("tab").unwrap(), '\t');
        assert_eq!(parse_delimiter(";").unwrap(), ';');
        assert!(parse_delimiter(",,").is_err());
        assert!(parse_delimiter("é").is_err());
    }

    #[test]
    fn test_quote_none_disables_quote_byte() {
        let opts = CsvImportOptions { quoting: QuoteStyle::None, ..Default::default() };
        assert_eq!(opts.quote_byte().unwrap(), None);
        assert_eq!(CsvImportOptions::default().quote_byte().unwrap(), Some(b'"'));
    }

    #[test]
    fn test_settings_fall_back_to_defaults() {
        let custom = CsvImportOptions { has_header: false, delimiter: ';', ..Default::default() };
        let settings = ImportSettings::new().with("a.csv", ImportOptions::Text(custom.clone()));
        assert_eq!(settings.text_for("a.csv"), custom);
        assert_eq!(settings.text_for("b.csv"), CsvImportOptions::default());
        assert!(settings.excel_for("book.xlsx").sheet("Sheet1").has_header);

        let settings = settings.with("b.csv", ImportOptions::None);
        assert_eq!(settings.text_for("b.csv"), CsvImportOptions::default());
    }
}
