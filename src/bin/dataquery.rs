use clap::{Parser, Subcommand, ValueEnum};
use color_eyre::Result;
use dataquery::config::Config;
use dataquery::core::types::{FileFormat, ImportSettings, QuoteStyle, SheetOptions, parse_delimiter};
use dataquery::export::{self, ExportFormat};
use dataquery::ingest::{SourceDescriptor, SourceFile};
use dataquery::{DataQueryError, DataService};
use glob::glob;
use std::collections::HashMap;
use std::io::Read;
use std::path::PathBuf;
use tracing::{debug, error, info};

/// Query csv, txt, xlsx, json, parquet, avro, xml and zip files with SQL
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Enable file logging at the given level (overrides RUST_LOG)
    #[arg(long = "logging", value_enum, global = true)]
    logging: Option<LogLevel>,
    /// Path to a config file (overrides default config discovery)
    #[arg(long = "config", value_name = "PATH", global = true)]
    config: Option<PathBuf>,
    /// Load files before running the command. Repeat per file. Syntax: kind:path;key=value;...
    /// Examples: --load 'csv:data/a.csv;delim=semicolon;header=false'
    ///           --load 'xlsx:book.xlsx;no_header_sheets=Raw,Notes'
    ///           --load 'json:-;records=items' (reads stdin)
    ///           --load 'auto:exports/*.zip'
    #[arg(long = "load", value_name = "SPEC", global = true)]
    load: Vec<String>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List loaded tables
    Tables,
    /// Show the sheets or members of a file without loading it
    Describe { path: PathBuf },
    /// Show the first rows of a table
    Preview {
        table: String,
        #[arg(long)]
        rows: Option<usize>,
    },
    /// Run a SQL query, optionally edit the result, and print or export it
    Query {
        sql: String,
        /// Set a cell before export: row:column=value (rows start at 1)
        #[arg(long = "set", value_name = "ROW:COL=VALUE")]
        set: Vec<String>,
        /// Append empty rows
        #[arg(long = "append-rows", default_value_t = 0)]
        append_rows: usize,
        /// Delete a row (rows start at 1)
        #[arg(long = "delete-row", value_name = "ROW")]
        delete_row: Vec<usize>,
        /// Write the result to a file instead of printing it
        #[arg(long)]
        output: Option<PathBuf>,
        /// Export format (defaults to the output extension, then the configured format)
        #[arg(long)]
        format: Option<String>,
        /// Write a header row: y or n
        #[arg(long)]
        header: Option<String>,
        #[arg(long)]
        delimiter: Option<String>,
        /// QUOTE_ALL, QUOTE_MINIMAL, QUOTE_NONNUMERIC or QUOTE_NONE
        #[arg(long)]
        quoting: Option<String>,
    },
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
enum LogLevel { Error, Warn, Info, Debug, Trace }

/// One `--load` entry after parsing and glob expansion.
#[derive(Debug, Clone)]
struct LoadRequest {
    path: PathBuf,
    format: Option<FileFormat>,
    settings: ImportSettings,
}

fn main() -> Result<()> {
    color_eyre::install()?;
    let args = Args::parse();
    let level = match args.logging {
        Some(LogLevel::Error) => Some(tracing::Level::ERROR),
        Some(LogLevel::Warn) => Some(tracing::Level::WARN),
        Some(LogLevel::Info) => Some(tracing::Level::INFO),
        Some(LogLevel::Debug) => Some(tracing::Level::DEBUG),
        Some(LogLevel::Trace) => Some(tracing::Level::TRACE),
        None => None,
    };
    dataquery::logging::init_with(None, level)?;

    let config = Config::from_path(args.config.as_ref())?;
    let mut service = DataService::new(config);

    for spec in &args.load {
        for request in parse_load_spec(spec, &service.import_settings())? {
            let source = read_source(&request)?;
            let report = service.upload(&source, &request.settings)?;
            for line in report.loaded_messages() {
                eprintln!("{line}");
            }
            for line in report.warning_messages() {
                eprintln!("warning: {line}");
            }
        }
    }

    match args.command {
        Command::Tables => {
            for (name, entry) in service.registry().tables() {
                let (rows, cols) = entry.frame.shape();
                let origin = match (&entry.origin.member, &entry.origin.sheet) {
                    (Some(m), Some(s)) => format!("{} - {} [{}]", entry.origin.upload, m, s),
                    (Some(m), None) => format!("{} - {}", entry.origin.upload, m),
                    (None, Some(s)) => format!("{} [{}]", entry.origin.upload, s),
                    (None, None) => entry.origin.upload.clone(),
                };
                println!("{name}\t{rows} rows x {cols} columns\t{origin}");
            }
        }
        Command::Describe { path } => {
            let source = SourceFile::from_path(&path)?;
            print_descriptor(&service.describe(&source)?, 0);
        }
        Command::Preview { table, rows } => {
            let frame = match rows {
                Some(n) => service.registry().preview(&table, n)?,
                None => service.preview(&table)?,
            };
            println!("{frame}");
        }
        Command::Query { sql, set, append_rows, delete_row, output, format, header, delimiter, quoting } => {
            service.run_query(&sql)?;
            let edits = !set.is_empty() || append_rows > 0 || !delete_row.is_empty();
            if edits {
                apply_edits(&mut service, &set, append_rows, &delete_row)?;
            }
            let Some(editor) = service.editor() else {
                return Ok(());
            };
            match output {
                None => println!("{}", editor.numbered()?),
                Some(path) => {
                    let defaults = service.config().export.clone();
                    let format = match format {
                        Some(f) => f.parse::<ExportFormat>().map_err(|_| invalid("format", &f))?,
                        None => path
                            .to_str()
                            .and_then(ExportFormat::from_file_name)
                            .unwrap_or(defaults.format),
                    };
                    let mut options = defaults.options;
                    if let Some(h) = header {
                        options.header = parse_bool(&h);
                    }
                    if let Some(d) = delimiter {
                        options.delimiter = parse_delimiter(&d)?;
                    }
                    if let Some(q) = quoting {
                        options.quoting = q.parse::<QuoteStyle>().map_err(|_| invalid("quoting", &q))?;
                    }
                    let bytes = service.export(format, &options)?;
                    std::fs::write(&path, &bytes)?;
                    info!("Wrote {} ({})", path.display(), export::mime_type(format));
                    eprintln!("Wrote {} bytes to {}", bytes.len(), path.display());
                }
            }
        }
    }
    Ok(())
}

fn invalid(option: &str, value: &str) -> color_eyre::Report {
    DataQueryError::InvalidOption {
        option: option.to_string(),
        reason: format!("'{value}' is not recognised"),
    }
    .report()
}

fn apply_edits(service: &mut DataService, set: &[String], append_rows: usize, delete_rows: &[usize]) -> Result<()> {
    let editor = service
        .editor_mut()
        .ok_or_else(|| color_eyre::eyre::eyre!("No query result to edit"))?;
    for _ in 0..append_rows {
        editor.append_row()?;
    }
    for assignment in set {
        let (row, column, value) = parse_assignment(assignment)?;
        editor.set_cell(row, &column, &value)?;
    }
    let mut rows: Vec<usize> = delete_rows.iter().map(|r| one_based(*r)).collect::<Result<_>>()?;
    rows.sort_unstable();
    rows.dedup();
    for row in rows.into_iter().rev() {
        editor.delete_row(row)?;
    }
    editor.commit();
    Ok(())
}

fn one_based(row: usize) -> Result<usize> {
    row.checked_sub(1)
        .ok_or_else(|| color_eyre::eyre::eyre!("Rows are numbered from 1"))
}

/// `row:column=value` with a 1-based row.
fn parse_assignment(raw: &str) -> Result<(usize, String, String)> {
    let (target, value) = raw
        .split_once('=')
        .ok_or_else(|| color_eyre::eyre::eyre!("Expected 'row:column=value', got '{}'", raw))?;
    let (row, column) = target
        .split_once(':')
        .ok_or_else(|| color_eyre::eyre::eyre!("Expected 'row:column=value', got '{}'", raw))?;
    let row: usize = row
        .trim()
        .parse()
        .map_err(|_| color_eyre::eyre::eyre!("Invalid row '{}'", row))?;
    Ok((one_based(row)?, column.trim().to_string(), value.to_string()))
}

fn print_descriptor(descriptor: &SourceDescriptor, depth: usize) {
    let indent = "  ".repeat(depth);
    println!("{indent}{} ({})", descriptor.name, descriptor.format);
    for sheet in &descriptor.sheets {
        println!("{indent}  sheet: {sheet}");
    }
    for member in &descriptor.members {
        print_descriptor(member, depth + 1);
    }
    for path in &descriptor.excluded {
        println!("{indent}  excluded: {path}");
    }
}

fn read_source(request: &LoadRequest) -> Result<SourceFile> {
    let source = if request.path.as_os_str() == "-" {
        let mut buf = Vec::new();
        std::io::stdin().read_to_end(&mut buf)?;
        let ext = request.format.map(|f| f.extension()).unwrap_or("csv");
        SourceFile::new(format!("stdin.{ext}"), buf)
    } else {
        SourceFile::from_path(&request.path)?
    };
    debug!("Read {} ({} bytes)", source.name, source.bytes.len());
    Ok(match request.format {
        Some(format) => source.with_format(format),
        None => source,
    })
}

/// Parse `kind:path;key=value;...` into one request per matched path.
fn parse_load_spec(spec: &str, defaults: &ImportSettings) -> Result<Vec<LoadRequest>> {
    let (kind, rest) = match spec.split_once(':') {
        Some((k, r)) if is_known_kind(&k.trim().to_ascii_lowercase()) => (k.trim().to_ascii_lowercase(), r),
        _ => ("auto".to_string(), spec),
    };

    let mut parts = rest.split(';');
    let mut path = parts.next().unwrap_or("").trim().to_string();
    let mut kv: HashMap<String, String> = HashMap::new();
    for seg in parts {
        if seg.trim().is_empty() {
            continue;
        }
        if let Some((k, v)) = seg.split_once('=') {
            kv.insert(k.trim().to_ascii_lowercase(), v.trim().to_string());
        } else {
            // bare flags like 'ndjson' => true
            kv.insert(seg.trim().to_ascii_lowercase(), "true".to_string());
        }
    }
    if path.eq_ignore_ascii_case("stdin") {
        path = "-".to_string();
    }

    let mut settings = defaults.clone();
    let format = match kind.as_str() {
        "auto" => None,
        "csv" => Some(FileFormat::Csv),
        "tsv" => {
            settings.text_defaults.delimiter = '\t';
            Some(FileFormat::Txt)
        }
        "txt" | "text" => Some(FileFormat::Txt),
        "xlsx" => Some(FileFormat::Xlsx),
        "json" => Some(FileFormat::Json),
        "jsonl" | "ndjson" => {
            settings.json_defaults.ndjson = true;
            Some(FileFormat::Json)
        }
        "parquet" => Some(FileFormat::Parquet),
        "avro" => Some(FileFormat::Avro),
        "xml" => Some(FileFormat::Xml),
        "zip" => Some(FileFormat::Zip),
        other => return Err(color_eyre::eyre::eyre!("Unknown load kind '{}'", other)),
    };

    if let Some(v) = kv.get("delim").or_else(|| kv.get("delimiter")) {
        settings.text_defaults.delimiter = parse_delimiter(v)?;
    }
    if let Some(v) = kv.get("header").or_else(|| kv.get("has_header")) {
        settings.text_defaults.has_header = parse_bool(v);
    }
    if let Some(v) = kv.get("quote").or_else(|| kv.get("quote_char")) {
        match parse_char_opt(v) {
            Some(c) => settings.text_defaults.quote_char = c,
            None => settings.text_defaults.quoting = QuoteStyle::None,
        }
    }
    if let Some(v) = kv.get("quoting") {
        settings.text_defaults.quoting = v.parse::<QuoteStyle>().map_err(|_| invalid("quoting", v))?;
    }
    if let Some(v) = kv.get("encoding") {
        settings.text_defaults.encoding = v.clone();
    }
    if let Some(v) = kv.get("no_header_sheets") {
        for sheet in v.split(',').map(str::trim).filter(|s| !s.is_empty()) {
            settings
                .excel_defaults
                .sheets
                .insert(sheet.to_string(), SheetOptions { has_header: false });
        }
    }
    if let Some(v) = kv.get("records") {
        settings.json_defaults.records_expr = v.clone();
    }
    if let Some(v) = kv.get("ndjson") {
        settings.json_defaults.ndjson = parse_bool(v);
    }

    let paths = if path == "-" { vec![PathBuf::from("-")] } else { expand_glob_paths(&path)? };
    Ok(paths
        .into_iter()
        .map(|path| LoadRequest { path, format, settings: settings.clone() })
        .collect())
}

fn is_known_kind(kind: &str) -> bool {
    matches!(
        kind,
        "auto" | "csv" | "tsv" | "txt" | "text" | "xlsx" | "json" | "jsonl" | "ndjson" | "parquet" | "avro"
            | "xml" | "zip"
    )
}

fn parse_bool(v: &str) -> bool {
    matches!(v.to_ascii_lowercase().as_str(), "1" | "true" | "yes" | "y" | "on")
}

fn parse_char_opt(v: &str) -> Option<char> {
    if v.eq_ignore_ascii_case("none") || v.is_empty() {
        return None;
    }
    if let Some(rest) = v.strip_prefix("char:") {
        return rest.chars().next();
    }
    let unquoted = v.trim_matches('\'').trim_matches('"');
    unquoted.chars().next().or_else(|| v.chars().next())
}

// Expand a potential glob into concrete paths. If no wildcard is present or expansion
// yields no matches, fall back to the original path as a single entry.
fn expand_glob_paths(input: &str) -> Result<Vec<PathBuf>> {
    let has_wildcards = input.contains('*') || input.contains('?') || input.contains('[');
    if !has_wildcards {
        return Ok(vec![PathBuf::from(input)]);
    }
    let mut out = Vec::new();
    for entry in glob(input).map_err(|e| color_eyre::eyre::eyre!("Invalid glob pattern '{}': {}", input, e))? {
        match entry {
            Ok(p) => out.push(p),
            Err(e) => error!("Glob error on '{}': {}", input, e),
        }
    }
    if out.is_empty() {
        Ok(vec![PathBuf::from(input)])
    } else {
        out.sort();
        Ok(out)
    }
}
