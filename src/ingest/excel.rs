//! Spreadsheet (xlsx) loading: one frame per worksheet.

use calamine::{open_workbook_from_rs, Data, Reader, Xlsx};
use chrono::{Duration, NaiveDate};
use color_eyre::Result;
use polars::prelude::*;
use std::io::Cursor;
use tracing::debug;

use crate::core::naming::{positional_column_names, unique_column_names};
use crate::core::types::XlsxImportOptions;
use crate::error::DataQueryError;

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
enum CellColType {
    Unknown,
    Boolean,
    Int64,
    Float64,
    Datetime,
    Utf8,
}

fn open(name: &str, bytes: &[u8]) -> Result<Xlsx<Cursor<Vec<u8>>>> {
    open_workbook_from_rs(Cursor::new(bytes.to_vec())).map_err(|e| {
        DataQueryError::LoadFailed {
            name: name.to_string(),
            reason: format!("failed to open workbook: {e}"),
        }
        .report()
    })
}

/// List worksheet names in workbook order.
pub fn sheet_names(name: &str, bytes: &[u8]) -> Result<Vec<String>> {
    Ok(open(name, bytes)?.sheet_names())
}

/// Read every worksheet of a workbook, honouring per-sheet header options.
pub fn read_workbook(
    name: &str,
    bytes: &[u8],
    options: &XlsxImportOptions,
) -> Result<Vec<(String, DataFrame)>> {
    let mut workbook = open(name, bytes)?;
    let mut out = Vec::new();
    for sheet in workbook.sheet_names() {
        let range = workbook.worksheet_range(&sheet).map_err(|e| {
            DataQueryError::LoadFailed {
                name: name.to_string(),
                reason: format!("failed to read worksheet '{sheet}': {e}"),
            }
            .report()
        })?;
        let rows: Vec<Vec<Data>> = range.rows().map(|r| r.to_vec()).collect();
        let has_header = options.sheet(&sheet).has_header;
        debug!("Worksheet '{}' of {}: {} rows, header={}", sheet, name, rows.len(), has_header);
        let df = rows_to_frame(rows, has_header).map_err(|e| {
            DataQueryError::LoadFailed {
                name: name.to_string(),
                reason: format!("failed to build table from worksheet '{sheet}': {e}"),
            }
            .report()
        })?;
        out.push((sheet, df));
    }
    Ok(out)
}

fn rows_to_frame(mut rows: Vec<Vec<Data>>, has_header: bool) -> PolarsResult<DataFrame> {
    let width = rows.iter().map(|r| r.len()).max().unwrap_or(0);
    if width == 0 {
        return Ok(DataFrame::empty());
    }
    for row in &mut rows {
        if row.len() < width {
            row.resize(width, Data::Empty);
        }
    }
    let names = if has_header {
        let header = rows.remove(0);
        unique_column_names(header.iter().map(cell_to_string))
    } else {
        positional_column_names(width)
    };

    let mut columns: Vec<Column> = Vec::with_capacity(width);
    for (idx, col_name) in names.iter().enumerate() {
        let cells: Vec<&Data> = rows.iter().map(|r| &r[idx]).collect();
        columns.push(cells_to_series(col_name, &cells)?.into());
    }
    DataFrame::new(columns)
}

fn infer_type(cells: &[&Data]) -> CellColType {
    let mut col_type = CellColType::Unknown;
    for cell in cells {
        let cell_type = match cell {
            Data::Empty => continue,
            Data::Bool(_) => CellColType::Boolean,
            Data::Int(_) => CellColType::Int64,
            Data::Float(f) if f.fract() == 0.0 && f.abs() < i64::MAX as f64 => CellColType::Int64,
            Data::Float(_) => CellColType::Float64,
            Data::DateTime(_) => CellColType::Datetime,
            _ => CellColType::Utf8,
        };
        col_type = match (col_type, cell_type) {
            (CellColType::Unknown, t) => t,
            (a, b) if a == b => a,
            (CellColType::Int64, CellColType::Float64) | (CellColType::Float64, CellColType::Int64) => {
                CellColType::Float64
            }
            _ => return CellColType::Utf8,
        };
    }
    col_type
}

fn cells_to_series(name: &str, cells: &[&Data]) -> PolarsResult<Series> {
    let col_name: PlSmallStr = name.into();
    let series = match infer_type(cells) {
        CellColType::Boolean => {
            let data: Vec<Option<bool>> = cells
                .iter()
                .map(|c| match c {
                    Data::Bool(b) => Some(*b),
                    _ => None,
                })
                .collect();
            Series::new(col_name, data)
        }
        CellColType::Int64 => {
            let data: Vec<Option<i64>> = cells
                .iter()
                .map(|c| match c {
                    Data::Int(i) => Some(*i),
                    Data::Float(f) => Some(*f as i64),
                    _ => None,
                })
                .collect();
            Series::new(col_name, data)
        }
        CellColType::Float64 => {
            let data: Vec<Option<f64>> = cells
                .iter()
                .map(|c| match c {
                    Data::Int(i) => Some(*i as f64),
                    Data::Float(f) => Some(*f),
                    _ => None,
                })
                .collect();
            Series::new(col_name, data)
        }
        CellColType::Datetime => {
            let data: Vec<Option<i64>> = cells
                .iter()
                .map(|c| match c {
                    Data::DateTime(d) => excel_serial_to_millis(d.as_f64()),
                    _ => None,
                })
                .collect();
            Series::new(col_name, data).cast(&DataType::Datetime(TimeUnit::Milliseconds, None))?
        }
        CellColType::Unknown | CellColType::Utf8 => {
            let data: Vec<Option<String>> = cells
                .iter()
                .map(|c| match c {
                    Data::Empty => None,
                    other => Some(cell_to_string(other)),
                })
                .collect();
            Series::new(col_name, data)
        }
    };
    Ok(series)
}

fn cell_to_string(cell: &Data) -> String {
    match cell {
        Data::Empty => String::new(),
        Data::String(s) => s.clone(),
        Data::Int(i) => i.to_string(),
        Data::Float(f) => f.to_string(),
        Data::Bool(b) => b.to_string(),
        Data::DateTime(d) => excel_serial_to_millis(d.as_f64())
            .and_then(chrono::DateTime::from_timestamp_millis)
            .map(|dt| dt.naive_utc().to_string())
            .unwrap_or_else(|| d.as_f64().to_string()),
        Data::DateTimeIso(s) => s.clone(),
        Data::DurationIso(s) => s.clone(),
        Data::Error(e) => format!("ERROR: {e:?}"),
    }
}

/// Excel stores datetimes as fractional days since 1899-12-30.
/// Serials outside chrono's range give `None`.
fn excel_serial_to_millis(serial: f64) -> Option<i64> {
    if !serial.is_finite() {
        return None;
    }
    let epoch = NaiveDate::from_ymd_opt(1899, 12, 30)?.and_hms_opt(0, 0, 0)?;
    let millis = (serial * 86_400_000.0).round() as i64;
    let dt = epoch.checked_add_signed(Duration::try_milliseconds(millis)?)?;
    Some(dt.and_utc().timestamp_millis())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use rust_xlsxwriter::Workbook;

    fn workbook_bytes() -> Vec<u8> {
        let mut wb = Workbook::new();
        let ws = wb.add_worksheet();
        ws.set_name("People").unwrap();
        ws.write_string(0, 0, "id").unwrap();
        ws.write_string(0, 1, "name").unwrap();
        ws.write_number(1, 0, 1.0).unwrap();
        ws.write_string(1, 1, "Alice").unwrap();
        ws.write_number(2, 0, 2.0).unwrap();
        ws.write_string(2, 1, "Bob").unwrap();
        let ws2 = wb.add_worksheet();
        ws2.set_name("Raw").unwrap();
        ws2.write_number(0, 0, 1.5).unwrap();
        ws2.write_boolean(0, 1, true).unwrap();
        ws2.write_number(1, 0, 2.0).unwrap();
        ws2.write_boolean(1, 1, false).unwrap();
        wb.save_to_buffer().unwrap()
    }

    #[test]
    fn test_sheet_names_in_order() {
        let bytes = workbook_bytes();
        assert_eq!(sheet_names("b.xlsx", &bytes).unwrap(), vec!["People", "Raw"]);
    }

    #[test]
    fn test_read_workbook_with_per_sheet_headers() {
        let bytes = workbook_bytes();
        let mut opts = XlsxImportOptions::default();
        opts.sheets.insert("Raw".into(), crate::core::types::SheetOptions { has_header: false });
        let sheets = read_workbook("b.xlsx", &bytes, &opts).unwrap();
        assert_eq!(sheets.len(), 2);

        let (name, people) = &sheets[0];
        assert_eq!(name, "People");
        assert_eq!(people.shape(), (2, 2));
        assert_eq!(people.column("id").unwrap().dtype(), &DataType::Int64);

        let (_, raw) = &sheets[1];
        assert_eq!(raw.shape(), (2, 2));
        assert_eq!(raw.column("col_1").unwrap().dtype(), &DataType::Float64);
        assert_eq!(raw.column("col_2").unwrap().dtype(), &DataType::Boolean);
    }

    #[test]
    fn test_garbage_is_load_error() {
        let err = read_workbook("x.xlsx", b"not a zip", &XlsxImportOptions::default()).unwrap_err();
        assert!(matches!(
            crate::error::classify(&err),
            Some(DataQueryError::LoadFailed { .. })
        ));
    }

    #[test]
    fn test_excel_serial_conversion() {
        // 2024-01-01 00:00:00 UTC
        assert_eq!(excel_serial_to_millis(45292.0), Some(1_704_067_200_000));
        assert_eq!(excel_serial_to_millis(-1e20), None);
        assert_eq!(excel_serial_to_millis(1e20), None);
        assert_eq!(excel_serial_to_millis(f64::NAN), None);
    }

    #[test]
    fn test_out_of_range_date_cell_becomes_null() {
        let date = rust_xlsxwriter::Format::new().set_num_format("yyyy-mm-dd");
        let mut wb = Workbook::new();
        let ws = wb.add_worksheet();
        ws.write_string(0, 0, "d").unwrap();
        ws.write_number_with_format(1, 0, -1e20, &date).unwrap();
        ws.write_number_with_format(2, 0, 45292.0, &date).unwrap();
        let bytes = wb.save_to_buffer().unwrap();

        let sheets = read_workbook("dates.xlsx", &bytes, &XlsxImportOptions::default()).unwrap();
        let (_, frame) = &sheets[0];
        let column = frame.column("d").unwrap();
        assert_eq!(column.len(), 2);
        assert_eq!(column.null_count(), 1);
    }
}
