use color_eyre::Result;
use polars::prelude::*;
use rust_xlsxwriter::Workbook;

use super::{ExportFormat, unavailable};

const MAX_ROWS: usize = 1_048_576;
const MAX_COLS: usize = 16_384;

/// Single worksheet `Sheet1`; numbers and booleans are written natively.
pub(super) fn write_workbook(df: &DataFrame, header: bool) -> Result<Vec<u8>> {
    let fail = |e: &dyn std::fmt::Display| unavailable(ExportFormat::Xlsx, e);
    let header_rows = usize::from(header);
    if df.height() + header_rows > MAX_ROWS || df.width() > MAX_COLS {
        return Err(fail(&format!(
            "{} rows x {} columns exceeds the worksheet limits",
            df.height(),
            df.width()
        )));
    }

    let mut workbook = Workbook::new();
    let sheet = workbook.add_worksheet();
    sheet.set_name("Sheet1").map_err(|e| fail(&e))?;

    for (c, column) in df.get_columns().iter().enumerate() {
        let col = c as u16;
        if header {
            sheet.write_string(0, col, column.name().as_str()).map_err(|e| fail(&e))?;
        }
        let numeric = column.dtype().is_integer() || column.dtype().is_float();
        let series = column.as_materialized_series();
        for idx in 0..series.len() {
            let row = (idx + header_rows) as u32;
            let value = series.get(idx)?;
            match value {
                AnyValue::Null => {}
                AnyValue::Boolean(b) => {
                    sheet.write_boolean(row, col, b).map_err(|e| fail(&e))?;
                }
                v if numeric => {
                    if let Some(n) = v.extract::<f64>() {
                        sheet.write_number(row, col, n).map_err(|e| fail(&e))?;
                    }
                }
                v => {
                    sheet.write_string(row, col, v.str_value().as_ref()).map_err(|e| fail(&e))?;
                }
            }
        }
    }

    workbook.save_to_buffer().map_err(|e| fail(&e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::{SheetOptions, XlsxImportOptions};
    use crate::ingest::excel::read_workbook;
    use pretty_assertions::assert_eq;

    fn sample() -> DataFrame {
        polars::df![
            "id" => [1i64, 2, 3],
            "name" => [Some("a"), None, Some("c")],
            "ok" => [true, false, true],
        ]
        .unwrap()
    }

    #[test]
    fn test_workbook_reads_back() {
        let bytes = write_workbook(&sample(), true).unwrap();
        let sheets = read_workbook("q.xlsx", &bytes, &XlsxImportOptions::default()).unwrap();
        assert_eq!(sheets.len(), 1);
        let (name, df) = &sheets[0];
        assert_eq!(name, "Sheet1");
        assert_eq!(df.shape(), (3, 3));
        assert_eq!(df.column("id").unwrap().dtype(), &DataType::Int64);
        assert_eq!(df.column("ok").unwrap().dtype(), &DataType::Boolean);
    }

    #[test]
    fn test_workbook_without_header() {
        let bytes = write_workbook(&sample(), false).unwrap();
        let mut opts = XlsxImportOptions::default();
        opts.sheets.insert("Sheet1".into(), SheetOptions { has_header: false });
        let sheets = read_workbook("q.xlsx", &bytes, &opts).unwrap();
        assert_eq!(sheets[0].1.height(), 3);
    }
}
