use chrono::{NaiveDate, NaiveDateTime};
use color_eyre::Result;
use polars::prelude::*;
use std::collections::HashSet;
use std::fmt;
use tracing::{debug, info};

use crate::error::DataQueryError;
use crate::registry::number_rows;

/// One key of a multi-column sort.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SortColumn {
    pub name: String,
    pub ascending: bool,
}

impl SortColumn {
    pub fn asc(name: impl Into<String>) -> Self {
        Self { name: name.into(), ascending: true }
    }

    pub fn desc(name: impl Into<String>) -> Self {
        Self { name: name.into(), ascending: false }
    }
}

impl fmt::Display for SortColumn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.name, if self.ascending { "ASC" } else { "DESC" })
    }
}

/// A query result together with an optional edited copy.
///
/// Edits always go to the copy; `commit` promotes it and `discard` throws it away.
#[derive(Debug, Clone)]
pub struct ResultEditor {
    original: DataFrame,
    edited: Option<DataFrame>,
    last_sort: Option<Vec<SortColumn>>,
}

impl ResultEditor {
    pub fn new(result: DataFrame) -> Self {
        Self {
            original: result,
            edited: None,
            last_sort: None,
        }
    }

    pub fn original(&self) -> &DataFrame {
        &self.original
    }

    pub fn edited(&self) -> Option<&DataFrame> {
        self.edited.as_ref()
    }

    /// Whether there are uncommitted edits.
    pub fn is_editing(&self) -> bool {
        self.edited.is_some()
    }

    pub fn last_sort(&self) -> Option<&[SortColumn]> {
        self.last_sort.as_deref()
    }

    /// The frame to export: the edited copy when present, otherwise the result.
    pub fn export_frame(&self) -> &DataFrame {
        self.edited.as_ref().unwrap_or(&self.original)
    }

    /// The current frame with a `#` column numbered from 1.
    pub fn numbered(&self) -> Result<DataFrame> {
        Ok(number_rows(self.export_frame().clone())?)
    }

    fn working(&mut self) -> &mut DataFrame {
        self.edited.get_or_insert_with(|| self.original.clone())
    }

    fn check_column(&self, column: &str) -> Result<()> {
        if self.export_frame().column(column).is_err() {
            return Err(color_eyre::eyre::eyre!("Column '{}' not found in result", column));
        }
        Ok(())
    }

    /// Replace one cell, parsing `text` into the column's type. Empty text stores null.
    pub fn set_cell(&mut self, row: usize, column: &str, text: &str) -> Result<()> {
        self.check_column(column)?;
        let height = self.export_frame().height();
        if row >= height {
            return Err(DataQueryError::CellOutOfRange { row, column: column.to_string() }.report());
        }
        let current = self.export_frame().column(column)?.as_materialized_series().clone();
        let value = parse_cell(column, current.dtype(), text)?;

        let mut updated = current.slice(0, row);
        updated.append(&value)?;
        updated.append(&current.slice((row + 1) as i64, height - row - 1))?;
        self.working().with_column(updated)?;
        debug!("Set cell ({}, {}) to '{}'", row, column, text);
        Ok(())
    }

    /// Append a row of nulls.
    pub fn append_row(&mut self) -> Result<()> {
        let frame = self.working();
        let nulls: Vec<Column> = frame
            .get_columns()
            .iter()
            .map(|c| Series::full_null(c.name().clone(), 1, c.dtype()).into_column())
            .collect();
        let row = DataFrame::new(nulls)?;
        let stacked = frame.vstack(&row)?;
        *frame = stacked;
        Ok(())
    }

    pub fn delete_row(&mut self, row: usize) -> Result<()> {
        let height = self.export_frame().height();
        if row >= height {
            return Err(DataQueryError::CellOutOfRange { row, column: "#".to_string() }.report());
        }
        let mask = BooleanChunked::from_iter_values("keep".into(), (0..height).map(|i| i != row));
        let frame = self.working();
        let kept = frame.filter(&mask)?;
        *frame = kept;
        Ok(())
    }

    pub fn rename_column(&mut self, column: &str, new_name: &str) -> Result<()> {
        self.check_column(column)?;
        if column != new_name && self.export_frame().column(new_name).is_ok() {
            return Err(color_eyre::eyre::eyre!("Column '{}' already exists", new_name));
        }
        self.working().rename(column, new_name.into())?;
        Ok(())
    }

    /// Cast a column to a new DataType in place.
    pub fn cast_column(&mut self, column: &str, dtype: &DataType) -> Result<()> {
        self.check_column(column)?;
        let frame = self.working();
        let casted = frame
            .column(column)?
            .strict_cast(dtype)
            .map_err(|e| color_eyre::eyre::eyre!("Cast error on '{}': {}", column, e))?;
        frame.with_column(casted)?;
        Ok(())
    }

    /// Reorder columns; every named column must exist and each may appear once.
    pub fn reorder_columns(&mut self, column_order: &[String]) -> Result<()> {
        let mut seen = HashSet::new();
        for name in column_order {
            self.check_column(name)?;
            if !seen.insert(name.as_str()) {
                return Err(color_eyre::eyre::eyre!("Column '{}' listed twice", name));
            }
        }
        let frame = self.working();
        let reordered = frame.select(column_order.iter().cloned())?;
        *frame = reordered;
        Ok(())
    }

    /// Sort by the given columns and directions.
    pub fn sort_by_columns(&mut self, columns: &[SortColumn]) -> Result<()> {
        if columns.is_empty() {
            return Ok(());
        }
        for c in columns {
            self.check_column(&c.name)?;
        }
        let by: Vec<String> = columns.iter().map(|c| c.name.clone()).collect();
        let reverse: Vec<bool> = columns.iter().map(|c| !c.ascending).collect();
        let options = SortMultipleOptions::default()
            .with_order_descending_multi(reverse.clone())
            .with_nulls_last_multi(reverse)
            .with_maintain_order(true);
        let frame = self.working();
        let sorted = frame.sort(by, options)?;
        *frame = sorted;
        self.last_sort = Some(columns.to_vec());
        Ok(())
    }

    /// Make the edited copy the result and leave edit mode.
    pub fn commit(&mut self) {
        if let Some(edited) = self.edited.take() {
            info!("Committed edits ({} rows)", edited.height());
            self.original = edited;
        }
    }

    /// Drop unsaved edits.
    pub fn discard(&mut self) {
        if self.edited.take().is_some() {
            info!("Discarded edits");
        }
        self.last_sort = None;
    }
}

const DATETIME_FORMATS: [&str; 3] = ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%d %H:%M"];

/// ISO text with `T` or a space between date and time, or a bare date at midnight.
fn parse_datetime(text: &str) -> Option<NaiveDateTime> {
    DATETIME_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(text, fmt).ok())
        .or_else(|| NaiveDate::parse_from_str(text, "%Y-%m-%d").ok()?.and_hms_opt(0, 0, 0))
}

fn parse_cell(column: &str, dtype: &DataType, text: &str) -> Result<Series> {
    let name: PlSmallStr = column.into();
    if text.is_empty() {
        return Ok(Series::full_null(name, 1, dtype));
    }
    let invalid = || {
        DataQueryError::InvalidCellValue {
            column: column.to_string(),
            value: text.to_string(),
            dtype: dtype.to_string(),
        }
        .report()
    };
    let trimmed = text.trim();
    let series = match dtype {
        DataType::String => Series::new(name, [text]),
        DataType::Boolean => {
            let value = match trimmed.to_ascii_lowercase().as_str() {
                "true" | "t" | "yes" | "y" | "1" => true,
                "false" | "f" | "no" | "n" | "0" => false,
                _ => return Err(invalid()),
            };
            Series::new(name, [value])
        }
        dt if dt.is_integer() => {
            let value: i64 = trimmed.parse().map_err(|_| invalid())?;
            Series::new(name, [value]).strict_cast(dt).map_err(|_| invalid())?
        }
        dt if dt.is_float() => {
            let value: f64 = trimmed.parse().map_err(|_| invalid())?;
            Series::new(name, [value]).strict_cast(dt).map_err(|_| invalid())?
        }
        DataType::Datetime(unit, _) => {
            let utc = parse_datetime(trimmed).ok_or_else(invalid)?.and_utc();
            let value = match unit {
                TimeUnit::Milliseconds => Some(utc.timestamp_millis()),
                TimeUnit::Microseconds => Some(utc.timestamp_micros()),
                TimeUnit::Nanoseconds => utc.timestamp_nanos_opt(),
            }
            .ok_or_else(invalid)?;
            Series::new(name, [value]).cast(dtype).map_err(|_| invalid())?
        }
        DataType::Date => {
            let date = NaiveDate::parse_from_str(trimmed, "%Y-%m-%d").map_err(|_| invalid())?;
            let days = date.signed_duration_since(NaiveDate::default()).num_days() as i32;
            Series::new(name, [days]).cast(dtype).map_err(|_| invalid())?
        }
        other => Series::new(name, [trimmed]).strict_cast(other).map_err(|_| invalid())?,
    };
    Ok(series)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::classify;
    use pretty_assertions::assert_eq;

    fn editor() -> ResultEditor {
        let df = polars::df![
            "id" => [3i64, 1, 2],
            "name" => ["c", "a", "b"],
            "score" => [1.5f64, 2.5, 0.5],
            "ok" => [true, false, true],
        ]
        .unwrap();
        ResultEditor::new(df)
    }

    fn ints(df: &DataFrame, col: &str) -> Vec<Option<i64>> {
        df.column(col).unwrap().i64().unwrap().into_iter().collect()
    }

    #[test]
    fn test_set_cell_parses_column_type() {
        let mut ed = editor();
        ed.set_cell(1, "id", "42").unwrap();
        ed.set_cell(0, "score", "").unwrap();
        ed.set_cell(2, "ok", "no").unwrap();
        ed.set_cell(2, "name", "z").unwrap();

        let df = ed.export_frame();
        assert_eq!(ints(df, "id"), vec![Some(3), Some(42), Some(2)]);
        assert_eq!(df.column("score").unwrap().null_count(), 1);
        assert_eq!(df.column("ok").unwrap().bool().unwrap().get(2), Some(false));
        assert_eq!(df.column("name").unwrap().str().unwrap().get(2), Some("z"));
        // Result untouched until commit
        assert_eq!(ints(ed.original(), "id"), vec![Some(3), Some(1), Some(2)]);
    }

    #[test]
    fn test_set_cell_datetime_forms() {
        let at = Series::new("at".into(), [0i64, 0])
            .cast(&DataType::Datetime(TimeUnit::Milliseconds, None))
            .unwrap();
        let day = Series::new("day".into(), [Some(0i32), None]).cast(&DataType::Date).unwrap();
        let df = DataFrame::new(vec![at.into(), day.into()]).unwrap();
        let mut ed = ResultEditor::new(df);

        ed.set_cell(0, "at", "2024-02-01 10:00:00").unwrap();
        ed.set_cell(1, "at", "2024-02-01").unwrap();
        ed.set_cell(0, "day", "2024-02-01").unwrap();

        let df = ed.export_frame();
        let millis: Vec<Option<i64>> = df
            .column("at")
            .unwrap()
            .cast(&DataType::Int64)
            .unwrap()
            .i64()
            .unwrap()
            .into_iter()
            .collect();
        assert_eq!(millis, vec![Some(1_706_781_600_000), Some(1_706_745_600_000)]);
        let days: Vec<Option<i32>> = df
            .column("day")
            .unwrap()
            .cast(&DataType::Int32)
            .unwrap()
            .i32()
            .unwrap()
            .into_iter()
            .collect();
        assert_eq!(days, vec![Some(19_754), None]);

        let err = ed.set_cell(0, "at", "01/02/2024").unwrap_err();
        assert!(matches!(classify(&err), Some(DataQueryError::InvalidCellValue { .. })));
    }

    #[test]
    fn test_set_cell_rejects_bad_values() {
        let mut ed = editor();
        let err = ed.set_cell(0, "id", "abc").unwrap_err();
        assert!(matches!(classify(&err), Some(DataQueryError::InvalidCellValue { .. })));
        let err = ed.set_cell(9, "id", "1").unwrap_err();
        assert!(matches!(classify(&err), Some(DataQueryError::CellOutOfRange { .. })));
        assert!(ed.set_cell(0, "nope", "1").is_err());
        assert!(!ed.is_editing());
    }

    #[test]
    fn test_append_and_delete_rows() {
        let mut ed = editor();
        ed.append_row().unwrap();
        assert_eq!(ed.export_frame().height(), 4);
        assert_eq!(ed.export_frame().column("name").unwrap().null_count(), 1);
        ed.set_cell(3, "id", "7").unwrap();
        ed.delete_row(0).unwrap();
        assert_eq!(ints(ed.export_frame(), "id"), vec![Some(1), Some(2), Some(7)]);
        assert!(ed.delete_row(3).is_err());
    }

    #[test]
    fn test_commit_and_discard() {
        let mut ed = editor();
        ed.delete_row(0).unwrap();
        ed.discard();
        assert_eq!(ed.export_frame().height(), 3);

        ed.delete_row(0).unwrap();
        ed.commit();
        assert!(!ed.is_editing());
        assert_eq!(ed.original().height(), 2);
    }

    #[test]
    fn test_column_operations() {
        let mut ed = editor();
        ed.rename_column("name", "label").unwrap();
        assert!(ed.rename_column("label", "id").is_err());
        ed.cast_column("id", &DataType::Float64).unwrap();
        assert_eq!(ed.export_frame().column("id").unwrap().dtype(), &DataType::Float64);
        assert!(ed.cast_column("label", &DataType::Int64).is_err());

        ed.reorder_columns(&["ok".into(), "label".into()]).unwrap();
        let names: Vec<String> = ed.export_frame().get_column_names().iter().map(|s| s.to_string()).collect();
        assert_eq!(names, vec!["ok", "label"]);
        assert!(ed.reorder_columns(&["ok".into(), "ok".into()]).is_err());
    }

    #[test]
    fn test_sort_by_columns() {
        let mut ed = editor();
        ed.sort_by_columns(&[SortColumn::desc("ok"), SortColumn::asc("id")]).unwrap();
        assert_eq!(ints(ed.export_frame(), "id"), vec![Some(2), Some(3), Some(1)]);
        assert_eq!(ed.last_sort().map(|s| s.len()), Some(2));
    }

    #[test]
    fn test_numbered_view() {
        let ed = editor();
        let view = ed.numbered().unwrap();
        assert_eq!(view.get_column_names()[0].as_str(), "#");
        assert_eq!(view.width(), 5);
    }
}
