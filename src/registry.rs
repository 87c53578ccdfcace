//! Named in-memory tables, the namespace SQL queries run against.

use chrono::{DateTime, Utc};
use color_eyre::Result;
use polars::prelude::*;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::error::DataQueryError;

/// Where a registered table came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableOrigin {
    /// Name of the uploaded file that produced the table
    pub upload: String,
    pub member: Option<String>,
    pub sheet: Option<String>,
}

impl TableOrigin {
    pub fn upload(name: impl Into<String>) -> Self {
        Self {
            upload: name.into(),
            member: None,
            sheet: None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct TableEntry {
    pub frame: Arc<DataFrame>,
    pub origin: TableOrigin,
    pub loaded_at: DateTime<Utc>,
}

#[derive(Debug, Default, Clone)]
pub struct TableRegistry {
    tables: BTreeMap<String, TableEntry>,
}

impl TableRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a table and return the name it was registered under.
    ///
    /// A taken name gets the first free `_<n>` suffix starting at 2.
    pub fn register(&mut self, name: &str, frame: DataFrame, origin: TableOrigin) -> String {
        let mut final_name = name.to_string();
        if self.tables.contains_key(&final_name) {
            let mut n = 2usize;
            while self.tables.contains_key(&format!("{name}_{n}")) {
                n += 1;
            }
            final_name = format!("{name}_{n}");
            warn!(
                "Table name '{}' already in use; registering {} as '{}'",
                name, origin.upload, final_name
            );
        }
        debug!("Registered table '{}' {:?}", final_name, frame.shape());
        self.tables.insert(
            final_name.clone(),
            TableEntry {
                frame: Arc::new(frame),
                origin,
                loaded_at: Utc::now(),
            },
        );
        final_name
    }

    /// Drop every table produced by `upload`. Returns the removed names.
    pub fn remove_upload(&mut self, upload: &str) -> Vec<String> {
        let names: Vec<String> = self
            .tables
            .iter()
            .filter(|(_, entry)| entry.origin.upload == upload)
            .map(|(name, _)| name.clone())
            .collect();
        for name in &names {
            self.tables.remove(name);
        }
        names
    }

    pub fn remove(&mut self, name: &str) -> Option<TableEntry> {
        self.tables.remove(name)
    }

    pub fn get(&self, name: &str) -> Option<&TableEntry> {
        self.tables.get(name)
    }

    pub fn frame(&self, name: &str) -> Result<Arc<DataFrame>> {
        self.tables
            .get(name)
            .map(|entry| entry.frame.clone())
            .ok_or_else(|| DataQueryError::UnknownTable(name.to_string()).report())
    }

    /// Registered names in sorted order.
    pub fn names(&self) -> Vec<String> {
        self.tables.keys().cloned().collect()
    }

    pub fn tables(&self) -> impl Iterator<Item = (&String, &TableEntry)> {
        self.tables.iter()
    }

    /// Names of every upload that currently owns at least one table.
    pub fn uploads(&self) -> Vec<String> {
        let mut uploads: Vec<String> = self.tables.values().map(|e| e.origin.upload.clone()).collect();
        uploads.sort();
        uploads.dedup();
        uploads
    }

    pub fn len(&self) -> usize {
        self.tables.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }

    pub fn clear(&mut self) {
        self.tables.clear();
    }

    /// First `rows` rows of a table with a `#` column numbered from 1.
    pub fn preview(&self, name: &str, rows: usize) -> Result<DataFrame> {
        let frame = self.frame(name)?;
        Ok(number_rows(frame.head(Some(rows)))?)
    }
}

/// Prepend a 1-based `#` row number column for display.
pub fn number_rows(frame: DataFrame) -> PolarsResult<DataFrame> {
    frame.with_row_index("#".into(), Some(1))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn frame(n: i64) -> DataFrame {
        let values: Vec<i64> = (0..n).collect();
        DataFrame::new(vec![Series::new("v".into(), values).into()]).unwrap()
    }

    #[test]
    fn test_collision_gets_suffix() {
        let mut reg = TableRegistry::new();
        assert_eq!(reg.register("t", frame(1), TableOrigin::upload("a.csv")), "t");
        assert_eq!(reg.register("t", frame(2), TableOrigin::upload("b.csv")), "t_2");
        assert_eq!(reg.register("t", frame(3), TableOrigin::upload("c.csv")), "t_3");
        assert_eq!(reg.names(), vec!["t", "t_2", "t_3"]);
        assert_eq!(reg.frame("t_2").unwrap().height(), 2);
    }

    #[test]
    fn test_remove_upload_drops_all_its_tables() {
        let mut reg = TableRegistry::new();
        let mut origin = TableOrigin::upload("bundle.zip");
        origin.member = Some("a.csv".into());
        reg.register("bundle_zip_a_csv", frame(1), origin.clone());
        origin.member = Some("b.csv".into());
        reg.register("bundle_zip_b_csv", frame(1), origin);
        reg.register("other", frame(1), TableOrigin::upload("other.csv"));

        let removed = reg.remove_upload("bundle.zip");
        assert_eq!(removed, vec!["bundle_zip_a_csv", "bundle_zip_b_csv"]);
        assert_eq!(reg.names(), vec!["other"]);
        assert_eq!(reg.uploads(), vec!["other.csv"]);
        assert!(reg.remove_upload("missing.csv").is_empty());
    }

    #[test]
    fn test_preview_is_numbered_from_one() {
        let mut reg = TableRegistry::new();
        reg.register("t", frame(10), TableOrigin::upload("t.csv"));
        let preview = reg.preview("t", 5).unwrap();
        assert_eq!(preview.shape(), (5, 2));
        let idx = preview.column("#").unwrap().cast(&DataType::Int64).unwrap();
        assert_eq!(idx.i64().unwrap().get(0), Some(1));
        assert_eq!(idx.i64().unwrap().get(4), Some(5));
    }

    #[test]
    fn test_unknown_table() {
        let reg = TableRegistry::new();
        let err = reg.preview("nope", 5).unwrap_err();
        assert!(matches!(
            crate::error::classify(&err),
            Some(DataQueryError::UnknownTable(_))
        ));
        assert!(reg.is_empty());
    }
}
