//! Table and column naming rules shared by every loader.

use lazy_static::lazy_static;
use regex::Regex;
use std::collections::HashSet;

lazy_static! {
    static ref INVALID_TABLE_CHARS: Regex = Regex::new(r"[^a-zA-Z0-9_]").expect("static regex");
}

/// Remove spaces and every character outside `[a-zA-Z0-9_]`.
///
/// Names that end up empty become `table`; a leading digit gets a `t_` prefix so the
/// name can be used unquoted in SQL.
pub fn clean_table_name(name: &str) -> String {
    let no_spaces = name.replace(' ', "");
    let cleaned = INVALID_TABLE_CHARS.replace_all(&no_spaces, "").into_owned();
    if cleaned.is_empty() {
        "table".to_string()
    } else if cleaned.starts_with(|c: char| c.is_ascii_digit()) {
        format!("t_{cleaned}")
    } else {
        cleaned
    }
}

/// `orders.v2.csv` -> `orders_v2_csv`
pub fn file_stem_name(file_name: &str) -> String {
    file_name.replace('.', "_")
}

/// Build the registry name for a table produced by a file, an archive member or a sheet.
pub fn table_name_for(file_name: &str, archive: Option<&str>, sheet: Option<&str>) -> String {
    let mut raw = file_stem_name(file_name);
    if let Some(archive) = archive {
        raw = format!("{}_{}", file_stem_name(archive), raw);
    }
    if let Some(sheet) = sheet {
        raw = format!("{raw}_{sheet}");
    }
    clean_table_name(&raw.to_lowercase())
}

/// Positional column names used when a source has no header row.
pub fn positional_column_names(count: usize) -> Vec<String> {
    (1..=count).map(|i| format!("col_{i}")).collect()
}

/// Turn raw header cells into usable, unique column names.
pub fn unique_column_names<I, S>(raw: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut used: HashSet<String> = HashSet::new();
    let mut out = Vec::new();
    for (idx, raw_name) in raw.into_iter().enumerate() {
        let mut name = raw_name.as_ref().trim().to_string();
        if name.is_empty() {
            name = format!("col_{}", idx + 1);
        }
        if used.contains(&name) {
            let base = name.clone();
            let mut suffix = 2usize;
            while used.contains(&format!("{base}_{suffix}")) {
                suffix += 1;
            }
            name = format!("{base}_{suffix}");
        }
        used.insert(name.clone());
        out.push(name);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_clean_table_name() {
        assert_eq!(clean_table_name("my table-2024!"), "mytable2024");
        assert_eq!(clean_table_name("ok_name"), "ok_name");
        assert_eq!(clean_table_name("2024_sales"), "t_2024_sales");
        assert_eq!(clean_table_name("$$$"), "table");
    }

    #[test]
    fn test_table_name_for_plain_file() {
        assert_eq!(table_name_for("Sales Data.CSV", None, None), "salesdata_csv");
    }

    #[test]
    fn test_table_name_for_archive_and_sheet() {
        assert_eq!(
            table_name_for("book.xlsx", Some("bundle.zip"), Some("Q1 Totals")),
            "bundle_zip_book_xlsx_q1totals"
        );
        assert_eq!(table_name_for("book.xlsx", None, Some("Sheet1")), "book_xlsx_sheet1");
    }

    #[test]
    fn test_unique_column_names() {
        let names = unique_column_names(["id", "", "id", " name ", "id"]);
        assert_eq!(names, vec!["id", "col_2", "id_2", "name", "id_3"]);
    }

    #[test]
    fn test_positional_column_names() {
        assert_eq!(positional_column_names(3), vec!["col_1", "col_2", "col_3"]);
        assert!(positional_column_names(0).is_empty());
    }
}
