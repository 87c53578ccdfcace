use color_eyre::Result;
use polars::prelude::{CsvWriter, DataFrame, DataType, QuoteStyle as CsvQuoteStyle, SerWriter};

use super::{ExportFormat, ExportOptions, unavailable};
use crate::core::types::QuoteStyle;
use crate::error::DataQueryError;

fn csv_quote_style(quoting: QuoteStyle) -> CsvQuoteStyle {
    match quoting {
        QuoteStyle::All => CsvQuoteStyle::Always,
        QuoteStyle::Minimal => CsvQuoteStyle::Necessary,
        QuoteStyle::NonNumeric => CsvQuoteStyle::NonNumeric,
        QuoteStyle::None => CsvQuoteStyle::Never,
    }
}

/// Whether any header or value would need quoting to stay parseable.
fn needs_escape(df: &DataFrame, options: &ExportOptions) -> Result<bool> {
    let special = |s: &str| {
        s.contains(options.delimiter)
            || s.contains(options.quote_char)
            || s.contains('\n')
            || s.contains('\r')
    };
    if options.header && df.get_column_names().iter().any(|n| special(n.as_str())) {
        return Ok(true);
    }
    // Numbers count too: '.' or '-' as delimiter collides with 1.5 or -1
    for column in df.get_columns() {
        let as_text = column.cast(&DataType::String)?;
        if as_text.str()?.into_iter().flatten().any(|s| special(s)) {
            return Ok(true);
        }
    }
    Ok(false)
}

/// Delimited text without a row index.
pub(super) fn write_delimited(
    df: &mut DataFrame,
    format: ExportFormat,
    options: &ExportOptions,
) -> Result<Vec<u8>> {
    if !options.delimiter.is_ascii() || !options.quote_char.is_ascii() {
        return Err(DataQueryError::InvalidOption {
            option: "delimiter".into(),
            reason: "delimiter and quote character must be single-byte characters".into(),
        }
        .report());
    }
    if options.quoting == QuoteStyle::None && needs_escape(df, options)? {
        return Err(DataQueryError::NeedsEscape.report());
    }

    let mut buf = Vec::new();
    CsvWriter::new(&mut buf)
        .include_header(options.header)
        .with_separator(options.delimiter as u8)
        .with_quote_char(options.quote_char as u8)
        .with_quote_style(csv_quote_style(options.quoting))
        .finish(df)
        .map_err(|e| unavailable(format, e))?;
    Ok(buf)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::classify;
    use pretty_assertions::assert_eq;

    fn sample() -> DataFrame {
        polars::df![
            "id" => [1i64, 2],
            "note" => ["plain", "a,b"],
        ]
        .unwrap()
    }

    fn write(df: &DataFrame, options: ExportOptions) -> Result<String> {
        let mut df = df.clone();
        let bytes = write_delimited(&mut df, ExportFormat::Csv, &options)?;
        Ok(String::from_utf8(bytes).unwrap())
    }

    #[test]
    fn test_minimal_quoting() {
        let out = write(&sample(), ExportOptions::default()).unwrap();
        assert_eq!(out, "id,note\n1,plain\n2,\"a,b\"\n");
    }

    #[test]
    fn test_quote_all_without_header() {
        let options = ExportOptions { header: false, quoting: QuoteStyle::All, ..Default::default() };
        let out = write(&sample(), options).unwrap();
        assert_eq!(out, "\"1\",\"plain\"\n\"2\",\"a,b\"\n");
    }

    #[test]
    fn test_quote_none_with_special_character() {
        let options = ExportOptions { quoting: QuoteStyle::None, ..Default::default() };
        let err = write(&sample(), options.clone()).unwrap_err();
        assert!(matches!(classify(&err), Some(DataQueryError::NeedsEscape)));

        let piped = ExportOptions { delimiter: '|', ..options };
        let out = write(&sample(), piped).unwrap();
        assert_eq!(out, "id|note\n1|plain\n2|a,b\n");
    }

    #[test]
    fn test_quote_none_checks_numeric_values() {
        let numbers = polars::df![
            "x" => [1.5f64, 2.25],
            "y" => [-1i64, 3],
        ]
        .unwrap();
        for delimiter in ['.', '-'] {
            let options = ExportOptions { delimiter, quoting: QuoteStyle::None, ..Default::default() };
            let err = write(&numbers, options).unwrap_err();
            assert!(matches!(classify(&err), Some(DataQueryError::NeedsEscape)), "{delimiter}");
        }

        let options = ExportOptions { delimiter: ';', quoting: QuoteStyle::None, ..Default::default() };
        assert_eq!(write(&numbers, options).unwrap(), "x;y\n1.5;-1\n2.25;3\n");
    }
}
