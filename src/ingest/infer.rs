//! Column type inference for sources that only hand us text (XML, flattened JSON).

use polars::prelude::*;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TextColType {
    Unknown,
    Int64,
    Float64,
    Boolean,
    Utf8,
}

fn parse_bool(s: &str) -> Option<bool> {
    match s.to_ascii_lowercase().as_str() {
        "true" => Some(true),
        "false" => Some(false),
        _ => None,
    }
}

fn classify(value: &str) -> TextColType {
    if value.parse::<i64>().is_ok() {
        TextColType::Int64
    } else if value.parse::<f64>().is_ok() {
        TextColType::Float64
    } else if parse_bool(value).is_some() {
        TextColType::Boolean
    } else {
        TextColType::Utf8
    }
}

fn promote(current: TextColType, next: TextColType) -> TextColType {
    use TextColType::*;
    match (current, next) {
        (Unknown, t) => t,
        (a, b) if a == b => a,
        (Int64, Float64) | (Float64, Int64) => Float64,
        _ => Utf8,
    }
}

/// Build a Series from optional text cells, picking the narrowest type every
/// non-empty value parses as. Empty strings are treated as nulls.
pub fn text_column(name: &str, values: Vec<Option<String>>) -> Series {
    let values: Vec<Option<String>> = values
        .into_iter()
        .map(|v| v.filter(|s| !s.trim().is_empty()))
        .collect();

    let col_type = values
        .iter()
        .flatten()
        .fold(TextColType::Unknown, |acc, v| promote(acc, classify(v.trim())));

    let name: PlSmallStr = name.into();
    match col_type {
        TextColType::Int64 => {
            let data: Vec<Option<i64>> = values
                .iter()
                .map(|v| v.as_deref().and_then(|s| s.trim().parse().ok()))
                .collect();
            Series::new(name, data)
        }
        TextColType::Float64 => {
            let data: Vec<Option<f64>> = values
                .iter()
                .map(|v| v.as_deref().and_then(|s| s.trim().parse().ok()))
                .collect();
            Series::new(name, data)
        }
        TextColType::Boolean => {
            let data: Vec<Option<bool>> = values
                .iter()
                .map(|v| v.as_deref().and_then(|s| parse_bool(s.trim())))
                .collect();
            Series::new(name, data)
        }
        // All-null columns stay Utf8 with None values
        TextColType::Unknown | TextColType::Utf8 => Series::new(name, values),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn some(values: &[&str]) -> Vec<Option<String>> {
        values.iter().map(|s| Some(s.to_string())).collect()
    }

    #[test]
    fn test_integer_column() {
        let s = text_column("n", some(&["1", "2", ""]));
        assert_eq!(s.dtype(), &DataType::Int64);
        assert_eq!(s.null_count(), 1);
    }

    #[test]
    fn test_mixed_numbers_promote_to_float() {
        let s = text_column("n", some(&["1", "2.5"]));
        assert_eq!(s.dtype(), &DataType::Float64);
    }

    #[test]
    fn test_boolean_and_text() {
        assert_eq!(text_column("b", some(&["true", "False"])).dtype(), &DataType::Boolean);
        assert_eq!(text_column("t", some(&["1", "x"])).dtype(), &DataType::String);
        assert_eq!(text_column("e", vec![None, None]).dtype(), &DataType::String);
    }
}
