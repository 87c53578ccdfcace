//! JMESPath runtime used to pick the records out of a JSON document.
//!
//! Expressions run on a per-thread `Runtime` that has the built-in functions
//! plus `entries` and `merge_key`.

mod functions;

pub use functions::register_custom_functions;

use color_eyre::{Result, eyre::eyre};
use jmespath::{Runtime, Variable};
use serde_json::Value as JsonValue;

thread_local! {
    static RECORDS_RUNTIME: Runtime = {
        let mut rt = Runtime::new();
        rt.register_builtin_functions();
        register_custom_functions(&mut rt);
        rt
    };
}

/// Evaluate `expr` against `data`. The identity expression `@` short-circuits.
pub fn search(expr: &str, data: JsonValue) -> Result<JsonValue> {
    let expr = expr.trim();
    if expr.is_empty() || expr == "@" {
        return Ok(data);
    }
    let var = Variable::try_from(data).map_err(|e| eyre!("Unsupported JSON value: {e}"))?;
    let found = RECORDS_RUNTIME.with(|rt| {
        let compiled = rt
            .compile(expr)
            .map_err(|e| eyre!("Invalid JMESPath expression '{expr}': {e}"))?;
        compiled
            .search(var)
            .map_err(|e| eyre!("JMESPath evaluation failed: {e}"))
    })?;
    Ok(serde_json::to_value(&*found)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_identity_returns_input() {
        let data = json!([{"a": 1}]);
        assert_eq!(search("@", data.clone()).unwrap(), data);
    }

    #[test]
    fn test_nested_records() {
        let data = json!({"meta": {"n": 2}, "items": [{"a": 1}, {"a": 2}]});
        assert_eq!(search("items", data).unwrap(), json!([{"a": 1}, {"a": 2}]));
    }

    #[test]
    fn test_invalid_expression() {
        assert!(search("items[", json!({})).is_err());
    }
}
