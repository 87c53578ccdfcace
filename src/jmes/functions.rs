use std::collections::BTreeMap;

use jmespath::functions::{ArgumentType, CustomFunction, Signature};
use jmespath::{Context, Rcvar, Runtime, Variable};

/// Register the record-shaping JMESPath functions.
pub fn register_custom_functions(runtime: &mut Runtime) {
    // entries(object) -> [{"key": k, "value": v}, ...]
    // Turns a keyed object (e.g. {"id1": {...}, "id2": {...}}) into a list of records.
    runtime.register_function(
        "entries",
        Box::new(CustomFunction::new(
            Signature::new(vec![ArgumentType::Object], None),
            Box::new(|args: &[Rcvar], _ctx: &mut Context| {
                let mut out = Vec::new();
                if let Some(map) = args.first().and_then(|v| v.as_object()) {
                    for (key, value) in map.iter() {
                        let mut record = BTreeMap::new();
                        record.insert("key".to_string(), Rcvar::new(Variable::String(key.clone())));
                        record.insert("value".to_string(), value.clone());
                        out.push(Rcvar::new(Variable::Object(record)));
                    }
                }
                Ok(Rcvar::new(Variable::Array(out)))
            }),
        )),
    );

    // merge_key(object, name) -> [{name: k, ...v}, ...]
    // Like `entries` but folds the key into each object-valued record.
    runtime.register_function(
        "merge_key",
        Box::new(CustomFunction::new(
            Signature::new(vec![ArgumentType::Object, ArgumentType::String], None),
            Box::new(|args: &[Rcvar], _ctx: &mut Context| {
                let key_name = args
                    .get(1)
                    .and_then(|v| v.as_string())
                    .map(|s| s.to_string())
                    .unwrap_or_else(|| "key".to_string());
                let mut out = Vec::new();
                if let Some(map) = args.first().and_then(|v| v.as_object()) {
                    for (key, value) in map.iter() {
                        let mut record = match value.as_object() {
                            Some(fields) => fields.clone(),
                            None => {
                                let mut single = BTreeMap::new();
                                single.insert("value".to_string(), value.clone());
                                single
                            }
                        };
                        record.insert(key_name.clone(), Rcvar::new(Variable::String(key.clone())));
                        out.push(Rcvar::new(Variable::Object(record)));
                    }
                }
                Ok(Rcvar::new(Variable::Array(out)))
            }),
        )),
    );
}
