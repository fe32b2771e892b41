//! Built-in add-with-cache executor, kept as the reference implementation
//! of the executor contract.

use serde_json::{json, Map, Number, Value};

use super::{BoxError, Executor, Invocation};

/// Adds the `a` and `b` arguments, memoizing each sum in the function's
/// cache under the key `"{a}+{b}"`.
///
/// A cache hit returns `{isCached: true, total}` without a `cache` field,
/// so the stored entry is left untouched. A miss returns the updated cache
/// alongside the total, which the bridge persists for the next request.
pub struct AddFunction;

impl Executor for AddFunction {
    fn call(&self, invocation: &Invocation) -> Result<Option<Value>, BoxError> {
        let a = operand(&invocation.function_arguments, "a")?;
        let b = operand(&invocation.function_arguments, "b")?;
        let cache_key = format!("{}+{}", a, b);

        if let Some(total) = invocation.cache.get(&cache_key) {
            return Ok(Some(json!({ "isCached": true, "total": total })));
        }

        let total = total_of(a, b)?;
        let mut cache = match &invocation.cache {
            Value::Object(entries) => entries.clone(),
            _ => Map::new(),
        };
        cache.insert(cache_key, total.clone());

        Ok(Some(json!({ "isCached": false, "total": total, "cache": cache })))
    }
}

fn operand<'a>(arguments: &'a Value, name: &str) -> Result<&'a Number, BoxError> {
    match arguments.get(name) {
        Some(Value::Number(number)) => Ok(number),
        Some(other) => Err(format!("argument {} must be a number, got {}", name, other).into()),
        None => Err(format!("argument {} is missing", name).into()),
    }
}

fn total_of(a: &Number, b: &Number) -> Result<Value, BoxError> {
    if let (Some(x), Some(y)) = (a.as_i64(), b.as_i64()) {
        if let Some(total) = x.checked_add(y) {
            return Ok(json!(total));
        }
    }
    match (a.as_f64(), b.as_f64()) {
        (Some(x), Some(y)) => Ok(json!(x + y)),
        _ => Err("arguments are outside the supported numeric range".into()),
    }
}
