//! Bidirectional conversion between script values and template values.
//!
//! Design note "value system spanning templates and scripts": rather
//! than maintaining two parallel value enums and a conversion function
//! between them, the scripting engine evaluates expressions directly
//! into `crate::expr::Value` — the same type the template engine uses.
//! Conversion is therefore the identity function; this module exists to
//! give that decision a name and a place to special-case `none` per
//! `set_variable`'s documented behavior ("none -> nil").

use crate::expr::Value;

/// Converts a script-evaluated value into the generic value stored in
/// the build context's variable map, recursing into lists/dicts so
/// nested structures keep their shape (§4.6 `set_variable`).
pub fn to_context_value(value: &Value) -> Value {
    match value {
        Value::None => Value::None,
        Value::List(items) => Value::List(items.iter().map(to_context_value).collect()),
        Value::Dict(map) => {
            let mut out = indexmap::IndexMap::new();
            for (k, v) in map {
                out.insert(k.clone(), to_context_value(v));
            }
            Value::Dict(out)
        }
        other => other.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recurses_into_nested_collections() {
        let mut inner = indexmap::IndexMap::new();
        inner.insert("k".to_string(), Value::None);
        let value = Value::List(vec![Value::Dict(inner)]);
        let converted = to_context_value(&value);
        assert_eq!(converted, value);
    }
}
