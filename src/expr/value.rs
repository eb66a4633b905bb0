//! The typed value system shared by the template engine and the scripting
//! engine (design note: "value system spanning templates and scripts").
//!
//! A single variant type with bidirectional conversion to the scripting
//! engine's value space (see `crate::script::value`) avoids reflection in
//! the hot render/evaluate path.

use indexmap::IndexMap;
use std::fmt;
use std::rc::Rc;

use crate::error::{RecipeError, Result};

/// An object that can answer attribute lookups (`context.version`,
/// `loop.last`). Backs the read-only `context`/`local`/`loop` objects
/// exposed to templates and scripts.
pub trait AttrObject: fmt::Debug {
    fn get_attr(&self, name: &str) -> Option<Value>;
}

pub type Callable = Rc<dyn Fn(&[Value]) -> Result<Value>>;

#[derive(Clone)]
pub enum Value {
    None,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    List(Vec<Value>),
    Dict(IndexMap<String, Value>),
    Callable(Callable),
    Object(Rc<dyn AttrObject>),
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::None => write!(f, "None"),
            Value::Bool(b) => write!(f, "Bool({b})"),
            Value::Int(i) => write!(f, "Int({i})"),
            Value::Float(x) => write!(f, "Float({x})"),
            Value::Str(s) => write!(f, "Str({s:?})"),
            Value::List(l) => write!(f, "List({l:?})"),
            Value::Dict(d) => write!(f, "Dict({d:?})"),
            Value::Callable(_) => write!(f, "Callable(..)"),
            Value::Object(o) => write!(f, "Object({o:?})"),
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        use Value::*;
        match (self, other) {
            (None, None) => true,
            (Bool(a), Bool(b)) => a == b,
            (Int(a), Int(b)) => a == b,
            (Float(a), Float(b)) => a == b,
            (Int(a), Float(b)) | (Float(b), Int(a)) => (*a as f64) == *b,
            (Str(a), Str(b)) => a == b,
            (List(a), List(b)) => a == b,
            (Dict(a), Dict(b)) => a == b,
            _ => false,
        }
    }
}

impl Value {
    pub fn str(s: impl Into<String>) -> Self {
        Value::Str(s.into())
    }

    pub fn is_truthy(&self) -> bool {
        match self {
            Value::None => false,
            Value::Bool(b) => *b,
            Value::Int(i) => *i != 0,
            Value::Float(f) => *f != 0.0,
            Value::Str(s) => !s.is_empty(),
            Value::List(l) => !l.is_empty(),
            Value::Dict(d) => !d.is_empty(),
            Value::Callable(_) => true,
            Value::Object(_) => true,
        }
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Value::None => "none",
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::Float(_) => "float",
            Value::Str(_) => "string",
            Value::List(_) => "list",
            Value::Dict(_) => "dict",
            Value::Callable(_) => "callable",
            Value::Object(_) => "object",
        }
    }

    /// Renders per §4.5: `none` is the empty string, everything else via
    /// its `String()` conversion.
    pub fn render(&self) -> String {
        match self {
            Value::None => String::new(),
            Value::Bool(b) => b.to_string(),
            Value::Int(i) => i.to_string(),
            Value::Float(f) => {
                if f.fract() == 0.0 && f.is_finite() {
                    format!("{f:.1}")
                } else {
                    f.to_string()
                }
            }
            Value::Str(s) => s.clone(),
            Value::List(items) => {
                let rendered: Vec<String> = items.iter().map(Value::render).collect();
                format!("[{}]", rendered.join(", "))
            }
            Value::Dict(map) => {
                let rendered: Vec<String> = map
                    .iter()
                    .map(|(k, v)| format!("{k:?}: {}", v.render()))
                    .collect();
                format!("{{{}}}", rendered.join(", "))
            }
            Value::Callable(_) => "<callable>".to_string(),
            Value::Object(o) => format!("{o:?}"),
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s.as_str()),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i),
            Value::Bool(b) => Some(*b as i64),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[Value]> {
        match self {
            Value::List(items) => Some(items.as_slice()),
            _ => None,
        }
    }

    /// Coerces to a list for iteration/`list()`: lists pass through,
    /// strings iterate a list of one, dicts iterate their keys.
    pub fn iter_values(&self) -> Result<Vec<Value>> {
        match self {
            Value::List(items) => Ok(items.clone()),
            Value::Dict(map) => Ok(map.keys().map(|k| Value::Str(k.clone())).collect()),
            Value::Str(s) => Ok(s.chars().map(|c| Value::Str(c.to_string())).collect()),
            other => Err(RecipeError::evaluation(format!(
                "value of type {} is not iterable",
                other.type_name()
            ))),
        }
    }

    pub fn get_index(&self, idx: &Value) -> Result<Value> {
        match (self, idx) {
            (Value::List(items), Value::Int(i)) => {
                let len = items.len() as i64;
                let real = if *i < 0 { len + i } else { *i };
                if real < 0 || real >= len {
                    return Err(RecipeError::evaluation(format!(
                        "list index {i} out of range (len {len})"
                    )));
                }
                Ok(items[real as usize].clone())
            }
            (Value::Dict(map), Value::Str(key)) => map
                .get(key)
                .cloned()
                .ok_or_else(|| RecipeError::evaluation(format!("key {key:?} not found in dict"))),
            (Value::Str(s), Value::Int(i)) => {
                let chars: Vec<char> = s.chars().collect();
                let len = chars.len() as i64;
                let real = if *i < 0 { len + i } else { *i };
                if real < 0 || real >= len {
                    return Err(RecipeError::evaluation("string index out of range"));
                }
                Ok(Value::Str(chars[real as usize].to_string()))
            }
            (other, _) => Err(RecipeError::evaluation(format!(
                "value of type {} is not indexable",
                other.type_name()
            ))),
        }
    }

    pub fn get_attr(&self, name: &str) -> Result<Value> {
        match self {
            Value::Dict(map) => map.get(name).cloned().ok_or_else(|| {
                RecipeError::evaluation(format!("undefined attribute {name:?}"))
            }),
            Value::Object(obj) => obj
                .get_attr(name)
                .ok_or_else(|| RecipeError::evaluation(format!("undefined attribute {name:?}"))),
            other => Err(RecipeError::evaluation(format!(
                "value of type {} has no attributes",
                other.type_name()
            ))),
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Str(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Str(s)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Int(i)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

/// Converts a `Value` into `serde_json::Value`, used by the `boutique`
/// directive (§4.1) to serialize an evaluated recipe fragment to
/// `/boutique.json`. Callables/objects have no JSON representation and
/// lower to `null`.
pub fn to_json(value: &Value) -> serde_json::Value {
    match value {
        Value::None => serde_json::Value::Null,
        Value::Bool(b) => serde_json::Value::Bool(*b),
        Value::Int(i) => serde_json::Value::Number((*i).into()),
        Value::Float(f) => serde_json::Number::from_f64(*f)
            .map(serde_json::Value::Number)
            .unwrap_or(serde_json::Value::Null),
        Value::Str(s) => serde_json::Value::String(s.clone()),
        Value::List(items) => serde_json::Value::Array(items.iter().map(to_json).collect()),
        Value::Dict(map) => {
            let mut out = serde_json::Map::new();
            for (k, v) in map {
                out.insert(k.clone(), to_json(v));
            }
            serde_json::Value::Object(out)
        }
        Value::Callable(_) | Value::Object(_) => serde_json::Value::Null,
    }
}

/// Converts a parsed YAML/JSON value into the expression `Value` space,
/// used when seeding a `BuildContext` from recipe YAML.
pub fn from_yaml(value: &serde_yml::Value) -> Value {
    match value {
        serde_yml::Value::Null => Value::None,
        serde_yml::Value::Bool(b) => Value::Bool(*b),
        serde_yml::Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                Value::Int(i)
            } else {
                Value::Float(n.as_f64().unwrap_or(0.0))
            }
        }
        serde_yml::Value::String(s) => Value::Str(s.clone()),
        serde_yml::Value::Sequence(seq) => Value::List(seq.iter().map(from_yaml).collect()),
        serde_yml::Value::Mapping(map) => {
            let mut out = IndexMap::new();
            for (k, v) in map {
                if let Some(key) = k.as_str() {
                    out.insert(key.to_string(), from_yaml(v));
                }
            }
            Value::Dict(out)
        }
        serde_yml::Value::Tagged(t) => from_yaml(&t.value),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn truthiness() {
        assert!(!Value::Str(String::new()).is_truthy());
        assert!(!Value::List(vec![]).is_truthy());
        assert!(!Value::Int(0).is_truthy());
        assert!(Value::Int(1).is_truthy());
        assert!(!Value::None.is_truthy());
        assert!(Value::Bool(true).is_truthy());
    }

    #[test]
    fn render_none_is_empty() {
        assert_eq!(Value::None.render(), "");
        assert_eq!(Value::Int(42).render(), "42");
    }

    #[test]
    fn negative_list_index() {
        let list = Value::List(vec![Value::Int(1), Value::Int(2), Value::Int(3)]);
        assert_eq!(list.get_index(&Value::Int(-1)).unwrap(), Value::Int(3));
    }
}
