use std::fmt;

/// A passthrough attribute value carried from the zone source to the output row.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum AttrValue {
    #[default]
    Null,
    Bool(bool),
    Integer(i64),
    Float(f64),
    Text(String),
}

impl AttrValue {
    #[inline] pub fn is_null(&self) -> bool { matches!(self, AttrValue::Null) }

    /// Text form used for filtering and identifier extraction; `None` for nulls.
    pub fn as_text(&self) -> Option<String> {
        match self {
            AttrValue::Null => None,
            AttrValue::Text(s) => Some(s.clone()),
            other => Some(other.to_string()),
        }
    }

    /// Build from a JSON property value. Arrays and objects are kept as JSON text.
    pub fn from_json(value: &serde_json::Value) -> Self {
        use serde_json::Value;
        match value {
            Value::Null => AttrValue::Null,
            Value::Bool(b) => AttrValue::Bool(*b),
            Value::Number(n) => n.as_i64().map(AttrValue::Integer)
                .or_else(|| n.as_f64().map(AttrValue::Float))
                .unwrap_or(AttrValue::Null),
            Value::String(s) => AttrValue::Text(s.clone()),
            other => AttrValue::Text(other.to_string()),
        }
    }

    pub fn to_json(&self) -> serde_json::Value {
        use serde_json::{json, Value};
        match self {
            AttrValue::Null => Value::Null,
            AttrValue::Bool(b) => json!(b),
            AttrValue::Integer(i) => json!(i),
            AttrValue::Float(f) => json!(f),
            AttrValue::Text(s) => json!(s),
        }
    }
}

impl fmt::Display for AttrValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AttrValue::Null => Ok(()),
            AttrValue::Bool(b) => write!(f, "{b}"),
            AttrValue::Integer(i) => write!(f, "{i}"),
            AttrValue::Float(x) => write!(f, "{x}"),
            AttrValue::Text(s) => f.write_str(s),
        }
    }
}
