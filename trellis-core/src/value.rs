//! Dynamic values carried by state variables.

use std::fmt;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// The value of a state variable, attribute, or essential cell.
///
/// `Integer` and `Number` compare equal when they denote the same number.
/// `Error` is the sentinel a definition resolves to when it cannot produce a
/// value; it serializes as `{"error": message}`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    #[default]
    Null,
    Bool(bool),
    Integer(i64),
    Number(f64),
    Text(String),
    List(Vec<Value>),
    Error { error: String },
    Map(IndexMap<String, Value>),
}

/// Expected type of an attribute value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ValueKind {
    Any,
    Boolean,
    Integer,
    Number,
    Text,
    List,
}

impl Value {
    pub fn error(message: impl Into<String>) -> Self {
        Value::Error {
            error: message.into(),
        }
    }

    pub fn text(s: impl Into<String>) -> Self {
        Value::Text(s.into())
    }

    pub fn map<K, I>(entries: I) -> Self
    where
        K: Into<String>,
        I: IntoIterator<Item = (K, Value)>,
    {
        Value::Map(entries.into_iter().map(|(k, v)| (k.into(), v)).collect())
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn is_error(&self) -> bool {
        matches!(self, Value::Error { .. })
    }

    pub fn error_message(&self) -> Option<&str> {
        match self {
            Value::Error { error } => Some(error),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Number(n) => Some(*n),
            Value::Integer(i) => Some(*i as f64),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Integer(i) => Some(*i),
            Value::Number(n) if n.fract() == 0.0 && n.is_finite() => Some(*n as i64),
            _ => None,
        }
    }

    pub fn as_usize(&self) -> Option<usize> {
        self.as_i64().and_then(|i| usize::try_from(i).ok())
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[Value]> {
        match self {
            Value::List(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_map(&self) -> Option<&IndexMap<String, Value>> {
        match self {
            Value::Map(map) => Some(map),
            _ => None,
        }
    }

    /// Look up a key of a map value.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.as_map().and_then(|m| m.get(key))
    }

    /// Truthiness used for governing flags: only `true` counts.
    pub fn is_true(&self) -> bool {
        matches!(self, Value::Bool(true))
    }

    /// Convert to the given kind, parsing text where that makes sense.
    ///
    /// Returns `None` when the value cannot represent the kind.
    pub fn coerce(&self, kind: ValueKind) -> Option<Value> {
        match kind {
            ValueKind::Any => Some(self.clone()),
            ValueKind::Number => match self {
                Value::Number(_) => Some(self.clone()),
                Value::Integer(i) => Some(Value::Number(*i as f64)),
                Value::Text(s) => s.trim().parse::<f64>().ok().map(Value::Number),
                _ => None,
            },
            ValueKind::Integer => match self {
                Value::Text(s) => s.trim().parse::<i64>().ok().map(Value::Integer),
                other => other.as_i64().map(Value::Integer),
            },
            ValueKind::Text => match self {
                Value::Text(_) => Some(self.clone()),
                Value::Number(_) | Value::Integer(_) | Value::Bool(_) => {
                    Some(Value::Text(self.to_string()))
                }
                _ => None,
            },
            ValueKind::Boolean => match self {
                Value::Bool(_) => Some(self.clone()),
                Value::Text(s) => match s.trim().to_ascii_lowercase().as_str() {
                    "true" | "" => Some(Value::Bool(true)),
                    "false" => Some(Value::Bool(false)),
                    _ => None,
                },
                _ => None,
            },
            ValueKind::List => match self {
                Value::List(_) => Some(self.clone()),
                Value::Text(s) => Some(Value::List(
                    s.split_whitespace()
                        .map(|part| match part.parse::<f64>() {
                            Ok(n) => Value::Number(n),
                            Err(_) => Value::Text(part.to_string()),
                        })
                        .collect(),
                )),
                Value::Null => None,
                other => Some(Value::List(vec![other.clone()])),
            },
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Null, Value::Null) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Integer(a), Value::Integer(b)) => a == b,
            (Value::Number(a), Value::Number(b)) => a == b,
            (Value::Integer(a), Value::Number(b)) | (Value::Number(b), Value::Integer(a)) => {
                *a as f64 == *b
            }
            (Value::Text(a), Value::Text(b)) => a == b,
            (Value::List(a), Value::List(b)) => a == b,
            (Value::Error { error: a }, Value::Error { error: b }) => a == b,
            (Value::Map(a), Value::Map(b)) => a == b,
            _ => false,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => f.write_str(""),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Integer(i) => write!(f, "{i}"),
            Value::Number(n) => write!(f, "{n}"),
            Value::Text(s) => f.write_str(s),
            Value::List(items) => {
                let parts: Vec<String> = items.iter().map(ToString::to_string).collect();
                write!(f, "{}", parts.join(", "))
            }
            Value::Error { error } => write!(f, "error: {error}"),
            Value::Map(map) => {
                let parts: Vec<String> = map.iter().map(|(k, v)| format!("{k}: {v}")).collect();
                write!(f, "{{{}}}", parts.join(", "))
            }
        }
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Integer(i)
    }
}

impl From<i32> for Value {
    fn from(i: i32) -> Self {
        Value::Integer(i64::from(i))
    }
}

impl From<usize> for Value {
    fn from(i: usize) -> Self {
        Value::Integer(i as i64)
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Number(n)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Text(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Text(s)
    }
}

impl<T: Into<Value>> From<Vec<T>> for Value {
    fn from(items: Vec<T>) -> Self {
        Value::List(items.into_iter().map(Into::into).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn integers_and_numbers_compare_numerically() {
        assert_eq!(Value::Integer(3), Value::Number(3.0));
        assert_ne!(Value::Integer(3), Value::Number(3.5));
        assert_ne!(Value::Integer(1), Value::Bool(true));
    }

    #[test]
    fn coerce_parses_text() {
        assert_eq!(Value::text(" 4.5 ").coerce(ValueKind::Number), Some(Value::Number(4.5)));
        assert_eq!(Value::text("7").coerce(ValueKind::Integer), Some(Value::Integer(7)));
        assert_eq!(Value::text("False").coerce(ValueKind::Boolean), Some(Value::Bool(false)));
        assert_eq!(Value::text("abc").coerce(ValueKind::Number), None);
        assert_eq!(
            Value::text("1 b").coerce(ValueKind::List),
            Some(Value::List(vec![Value::Number(1.0), Value::text("b")]))
        );
    }

    #[test]
    fn error_sentinel_round_trips_through_json() {
        let v = Value::error("bad domain");
        let json = serde_json::to_string(&v).unwrap();
        assert_eq!(json, r#"{"error":"bad domain"}"#);
        let back: Value = serde_json::from_str(&json).unwrap();
        assert_eq!(back.error_message(), Some("bad domain"));
    }

    #[test]
    fn json_numbers_prefer_integers() {
        let v: Value = serde_json::from_str("[1, 2.5, null, \"x\"]").unwrap();
        let items = v.as_list().unwrap();
        assert!(matches!(items[0], Value::Integer(1)));
        assert!(matches!(items[1], Value::Number(_)));
        assert!(items[2].is_null());
    }
}
