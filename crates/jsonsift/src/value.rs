//! JSON value types and serialization helpers.
//!
//! This module defines the [`Value`] enum, which represents any valid JSON
//! value, plus the escape-aware writers used by the engine and the command
//! line tool. Objects preserve source key order (`IndexMap`), which is what
//! makes projection output line up with input order.

use indexmap::IndexMap;

/// Insertion-ordered JSON object.
pub type Map = IndexMap<String, Value>;
/// JSON array.
pub type Array = Vec<Value>;

/// A JSON value as defined by [RFC 8259].
///
/// # Examples
///
/// ```
/// use jsonsift::{Map, Value};
///
/// let mut map = Map::new();
/// map.insert("key".to_string(), Value::String("value".into()));
/// let v = Value::Object(map);
/// assert_eq!(v.to_string(), r#"{"key":"value"}"#);
/// ```
///
/// [RFC 8259]: https://datatracker.ietf.org/doc/html/rfc8259
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Clone, Debug, PartialEq)]
pub enum Value {
    Null,
    Boolean(bool),
    Number(f64),
    String(String),
    Array(Array),
    Object(Map),
}

impl Default for Value {
    fn default() -> Self {
        Self::Null
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Self::Boolean(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Self::Number(v)
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Self::String(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Self::String(v.to_string())
    }
}

impl From<Array> for Value {
    fn from(v: Array) -> Self {
        Self::Array(v)
    }
}

impl From<Map> for Value {
    fn from(v: Map) -> Self {
        Self::Object(v)
    }
}

impl Value {
    /// Returns `true` if the value is [`Null`](Value::Null).
    #[must_use]
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Returns `true` if the value is a string.
    #[must_use]
    pub fn is_string(&self) -> bool {
        matches!(self, Self::String(..))
    }

    /// Returns `true` if the value is an array.
    #[must_use]
    pub fn is_array(&self) -> bool {
        matches!(self, Self::Array(..))
    }

    /// Returns `true` if the value is an object.
    #[must_use]
    pub fn is_object(&self) -> bool {
        matches!(self, Self::Object(..))
    }

    /// Serializes with two-space indentation.
    #[must_use]
    pub fn to_pretty_string(&self) -> String {
        let mut out = String::new();
        write_pretty(self, &mut out, 0).expect("fmt to String cannot fail");
        out
    }
}

/// Escapes a string for inclusion in a JSON string literal.
///
/// Quotes, backslashes and control characters become their JSON escape
/// sequences; everything else is written as-is.
pub(crate) fn write_escaped_string<W: core::fmt::Write>(src: &str, f: &mut W) -> core::fmt::Result {
    for c in src.chars() {
        match c {
            '"' => f.write_str("\\\"")?,
            '\\' => f.write_str("\\\\")?,
            '\u{0008}' => f.write_str("\\b")?,
            '\u{000C}' => f.write_str("\\f")?,
            '\n' => f.write_str("\\n")?,
            '\r' => f.write_str("\\r")?,
            '\t' => f.write_str("\\t")?,
            c if (c as u32) < 0x20 => write!(f, "\\u{:04X}", c as u32)?,
            _ => f.write_char(c)?,
        }
    }
    Ok(())
}

fn write_number<W: core::fmt::Write>(n: f64, f: &mut W) -> core::fmt::Result {
    if n.is_finite() {
        write!(f, "{n}")
    } else {
        // JSON has no NaN/Infinity.
        f.write_str("null")
    }
}

impl core::fmt::Display for Value {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Value::Null => f.write_str("null"),
            Value::Boolean(b) => f.write_str(if *b { "true" } else { "false" }),
            Value::Number(n) => write_number(*n, f),
            Value::String(s) => {
                f.write_str("\"")?;
                write_escaped_string(s, f)?;
                f.write_str("\"")
            }
            Value::Array(arr) => {
                f.write_str("[")?;
                let mut first = true;
                for v in arr {
                    if !first {
                        f.write_str(",")?;
                    }
                    first = false;
                    write!(f, "{v}")?;
                }
                f.write_str("]")
            }
            Value::Object(map) => {
                f.write_str("{")?;
                let mut first = true;
                for (k, v) in map {
                    if !first {
                        f.write_str(",")?;
                    }
                    first = false;
                    f.write_str("\"")?;
                    write_escaped_string(k, f)?;
                    write!(f, "\":{v}")?;
                }
                f.write_str("}")
            }
        }
    }
}

fn write_pretty<W: core::fmt::Write>(v: &Value, f: &mut W, indent: usize) -> core::fmt::Result {
    const STEP: usize = 2;
    match v {
        Value::Array(arr) if !arr.is_empty() => {
            f.write_str("[\n")?;
            let inner = indent + STEP;
            for (i, item) in arr.iter().enumerate() {
                if i > 0 {
                    f.write_str(",\n")?;
                }
                write!(f, "{:inner$}", "")?;
                write_pretty(item, f, inner)?;
            }
            write!(f, "\n{:indent$}]", "")
        }
        Value::Object(map) if !map.is_empty() => {
            f.write_str("{\n")?;
            let inner = indent + STEP;
            for (i, (k, item)) in map.iter().enumerate() {
                if i > 0 {
                    f.write_str(",\n")?;
                }
                write!(f, "{:inner$}\"", "")?;
                write_escaped_string(k, f)?;
                f.write_str("\": ")?;
                write_pretty(item, f, inner)?;
            }
            write!(f, "\n{:indent$}}}", "")
        }
        other => write!(f, "{other}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn compact_object_preserves_insertion_order() {
        let mut map = Map::new();
        map.insert("id".into(), Value::Number(1.0));
        map.insert("name".into(), Value::String("Leanne Graham".into()));
        map.insert("email".into(), Value::String("e@x".into()));
        assert_eq!(
            Value::Object(map).to_string(),
            r#"{"id":1,"name":"Leanne Graham","email":"e@x"}"#
        );
    }

    #[test]
    fn integral_numbers_print_without_fraction() {
        assert_eq!(Value::Number(1.0).to_string(), "1");
        assert_eq!(Value::Number(3.25).to_string(), "3.25");
        assert_eq!(Value::Number(-0.5).to_string(), "-0.5");
    }

    #[test]
    fn strings_are_escaped() {
        assert_eq!(
            Value::String("a\"b\\c\n".into()).to_string(),
            r#""a\"b\\c\n""#
        );
        assert_eq!(Value::String("\u{1}".into()).to_string(), r#""\u0001""#);
    }

    #[test]
    fn non_finite_numbers_serialize_as_null() {
        assert_eq!(Value::Number(f64::NAN).to_string(), "null");
        assert_eq!(Value::Number(f64::INFINITY).to_string(), "null");
    }

    #[test]
    fn pretty_writer_indents() {
        let mut inner = Map::new();
        inner.insert("b".into(), Value::Array(vec![Value::Number(1.0)]));
        let mut map = Map::new();
        map.insert("a".into(), Value::Object(inner));
        map.insert("empty".into(), Value::Object(Map::new()));
        let pretty = Value::Object(map).to_pretty_string();
        assert_eq!(
            pretty,
            "{\n  \"a\": {\n    \"b\": [\n      1\n    ]\n  },\n  \"empty\": {}\n}"
        );
    }
}
