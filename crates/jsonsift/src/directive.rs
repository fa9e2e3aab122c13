//! Terminal value transforms applied on the emission boundary.
//!
//! Directives come from the query (`@coerce(type:"number")`) and run
//! left-to-right over a value just before it is attached to the output.
//! The set is closed; a reference to an unknown name is a documented
//! non-error and behaves as identity. Each directive is O(1) in the size of
//! its value with a hard cap (`substring` copies at most
//! [`MAX_SUBSTRING_LEN`] characters).

use crate::value::Value;

/// Hard cap on the number of characters `substring` will copy.
pub const MAX_SUBSTRING_LEN: usize = 10_000;

/// A directive reference: a name from the closed set plus named arguments.
#[derive(Debug, Clone, PartialEq)]
pub struct Directive {
    pub name: String,
    pub args: Vec<(String, DirectiveArg)>,
}

/// A literal argument value as written in the query.
#[derive(Debug, Clone, PartialEq)]
pub enum DirectiveArg {
    String(String),
    Number(f64),
    Bool(bool),
    Ident(String),
}

impl DirectiveArg {
    /// Textual view for arguments that name things (`type:"number"` and
    /// `type:number` are equivalent).
    fn as_str(&self) -> Option<&str> {
        match self {
            DirectiveArg::String(s) | DirectiveArg::Ident(s) => Some(s),
            _ => None,
        }
    }

    fn as_number(&self) -> Option<f64> {
        match self {
            DirectiveArg::Number(n) => Some(*n),
            _ => None,
        }
    }

    /// The JSON value this argument denotes, for `default`.
    fn to_value(&self) -> Value {
        match self {
            DirectiveArg::String(s) => Value::String(s.clone()),
            DirectiveArg::Number(n) => Value::Number(*n),
            DirectiveArg::Bool(b) => Value::Boolean(*b),
            DirectiveArg::Ident(id) if id == "null" => Value::Null,
            DirectiveArg::Ident(id) => Value::String(id.clone()),
        }
    }
}

impl Directive {
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            args: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_arg(mut self, name: impl Into<String>, value: DirectiveArg) -> Self {
        self.args.push((name.into(), value));
        self
    }

    fn arg(&self, name: &str) -> Option<&DirectiveArg> {
        self.args
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v)
    }

    /// Applies this directive. Non-matching input types pass through
    /// unchanged.
    fn apply(&self, value: Value) -> Value {
        match self.name.as_str() {
            // The alias is consumed by the structure-start / leaf logic as
            // the output key; at transform time it is a no-op.
            "alias" => value,
            "coerce" => self.coerce(value),
            "default" => {
                if value.is_null() {
                    self.arg("value").map_or(Value::Null, DirectiveArg::to_value)
                } else {
                    value
                }
            }
            "formatNumber" => self.format_number(value),
            "substring" => self.substring(value),
            _ => value,
        }
    }

    fn coerce(&self, value: Value) -> Value {
        match self.arg("type").and_then(DirectiveArg::as_str) {
            Some("number") => match value {
                Value::String(s) => match s.trim().parse::<f64>() {
                    Ok(n) => Value::Number(n),
                    Err(_) => Value::String(s),
                },
                Value::Boolean(b) => Value::Number(if b { 1.0 } else { 0.0 }),
                other => other,
            },
            Some("string") => match value {
                Value::Number(n) => Value::String(Value::Number(n).to_string()),
                Value::Boolean(b) => Value::String(if b { "true" } else { "false" }.into()),
                other => other,
            },
            _ => value,
        }
    }

    fn format_number(&self, value: Value) -> Value {
        let Value::Number(n) = value else {
            return value;
        };
        #[allow(clippy::cast_possible_truncation)]
        let decimals = self
            .arg("dec")
            .and_then(DirectiveArg::as_number)
            .unwrap_or(0.0)
            .clamp(0.0, 20.0) as i32;
        let factor = 10f64.powi(decimals);
        Value::Number((n * factor).round() / factor)
    }

    fn substring(&self, value: Value) -> Value {
        let Value::String(s) = value else {
            return value;
        };
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let start = self
            .arg("start")
            .and_then(DirectiveArg::as_number)
            .unwrap_or(0.0)
            .max(0.0) as usize;
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let len = self
            .arg("len")
            .and_then(DirectiveArg::as_number)
            .map_or(MAX_SUBSTRING_LEN, |l| {
                (l.max(0.0) as usize).min(MAX_SUBSTRING_LEN)
            });
        Value::String(s.chars().skip(start).take(len).collect())
    }
}

/// Composes a directive chain left-to-right over `value`.
pub(crate) fn apply_directives(directives: &[Directive], value: Value) -> Value {
    directives.iter().fold(value, |v, d| d.apply(v))
}
