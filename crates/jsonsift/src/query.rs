//! Parser for the textual selection grammar.
//!
//! ```text
//! query      := '{' field_list '}' | field_list
//! field_list := field ( ',' field )*
//! field      := [ alias_name ':' ] source_key ( '@' directive )* [ '{' field_list '}' ]
//! directive  := name [ '(' arg_list ')' ]
//! arg_list   := arg ( ',' arg )*
//! arg        := name ':' ( string | number | true | false | identifier )
//! ```
//!
//! Identifiers are `[A-Za-z_][A-Za-z0-9_]*`; keys may also be written as
//! double-quoted strings. Whitespace is insignificant. A grammar violation
//! fails with [`ErrorKind::InvalidQuery`] before any input byte is
//! processed.

use crate::directive::{Directive, DirectiveArg};
use crate::error::{ErrorKind, SiftError};
use crate::selection::{Selection, SelectionNode};

/// Parses a selection string into a [`Selection`] tree.
///
/// # Examples
///
/// ```
/// use jsonsift::parse_query;
///
/// let sel = parse_query("{ id, contact: email @substring(start:0, len:5) }").unwrap();
/// assert!(sel.get("id").is_some());
/// assert_eq!(sel.get("email").unwrap().alias(), Some("contact"));
/// ```
pub fn parse_query(input: &str) -> Result<Selection, SiftError> {
    let mut parser = QueryParser {
        bytes: input.as_bytes(),
        pos: 0,
    };
    parser.skip_ws();
    let braced = parser.eat(b'{');
    let selection = parser.field_list(braced)?;
    if braced {
        parser.expect(b'}')?;
    } else if selection.is_empty() {
        return Err(parser.error("empty query"));
    }
    parser.skip_ws();
    if parser.pos < parser.bytes.len() {
        return Err(parser.error("unexpected trailing input"));
    }
    Ok(selection)
}

struct QueryParser<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl QueryParser<'_> {
    fn error(&self, msg: impl Into<String>) -> SiftError {
        SiftError::new(ErrorKind::InvalidQuery, msg, self.pos as u64)
    }

    fn skip_ws(&mut self) {
        while self
            .bytes
            .get(self.pos)
            .is_some_and(u8::is_ascii_whitespace)
        {
            self.pos += 1;
        }
    }

    fn peek(&self) -> Option<u8> {
        self.bytes.get(self.pos).copied()
    }

    /// Consumes `b` if it is next (after whitespace).
    fn eat(&mut self, b: u8) -> bool {
        self.skip_ws();
        if self.peek() == Some(b) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expect(&mut self, b: u8) -> Result<(), SiftError> {
        if self.eat(b) {
            Ok(())
        } else {
            Err(self.error(format!("expected `{}`", b as char)))
        }
    }

    /// `field_list` terminated by `}` (when braced) or end of input.
    fn field_list(&mut self, braced: bool) -> Result<Selection, SiftError> {
        let mut selection = Selection::new();
        loop {
            self.skip_ws();
            match self.peek() {
                None if braced => return Err(self.error("unterminated `{`")),
                None => break,
                Some(b'}') if braced => break,
                Some(_) => {}
            }
            let (key, node) = self.field()?;
            selection.insert(key, node);
            if !self.eat(b',') {
                break;
            }
        }
        Ok(selection)
    }

    fn field(&mut self) -> Result<(String, SelectionNode), SiftError> {
        let first = self.name()?;
        let (mut alias, key) = if self.eat(b':') {
            (Some(first), self.name()?)
        } else {
            (None, first)
        };

        let mut directives = Vec::new();
        while self.eat(b'@') {
            directives.push(self.directive()?);
        }
        // `@alias(name: x)` is an alternative spelling; the grammar form
        // wins when both are present.
        if alias.is_none() {
            alias = directives
                .iter()
                .find(|d| d.name == "alias")
                .and_then(|d| d.args.iter().find(|(n, _)| n == "name"))
                .and_then(|(_, v)| match v {
                    DirectiveArg::String(s) | DirectiveArg::Ident(s) => Some(s.clone()),
                    _ => None,
                });
        }

        let children = if self.eat(b'{') {
            let nested = self.field_list(true)?;
            self.expect(b'}')?;
            Some(nested)
        } else {
            None
        };

        let node = if alias.is_none() && children.is_none() && directives.is_empty() {
            SelectionNode::Leaf
        } else {
            SelectionNode::Node {
                alias,
                children,
                directives,
            }
        };
        Ok((key, node))
    }

    fn directive(&mut self) -> Result<Directive, SiftError> {
        let name = self.ident()?;
        let mut directive = Directive::new(name);
        if self.eat(b'(') {
            loop {
                let arg_name = self.ident()?;
                self.expect(b':')?;
                let value = self.arg_value()?;
                directive = directive.with_arg(arg_name, value);
                if !self.eat(b',') {
                    break;
                }
            }
            self.expect(b')')?;
        }
        Ok(directive)
    }

    fn arg_value(&mut self) -> Result<DirectiveArg, SiftError> {
        self.skip_ws();
        match self.peek() {
            Some(b'"') => Ok(DirectiveArg::String(self.string()?)),
            Some(b'-' | b'0'..=b'9') => Ok(DirectiveArg::Number(self.number()?)),
            Some(b) if is_ident_start(b) => {
                let ident = self.ident()?;
                match ident.as_str() {
                    "true" => Ok(DirectiveArg::Bool(true)),
                    "false" => Ok(DirectiveArg::Bool(false)),
                    _ => Ok(DirectiveArg::Ident(ident)),
                }
            }
            _ => Err(self.error("expected argument value")),
        }
    }

    /// A key or alias: an identifier or a double-quoted string.
    fn name(&mut self) -> Result<String, SiftError> {
        self.skip_ws();
        if self.peek() == Some(b'"') {
            self.string()
        } else {
            self.ident()
        }
    }

    fn ident(&mut self) -> Result<String, SiftError> {
        self.skip_ws();
        let start = self.pos;
        if !self.peek().is_some_and(is_ident_start) {
            return Err(self.error("expected identifier"));
        }
        self.pos += 1;
        while self.peek().is_some_and(is_ident_continue) {
            self.pos += 1;
        }
        Ok(String::from_utf8_lossy(&self.bytes[start..self.pos]).into_owned())
    }

    fn string(&mut self) -> Result<String, SiftError> {
        self.skip_ws();
        if self.peek() != Some(b'"') {
            return Err(self.error("expected string"));
        }
        self.pos += 1;
        let mut out = Vec::new();
        loop {
            match self.peek() {
                None => return Err(self.error("unterminated string")),
                Some(b'"') => {
                    self.pos += 1;
                    return Ok(String::from_utf8_lossy(&out).into_owned());
                }
                Some(b'\\') => {
                    self.pos += 1;
                    match self.peek() {
                        None => return Err(self.error("unterminated escape")),
                        Some(b) => {
                            out.push(match b {
                                b'n' => b'\n',
                                b'r' => b'\r',
                                b't' => b'\t',
                                other => other,
                            });
                            self.pos += 1;
                        }
                    }
                }
                Some(b) => {
                    out.push(b);
                    self.pos += 1;
                }
            }
        }
    }

    fn number(&mut self) -> Result<f64, SiftError> {
        self.skip_ws();
        let start = self.pos;
        if self.peek() == Some(b'-') {
            self.pos += 1;
        }
        while self
            .peek()
            .is_some_and(|b| b.is_ascii_digit() || matches!(b, b'.' | b'e' | b'E' | b'+' | b'-'))
        {
            self.pos += 1;
        }
        std::str::from_utf8(&self.bytes[start..self.pos])
            .ok()
            .and_then(|s| s.parse().ok())
            .ok_or_else(|| self.error("invalid number"))
    }
}

fn is_ident_start(b: u8) -> bool {
    b.is_ascii_alphabetic() || b == b'_'
}

fn is_ident_continue(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b'_'
}
