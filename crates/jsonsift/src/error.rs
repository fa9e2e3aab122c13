//! Error type shared by the tokenizer, the projection engine and the
//! line-oriented drivers.
//!
//! Every failure carries a machine-readable [`ErrorKind`], a human-readable
//! message, and the logical byte offset at which it was detected. Drivers
//! that work line by line additionally attach the 1-based line number.

use core::fmt;

/// Machine-readable failure categories.
///
/// [`ErrorKind::code`] yields the stable string form used in diagnostics and
/// by the command line tool.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// A `t`/`f`/`n` run did not spell `true`, `false` or `null`.
    InvalidLiteral,
    /// The selection string violates the query grammar.
    InvalidQuery,
    /// A structure end did not match the open container kind.
    StructuralMismatch,
    /// The cooperative cancellation flag was observed set.
    Abort,
    /// More matches were produced than `Budget::max_matches` allows.
    MatchBudget,
    /// More bytes were processed than `Budget::max_bytes` allows.
    ByteBudget,
    /// Wall-clock time exceeded `Budget::max_duration`.
    DurationBudget,
    /// Nesting exceeded `FanoutLimits::max_depth`.
    FanoutDepth,
    /// An array grew past `FanoutLimits::max_array_len`.
    FanoutArraySize,
    /// An object grew past `FanoutLimits::max_object_keys`.
    FanoutObjectKeys,
    /// An NDJSON line exceeded the configured cap.
    LineTooLong,
    /// An I/O failure in a driver layer.
    Io,
}

impl ErrorKind {
    /// Stable machine-readable code for this kind.
    #[must_use]
    pub fn code(self) -> &'static str {
        match self {
            ErrorKind::InvalidLiteral => "ERR_INVALID_LITERAL",
            ErrorKind::InvalidQuery => "ERR_INVALID_QUERY",
            ErrorKind::StructuralMismatch => "ERR_STRUCTURE",
            ErrorKind::Abort => "ERR_ABORT",
            ErrorKind::MatchBudget => "ERR_BUDGET_MATCHES",
            ErrorKind::ByteBudget => "ERR_BUDGET_BYTES",
            ErrorKind::DurationBudget => "ERR_BUDGET_DURATION",
            ErrorKind::FanoutDepth => "ERR_FANOUT_DEPTH",
            ErrorKind::FanoutArraySize => "ERR_FANOUT_ARRAY_SIZE",
            ErrorKind::FanoutObjectKeys => "ERR_FANOUT_OBJECT_KEYS",
            ErrorKind::LineTooLong => "ERR_LINE_TOO_LONG",
            ErrorKind::Io => "ERR_IO",
        }
    }

    /// Whether this kind is a controlled termination: everything emitted
    /// before the failure remains valid and the last-known result stays
    /// observable.
    #[must_use]
    pub fn is_controlled(self) -> bool {
        matches!(
            self,
            ErrorKind::Abort
                | ErrorKind::MatchBudget
                | ErrorKind::ByteBudget
                | ErrorKind::DurationBudget
                | ErrorKind::FanoutDepth
                | ErrorKind::FanoutArraySize
                | ErrorKind::FanoutObjectKeys
                | ErrorKind::LineTooLong
        )
    }
}

/// Error produced anywhere in the projection pipeline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SiftError {
    kind: ErrorKind,
    msg: String,
    /// Logical byte offset at which the failure was detected.
    pub offset: u64,
    /// 1-based line number, attached by line-oriented drivers.
    pub line: Option<u64>,
}

impl SiftError {
    pub(crate) fn new(kind: ErrorKind, msg: impl Into<String>, offset: u64) -> Self {
        Self {
            kind,
            msg: msg.into(),
            offset,
            line: None,
        }
    }

    /// The failure category.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    /// Attaches a 1-based line number (used by the NDJSON driver).
    #[must_use]
    pub fn with_line(mut self, line: u64) -> Self {
        self.line = Some(line);
        self
    }
}

impl fmt::Display for SiftError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {} at byte {}", self.kind.code(), self.msg, self.offset)?;
        if let Some(line) = self.line {
            write!(f, " (line {line})")?;
        }
        Ok(())
    }
}

impl std::error::Error for SiftError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_includes_code_and_offset() {
        let err = SiftError::new(ErrorKind::InvalidLiteral, "expected `true`", 17);
        assert_eq!(
            err.to_string(),
            "ERR_INVALID_LITERAL: expected `true` at byte 17"
        );
    }

    #[test]
    fn line_suffix() {
        let err = SiftError::new(ErrorKind::LineTooLong, "line exceeds cap", 0).with_line(4);
        assert!(err.to_string().ends_with("(line 4)"));
    }

    #[test]
    fn controlled_kinds() {
        assert!(ErrorKind::Abort.is_controlled());
        assert!(ErrorKind::FanoutDepth.is_controlled());
        assert!(!ErrorKind::InvalidLiteral.is_controlled());
        assert!(!ErrorKind::InvalidQuery.is_controlled());
    }
}
