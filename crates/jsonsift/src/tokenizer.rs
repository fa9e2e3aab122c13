//! The incremental, byte-oriented JSON tokenizer.
//!
//! [`Tokenizer`] consumes successive chunks of a logically append-only byte
//! stream and produces one [`Token`] per completed JSON lexical token, with
//! logical byte spans that keep increasing across chunks. Internal state
//! (FSM state, accumulator, in-flight token start) survives between
//! [`Tokenizer::feed`] calls, so a token that begins in one chunk and ends
//! in a later one is emitted exactly once.
//!
//! The hot path performs no steady-state allocation: one preallocated
//! accumulator backs strings, numbers and literals, and short strings
//! resolve through a bounded intern table.
//!
//! The lexer is permissive by design. In the idle state, anything that is
//! not a structural byte, a quote, a digit, a sign or a literal opener is
//! ignored; `{"a": !!! 1}` still tokenizes `a` and `1`. Escape sequences
//! inside strings are expanded at decode time (`\n` becomes a line feed,
//! `\uXXXX` pairs surrogates and falls back to U+FFFD for lone halves);
//! the raw emission mode of the engine is unaffected because it slices
//! source bytes by span, never through decoded text.
//!
//! # Examples
//!
//! ```rust
//! use jsonsift::{Tokenizer, TokenKind};
//!
//! let mut tokenizer = Tokenizer::new();
//! let mut kinds = Vec::new();
//! tokenizer
//!     .feed(br#"{"a": 1}"#, |tok| {
//!         kinds.push(tok.kind);
//!         Ok(())
//!     })
//!     .unwrap();
//! assert_eq!(
//!     kinds,
//!     vec![
//!         TokenKind::LBrace,
//!         TokenKind::String,
//!         TokenKind::Colon,
//!         TokenKind::Number,
//!         TokenKind::RBrace,
//!     ]
//! );
//! ```

use crate::budget::{CancelFlag, POLL_MASK};
use crate::error::{ErrorKind, SiftError};
use crate::escape::{EscapeStep, UnicodeEscapeBuffer};
use crate::intern::InternTable;
use crate::literal::ExpectedLiteral;
use crate::token::{Token, TokenKind};

/// Initial capacity of the token accumulator.
const ACC_CAPACITY: usize = 64 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LexState {
    /// Between tokens.
    Idle,
    /// Inside a string literal.
    Str,
    /// Immediately after a backslash inside a string.
    StrEscape,
    /// Inside the four hex digits of a `\u` escape.
    StrUnicode,
    /// Inside a number.
    Num,
    /// Inside `true` / `false` / `null`.
    Literal,
}

/// What one byte did to the FSM.
enum Step {
    /// Byte consumed, no token completed.
    Consumed,
    /// Byte consumed and a token completed.
    ConsumedToken,
    /// Byte not consumed (re-examine it), no token.
    Unconsumed,
    /// Byte not consumed but a token completed (number termination).
    UnconsumedToken,
}

/// Receiver for the engine-facing push interface.
pub(crate) trait TokenSink {
    fn token(&mut self, token: &Token) -> Result<(), SiftError>;

    /// Invoked at the 32 KiB poll cadence with the current logical offset.
    fn poll(&mut self, pos: u64) -> Result<(), SiftError> {
        let _ = pos;
        Ok(())
    }
}

struct FnSink<F, P> {
    on_token: F,
    budget: P,
}

impl<F, P> TokenSink for FnSink<F, P>
where
    F: FnMut(&Token) -> Result<(), SiftError>,
    P: FnMut(u64) -> Result<(), SiftError>,
{
    fn token(&mut self, token: &Token) -> Result<(), SiftError> {
        (self.on_token)(token)
    }

    fn poll(&mut self, pos: u64) -> Result<(), SiftError> {
        (self.budget)(pos)
    }
}

/// Incremental byte-to-token state machine. See the module docs.
#[derive(Debug)]
pub struct Tokenizer {
    state: LexState,
    /// Logical byte position: total bytes consumed since construction or
    /// the last [`reset`](Self::reset).
    pos: u64,
    /// Start offset of the in-flight token.
    token_start: u64,
    acc: Vec<u8>,
    int_value: u64,
    int_ok: bool,
    literal: Option<ExpectedLiteral>,
    escape: UnicodeEscapeBuffer,
    pending_high: Option<u16>,
    token: Token,
    intern: InternTable,
    cancel: CancelFlag,
}

impl Default for Tokenizer {
    fn default() -> Self {
        Self::new()
    }
}

impl Tokenizer {
    #[must_use]
    pub fn new() -> Self {
        Self::with_cancel(CancelFlag::new())
    }

    /// Creates a tokenizer observing a shared cancellation flag. The flag is
    /// polled every 32 KiB of input; once set, the next poll fails with
    /// [`ErrorKind::Abort`].
    #[must_use]
    pub fn with_cancel(cancel: CancelFlag) -> Self {
        Self {
            state: LexState::Idle,
            pos: 0,
            token_start: 0,
            acc: Vec::with_capacity(ACC_CAPACITY),
            int_value: 0,
            int_ok: false,
            literal: None,
            escape: UnicodeEscapeBuffer::new(),
            pending_high: None,
            token: Token::default(),
            intern: InternTable::new(),
            cancel: CancelFlag::clone(&cancel),
        }
    }

    /// Clears all FSM state; the next chunk is treated as position 0.
    ///
    /// The intern table is a cache, not FSM state, and survives resets.
    pub fn reset(&mut self) {
        self.state = LexState::Idle;
        self.pos = 0;
        self.token_start = 0;
        self.acc.clear();
        self.int_value = 0;
        self.int_ok = false;
        self.literal = None;
        self.escape.reset();
        self.pending_high = None;
        self.token = Token::default();
    }

    /// Current logical byte position.
    #[must_use]
    pub fn position(&self) -> u64 {
        self.pos
    }

    /// Processes one chunk, invoking `on_token` once per completed token
    /// with a reference to the reusable token record. The reference is only
    /// valid for the duration of the call; copy fields before returning.
    ///
    /// A call may consume its whole chunk without producing any token when
    /// every byte belongs to an in-progress string, number or literal.
    pub fn feed<F>(&mut self, chunk: &[u8], on_token: F) -> Result<(), SiftError>
    where
        F: FnMut(&Token) -> Result<(), SiftError>,
    {
        self.feed_with(chunk, on_token, |_| Ok(()))
    }

    /// Like [`feed`](Self::feed), additionally invoking `budget` with the
    /// current logical offset at the 32 KiB poll cadence. An `Err` from
    /// either closure stops processing and is returned as-is.
    pub fn feed_with<F, P>(&mut self, chunk: &[u8], on_token: F, budget: P) -> Result<(), SiftError>
    where
        F: FnMut(&Token) -> Result<(), SiftError>,
        P: FnMut(u64) -> Result<(), SiftError>,
    {
        let mut sink = FnSink { on_token, budget };
        self.feed_sink(chunk, &mut sink)
    }

    pub(crate) fn feed_sink<S: TokenSink>(
        &mut self,
        chunk: &[u8],
        sink: &mut S,
    ) -> Result<(), SiftError> {
        let mut i = 0usize;
        loop {
            let produced = {
                let mut poll = |pos: u64| sink.poll(pos);
                self.advance(chunk, &mut i, &mut poll)?
            };
            if !produced {
                return Ok(());
            }
            sink.token(&self.token)?;
        }
    }

    /// Lazy pull-style sequence of tokens over one chunk. Each item is a
    /// freshly materialized [`Token`].
    pub fn tokens<'t, 'c>(&'t mut self, chunk: &'c [u8]) -> Tokens<'t, 'c> {
        Tokens {
            tokenizer: self,
            chunk,
            i: 0,
            failed: false,
        }
    }

    /// Terminates the stream: an in-flight number is completed and emitted,
    /// an unterminated string or literal is discarded without emission, and
    /// a zero-width [`TokenKind::Eof`] token closes the sequence.
    pub fn finish<F>(&mut self, mut on_token: F) -> Result<(), SiftError>
    where
        F: FnMut(&Token) -> Result<(), SiftError>,
    {
        if matches!(self.state, LexState::Num) {
            let value = self.take_number();
            self.token.set_number(self.token_start, self.pos, value);
            on_token(&self.token)?;
        }
        self.state = LexState::Idle;
        self.acc.clear();
        self.literal = None;
        self.pending_high = None;
        self.escape.reset();
        self.token.set_eof(self.pos);
        on_token(&self.token)
    }

    pub(crate) fn finish_sink<S: TokenSink>(&mut self, sink: &mut S) -> Result<(), SiftError> {
        self.finish(|tok| sink.token(tok))
    }

    /// `(in_string, escaped)` view of the FSM for seeding the skip
    /// fast-path scanner.
    pub(crate) fn string_state(&self) -> (bool, bool) {
        match self.state {
            LexState::Str | LexState::StrUnicode => (true, false),
            LexState::StrEscape => (true, true),
            _ => (false, false),
        }
    }

    /// Re-synchronizes after the skip fast path consumed `consumed` bytes
    /// directly. Skipped token content is discarded; the FSM resumes in the
    /// scanner's final string state.
    pub(crate) fn skip_resync(&mut self, consumed: u64, in_string: bool, escaped: bool) {
        self.pos += consumed;
        self.acc.clear();
        self.literal = None;
        self.pending_high = None;
        self.escape.reset();
        self.state = match (in_string, escaped) {
            (true, true) => LexState::StrEscape,
            (true, false) => LexState::Str,
            _ => LexState::Idle,
        };
        self.token_start = self.pos;
    }

    /// Drives the FSM until one token completes (leaving it in the reusable
    /// record) or the chunk is exhausted.
    fn advance(
        &mut self,
        chunk: &[u8],
        i: &mut usize,
        poll: &mut dyn FnMut(u64) -> Result<(), SiftError>,
    ) -> Result<bool, SiftError> {
        while *i < chunk.len() {
            if self.pos & POLL_MASK == 0 {
                self.cancel.check(self.pos)?;
                poll(self.pos)?;
            }

            // Bulk path for string content: copy everything up to the next
            // quote or backslash in one pass, capped at the poll cadence.
            if matches!(self.state, LexState::Str) {
                let rest = &chunk[*i..];
                let cap = usize::try_from(POLL_MASK + 1 - (self.pos & POLL_MASK))
                    .unwrap_or(usize::MAX)
                    .min(rest.len());
                let stop = memchr::memchr2(b'"', b'\\', &rest[..cap]).unwrap_or(cap);
                if stop > 0 {
                    self.flush_pending_high();
                    self.acc.extend_from_slice(&rest[..stop]);
                    self.pos += stop as u64;
                    *i += stop;
                    continue;
                }
            }

            match self.step(chunk[*i])? {
                Step::Consumed => *i += 1,
                Step::ConsumedToken => {
                    *i += 1;
                    return Ok(true);
                }
                Step::Unconsumed => {}
                Step::UnconsumedToken => return Ok(true),
            }
        }
        Ok(false)
    }

    fn step(&mut self, b: u8) -> Result<Step, SiftError> {
        match self.state {
            LexState::Idle => Ok(self.step_idle(b)),
            LexState::Str => Ok(self.step_str(b)),
            LexState::StrEscape => Ok(self.step_str_escape(b)),
            LexState::StrUnicode => Ok(self.step_str_unicode(b)),
            LexState::Num => Ok(self.step_num(b)),
            LexState::Literal => self.step_literal(b),
        }
    }

    fn step_idle(&mut self, b: u8) -> Step {
        let structural = match b {
            b'{' => Some(TokenKind::LBrace),
            b'}' => Some(TokenKind::RBrace),
            b'[' => Some(TokenKind::LBracket),
            b']' => Some(TokenKind::RBracket),
            b':' => Some(TokenKind::Colon),
            b',' => Some(TokenKind::Comma),
            _ => None,
        };
        if let Some(kind) = structural {
            self.token.set_structural(kind, self.pos);
            self.pos += 1;
            return Step::ConsumedToken;
        }
        match b {
            b'"' => {
                self.token_start = self.pos;
                self.acc.clear();
                self.state = LexState::Str;
            }
            b't' | b'f' | b'n' => {
                self.literal = ExpectedLiteral::for_byte(b);
                self.token_start = self.pos;
                self.acc.clear();
                self.acc.push(b);
                self.state = LexState::Literal;
            }
            b'-' => {
                self.token_start = self.pos;
                self.acc.clear();
                self.acc.push(b);
                self.int_value = 0;
                self.int_ok = false;
                self.state = LexState::Num;
            }
            b'0'..=b'9' => {
                self.token_start = self.pos;
                self.acc.clear();
                self.acc.push(b);
                self.int_value = u64::from(b - b'0');
                self.int_ok = true;
                self.state = LexState::Num;
            }
            // Whitespace and anything else between tokens is ignored.
            _ => {}
        }
        self.pos += 1;
        Step::Consumed
    }

    fn step_str(&mut self, b: u8) -> Step {
        match b {
            b'"' => {
                self.flush_pending_high();
                let text = self.intern.resolve(&self.acc);
                self.token.set_string(self.token_start, self.pos + 1, text);
                self.acc.clear();
                self.state = LexState::Idle;
                self.pos += 1;
                Step::ConsumedToken
            }
            b'\\' => {
                self.state = LexState::StrEscape;
                self.pos += 1;
                Step::Consumed
            }
            _ => {
                self.flush_pending_high();
                self.acc.push(b);
                self.pos += 1;
                Step::Consumed
            }
        }
    }

    fn step_str_escape(&mut self, b: u8) -> Step {
        if b == b'u' {
            self.escape.reset();
            self.state = LexState::StrUnicode;
            self.pos += 1;
            return Step::Consumed;
        }
        self.flush_pending_high();
        match b {
            b'b' => self.acc.push(0x08),
            b'f' => self.acc.push(0x0C),
            b'n' => self.acc.push(b'\n'),
            b'r' => self.acc.push(b'\r'),
            b't' => self.acc.push(b'\t'),
            // `\"`, `\\`, `\/` and, permissively, any unknown escape: the
            // body byte stands for itself.
            _ => self.acc.push(b),
        }
        self.state = LexState::Str;
        self.pos += 1;
        Step::Consumed
    }

    fn step_str_unicode(&mut self, b: u8) -> Step {
        match self.escape.feed(b) {
            EscapeStep::NeedMore => {
                self.pos += 1;
                Step::Consumed
            }
            EscapeStep::Unit(unit) => {
                self.pos += 1;
                self.state = LexState::Str;
                self.push_code_unit(unit);
                Step::Consumed
            }
            EscapeStep::Invalid => {
                // Abandon the malformed escape and re-examine the byte as
                // plain string content.
                self.flush_pending_high();
                self.push_char(char::REPLACEMENT_CHARACTER);
                self.escape.reset();
                self.state = LexState::Str;
                Step::Unconsumed
            }
        }
    }

    fn step_num(&mut self, b: u8) -> Step {
        match b {
            b'0'..=b'9' => {
                self.acc.push(b);
                if self.int_ok {
                    if self.int_value > (u64::MAX - 9) / 10 {
                        self.int_ok = false;
                    } else {
                        self.int_value = self.int_value * 10 + u64::from(b - b'0');
                    }
                }
                self.pos += 1;
                Step::Consumed
            }
            b'.' | b'e' | b'E' | b'+' | b'-' => {
                self.acc.push(b);
                self.int_ok = false;
                self.pos += 1;
                Step::Consumed
            }
            _ => {
                // The terminating byte is re-examined by the idle state.
                let value = self.take_number();
                self.token.set_number(self.token_start, self.pos, value);
                self.state = LexState::Idle;
                Step::UnconsumedToken
            }
        }
    }

    fn step_literal(&mut self, b: u8) -> Result<Step, SiftError> {
        let Some(lit) = self.literal else {
            self.state = LexState::Idle;
            return Ok(Step::Unconsumed);
        };
        self.acc.push(b);
        self.pos += 1;
        if self.acc.len() < lit.target_len() {
            return Ok(Step::Consumed);
        }
        if lit.matches(&self.acc) {
            self.token
                .set_literal(lit.kind(), self.token_start, self.pos);
            self.acc.clear();
            self.literal = None;
            self.state = LexState::Idle;
            Ok(Step::ConsumedToken)
        } else {
            Err(SiftError::new(
                ErrorKind::InvalidLiteral,
                format!("expected `{}`", lit.spelling()),
                self.token_start,
            ))
        }
    }

    fn take_number(&mut self) -> f64 {
        #[allow(clippy::cast_precision_loss)]
        let value = if self.int_ok {
            self.int_value as f64
        } else {
            // Permissive number grammar: a malformed accumulation parses
            // best-effort and bottoms out at 0.0.
            std::str::from_utf8(&self.acc)
                .ok()
                .and_then(|s| s.parse::<f64>().ok())
                .unwrap_or(0.0)
        };
        self.acc.clear();
        self.int_value = 0;
        self.int_ok = false;
        value
    }

    fn push_char(&mut self, c: char) {
        let mut buf = [0u8; 4];
        self.acc.extend_from_slice(c.encode_utf8(&mut buf).as_bytes());
    }

    fn push_code_unit(&mut self, unit: u16) {
        match unit {
            0xD800..=0xDBFF => {
                self.flush_pending_high();
                self.pending_high = Some(unit);
            }
            0xDC00..=0xDFFF => match self.pending_high.take() {
                Some(high) => {
                    let c = 0x10000
                        + ((u32::from(high) - 0xD800) << 10)
                        + (u32::from(unit) - 0xDC00);
                    self.push_char(char::from_u32(c).unwrap_or(char::REPLACEMENT_CHARACTER));
                }
                None => self.push_char(char::REPLACEMENT_CHARACTER),
            },
            _ => {
                self.flush_pending_high();
                self.push_char(char::from_u32(u32::from(unit)).unwrap_or(char::REPLACEMENT_CHARACTER));
            }
        }
    }

    /// A high surrogate not followed by a low surrogate decodes to U+FFFD.
    fn flush_pending_high(&mut self) {
        if self.pending_high.take().is_some() {
            self.push_char(char::REPLACEMENT_CHARACTER);
        }
    }
}

/// Pull-style token sequence over one chunk; see [`Tokenizer::tokens`].
pub struct Tokens<'t, 'c> {
    tokenizer: &'t mut Tokenizer,
    chunk: &'c [u8],
    i: usize,
    failed: bool,
}

impl Iterator for Tokens<'_, '_> {
    type Item = Result<Token, SiftError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed {
            return None;
        }
        let mut noop = |_| Ok(());
        match self.tokenizer.advance(self.chunk, &mut self.i, &mut noop) {
            Ok(true) => Some(Ok(self.tokenizer.token.clone())),
            Ok(false) => None,
            Err(err) => {
                self.failed = true;
                Some(Err(err))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn collect(chunks: &[&[u8]]) -> Vec<Token> {
        let mut tokenizer = Tokenizer::new();
        let mut out = Vec::new();
        for chunk in chunks {
            tokenizer
                .feed(chunk, |tok| {
                    out.push(tok.clone());
                    Ok(())
                })
                .unwrap();
        }
        tokenizer
            .finish(|tok| {
                out.push(tok.clone());
                Ok(())
            })
            .unwrap();
        out
    }

    #[test]
    fn spans_are_monotone_and_non_overlapping() {
        let toks = collect(&[br#"{"a": [1, true, "x"]}"#]);
        let mut prev_end = 0;
        for tok in toks.iter().filter(|t| !t.is_eof()) {
            assert!(tok.start < tok.end, "zero-width {:?}", tok.kind);
            assert!(tok.start >= prev_end);
            prev_end = tok.end;
        }
    }

    #[test]
    fn string_split_across_chunks_emits_once() {
        let toks = collect(&[b"\"hel", b"lo\""]);
        let strings: Vec<_> = toks
            .iter()
            .filter(|t| t.kind == TokenKind::String)
            .collect();
        assert_eq!(strings.len(), 1);
        assert_eq!(strings[0].string.as_deref(), Some("hello"));
        assert_eq!((strings[0].start, strings[0].end), (0, 7));
    }

    #[test]
    fn number_split_across_chunks() {
        let toks = collect(&[b"12", b"3.5,"]);
        assert_eq!(toks[0].kind, TokenKind::Number);
        assert_eq!(toks[0].number, 123.5);
        assert_eq!((toks[0].start, toks[0].end), (0, 5));
        assert_eq!(toks[1].kind, TokenKind::Comma);
    }

    #[test]
    fn escape_split_across_chunks() {
        let toks = collect(&[b"\"a\\", b"nb\""]);
        assert_eq!(toks[0].string.as_deref(), Some("a\nb"));
    }

    #[test]
    fn literal_split_across_chunks() {
        let toks = collect(&[b"tr", b"ue"]);
        assert_eq!(toks[0].kind, TokenKind::True);
        assert_eq!((toks[0].start, toks[0].end), (0, 4));
    }

    #[test]
    fn invalid_literal_fails_at_start_offset() {
        let mut tokenizer = Tokenizer::new();
        let err = tokenizer.feed(b"   truX", |_| Ok(())).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidLiteral);
        assert_eq!(err.offset, 3);
    }

    #[test]
    fn garbage_between_tokens_is_ignored() {
        let toks = collect(&[br#"{"a": !!! 1}"#]);
        let kinds: Vec<_> = toks.iter().map(|t| t.kind).collect();
        assert_eq!(
            kinds,
            vec![
                TokenKind::LBrace,
                TokenKind::String,
                TokenKind::Colon,
                TokenKind::Number,
                TokenKind::RBrace,
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn unicode_escape_decodes() {
        let toks = collect(&[br#""A\u00e9""#]);
        assert_eq!(toks[0].string.as_deref(), Some("A\u{e9}"));
    }

    #[test]
    fn raw_utf8_passes_through() {
        let toks = collect(&[r#""Aé😀""#.as_bytes()]);
        assert_eq!(toks[0].string.as_deref(), Some("Aé😀"));
    }

    #[test]
    fn surrogate_pair_decodes() {
        let toks = collect(&[br#""\ud83d\ude00""#]);
        assert_eq!(toks[0].string.as_deref(), Some("\u{1F600}"));
    }

    #[test]
    fn lone_surrogate_is_replaced() {
        let toks = collect(&[br#""\ud83dx""#]);
        assert_eq!(toks[0].string.as_deref(), Some("\u{FFFD}x"));
    }

    #[test]
    fn unterminated_string_produces_nothing() {
        let toks = collect(&[b"\"never ends"]);
        assert_eq!(toks.len(), 1);
        assert!(toks[0].is_eof());
    }

    #[test]
    fn trailing_number_emitted_at_finish() {
        let toks = collect(&[b"42"]);
        assert_eq!(toks[0].kind, TokenKind::Number);
        assert_eq!(toks[0].number, 42.0);
        assert_eq!((toks[0].start, toks[0].end), (0, 2));
    }

    #[test]
    fn integer_fast_path_matches_general_parse() {
        for input in ["0", "7", "123456789", "184467440737095516150"] {
            let toks = collect(&[input.as_bytes()]);
            assert_eq!(toks[0].number, input.parse::<f64>().unwrap(), "{input}");
        }
    }

    #[test]
    fn iterator_form_materializes_tokens() {
        let mut tokenizer = Tokenizer::new();
        let toks: Result<Vec<_>, _> = tokenizer.tokens(br#"[null]"#).collect();
        let toks = toks.unwrap();
        assert_eq!(toks.len(), 3);
        assert_eq!(toks[1].kind, TokenKind::Null);
    }

    #[test]
    fn cancellation_observed_at_poll() {
        let cancel = CancelFlag::new();
        let mut tokenizer = Tokenizer::with_cancel(cancel.clone());
        cancel.cancel();
        let err = tokenizer.feed(b"{}", |_| Ok(())).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Abort);
    }

    #[test]
    fn reset_restores_position_zero() {
        let mut tokenizer = Tokenizer::new();
        tokenizer.feed(b"{\"part", |_| Ok(())).unwrap();
        tokenizer.reset();
        let mut first = None;
        tokenizer
            .feed(b"7,", |tok| {
                first.get_or_insert(tok.clone());
                Ok(())
            })
            .unwrap();
        assert_eq!(first.unwrap().start, 0);
    }
}
