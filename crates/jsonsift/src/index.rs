//! Indexed-access sidecar for repeated queries over one immutable buffer.
//!
//! A preprocessing pass maps every root-level object key to the byte offset
//! of its following colon. A query whose selection only needs keys deep
//! into the buffer can then start the engine at the earliest requested
//! key instead of at byte zero. This is purely an optimization:
//! correctness never depends on it, and the index must be discarded
//! whenever the buffer identity changes.
//!
//! The engine is primed as if the root object's opening brace had already
//! been consumed, and input starts at the requested key's opening quote.
//! Anchoring at the key itself (rather than backing off a fixed distance)
//! keeps the mid-buffer start from landing inside a preceding value.

use std::collections::HashMap;
use std::rc::Rc;

use crate::engine::ProjectionEngine;
use crate::error::SiftError;
use crate::selection::Selection;
use crate::sink::Sink;
use crate::token::TokenKind;
use crate::tokenizer::Tokenizer;

/// Offsets of one root-level key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct KeySpan {
    /// Offset of the key's opening quote.
    key_start: u64,
    /// Offset of the colon following the key.
    colon: u64,
}

/// Map from root-level object key to its byte offsets.
#[derive(Debug, Default)]
pub struct RootIndex {
    offsets: HashMap<String, KeySpan>,
}

impl RootIndex {
    /// Scans `buf` once and records every root-level key. Best-effort: a
    /// tokenization failure ends the scan with whatever was collected.
    #[must_use]
    pub fn build(buf: &[u8]) -> Self {
        let mut tokenizer = Tokenizer::new();
        let mut offsets = HashMap::new();
        let mut depth = 0u64;
        let mut last_key: Option<(Rc<str>, u64)> = None;
        let _ = tokenizer.feed(buf, |tok| {
            match tok.kind {
                TokenKind::LBrace | TokenKind::LBracket => {
                    depth += 1;
                    last_key = None;
                }
                TokenKind::RBrace | TokenKind::RBracket => {
                    depth = depth.saturating_sub(1);
                    last_key = None;
                }
                TokenKind::String if depth == 1 => {
                    last_key = tok.string.clone().map(|s| (s, tok.start));
                }
                TokenKind::Colon if depth == 1 => {
                    if let Some((key, key_start)) = last_key.take() {
                        offsets.entry(key.to_string()).or_insert(KeySpan {
                            key_start,
                            colon: tok.start,
                        });
                    }
                }
                TokenKind::Comma if depth == 1 => {
                    last_key = None;
                }
                _ => {}
            }
            Ok(())
        });
        Self { offsets }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.offsets.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.offsets.is_empty()
    }

    /// Colon offset of one root key.
    #[must_use]
    pub fn offset_of(&self, key: &str) -> Option<u64> {
        self.offsets.get(key).map(|span| span.colon)
    }

    /// Where an engine should start for `selection`: the opening quote of
    /// the earliest requested key, or 0 when any requested key is unknown
    /// to the index (a full scan is then required anyway).
    #[must_use]
    pub fn start_offset(&self, selection: &Selection) -> u64 {
        let mut min = None;
        for (key, _) in selection.iter() {
            match self.offsets.get(key.as_str()) {
                None => return 0,
                Some(span) => {
                    min = Some(min.map_or(span.key_start, |m: u64| m.min(span.key_start)));
                }
            }
        }
        min.unwrap_or(0)
    }
}

/// Executes `engine` over `buf`, starting at the offset the index suggests
/// for the engine's selection. Falls back to a plain
/// [`execute`](ProjectionEngine::execute) when the index offers no useful
/// starting point.
pub fn execute_indexed<S: Sink>(
    engine: &mut ProjectionEngine<'_, S>,
    index: &RootIndex,
    buf: &[u8],
) -> Result<(), SiftError> {
    let start = index.start_offset(engine.selection());
    if start == 0 {
        return engine.execute(buf);
    }
    let start = usize::try_from(start).unwrap_or(buf.len()).min(buf.len());
    engine.prime_root_object();
    engine.execute(&buf[start..])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::options::EngineOptions;
    use crate::query::parse_query;
    use crate::sink::Collector;

    const DOC: &[u8] =
        br#"{"alpha":{"deep":[1,2,3]},"beta":"value","gamma":{"g":1},"delta":4}"#;

    #[test]
    fn index_records_root_keys_only() {
        let index = RootIndex::build(DOC);
        assert_eq!(index.len(), 4);
        assert_eq!(index.offset_of("alpha"), Some(8));
        assert!(index.offset_of("deep").is_none());
        assert!(index.offset_of("g").is_none());
    }

    #[test]
    fn start_offset_is_the_earliest_requested_key() {
        let index = RootIndex::build(DOC);
        let sel = parse_query("{ gamma, delta }").unwrap();
        let start = index.start_offset(&sel);
        assert!(start > 0);
        assert!(DOC[start as usize..].starts_with(b"\"gamma\""));
        // Unknown keys force a full scan.
        let sel = parse_query("{ missing, delta }").unwrap();
        assert_eq!(index.start_offset(&sel), 0);
    }

    #[test]
    fn indexed_execution_matches_plain_execution() {
        let index = RootIndex::build(DOC);
        for query in ["{ delta }", "{ gamma { g } }", "{ beta, delta }"] {
            let selection = parse_query(query).unwrap();

            let mut plain =
                ProjectionEngine::new(&selection, Collector::new(), EngineOptions::default());
            plain.execute(DOC).unwrap();
            let expected = plain.take_result();
            assert!(expected.is_some());

            let mut indexed =
                ProjectionEngine::new(&selection, Collector::new(), EngineOptions::default());
            execute_indexed(&mut indexed, &index, DOC).unwrap();
            assert_eq!(indexed.take_result(), expected, "{query}");
        }
    }
}
