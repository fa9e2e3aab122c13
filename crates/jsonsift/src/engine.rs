//! The projection engine: a selection-driven pushdown automaton over the
//! token stream.
//!
//! The engine keeps four parallel stacks (selection context, result
//! container, container kind, output key) with equal length at all times;
//! depth equals stack length. Each incoming token either records a pending
//! key, attaches a value under the current context, opens or closes a
//! container, or enters *skip mode*, in which an entire unselected subtree
//! is consumed with no stack mutation at all; only `skip_depth` moves.
//!
//! Matches leave through the [`Sink`]: the root object emits once on
//! completion, elements of a root array emit one by one as they close, and
//! a completed root array is stored as the final result without a second
//! emission. In raw mode each emission carries the exact source bytes of
//! the match instead of the materialized value.
//!
//! # Examples
//!
//! ```rust
//! use jsonsift::{Collector, EngineOptions, ProjectionEngine, parse_query};
//!
//! let selection = parse_query("{ id, name }").unwrap();
//! let mut engine = ProjectionEngine::new(&selection, Collector::new(), EngineOptions::default());
//! engine
//!     .execute(br#"{"id": 1, "name": "Leanne", "email": "e@x"}"#)
//!     .unwrap();
//! assert_eq!(
//!     engine.result().unwrap().to_string(),
//!     r#"{"id":1,"name":"Leanne"}"#
//! );
//! ```

use std::rc::Rc;

use crate::budget::{BudgetClock, CancelFlag, POLL_INTERVAL};
use crate::directive::apply_directives;
use crate::error::{ErrorKind, SiftError};
use crate::options::{EmitMode, EngineOptions, FanoutLimits};
use crate::raw::Retained;
use crate::scan::{scan, SkipState};
use crate::selection::{Selection, SelectionNode};
use crate::sink::{Sink, Stats};
use crate::token::{Token, TokenKind};
use crate::tokenizer::{TokenSink, Tokenizer};
use crate::value::{Map, Value};

/// Default window for [`ProjectionEngine::execute_chunked`].
pub const DEFAULT_WINDOW: usize = 64 * 1024;

/// Smallest permitted window for [`ProjectionEngine::execute_chunked`].
pub const MIN_WINDOW: usize = 4 * 1024;

/// Selection context governing one open container.
#[derive(Debug, Clone, Copy)]
struct Ctx<'sel> {
    /// Keys projected inside this container; `None` projects nothing.
    children: Option<&'sel Selection>,
    /// The node that selected this container; `None` only at the root.
    node: Option<&'sel SelectionNode>,
}

/// Per-level bookkeeping for the fan-out guard inside skip mode.
#[derive(Debug, Clone, Copy)]
struct SkipFrame {
    is_array: bool,
    entries: usize,
}

/// Everything but the tokenizer, so the token callback can borrow the
/// engine state while the tokenizer drives it.
struct Core<'sel, S: Sink> {
    root: &'sel Selection,
    sink: S,
    mode: EmitMode,
    fanout: Option<FanoutLimits>,
    clock: BudgetClock,
    cancel: CancelFlag,

    sel: Vec<Ctx<'sel>>,
    results: Vec<Value>,
    kinds: Vec<bool>,
    keys: Vec<Option<String>>,

    pending_key: Option<Rc<str>>,
    skip_depth: u64,
    skip_frames: Vec<SkipFrame>,

    final_output: Option<Value>,
    matched: u64,
    processed: u64,
    skipped_bytes: u64,
    raw_start: Option<u64>,
    retained: Retained,
}

/// One `process_chunk` invocation: the token consumer plus the chunk it is
/// reading from, for raw span assembly.
struct ChunkRun<'r, 'c, 'sel, S: Sink> {
    core: &'r mut Core<'sel, S>,
    chunk: &'c [u8],
    base: u64,
}

impl<S: Sink> TokenSink for ChunkRun<'_, '_, '_, S> {
    fn token(&mut self, token: &Token) -> Result<(), SiftError> {
        self.core.on_token(token, self.chunk, self.base)
    }

    fn poll(&mut self, pos: u64) -> Result<(), SiftError> {
        self.core.clock.check_progress(pos)
    }
}

/// The streaming projection engine. See the module docs.
///
/// One tokenizer and one engine constitute a logical execution; construct
/// a fresh engine per flow (or [`reset`](Self::reset) between flows) and
/// never share one across concurrent flows.
pub struct ProjectionEngine<'sel, S: Sink> {
    tokenizer: Tokenizer,
    core: Core<'sel, S>,
}

impl<'sel, S: Sink> ProjectionEngine<'sel, S> {
    pub fn new(selection: &'sel Selection, sink: S, options: EngineOptions) -> Self {
        Self::with_cancel(selection, sink, options, CancelFlag::new())
    }

    /// Creates an engine observing a caller-owned cancellation flag.
    pub fn with_cancel(
        selection: &'sel Selection,
        sink: S,
        options: EngineOptions,
        cancel: CancelFlag,
    ) -> Self {
        Self {
            tokenizer: Tokenizer::with_cancel(cancel.clone()),
            core: Core {
                root: selection,
                sink,
                mode: options.mode,
                fanout: options.fanout,
                clock: BudgetClock::new(options.budget),
                cancel,
                sel: Vec::with_capacity(16),
                results: Vec::with_capacity(16),
                kinds: Vec::with_capacity(16),
                keys: Vec::with_capacity(16),
                pending_key: None,
                skip_depth: 0,
                skip_frames: Vec::new(),
                final_output: None,
                matched: 0,
                processed: 0,
                skipped_bytes: 0,
                raw_start: None,
                retained: Retained::new(),
            },
        }
    }

    /// A clone of the engine's cancellation flag, for another thread or a
    /// signal handler to set.
    #[must_use]
    pub fn cancel_flag(&self) -> CancelFlag {
        self.core.cancel.clone()
    }

    /// Processes the next contiguous chunk of the stream.
    pub fn process_chunk(&mut self, chunk: &[u8]) -> Result<(), SiftError> {
        let base = self.core.processed;
        self.core.cancel.check(base)?;
        self.core.clock.check_progress(base)?;

        let mut offset = 0usize;
        if self.core.skip_depth > 0 && self.core.fanout.is_none() {
            offset = self.fast_skip(chunk, base)?;
        }
        if offset < chunk.len() {
            let mut run = ChunkRun {
                core: &mut self.core,
                chunk,
                base,
            };
            self.tokenizer.feed_sink(&chunk[offset..], &mut run)?;
        }

        if self.core.mode == EmitMode::Raw {
            // Matches are the root object or depth-1 containers, so the
            // only offset a future emission can still need is the capture
            // start of the match in flight.
            match self.core.raw_start {
                Some(f) => self.core.retained.retain(f, chunk, base),
                None => self.core.retained.clear(),
            }
        }

        self.core.processed += chunk.len() as u64;
        self.core.clock.check_progress(self.core.processed)?;
        Ok(())
    }

    /// Terminates the stream: flushes the tokenizer, delivers final stats
    /// and the drain signal.
    pub fn finish(&mut self) -> Result<(), SiftError> {
        self.end_input()?;
        let stats = self.stats();
        self.core.sink.on_stats(&stats);
        self.core.sink.on_drain();
        Ok(())
    }

    /// Flushes the tokenizer at end of input without delivering stats or
    /// the drain signal. Line drivers end each line this way and drain once
    /// for the whole stream.
    pub(crate) fn end_input(&mut self) -> Result<(), SiftError> {
        let base = self.core.processed;
        let mut run = ChunkRun {
            core: &mut self.core,
            chunk: &[],
            base,
        };
        self.tokenizer.finish_sink(&mut run)
    }

    /// The selection tree this engine projects with.
    #[must_use]
    pub fn selection(&self) -> &'sel Selection {
        self.core.root
    }

    /// Runs a whole buffer as a single chunk and terminates.
    pub fn execute(&mut self, buf: &[u8]) -> Result<(), SiftError> {
        self.process_chunk(buf)?;
        self.finish()
    }

    /// Runs a whole buffer in fixed-size windows (floor [`MIN_WINDOW`]),
    /// re-arming the skip fast path at every window boundary. Output is
    /// identical to [`execute`](Self::execute) for every window size.
    pub fn execute_chunked(&mut self, buf: &[u8], window: usize) -> Result<(), SiftError> {
        let window = window.max(MIN_WINDOW);
        for chunk in buf.chunks(window) {
            self.process_chunk(chunk)?;
        }
        self.finish()
    }

    /// The last-known result: the completed root after a full run, or the
    /// partially built root after a controlled termination.
    #[must_use]
    pub fn result(&self) -> Option<&Value> {
        self.core.final_output.as_ref().or_else(|| self.core.results.first())
    }

    /// Takes the final result out of the engine.
    pub fn take_result(&mut self) -> Option<Value> {
        self.core
            .final_output
            .take()
            .or_else(|| (!self.core.results.is_empty()).then(|| self.core.results.remove(0)))
    }

    /// Telemetry for the execution so far.
    #[must_use]
    pub fn stats(&self) -> Stats {
        let ms = self.core.clock.elapsed().as_secs_f64() * 1000.0;
        #[allow(clippy::cast_precision_loss)]
        let processed = self.core.processed as f64;
        #[allow(clippy::cast_precision_loss)]
        let skipped = self.core.skipped_bytes as f64;
        Stats {
            matched_count: self.core.matched,
            processed_bytes: self.core.processed,
            duration_ms: ms,
            throughput_mbps: if ms > 0.0 {
                (processed / 1e6) / (ms / 1000.0)
            } else {
                0.0
            },
            skip_ratio: if self.core.processed > 0 {
                skipped / processed
            } else {
                0.0
            },
        }
    }

    /// Returns the engine to its initial state for another flow over the
    /// same selection. The wall clock of a duration budget keeps running
    /// from construction.
    pub fn reset(&mut self) {
        self.tokenizer.reset();
        let core = &mut self.core;
        core.sel.clear();
        core.results.clear();
        core.kinds.clear();
        core.keys.clear();
        core.pending_key = None;
        core.skip_depth = 0;
        core.skip_frames.clear();
        core.final_output = None;
        core.matched = 0;
        core.processed = 0;
        core.skipped_bytes = 0;
        core.raw_start = None;
        core.retained.clear();
    }

    /// Access to the sink, e.g. to drain a collector between lines.
    pub fn sink_mut(&mut self) -> &mut S {
        &mut self.core.sink
    }

    /// Consumes the engine, returning its sink.
    pub fn into_sink(self) -> S {
        self.core.sink
    }

    /// Starts the automaton as if the opening brace of a root object had
    /// already been consumed. Used by the indexed-access sidecar to begin
    /// mid-buffer.
    pub(crate) fn prime_root_object(&mut self) {
        let core = &mut self.core;
        core.sel.push(Ctx {
            children: Some(core.root),
            node: None,
        });
        core.results.push(Value::Object(Map::new()));
        core.kinds.push(false);
        core.keys.push(None);
    }

    /// Byte-scans the head of `chunk` while in skip mode, bypassing the
    /// tokenizer, and re-synchronizes the lexer afterwards.
    fn fast_skip(&mut self, chunk: &[u8], base: u64) -> Result<usize, SiftError> {
        let (in_string, escaped) = self.tokenizer.string_state();
        let mut state = SkipState {
            depth: self.core.skip_depth,
            in_string,
            escaped,
        };
        let mut consumed = 0usize;
        while consumed < chunk.len() && state.depth > 0 {
            self.core.cancel.check(base + consumed as u64)?;
            self.core.clock.check_progress(base + consumed as u64)?;
            #[allow(clippy::cast_possible_truncation)]
            let upto = (consumed + POLL_INTERVAL as usize).min(chunk.len());
            consumed += scan(&chunk[consumed..upto], &mut state);
        }
        self.core.skip_depth = state.depth;
        self.core.skipped_bytes += consumed as u64;
        self.tokenizer
            .skip_resync(consumed as u64, state.in_string, state.escaped);
        if state.depth == 0 {
            self.core.pending_key = None;
        }
        Ok(consumed)
    }

}

impl<'sel, S: Sink> Core<'sel, S> {
    fn on_token(&mut self, t: &Token, chunk: &[u8], base: u64) -> Result<(), SiftError> {
        if self.skip_depth > 0 {
            return self.skip_token(t);
        }
        match t.kind {
            TokenKind::LBrace | TokenKind::LBracket => self.structure_start(t),
            TokenKind::RBrace | TokenKind::RBracket => self.structure_end(t, chunk, base),
            TokenKind::String
            | TokenKind::Number
            | TokenKind::True
            | TokenKind::False
            | TokenKind::Null => self.value_token(t),
            TokenKind::Colon | TokenKind::Comma | TokenKind::Eof => Ok(()),
        }
    }

    fn structure_start(&mut self, t: &Token) -> Result<(), SiftError> {
        let is_array = t.kind == TokenKind::LBracket;

        if self.results.is_empty() {
            self.check_depth(1, t.start)?;
            if self.mode == EmitMode::Raw && !is_array {
                self.raw_start = Some(t.start);
            }
            self.push_container(
                Ctx {
                    children: Some(self.root),
                    node: None,
                },
                is_array,
                None,
            );
            self.pending_key = None;
            return Ok(());
        }

        let parent_is_array = *self.kinds.last().expect("aligned stacks");
        if parent_is_array {
            // Elements are projected with the element slot's own rules.
            let ctx = *self.sel.last().expect("aligned stacks");
            self.check_depth(self.results.len() + 1, t.start)?;
            if self.mode == EmitMode::Raw && self.results.len() == 1 {
                self.raw_start = Some(t.start);
            }
            self.push_container(ctx, is_array, None);
            self.pending_key = None;
            return Ok(());
        }

        let Some(key) = self.pending_key.take() else {
            // A container value with no key is not addressable by any
            // selection; skip it wholesale.
            return self.enter_skip(is_array, t);
        };
        let ctx = *self.sel.last().expect("aligned stacks");
        match ctx.children.and_then(|c| c.get(&key)) {
            None => self.enter_skip(is_array, t),
            Some(node) => {
                self.check_depth(self.results.len() + 1, t.start)?;
                let out_key = node.output_key(&key).to_string();
                self.push_container(
                    Ctx {
                        children: node.children(),
                        node: Some(node),
                    },
                    is_array,
                    Some(out_key),
                );
                self.pending_key = None;
                Ok(())
            }
        }
    }

    fn structure_end(&mut self, t: &Token, chunk: &[u8], base: u64) -> Result<(), SiftError> {
        if self.results.is_empty() {
            // Stray close outside any structure; tolerated like any other
            // garbage between values.
            return Ok(());
        }
        let popped_is_array = *self.kinds.last().expect("aligned stacks");
        if popped_is_array != (t.kind == TokenKind::RBracket) {
            return Err(SiftError::new(
                ErrorKind::StructuralMismatch,
                if popped_is_array {
                    "expected `]` to close array"
                } else {
                    "expected `}` to close object"
                },
                t.start,
            ));
        }

        // Missing-key defaults for the closing object.
        let ctx = *self.sel.last().expect("aligned stacks");
        if !popped_is_array {
            if let (Some(children), Some(Value::Object(map))) = (ctx.children, self.results.last_mut())
            {
                for (key, node) in children.iter() {
                    if node.has_default() {
                        let out_key = node.output_key(key);
                        if !map.contains_key(out_key) {
                            let value = apply_directives(node.directives(), Value::Null);
                            map.insert(out_key.to_string(), value);
                        }
                    }
                }
            }
        }

        self.sel.pop();
        self.kinds.pop();
        let key = self.keys.pop().expect("aligned stacks");
        let popped = self.results.pop().expect("aligned stacks");
        self.pending_key = None;

        if self.results.is_empty() {
            if !popped_is_array {
                // The root object completing is the single match.
                let start = self.raw_start.take().unwrap_or(0);
                self.emit_match(&popped, start, t.end, chunk, base)?;
            }
            self.final_output = Some(popped);
            return Ok(());
        }

        let depth = self.results.len();
        let parent_is_array = *self.kinds.last().expect("aligned stacks");
        if parent_is_array && depth == 1 {
            // An element of the root array completed.
            let start = self.raw_start.take().unwrap_or(t.start);
            self.emit_match(&popped, start, t.end, chunk, base)?;
        }

        let fanout = self.fanout;
        match self.results.last_mut().expect("aligned stacks") {
            Value::Array(arr) => {
                if let Some(f) = fanout {
                    if arr.len() >= f.max_array_len {
                        return Err(SiftError::new(
                            ErrorKind::FanoutArraySize,
                            format!("array exceeds {} elements", f.max_array_len),
                            t.start,
                        ));
                    }
                }
                arr.push(popped);
            }
            Value::Object(map) => {
                let Some(key) = key else {
                    return Err(SiftError::new(
                        ErrorKind::StructuralMismatch,
                        "container completed in object context without a key",
                        t.start,
                    ));
                };
                if let Some(f) = fanout {
                    if map.len() >= f.max_object_keys {
                        return Err(SiftError::new(
                            ErrorKind::FanoutObjectKeys,
                            format!("object exceeds {} keys", f.max_object_keys),
                            t.start,
                        ));
                    }
                }
                map.insert(key, popped);
            }
            _ => {
                return Err(SiftError::new(
                    ErrorKind::StructuralMismatch,
                    "value attachment into a non-container",
                    t.start,
                ));
            }
        }
        Ok(())
    }

    fn value_token(&mut self, t: &Token) -> Result<(), SiftError> {
        if self.results.is_empty() {
            // A bare scalar at the root selects nothing.
            return Ok(());
        }
        let in_array = *self.kinds.last().expect("aligned stacks");
        if in_array {
            let ctx = *self.sel.last().expect("aligned stacks");
            let admitted = ctx
                .node
                .map_or(ctx.children.is_none(), SelectionNode::admits_scalar_elements);
            if admitted {
                let directives = ctx.node.map_or(&[][..], SelectionNode::directives);
                let value = apply_directives(directives, token_value(t));
                let len = match self.results.last() {
                    Some(Value::Array(arr)) => arr.len(),
                    _ => 0,
                };
                if let Some(f) = self.fanout {
                    if len >= f.max_array_len {
                        return Err(SiftError::new(
                            ErrorKind::FanoutArraySize,
                            format!("array exceeds {} elements", f.max_array_len),
                            t.start,
                        ));
                    }
                }
                if let Some(Value::Array(arr)) = self.results.last_mut() {
                    arr.push(value);
                }
            }
            return Ok(());
        }

        match (self.pending_key.take(), t.kind) {
            (None, TokenKind::String) => {
                self.pending_key = t.string.clone();
                Ok(())
            }
            (None, _) => Ok(()),
            (Some(key), _) => {
                let ctx = *self.sel.last().expect("aligned stacks");
                if let Some(node) = ctx.children.and_then(|c| c.get(&key)) {
                    let value = apply_directives(node.directives(), token_value(t));
                    let out_key = node.output_key(&key).to_string();
                    let fanout = self.fanout;
                    if let Some(Value::Object(map)) = self.results.last_mut() {
                        if let Some(f) = fanout {
                            if map.len() >= f.max_object_keys && !map.contains_key(&out_key) {
                                return Err(SiftError::new(
                                    ErrorKind::FanoutObjectKeys,
                                    format!("object exceeds {} keys", f.max_object_keys),
                                    t.start,
                                ));
                            }
                        }
                        map.insert(out_key, value);
                    }
                }
                Ok(())
            }
        }
    }

    fn skip_token(&mut self, t: &Token) -> Result<(), SiftError> {
        match t.kind {
            TokenKind::LBrace | TokenKind::LBracket => {
                self.skip_depth += 1;
                if self.fanout.is_some() {
                    #[allow(clippy::cast_possible_truncation)]
                    self.check_depth(self.results.len() + self.skip_depth as usize, t.start)?;
                    self.skip_frames.push(SkipFrame {
                        is_array: t.kind == TokenKind::LBracket,
                        entries: 0,
                    });
                }
            }
            TokenKind::RBrace | TokenKind::RBracket => {
                if self.fanout.is_some() {
                    self.skip_frames.pop();
                }
                self.skip_depth -= 1;
                if self.skip_depth == 0 {
                    self.pending_key = None;
                }
            }
            TokenKind::Comma => {
                if let Some(f) = self.fanout {
                    if let Some(frame) = self.skip_frames.last_mut() {
                        frame.entries += 1;
                        if frame.is_array && frame.entries >= f.max_array_len {
                            return Err(SiftError::new(
                                ErrorKind::FanoutArraySize,
                                format!("array exceeds {} elements", f.max_array_len),
                                t.start,
                            ));
                        }
                        if !frame.is_array && frame.entries >= f.max_object_keys {
                            return Err(SiftError::new(
                                ErrorKind::FanoutObjectKeys,
                                format!("object exceeds {} keys", f.max_object_keys),
                                t.start,
                            ));
                        }
                    }
                }
            }
            _ => {}
        }
        self.skipped_bytes += t.end.saturating_sub(t.start);
        Ok(())
    }

    fn enter_skip(&mut self, is_array: bool, t: &Token) -> Result<(), SiftError> {
        self.pending_key = None;
        self.skip_depth = 1;
        if self.fanout.is_some() {
            self.check_depth(self.results.len() + 1, t.start)?;
            self.skip_frames.push(SkipFrame {
                is_array,
                entries: 0,
            });
        }
        self.skipped_bytes += t.end.saturating_sub(t.start);
        Ok(())
    }

    fn push_container(&mut self, ctx: Ctx<'sel>, is_array: bool, key: Option<String>) {
        self.sel.push(ctx);
        self.results.push(if is_array {
            Value::Array(Vec::new())
        } else {
            Value::Object(Map::new())
        });
        self.kinds.push(is_array);
        self.keys.push(key);
    }

    fn emit_match(
        &mut self,
        value: &Value,
        start: u64,
        end: u64,
        chunk: &[u8],
        base: u64,
    ) -> Result<(), SiftError> {
        self.matched += 1;
        self.clock.check_matches(self.matched, end)?;
        self.clock.check_progress(end)?;
        match self.mode {
            EmitMode::Object => self.sink.on_match(value),
            EmitMode::Raw => {
                let bytes = self.retained.slice(start, end, chunk, base);
                self.sink.on_raw_match(&bytes);
            }
        }
        Ok(())
    }

    fn check_depth(&self, depth: usize, offset: u64) -> Result<(), SiftError> {
        if let Some(f) = self.fanout {
            if depth > f.max_depth {
                return Err(SiftError::new(
                    ErrorKind::FanoutDepth,
                    format!("nesting depth exceeds {}", f.max_depth),
                    offset,
                ));
            }
        }
        Ok(())
    }
}

fn token_value(t: &Token) -> Value {
    match t.kind {
        TokenKind::String => Value::String(t.string.as_deref().unwrap_or("").to_string()),
        TokenKind::Number => Value::Number(t.number),
        TokenKind::True => Value::Boolean(true),
        TokenKind::False => Value::Boolean(false),
        _ => Value::Null,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::budget::Budget;
    use crate::query::parse_query;
    use crate::sink::Collector;

    fn run(query: &str, input: &str) -> (Vec<Value>, Option<Value>) {
        let selection = parse_query(query).unwrap();
        let mut engine =
            ProjectionEngine::new(&selection, Collector::new(), EngineOptions::default());
        engine.execute(input.as_bytes()).unwrap();
        let result = engine.take_result();
        (engine.into_sink().matches, result)
    }

    #[test]
    fn flat_projection() {
        let (matches, result) = run(
            "{ id, name, email }",
            r#"{"id":1,"name":"Leanne Graham","email":"e@x","phone":"123"}"#,
        );
        assert_eq!(
            result.unwrap().to_string(),
            r#"{"id":1,"name":"Leanne Graham","email":"e@x"}"#
        );
        assert_eq!(matches.len(), 1);
    }

    #[test]
    fn nested_projection() {
        let (_, result) = run("{ a { b { c } } }", r#"{"a":{"b":{"c":1,"d":2},"e":3}}"#);
        assert_eq!(result.unwrap().to_string(), r#"{"a":{"b":{"c":1}}}"#);
    }

    #[test]
    fn root_array_elements_emit_individually() {
        let (matches, result) = run(
            "{ name }",
            r#"[{"id":1,"name":"A","active":true},{"id":2,"name":"B","active":false}]"#,
        );
        assert_eq!(matches.len(), 2);
        assert_eq!(matches[0].to_string(), r#"{"name":"A"}"#);
        assert_eq!(matches[1].to_string(), r#"{"name":"B"}"#);
        // The completed array is stored but was not emitted a second time.
        assert_eq!(
            result.unwrap().to_string(),
            r#"[{"name":"A"},{"name":"B"}]"#
        );
    }

    #[test]
    fn alias_and_coerce() {
        let (_, result) = run(
            r#"{ first: firstName, age @coerce(type:"number") }"#,
            r#"{"firstName":"Leanne","age":"25"}"#,
        );
        assert_eq!(result.unwrap().to_string(), r#"{"first":"Leanne","age":25}"#);
    }

    #[test]
    fn default_synthesized_for_missing_key() {
        let (_, result) = run(r#"{ missing @default(value:"N/A") }"#, "{}");
        assert_eq!(result.unwrap().to_string(), r#"{"missing":"N/A"}"#);
    }

    #[test]
    fn leaf_selection_of_scalar_array_keeps_elements() {
        let (_, result) = run("{ tags }", r#"{"tags":["a","b"],"other":1}"#);
        assert_eq!(result.unwrap().to_string(), r#"{"tags":["a","b"]}"#);
    }

    #[test]
    fn leaf_selection_of_object_projects_no_children() {
        let (_, result) = run("{ a }", r#"{"a":{"b":1}}"#);
        assert_eq!(result.unwrap().to_string(), r#"{"a":{}}"#);
    }

    #[test]
    fn unselected_subtree_is_skipped_without_stack_growth() {
        let (_, result) = run(
            "{ keep }",
            r#"{"drop":{"deep":[{"x":[1,2,{"y":"{\"}]["}]}]},"keep":7}"#,
        );
        assert_eq!(result.unwrap().to_string(), r#"{"keep":7}"#);
    }

    #[test]
    fn garbage_between_tokens_is_tolerated() {
        let (_, result) = run("{ a }", r#"{"a": !!! 1}"#);
        assert_eq!(result.unwrap().to_string(), r#"{"a":1}"#);
    }

    #[test]
    fn mismatched_close_is_a_structural_error() {
        let selection = parse_query("{ a }").unwrap();
        let mut engine =
            ProjectionEngine::new(&selection, Collector::new(), EngineOptions::default());
        let err = engine.execute(br#"{"a":1]"#).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::StructuralMismatch);
    }

    #[test]
    fn unclosed_string_at_eof_keeps_prior_fields() {
        let selection = parse_query("{ a, b }").unwrap();
        let mut engine =
            ProjectionEngine::new(&selection, Collector::new(), EngineOptions::default());
        engine.execute(br#"{"a":1,"b":"never end"#).unwrap();
        // No emission, no crash; the partial result is observable.
        assert_eq!(engine.into_sink().matches.len(), 0);
    }

    #[test]
    fn match_budget_is_a_controlled_prefix() {
        let selection = parse_query("{ id }").unwrap();
        let options = EngineOptions {
            budget: Budget {
                max_matches: Some(2),
                ..Budget::default()
            },
            ..EngineOptions::default()
        };
        let mut engine = ProjectionEngine::new(&selection, Collector::new(), options);
        let err = engine
            .execute(br#"[{"id":1},{"id":2},{"id":3},{"id":4}]"#)
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::MatchBudget);
        assert_eq!(engine.into_sink().matches.len(), 2);
    }

    #[test]
    fn fanout_depth_guard_applies_in_skip_mode() {
        let selection = parse_query("{ keep }").unwrap();
        let options = EngineOptions {
            fanout: Some(FanoutLimits {
                max_depth: 10,
                ..FanoutLimits::default()
            }),
            ..EngineOptions::default()
        };
        let mut engine = ProjectionEngine::new(&selection, Collector::new(), options);
        let deep = format!(r#"{{"drop":{}{}}}"#, "[".repeat(50), "]".repeat(50));
        let err = engine.execute(deep.as_bytes()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::FanoutDepth);
    }

    #[test]
    fn chunked_execution_matches_single_buffer() {
        let query = "{ name, nested { keep } }";
        // The unselected `blob` subtree spans several 4 KiB windows, so the
        // skip fast path re-arms at window boundaries, including inside
        // string content.
        let blob = format!(
            r#"{{"nums":[{}],"text":"{}"}}"#,
            "7,".repeat(4_000) + "7",
            "str \\\" ing ".repeat(1_000)
        );
        let input = format!(
            r#"[{{"name":"a","blob":{blob},"nested":{{"keep":1,"drop":2}}}},{{"name":"b"}}]"#
        );
        let (single, single_result) = run(query, &input);

        let selection = parse_query(query).unwrap();
        let mut engine =
            ProjectionEngine::new(&selection, Collector::new(), EngineOptions::default());
        engine.execute_chunked(input.as_bytes(), MIN_WINDOW).unwrap();
        let chunked_result = engine.take_result();
        assert_eq!(engine.into_sink().matches, single);
        assert_eq!(chunked_result, single_result);
    }

    #[test]
    fn raw_mode_emits_exact_source_bytes() {
        let selection = parse_query("{ name }").unwrap();
        let options = EngineOptions {
            mode: EmitMode::Raw,
            ..EngineOptions::default()
        };
        let mut engine = ProjectionEngine::new(&selection, Collector::new(), options);
        let input = br#"[ {"id":1,"name":"A"} , {"id":2,"name":"B"} ]"#;
        engine.execute(input).unwrap();
        let raw = engine.into_sink().raw;
        assert_eq!(raw.len(), 2);
        assert_eq!(raw[0], br#"{"id":1,"name":"A"}"#.to_vec());
        assert_eq!(raw[1], br#"{"id":2,"name":"B"}"#.to_vec());
    }

    #[test]
    fn raw_mode_spans_chunk_boundaries() {
        let selection = parse_query("{ a }").unwrap();
        let options = EngineOptions {
            mode: EmitMode::Raw,
            ..EngineOptions::default()
        };
        let mut engine = ProjectionEngine::new(&selection, Collector::new(), options);
        let input = br#"{"a": [1, 2, 3]}"#;
        for chunk in input.chunks(3) {
            engine.process_chunk(chunk).unwrap();
        }
        engine.finish().unwrap();
        let raw = engine.into_sink().raw;
        assert_eq!(raw, vec![input.to_vec()]);
    }

    #[test]
    fn reset_makes_runs_idempotent() {
        let selection = parse_query("{ a { b } }").unwrap();
        let mut engine =
            ProjectionEngine::new(&selection, Collector::new(), EngineOptions::default());
        let input = br#"{"a":{"b":[1,{}],"c":1}}"#;
        engine.execute(input).unwrap();
        let first = engine.take_result();
        engine.reset();
        engine.execute(input).unwrap();
        assert_eq!(engine.take_result(), first);
    }

    #[test]
    fn stats_and_drain_delivered_on_finish() {
        let selection = parse_query("{ a }").unwrap();
        let mut engine =
            ProjectionEngine::new(&selection, Collector::new(), EngineOptions::default());
        engine.execute(br#"{"a":1,"b":{"c":2}}"#).unwrap();
        let sink = engine.into_sink();
        assert!(sink.drained);
        let stats = sink.stats.unwrap();
        assert_eq!(stats.matched_count, 1);
        assert_eq!(stats.processed_bytes, 19);
        assert!(stats.skip_ratio > 0.0);
    }
}
