//! Newline-delimited JSON driver.
//!
//! [`NdjsonDriver`] splits chunked input at line feeds and runs the engine
//! once per line, resetting it in between, so each line is its own flow and
//! emits through the shared sink as soon as it completes. With
//! `skip_errors` enabled, a failing line is reported to the error callback
//! (with its 1-based line number and the line content, truncated if
//! oversize) and processing continues on the next line; otherwise the first
//! failure terminates the stream.

use std::time::Instant;

use crate::engine::ProjectionEngine;
use crate::error::{ErrorKind, SiftError};
use crate::sink::{Sink, Stats};

/// How many bytes of a failing line are passed to the error callback.
const ERROR_LINE_CAP: usize = 1024;

/// Configuration for the line driver.
#[derive(Debug, Clone, Copy, Default)]
pub struct NdjsonOptions {
    /// Report per-line errors and continue instead of terminating.
    pub skip_errors: bool,
    /// Upper bound on line length; longer lines fail with
    /// [`ErrorKind::LineTooLong`] (and are dropped in skip-errors mode).
    pub max_line_len: Option<usize>,
}

/// Line-oriented wrapper around a [`ProjectionEngine`].
pub struct NdjsonDriver<'sel, S: Sink> {
    engine: ProjectionEngine<'sel, S>,
    options: NdjsonOptions,
    line_buf: Vec<u8>,
    line_no: u64,
    oversize: bool,
    started: Instant,
    total_bytes: u64,
    total_matches: u64,
    skipped_estimate: f64,
}

impl<'sel, S: Sink> NdjsonDriver<'sel, S> {
    pub fn new(engine: ProjectionEngine<'sel, S>, options: NdjsonOptions) -> Self {
        Self {
            engine,
            options,
            line_buf: Vec::new(),
            line_no: 1,
            oversize: false,
            started: Instant::now(),
            total_bytes: 0,
            total_matches: 0,
            skipped_estimate: 0.0,
        }
    }

    /// Sets the number of the next line, for shard drivers that start
    /// mid-stream.
    pub fn starting_at(mut self, line_no: u64) -> Self {
        self.line_no = line_no;
        self
    }

    /// Feeds the next chunk of the byte stream. `on_error` receives each
    /// per-line failure in skip-errors mode.
    pub fn feed<F>(&mut self, chunk: &[u8], on_error: &mut F) -> Result<(), SiftError>
    where
        F: FnMut(SiftError, &[u8]),
    {
        let mut rest = chunk;
        while let Some(nl) = memchr::memchr(b'\n', rest) {
            let (head, tail) = rest.split_at(nl);
            rest = &tail[1..];
            self.push_line_part(head, on_error)?;
            self.complete_line(on_error)?;
        }
        self.push_line_part(rest, on_error)
    }

    /// Ends the stream: processes a trailing unterminated line, then
    /// delivers aggregate stats and the drain signal.
    pub fn finish<F>(&mut self, on_error: &mut F) -> Result<(), SiftError>
    where
        F: FnMut(SiftError, &[u8]),
    {
        if self.oversize || !self.line_buf.is_empty() {
            self.complete_line(on_error)?;
        }
        let stats = self.stats();
        let sink = self.engine.sink_mut();
        sink.on_stats(&stats);
        sink.on_drain();
        Ok(())
    }

    /// Aggregate telemetry across all lines so far.
    #[must_use]
    pub fn stats(&self) -> Stats {
        let ms = self.started.elapsed().as_secs_f64() * 1000.0;
        #[allow(clippy::cast_precision_loss)]
        let processed = self.total_bytes as f64;
        Stats {
            matched_count: self.total_matches,
            processed_bytes: self.total_bytes,
            duration_ms: ms,
            throughput_mbps: if ms > 0.0 {
                (processed / 1e6) / (ms / 1000.0)
            } else {
                0.0
            },
            skip_ratio: if self.total_bytes > 0 {
                self.skipped_estimate / processed
            } else {
                0.0
            },
        }
    }

    /// Access to the shared sink, e.g. to observe write failures between
    /// chunks.
    pub fn sink_mut(&mut self) -> &mut S {
        self.engine.sink_mut()
    }

    /// Consumes the driver, returning the engine's sink.
    pub fn into_sink(self) -> S {
        self.engine.into_sink()
    }

    fn push_line_part<F>(&mut self, part: &[u8], on_error: &mut F) -> Result<(), SiftError>
    where
        F: FnMut(SiftError, &[u8]),
    {
        if self.oversize || part.is_empty() {
            return Ok(());
        }
        if let Some(cap) = self.options.max_line_len {
            if self.line_buf.len() + part.len() > cap {
                self.oversize = true;
                let err = SiftError::new(
                    ErrorKind::LineTooLong,
                    format!("line exceeds {cap} bytes"),
                    self.total_bytes,
                )
                .with_line(self.line_no);
                if self.options.skip_errors {
                    let mut shown = std::mem::take(&mut self.line_buf);
                    shown.extend_from_slice(part);
                    shown.truncate(ERROR_LINE_CAP);
                    on_error(err, &shown);
                    return Ok(());
                }
                return Err(err);
            }
        }
        self.line_buf.extend_from_slice(part);
        Ok(())
    }

    fn complete_line<F>(&mut self, on_error: &mut F) -> Result<(), SiftError>
    where
        F: FnMut(SiftError, &[u8]),
    {
        if self.oversize {
            self.oversize = false;
            self.line_buf.clear();
            self.line_no += 1;
            return Ok(());
        }
        // Tolerate CRLF input.
        if self.line_buf.last() == Some(&b'\r') {
            self.line_buf.pop();
        }
        if self.line_buf.iter().all(u8::is_ascii_whitespace) {
            self.line_buf.clear();
            self.line_no += 1;
            return Ok(());
        }

        self.engine.reset();
        let outcome = self
            .engine
            .process_chunk(&self.line_buf)
            .and_then(|()| self.engine.end_input());
        let line_stats = self.engine.stats();
        self.total_bytes += self.line_buf.len() as u64;
        self.total_matches += line_stats.matched_count;
        #[allow(clippy::cast_precision_loss)]
        {
            self.skipped_estimate += line_stats.skip_ratio * line_stats.processed_bytes as f64;
        }

        let result = match outcome {
            Ok(()) => Ok(()),
            Err(err) => {
                let err = err.with_line(self.line_no);
                if self.options.skip_errors {
                    let shown = &self.line_buf[..self.line_buf.len().min(ERROR_LINE_CAP)];
                    on_error(err, shown);
                    Ok(())
                } else {
                    Err(err)
                }
            }
        };
        self.line_buf.clear();
        self.line_no += 1;
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::options::EngineOptions;
    use crate::query::parse_query;
    use crate::sink::Collector;

    fn driver<'sel>(
        selection: &'sel crate::Selection,
        options: NdjsonOptions,
    ) -> NdjsonDriver<'sel, Collector> {
        let engine = ProjectionEngine::new(selection, Collector::new(), EngineOptions::default());
        NdjsonDriver::new(engine, options)
    }

    #[test]
    fn one_emission_per_line() {
        let selection = parse_query("{ id }").unwrap();
        let mut d = driver(&selection, NdjsonOptions::default());
        let mut on_error = |_: SiftError, _: &[u8]| panic!("unexpected error");
        d.feed(b"{\"id\":1}\n{\"id\":2}\n", &mut on_error).unwrap();
        d.finish(&mut on_error).unwrap();
        let sink = d.into_sink();
        assert_eq!(sink.matches.len(), 2);
        assert_eq!(sink.matches[1].to_string(), r#"{"id":2}"#);
        assert!(sink.drained);
    }

    #[test]
    fn lines_split_across_chunks() {
        let selection = parse_query("{ id }").unwrap();
        let mut d = driver(&selection, NdjsonOptions::default());
        let mut on_error = |_: SiftError, _: &[u8]| panic!("unexpected error");
        for chunk in b"{\"id\":1}\n{\"id\":22}\n".chunks(3) {
            d.feed(chunk, &mut on_error).unwrap();
        }
        d.finish(&mut on_error).unwrap();
        assert_eq!(d.into_sink().matches.len(), 2);
    }

    #[test]
    fn skip_errors_reports_line_and_continues() {
        let selection = parse_query("{ id }").unwrap();
        let mut d = driver(
            &selection,
            NdjsonOptions {
                skip_errors: true,
                ..NdjsonOptions::default()
            },
        );
        let mut errors = Vec::new();
        let mut on_error =
            |err: SiftError, line: &[u8]| errors.push((err, String::from_utf8_lossy(line).into_owned()));
        d.feed(b"{\"id\":1}\n{\"id\":truX}\n{\"id\":3}\n", &mut on_error)
            .unwrap();
        d.finish(&mut on_error).unwrap();
        assert_eq!(errors.len(), 1);
        let (err, line) = &errors[0];
        assert_eq!(err.kind(), ErrorKind::InvalidLiteral);
        assert_eq!(err.line, Some(2));
        // Position points at the `t` of `truX`.
        assert_eq!(err.offset, 6);
        assert_eq!(line, "{\"id\":truX}");
        assert_eq!(d.into_sink().matches.len(), 2);
    }

    #[test]
    fn hard_mode_stops_at_first_error() {
        let selection = parse_query("{ id }").unwrap();
        let mut d = driver(&selection, NdjsonOptions::default());
        let mut on_error = |_: SiftError, _: &[u8]| {};
        let err = d
            .feed(b"{\"id\":truX}\n{\"id\":3}\n", &mut on_error)
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidLiteral);
        assert_eq!(err.line, Some(1));
    }

    #[test]
    fn oversize_line_is_dropped_in_skip_mode() {
        let selection = parse_query("{ id }").unwrap();
        let mut d = driver(
            &selection,
            NdjsonOptions {
                skip_errors: true,
                max_line_len: Some(16),
            },
        );
        let mut errors = Vec::new();
        let mut on_error = |err: SiftError, _: &[u8]| errors.push(err);
        let long = format!("{{\"id\":1,\"pad\":\"{}\"}}\n{{\"id\":2}}\n", "x".repeat(64));
        d.feed(long.as_bytes(), &mut on_error).unwrap();
        d.finish(&mut on_error).unwrap();
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].kind(), ErrorKind::LineTooLong);
        assert_eq!(d.into_sink().matches.len(), 1);
    }

    #[test]
    fn blank_lines_are_skipped() {
        let selection = parse_query("{ id }").unwrap();
        let mut d = driver(&selection, NdjsonOptions::default());
        let mut on_error = |_: SiftError, _: &[u8]| panic!("unexpected error");
        d.feed(b"\n{\"id\":1}\r\n\n{\"id\":2}", &mut on_error).unwrap();
        d.finish(&mut on_error).unwrap();
        let stats = d.stats();
        assert_eq!(stats.matched_count, 2);
        assert_eq!(d.into_sink().matches.len(), 2);
    }
}
