//! The output side of the engine.
//!
//! A [`Sink`] receives completed matches (materialized or raw), final
//! telemetry, and the drain signal. Every entry point has a default no-op
//! body, so a sink implements only what it consumes. The engine never
//! awaits a sink; backpressure belongs to the runtime layer above.

use crate::value::Value;

/// Consumer contract invoked by the engine at emission time.
pub trait Sink {
    /// One materialized match (object emission mode).
    fn on_match(&mut self, value: &Value) {
        let _ = value;
    }

    /// One match as its exact source bytes (raw emission mode).
    fn on_raw_match(&mut self, bytes: &[u8]) {
        let _ = bytes;
    }

    /// Execution telemetry, delivered before the drain signal.
    fn on_stats(&mut self, stats: &Stats) {
        let _ = stats;
    }

    /// Final completion signal after the last input chunk; used for
    /// flushing.
    fn on_drain(&mut self) {}
}

impl<S: Sink + ?Sized> Sink for &mut S {
    fn on_match(&mut self, value: &Value) {
        (**self).on_match(value);
    }

    fn on_raw_match(&mut self, bytes: &[u8]) {
        (**self).on_raw_match(bytes);
    }

    fn on_stats(&mut self, stats: &Stats) {
        (**self).on_stats(stats);
    }

    fn on_drain(&mut self) {
        (**self).on_drain();
    }
}

/// Telemetry snapshot for one execution.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Stats {
    /// Matches emitted so far.
    pub matched_count: u64,
    /// Logical bytes consumed.
    pub processed_bytes: u64,
    /// Wall-clock time since engine construction.
    pub duration_ms: f64,
    /// `processed_bytes` over `duration_ms`, in megabytes per second.
    pub throughput_mbps: f64,
    /// Fraction of processed bytes that were skipped rather than projected.
    pub skip_ratio: f64,
}

/// A sink that buffers everything it receives; convenient for tests and
/// for drivers that post-process a whole execution.
#[derive(Debug, Default)]
pub struct Collector {
    pub matches: Vec<Value>,
    pub raw: Vec<Vec<u8>>,
    pub stats: Option<Stats>,
    pub drained: bool,
}

impl Collector {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl Sink for Collector {
    fn on_match(&mut self, value: &Value) {
        self.matches.push(value.clone());
    }

    fn on_raw_match(&mut self, bytes: &[u8]) {
        self.raw.push(bytes.to_vec());
    }

    fn on_stats(&mut self, stats: &Stats) {
        self.stats = Some(*stats);
    }

    fn on_drain(&mut self) {
        self.drained = true;
    }
}
