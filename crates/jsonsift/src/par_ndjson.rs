//! Parallel NDJSON driver.
//!
//! Shards a byte buffer at line boundaries into roughly equal pieces,
//! processes every shard on the rayon pool with its own engine (engines are
//! never shared across flows), and hands results back on the calling
//! thread. `Preserve` delivers lines in input order; `Relaxed` delivers
//! each shard's results as soon as that shard completes.

use rayon::prelude::*;

use crate::engine::ProjectionEngine;
use crate::error::SiftError;
use crate::ndjson::{NdjsonDriver, NdjsonOptions};
use crate::options::EngineOptions;
use crate::selection::Selection;
use crate::sink::Collector;
use crate::value::Value;

/// Target shard size in bytes; shards always end at a line boundary.
const SHARD_TARGET_SIZE: usize = 1024 * 1024;

/// Cross-shard result ordering.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrderingMode {
    /// Emit in input order.
    Preserve,
    /// Emit as shards complete.
    Relaxed,
}

/// Output of one processed shard.
struct ShardOutput {
    values: Vec<Value>,
    errors: Vec<SiftError>,
}

/// Projects every line of `buf` in parallel, calling `on_value` per
/// emitted match and `on_error` per skipped line error, both on the calling
/// thread.
///
/// With `skip_errors` disabled the first failing line aborts the run; in
/// `Relaxed` mode "first" means first observed, not first in input order.
pub fn project_lines_parallel(
    buf: &[u8],
    selection: &Selection,
    engine_options: EngineOptions,
    ndjson_options: NdjsonOptions,
    ordering: OrderingMode,
    mut on_value: impl FnMut(Value) + Send,
    mut on_error: impl FnMut(SiftError) + Send,
) -> Result<(), SiftError> {
    let shards = split_shards(buf, SHARD_TARGET_SIZE);

    match ordering {
        OrderingMode::Preserve => {
            let outputs: Vec<Result<ShardOutput, SiftError>> = shards
                .par_iter()
                .map(|shard| process_shard(shard, selection, engine_options, ndjson_options))
                .collect();
            for output in outputs {
                let output = output?;
                for value in output.values {
                    on_value(value);
                }
                for err in output.errors {
                    on_error(err);
                }
            }
            Ok(())
        }
        OrderingMode::Relaxed => {
            let (tx, rx) = std::sync::mpsc::channel();
            let mut first_err = None;
            rayon::scope(|scope| {
                scope.spawn(|_| {
                    shards
                        .par_iter()
                        .for_each_with(tx, |tx, shard| {
                            let _ = tx.send(process_shard(
                                shard,
                                selection,
                                engine_options,
                                ndjson_options,
                            ));
                        });
                });
                for output in rx {
                    match output {
                        Ok(output) => {
                            for value in output.values {
                                on_value(value);
                            }
                            for err in output.errors {
                                on_error(err);
                            }
                        }
                        Err(err) if first_err.is_none() => first_err = Some(err),
                        Err(_) => {}
                    }
                }
            });
            first_err.map_or(Ok(()), Err)
        }
    }
}

/// One shard: its bytes plus the 1-based number of its first line.
struct Shard<'a> {
    bytes: &'a [u8],
    first_line: u64,
}

fn split_shards(buf: &[u8], target: usize) -> Vec<Shard<'_>> {
    let mut shards = Vec::new();
    let mut start = 0usize;
    let mut line = 1u64;
    while start < buf.len() {
        let mut end = (start + target).min(buf.len());
        if end < buf.len() {
            match memchr::memchr(b'\n', &buf[end..]) {
                Some(off) => end += off + 1,
                None => end = buf.len(),
            }
        }
        let bytes = &buf[start..end];
        shards.push(Shard { bytes, first_line: line });
        line += memchr::memchr_iter(b'\n', bytes).count() as u64;
        start = end;
    }
    shards
}

fn process_shard(
    shard: &Shard<'_>,
    selection: &Selection,
    engine_options: EngineOptions,
    ndjson_options: NdjsonOptions,
) -> Result<ShardOutput, SiftError> {
    let engine = ProjectionEngine::new(selection, Collector::new(), engine_options);
    let mut driver = NdjsonDriver::new(engine, ndjson_options).starting_at(shard.first_line);
    let mut errors = Vec::new();
    {
        let mut on_error = |err: SiftError, _line: &[u8]| errors.push(err);
        driver.feed(shard.bytes, &mut on_error)?;
        driver.finish(&mut on_error)?;
    }
    Ok(ShardOutput {
        values: driver.into_sink().matches,
        errors,
    })
}
