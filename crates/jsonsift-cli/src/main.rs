//! `jsonsift` command line tool: project a selection over JSON from a file
//! or stdin.
//!
//! Standard mode prints one JSON document (the projected result); NDJSON
//! mode prints one document per input line as lines complete. Exits 0 on
//! success and on a broken pipe, 1 on any other failure.

use std::fs::File;
use std::io::{self, BufWriter, Read, Write};
use std::process::ExitCode;

use anyhow::{anyhow, Context, Result};
use clap::Parser;
use jsonsift::{
    parse_query, EngineOptions, NdjsonDriver, NdjsonOptions, ProjectionEngine, SiftError, Sink,
    Stats, Value,
};
use tracing_subscriber::EnvFilter;

const READ_CHUNK: usize = 64 * 1024;

#[derive(Parser)]
#[command(
    name = "jsonsift",
    version,
    about = "Streaming JSON projection: keep the fields you ask for, skip the rest",
    arg_required_else_help = true
)]
struct Cli {
    /// Treat input as newline-delimited JSON, one output document per line
    #[arg(long, visible_alias = "jsonl")]
    ndjson: bool,

    /// In NDJSON mode, report per-line errors on stderr and continue
    #[arg(long)]
    skip_errors: bool,

    /// Maximum NDJSON line length in bytes
    #[arg(long, value_name = "bytes")]
    max_line_length: Option<usize>,

    /// Pretty-print output
    #[arg(long, conflicts_with = "compact")]
    pretty: bool,

    /// Compact output (the default)
    #[arg(long)]
    compact: bool,

    /// Input file followed by the query, or just the query (stdin input)
    #[arg(value_name = "FILE")]
    first: String,

    /// Selection query, e.g. '{ id, name, address { city } }'
    #[arg(value_name = "QUERY")]
    second: Option<String>,
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(io::stderr)
        .init();

    match run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) if is_broken_pipe(&err) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("jsonsift: {err:#}");
            ExitCode::FAILURE
        }
    }
}

fn run() -> Result<()> {
    let cli = Cli::parse();
    let (path, query) = match &cli.second {
        Some(query) => (Some(cli.first.as_str()), query.as_str()),
        None => (None, cli.first.as_str()),
    };
    let selection = parse_query(query).map_err(|err| anyhow!("invalid query: {err}"))?;
    let pretty = cli.pretty;

    let mut input: Box<dyn Read> = match path {
        Some(p) => Box::new(File::open(p).with_context(|| format!("cannot open `{p}`"))?),
        None => Box::new(io::stdin().lock()),
    };
    let stdout = io::stdout();
    let out = BufWriter::new(stdout.lock());

    if cli.ndjson {
        let ndjson_options = NdjsonOptions {
            skip_errors: cli.skip_errors,
            max_line_len: cli.max_line_length,
        };
        run_ndjson(&mut input, &selection, ndjson_options, pretty, out)
    } else {
        run_standard(&mut input, &selection, pretty, out)
    }
}

fn run_standard(
    input: &mut dyn Read,
    selection: &jsonsift::Selection,
    pretty: bool,
    mut out: impl Write,
) -> Result<()> {
    let mut engine = ProjectionEngine::new(selection, Quiet, EngineOptions::default());
    let mut buf = vec![0u8; READ_CHUNK];
    loop {
        let n = input.read(&mut buf).context("read failed")?;
        if n == 0 {
            break;
        }
        engine.process_chunk(&buf[..n])?;
    }
    engine.finish()?;
    let stats = engine.stats();
    tracing::debug!(
        matched = stats.matched_count,
        bytes = stats.processed_bytes,
        throughput_mbps = stats.throughput_mbps,
        "projection complete"
    );

    let result = engine.take_result().unwrap_or(Value::Null);
    write_value(&mut out, &result, pretty)?;
    out.flush().context("flush failed")?;
    Ok(())
}

fn run_ndjson(
    input: &mut dyn Read,
    selection: &jsonsift::Selection,
    options: NdjsonOptions,
    pretty: bool,
    out: impl Write,
) -> Result<()> {
    let sink = LineSink {
        out,
        pretty,
        error: None,
    };
    let engine = ProjectionEngine::new(selection, sink, EngineOptions::default());
    let mut driver = NdjsonDriver::new(engine, options);
    let mut on_error = |err: SiftError, line: &[u8]| {
        tracing::warn!(
            line = err.line,
            code = err.kind().code(),
            content = %String::from_utf8_lossy(line),
            "skipped line: {err}"
        );
    };

    let mut buf = vec![0u8; READ_CHUNK];
    loop {
        let n = input.read(&mut buf).context("read failed")?;
        if n == 0 {
            break;
        }
        driver.feed(&buf[..n], &mut on_error)?;
        if let Some(err) = driver.sink_mut().error.take() {
            return Err(err).context("write failed");
        }
    }
    driver.finish(&mut on_error)?;
    let stats = driver.stats();
    tracing::debug!(
        matched = stats.matched_count,
        bytes = stats.processed_bytes,
        throughput_mbps = stats.throughput_mbps,
        "ndjson stream complete"
    );

    let mut sink = driver.into_sink();
    if let Some(err) = sink.error.take() {
        return Err(err).context("write failed");
    }
    sink.out.flush().context("flush failed")?;
    Ok(())
}

/// Standard mode only needs the engine's final result; per-match
/// emissions are not printed.
struct Quiet;

impl Sink for Quiet {}

/// Writes each match as one output line the moment it completes.
struct LineSink<W: Write> {
    out: W,
    pretty: bool,
    error: Option<io::Error>,
}

impl<W: Write> Sink for LineSink<W> {
    fn on_match(&mut self, value: &Value) {
        if self.error.is_some() {
            return;
        }
        if let Err(err) = write_value(&mut self.out, value, self.pretty) {
            self.error = Some(err);
        }
    }

    fn on_stats(&mut self, stats: &Stats) {
        tracing::trace!(?stats, "engine stats");
    }
}

fn write_value(out: &mut impl Write, value: &Value, pretty: bool) -> io::Result<()> {
    if pretty {
        writeln!(out, "{}", value.to_pretty_string())
    } else {
        writeln!(out, "{value}")
    }
}

fn is_broken_pipe(err: &anyhow::Error) -> bool {
    err.chain().any(|cause| {
        cause
            .downcast_ref::<io::Error>()
            .is_some_and(|io_err| io_err.kind() == io::ErrorKind::BrokenPipe)
    })
}
