#![no_main]

use arbitrary::Arbitrary;
use jsonsift::{parse_query, Collector, EngineOptions, ProjectionEngine, Value};
use libfuzzer_sys::fuzz_target;

/// A fuzz case: arbitrary bytes, a query picked from a fixed pool, and
/// chunk cut points. The engine must never panic, and chunk placement must
/// never change the outcome.
#[derive(Debug, Arbitrary)]
struct Case {
    query_pick: u8,
    cuts: Vec<u16>,
    payload: Vec<u8>,
}

const QUERIES: &[&str] = &[
    "{ a }",
    "{ a, b { c } }",
    "{ x: a @coerce(type:\"number\"), b @default(value:null) }",
    "{ deep { deeper { key } } }",
];

fn run(query: &str, chunks: &[&[u8]]) -> (Result<(), String>, Vec<Value>, Option<Value>) {
    let selection = parse_query(query).expect("pool queries parse");
    let mut engine = ProjectionEngine::new(&selection, Collector::new(), EngineOptions::default());
    let mut outcome = Ok(());
    for chunk in chunks {
        if let Err(err) = engine.process_chunk(chunk) {
            outcome = Err(err.to_string());
            break;
        }
    }
    if outcome.is_ok() {
        if let Err(err) = engine.finish() {
            outcome = Err(err.to_string());
        }
    }
    let result = engine.take_result();
    (outcome, engine.into_sink().matches, result)
}

fuzz_target!(|case: Case| {
    let query = QUERIES[case.query_pick as usize % QUERIES.len()];

    let whole = run(query, &[&case.payload]);

    let mut points: Vec<usize> = case
        .cuts
        .iter()
        .map(|c| *c as usize % case.payload.len().max(1))
        .collect();
    points.sort_unstable();
    let chunks = jsonsift::split_at_points(&case.payload, &points);
    let split = run(query, &chunks);

    assert_eq!(whole, split, "chunk placement changed the outcome");
});
