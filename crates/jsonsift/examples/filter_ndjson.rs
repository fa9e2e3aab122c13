//! Filter an NDJSON stream down to a few fields per line.
//!
//! Feeds a small synthetic stream through the line driver in uneven chunks
//! (the way a socket would deliver it) and prints one projected document
//! per line:
//!
//! ```console
//! cargo run -p jsonsift --example filter_ndjson
//! ```

use jsonsift::{
    parse_query, Collector, EngineOptions, NdjsonDriver, NdjsonOptions, ProjectionEngine,
    SiftError,
};

fn main() {
    let stream = br#"{"id":1,"user":{"name":"Leanne","karma":10},"payload":{"big":[1,2,3]}}
{"id":2,"user":{"name":"Ervin"},"payload":null}
{"id":3,"user":{"name":"Clementine"},"active":truX}
{"id":4,"user":{"name":"Patricia"},"payload":{"big":[4,5]}}
"#;

    let selection = parse_query("{ id, user { name } }").expect("query parses");
    let engine = ProjectionEngine::new(&selection, Collector::new(), EngineOptions::default());
    let mut driver = NdjsonDriver::new(
        engine,
        NdjsonOptions {
            skip_errors: true,
            ..NdjsonOptions::default()
        },
    );

    let mut on_error = |err: SiftError, line: &[u8]| {
        eprintln!("skipped {}: {err}", String::from_utf8_lossy(line));
    };
    // Deliver the stream in awkward 13-byte chunks; line reassembly is the
    // driver's problem.
    for chunk in stream.chunks(13) {
        driver.feed(chunk, &mut on_error).expect("stream processes");
    }
    driver.finish(&mut on_error).expect("stream finishes");

    for m in &driver.into_sink().matches {
        println!("{m}");
    }
}
