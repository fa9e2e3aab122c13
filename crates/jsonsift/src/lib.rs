//! Streaming JSON projection: keep the fields you ask for, skip the rest.
//!
//! `jsonsift` runs a selection tree against a chunked byte stream of JSON
//! and emits only the selected subset, so processing cost tracks the
//! *selected* data rather than the total input, and memory is bounded by
//! nesting depth. The pipeline is a forward-only byte [`Tokenizer`] feeding
//! a selection-driven [`ProjectionEngine`], with drivers on top for NDJSON
//! streams and repeated buffer queries.
//!
//! # Examples
//!
//! ```rust
//! use jsonsift::{Collector, EngineOptions, ProjectionEngine, parse_query};
//!
//! let selection = parse_query("{ id, contact: email }").unwrap();
//! let mut engine = ProjectionEngine::new(&selection, Collector::new(), EngineOptions::default());
//! engine
//!     .execute(br#"{"id": 7, "email": "e@x", "bulk": {"skipped": true}}"#)
//!     .unwrap();
//! assert_eq!(
//!     engine.result().unwrap().to_string(),
//!     r#"{"id":7,"contact":"e@x"}"#
//! );
//! ```

mod budget;
mod chunk_utils;
mod directive;
mod engine;
mod error;
mod escape;
mod index;
mod intern;
mod literal;
mod ndjson;
mod options;
mod query;
mod raw;
mod scan;
mod selection;
mod sink;
mod token;
mod tokenizer;
mod value;

#[cfg(feature = "par")]
mod par_ndjson;

pub use budget::{Budget, CancelFlag, POLL_INTERVAL};
pub use chunk_utils::{produce_chunks, split_at_points};
pub use directive::{Directive, DirectiveArg, MAX_SUBSTRING_LEN};
pub use engine::{ProjectionEngine, DEFAULT_WINDOW, MIN_WINDOW};
pub use error::{ErrorKind, SiftError};
pub use index::{execute_indexed, RootIndex};
pub use ndjson::{NdjsonDriver, NdjsonOptions};
pub use options::{EmitMode, EngineOptions, FanoutLimits};
pub use query::parse_query;
pub use selection::{Selection, SelectionNode};
pub use sink::{Collector, Sink, Stats};
pub use token::{Token, TokenKind};
pub use tokenizer::{Tokenizer, Tokens};
pub use value::{Array, Map, Value};

#[cfg(feature = "par")]
pub use par_ndjson::{project_lines_parallel, OrderingMode};
