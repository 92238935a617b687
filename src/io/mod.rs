//! File formats at the edges of the engine.
//!
//! | Module | Direction | Format |
//! |--------|-----------|--------|
//! | [`jsonl`] | in | Session JSONL files produced by the submission front end |
//! | [`csv`] | out | Aggregates and panel metrics as CSV |
//!
//! JSON output needs no adapter: result types derive `serde::Serialize`.

pub mod csv;
pub mod jsonl;

pub use jsonl::{parse_session_line, parse_session_line_with, read_session_dir, read_session_file};
