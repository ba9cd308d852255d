//! Command-line interface for the `tracecore` binary

pub mod args;

pub use args::Args;
