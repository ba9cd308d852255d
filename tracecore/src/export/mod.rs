//! Profile export
//!
//! Writes [`Profile`](crate::profile::Profile) snapshots as JSON, readable
//! back with [`Profile::from_file`](crate::profile::Profile::from_file).

pub mod json;

pub use json::ProfileExporter;
