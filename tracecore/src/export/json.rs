//! JSON profile writer
//!
//! Output shape:
//!
//! ```json
//! {
//!   "stats":   { "running": false, "stripes": 16, "traces": 2, ... },
//!   "samples": [ { "trace_id": 1, "samples": 40, "counter": 400000 } ],
//!   "traces":  [ { "trace_id": 1, "frames": [ { "location": 4096, "aux": 1 } ] } ],
//!   "names":   [ { "id": 17, "name": "main" } ]
//! }
//! ```

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use log::info;

use crate::domain::ExportError;
use crate::profile::Profile;

/// Serializes profiles to JSON
#[derive(Debug, Clone, Copy, Default)]
pub struct ProfileExporter {
    pretty: bool,
}

impl ProfileExporter {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Indent the output for humans
    #[must_use]
    pub fn pretty(mut self, pretty: bool) -> Self {
        self.pretty = pretty;
        self
    }

    /// Write `profile` to `writer`.
    ///
    /// # Errors
    /// Returns an error if serialization or the underlying write fails.
    pub fn export<W: Write>(&self, profile: &Profile, mut writer: W) -> Result<(), ExportError> {
        if self.pretty {
            serde_json::to_writer_pretty(&mut writer, profile)?;
        } else {
            serde_json::to_writer(&mut writer, profile)?;
        }
        writer.write_all(b"\n")?;
        writer.flush()?;
        Ok(())
    }

    /// Create (or truncate) `path` and write `profile` into it.
    ///
    /// # Errors
    /// Returns an error if the file cannot be created or written.
    pub fn export_to_file(&self, profile: &Profile, path: impl AsRef<Path>) -> Result<(), ExportError> {
        let path = path.as_ref();
        let file = File::create(path).map_err(|e| {
            ExportError::WriteFailed(format!("cannot create {}: {e}", path.display()))
        })?;
        self.export(profile, BufWriter::new(file))?;
        info!(
            "Exported {} samples and {} traces to {}",
            profile.samples.len(),
            profile.traces.len(),
            path.display()
        );
        Ok(())
    }
}
