//! Event sinks
//!
//! The recorder hands every sample to an [`EventSink`](crate::recorder::EventSink)
//! while its stripe is held. [`BufferedEventSink`] parks those records in
//! per-stripe bounded queues for a regular thread to drain.

pub mod buffered;

pub use buffered::{BufferedEventSink, SinkRecord};
