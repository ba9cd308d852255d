//! Analysis over profile snapshots
//!
//! Pure functions from a [`Profile`](crate::profile::Profile) (or a stream of
//! sink records) to ranked summaries. No access to live session state.

pub mod hotspot_analyzer;

pub use hotspot_analyzer::{hot_frames, hot_traces, FrameHotspot, HotspotStats, TraceHotspot};
