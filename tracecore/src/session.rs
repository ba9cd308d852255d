//! # Profiling Session
//!
//! [`Profiler`] owns every structure the recording path touches: the lock
//! stripes with their frame buffers, the trace store and the name
//! dictionary. Nothing is global; several sessions can live side by side.
//!
//! ## Lifecycle
//!
//! ```text
//!   new(sink) ──► start(config) ──► [record_sample ...] ──► stop()
//!                     ▲                                       │
//!                     └───────────── start(same config) ◄─────┘
//!
//!   dump()  : any time, shared hold on every stripe
//!   clear() : exclusive access, ids restart from the base
//! ```
//!
//! Starting with the configuration already in use resumes the session and
//! keeps collected traces. Starting with a different configuration
//! reallocates everything.

use std::collections::BTreeMap;
use std::sync::Arc;

use log::{debug, info, warn};
use tracecore_common::{DEFAULT_STRIPES, MAX_STACK_DEPTH};

use crate::domain::{ConfigError, SessionError, ThreadId, TraceId};
use crate::intern::Dictionary;
use crate::profile::{Profile, ProfileName, ProfileSample, ProfileStats, ProfileTrace};
use crate::recorder::{DropReason, Event, EventSink, RecordOutcome, SampleRecorder, StackWalker};
use crate::trace_store::MAX_TRACE_CAPACITY;

/// Default number of distinct traces a session can hold
pub const DEFAULT_TRACE_CAPACITY: usize = 65_536;

/// Default average frames reserved per trace
pub const DEFAULT_FRAMES_PER_TRACE: usize = 64;

/// Default per-stripe queue depth for buffered sinks
pub const DEFAULT_SINK_CAPACITY: usize = 4096;

/// Sizes of everything a session allocates up front
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionConfig {
    /// Number of lock stripes (concurrency level)
    pub stripes: usize,
    /// Frames captured per sample at most
    pub max_stack_depth: usize,
    /// Distinct traces the store can hold
    pub trace_capacity: usize,
    /// Total frames the trace arena can hold
    pub frame_capacity: usize,
    /// Per-stripe queue depth for [`BufferedEventSink`](crate::sink::BufferedEventSink)
    pub sink_capacity: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            stripes: DEFAULT_STRIPES,
            max_stack_depth: MAX_STACK_DEPTH,
            trace_capacity: DEFAULT_TRACE_CAPACITY,
            frame_capacity: DEFAULT_TRACE_CAPACITY * DEFAULT_FRAMES_PER_TRACE,
            sink_capacity: DEFAULT_SINK_CAPACITY,
        }
    }
}

impl SessionConfig {
    #[must_use]
    pub fn with_stripes(mut self, stripes: usize) -> Self {
        self.stripes = stripes;
        self
    }

    #[must_use]
    pub fn with_max_stack_depth(mut self, depth: usize) -> Self {
        self.max_stack_depth = depth;
        self
    }

    #[must_use]
    pub fn with_trace_capacity(mut self, traces: usize) -> Self {
        self.trace_capacity = traces;
        self
    }

    #[must_use]
    pub fn with_frame_capacity(mut self, frames: usize) -> Self {
        self.frame_capacity = frames;
        self
    }

    #[must_use]
    pub fn with_sink_capacity(mut self, capacity: usize) -> Self {
        self.sink_capacity = capacity;
        self
    }

    /// Check every size for a value the session cannot run with.
    ///
    /// # Errors
    /// Returns the first offending setting.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.stripes == 0 {
            return Err(ConfigError::ZeroStripes);
        }
        if self.max_stack_depth == 0 {
            return Err(ConfigError::ZeroStackDepth);
        }
        if self.max_stack_depth > MAX_STACK_DEPTH {
            return Err(ConfigError::StackDepthTooLarge {
                requested: self.max_stack_depth,
                limit: MAX_STACK_DEPTH,
            });
        }
        if self.trace_capacity == 0 {
            return Err(ConfigError::ZeroTraceCapacity);
        }
        if self.trace_capacity > MAX_TRACE_CAPACITY {
            return Err(ConfigError::TraceCapacityTooLarge(self.trace_capacity));
        }
        if self.frame_capacity < self.max_stack_depth {
            return Err(ConfigError::FrameCapacityTooSmall {
                frames: self.frame_capacity,
                depth: self.max_stack_depth,
            });
        }
        if self.sink_capacity == 0 {
            return Err(ConfigError::ZeroSinkCapacity);
        }
        Ok(())
    }
}

/// One profiling session
pub struct Profiler {
    sink: Arc<dyn EventSink>,
    config: Option<SessionConfig>,
    recorder: Option<SampleRecorder>,
    symbols: Dictionary,
}

impl Profiler {
    /// Create an idle session that will hand recorded samples to `sink`.
    #[must_use]
    pub fn new(sink: Arc<dyn EventSink>) -> Self {
        Self { sink, config: None, recorder: None, symbols: Dictionary::new() }
    }

    /// Arm the session.
    ///
    /// # Errors
    /// Fails if the session is already running or `config` is invalid; in
    /// both cases the session is left as it was. A failed reallocation
    /// leaves the session unconfigured.
    pub fn start(&mut self, config: SessionConfig) -> Result<(), SessionError> {
        if self.is_running() {
            return Err(SessionError::AlreadyRunning);
        }
        if let Err(e) = config.validate() {
            warn!("Rejected session configuration: {e}");
            return Err(e.into());
        }

        if self.config == Some(config) {
            debug!("Resuming session with unchanged configuration");
        } else {
            info!(
                "Allocating session: {} stripes, depth {}, {} traces, {} frames",
                config.stripes, config.max_stack_depth, config.trace_capacity, config.frame_capacity
            );
            self.recorder = None;
            self.config = None;
            self.recorder = Some(SampleRecorder::new(&config, Arc::clone(&self.sink))?);
            self.config = Some(config);
        }

        if let Some(recorder) = &self.recorder {
            recorder.set_running(true);
        }
        info!("Profiling session started");
        Ok(())
    }

    /// Disarm the session. Collected data is kept.
    ///
    /// # Errors
    /// Returns [`SessionError::NotRunning`] if the session was not started.
    pub fn stop(&self) -> Result<(), SessionError> {
        match &self.recorder {
            Some(recorder) if recorder.is_running() => {
                recorder.set_running(false);
                info!("Profiling session stopped");
                Ok(())
            }
            _ => Err(SessionError::NotRunning),
        }
    }

    #[must_use]
    pub fn is_running(&self) -> bool {
        self.recorder.as_ref().is_some_and(SampleRecorder::is_running)
    }

    /// Configuration of the current allocation, if any
    #[must_use]
    pub fn config(&self) -> Option<&SessionConfig> {
        self.config.as_ref()
    }

    /// The signal-handler entry point, once the session has been started
    #[must_use]
    pub fn recorder(&self) -> Option<&SampleRecorder> {
        self.recorder.as_ref()
    }

    /// Record one sample. Signal-safe.
    pub fn record_sample<W>(&self, tid: ThreadId, event: &Event, walker: &W) -> RecordOutcome
    where
        W: StackWalker + ?Sized,
    {
        match &self.recorder {
            Some(recorder) => recorder.record_sample(tid, event, walker),
            None => RecordOutcome::Dropped(DropReason::NotRunning),
        }
    }

    /// Attribute `event` to a known trace. Signal-safe.
    pub fn record_known(&self, tid: ThreadId, trace_id: TraceId, event: &Event) -> RecordOutcome {
        match &self.recorder {
            Some(recorder) => recorder.record_known(tid, trace_id, event),
            None => RecordOutcome::Dropped(DropReason::NotRunning),
        }
    }

    /// Intern a thread, method or class name. Allocates; not signal-safe.
    pub fn intern_name(&self, name: &str) -> u32 {
        self.symbols.lookup(name.as_bytes())
    }

    /// Id of an already interned name
    #[must_use]
    pub fn lookup_name(&self, name: &str) -> Option<u32> {
        self.symbols.lookup_existing(name.as_bytes())
    }

    /// Drop every trace, name and counter. Ids restart from the base.
    pub fn clear(&mut self) {
        if let Some(recorder) = &self.recorder {
            recorder.clear();
        }
        self.symbols.clear();
        info!("Profiling session cleared");
    }

    /// Bytes currently held by the session's structures
    #[must_use]
    pub fn used_memory(&self) -> usize {
        self.recorder.as_ref().map_or(0, SampleRecorder::used_memory) + self.symbols.used_memory()
    }

    #[must_use]
    pub fn stats(&self) -> ProfileStats {
        let mut stats = ProfileStats {
            running: self.is_running(),
            names: self.symbols.len(),
            used_memory: self.used_memory(),
            ..ProfileStats::default()
        };
        if let Some(recorder) = &self.recorder {
            stats.stripes = recorder.stripes().len();
            stats.traces = recorder.storage().len();
            stats.overflow_samples = recorder.storage().overflow_count();
            stats.reserved_memory = recorder.storage().reserved_memory();
            stats.failures = recorder.failures().snapshot();
        }
        stats
    }

    /// Copy out samples, traces and names.
    ///
    /// Holds every stripe shared while the store is read, so recording
    /// threads drop samples (as contention) for the duration.
    #[must_use]
    pub fn dump(&self) -> Profile {
        let mut profile = Profile { stats: self.stats(), ..Profile::default() };

        if let Some(recorder) = &self.recorder {
            let mut samples = Vec::new();
            let mut traces = BTreeMap::new();
            {
                let held = recorder.stripes().lock_all_shared();
                recorder.storage().collect_samples(&held, &mut samples);
                recorder.storage().collect_traces(&held, &mut traces);
            }
            profile.samples = samples.into_iter().map(ProfileSample::from).collect();
            profile.samples.sort_by_key(|s| s.trace_id);
            profile.traces = traces
                .iter()
                .map(|(&id, trace)| ProfileTrace::from_call_trace(id, trace))
                .collect();
        }

        let mut names = BTreeMap::new();
        self.symbols.collect(&mut names);
        profile.names = names
            .into_iter()
            .map(|(id, bytes)| ProfileName { id, name: String::from_utf8_lossy(&bytes).into_owned() })
            .collect();

        debug!(
            "Dumped {} samples, {} traces, {} names",
            profile.samples.len(),
            profile.traces.len(),
            profile.names.len()
        );
        profile
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::intern::BASE_INDEX;
    use crate::recorder::NullSink;
    use tracecore_common::FrameDescriptor;

    fn small_config() -> SessionConfig {
        SessionConfig::default()
            .with_stripes(4)
            .with_max_stack_depth(16)
            .with_trace_capacity(64)
            .with_frame_capacity(1024)
    }

    fn walker(_tid: ThreadId, _event: &Event, frames: &mut [FrameDescriptor]) -> usize {
        frames[0] = FrameDescriptor::new(1, 0);
        frames[1] = FrameDescriptor::new(2, 0);
        2
    }

    fn cpu() -> Event {
        Event::ExecutionSample { cpu_time_ns: 1_000 }
    }

    #[test]
    fn test_default_config_is_valid() {
        assert_eq!(SessionConfig::default().validate(), Ok(()));
    }

    #[test]
    fn test_validate_rejects_each_bad_size() {
        let base = small_config();
        assert_eq!(base.with_stripes(0).validate(), Err(ConfigError::ZeroStripes));
        assert_eq!(base.with_max_stack_depth(0).validate(), Err(ConfigError::ZeroStackDepth));
        assert_eq!(
            base.with_max_stack_depth(MAX_STACK_DEPTH + 1).validate(),
            Err(ConfigError::StackDepthTooLarge { requested: MAX_STACK_DEPTH + 1, limit: MAX_STACK_DEPTH })
        );
        assert_eq!(base.with_trace_capacity(0).validate(), Err(ConfigError::ZeroTraceCapacity));
        assert_eq!(
            base.with_frame_capacity(8).validate(),
            Err(ConfigError::FrameCapacityTooSmall { frames: 8, depth: 16 })
        );
        assert_eq!(base.with_sink_capacity(0).validate(), Err(ConfigError::ZeroSinkCapacity));
    }

    #[test]
    fn test_start_rejects_invalid_config() {
        let mut profiler = Profiler::new(Arc::new(NullSink));
        let err = profiler.start(small_config().with_stripes(0)).unwrap_err();
        assert!(matches!(err, SessionError::InvalidConfig(ConfigError::ZeroStripes)));
        assert!(!profiler.is_running());
        assert!(profiler.recorder().is_none());
    }

    #[test]
    fn test_start_stop_lifecycle() {
        let mut profiler = Profiler::new(Arc::new(NullSink));
        assert!(matches!(profiler.stop(), Err(SessionError::NotRunning)));

        profiler.start(small_config()).unwrap();
        assert!(profiler.is_running());
        assert!(matches!(profiler.start(small_config()), Err(SessionError::AlreadyRunning)));

        profiler.stop().unwrap();
        assert!(!profiler.is_running());
        assert!(matches!(profiler.stop(), Err(SessionError::NotRunning)));
    }

    #[test]
    fn test_reserved_memory_is_fixed_at_start() {
        let mut profiler = Profiler::new(Arc::new(NullSink));
        assert_eq!(profiler.stats().reserved_memory, 0);

        profiler.start(small_config()).unwrap();
        let reserved = profiler.stats().reserved_memory;
        let stored_before = profiler.recorder().map(|r| r.storage().used_memory()).unwrap();
        assert!(reserved > stored_before);

        for _ in 0..10 {
            profiler.record_sample(ThreadId(1), &cpu(), &walker);
        }
        assert_eq!(profiler.stats().reserved_memory, reserved);
        assert!(profiler.recorder().map(|r| r.storage().used_memory()).unwrap() <= reserved);
    }

    #[test]
    fn test_idle_session_drops_samples() {
        let profiler = Profiler::new(Arc::new(NullSink));
        assert_eq!(
            profiler.record_sample(ThreadId(1), &cpu(), &walker),
            RecordOutcome::Dropped(DropReason::NotRunning)
        );
    }

    #[test]
    fn test_resume_keeps_traces() {
        let mut profiler = Profiler::new(Arc::new(NullSink));
        profiler.start(small_config()).unwrap();
        profiler.record_sample(ThreadId(1), &cpu(), &walker);
        profiler.stop().unwrap();

        profiler.start(small_config()).unwrap();
        assert_eq!(profiler.stats().traces, 1);

        profiler.stop().unwrap();
        profiler.start(small_config().with_stripes(8)).unwrap();
        assert_eq!(profiler.stats().traces, 0);
        assert_eq!(profiler.stats().stripes, 8);
    }

    #[test]
    fn test_dump_collects_everything() {
        let mut profiler = Profiler::new(Arc::new(NullSink));
        profiler.start(small_config()).unwrap();
        let main = profiler.intern_name("main");
        let id = profiler.record_sample(ThreadId(1), &cpu(), &walker).trace_id().unwrap();
        profiler.record_sample(ThreadId(2), &cpu(), &walker);

        let profile = profiler.dump();
        assert_eq!(profile.samples.len(), 1);
        assert_eq!(profile.samples[0].trace_id, id);
        assert_eq!(profile.samples[0].samples, 2);
        assert_eq!(profile.samples[0].counter, 2_000);
        assert_eq!(profile.trace_index()[&id].frames.len(), 2);
        assert_eq!(profile.name(main), Some("main"));
        assert_eq!(profile.stats.failures.total_samples, 2);
    }

    #[test]
    fn test_clear_restarts_ids_and_memory() {
        let mut profiler = Profiler::new(Arc::new(NullSink));
        profiler.start(small_config()).unwrap();
        let baseline = profiler.used_memory();

        let first = profiler.intern_name("worker-1");
        assert!(first >= BASE_INDEX);
        for i in 2..1_000 {
            profiler.intern_name(&format!("worker-{i}"));
        }
        profiler.record_sample(ThreadId(1), &cpu(), &walker);
        assert!(profiler.used_memory() > baseline);

        profiler.clear();
        assert_eq!(profiler.used_memory(), baseline);
        assert_eq!(profiler.lookup_name("worker-1"), None);
        assert_eq!(profiler.intern_name("worker-1"), first);
        assert!(profiler.dump().samples.is_empty());
    }
}
