use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use tracecore::domain::ThreadId;
use tracecore::recorder::{Event, NullSink, ThreadState};
use tracecore::session::{Profiler, SessionConfig};
use tracecore::synthetic::SyntheticWalker;

fn config() -> SessionConfig {
    SessionConfig::default()
        .with_stripes(4)
        .with_max_stack_depth(32)
        .with_trace_capacity(256)
        .with_frame_capacity(256 * 32)
}

#[test]
fn test_clear_returns_to_empty_baseline() {
    let mut profiler = Profiler::new(Arc::new(NullSink));
    profiler.start(config()).expect("valid configuration");
    let baseline = profiler.used_memory();
    let first_name = profiler.intern_name("first");

    let walker = SyntheticWalker::new(&profiler, 50, 20);
    let event = Event::WallClock { interval_ns: 100, state: ThreadState::Sleeping };
    for i in 0..1_000 {
        profiler.record_sample(ThreadId(i), &event, &walker);
    }
    assert!(profiler.used_memory() > baseline);
    assert!(profiler.stats().traces > 1);

    profiler.clear();

    assert_eq!(profiler.used_memory(), baseline);
    let stats = profiler.stats();
    assert_eq!(stats.traces, 0);
    assert_eq!(stats.names, 0);
    assert_eq!(stats.failures.total_samples, 0);
    assert!(profiler.dump().samples.is_empty());

    // Ids restart from the base sequence.
    assert_eq!(profiler.intern_name("first"), first_name);
}

#[test]
fn test_dump_while_sampling_is_consistent() {
    let mut profiler = Profiler::new(Arc::new(NullSink));
    profiler.start(config()).expect("valid configuration");
    let walker = SyntheticWalker::new(&profiler, 8, 6);
    let event = Event::ExecutionSample { cpu_time_ns: 1 };
    let deadline = Instant::now() + Duration::from_millis(200);

    thread::scope(|s| {
        for t in 0..4 {
            let (profiler, walker) = (&profiler, &walker);
            s.spawn(move || {
                while Instant::now() < deadline {
                    profiler.record_sample(ThreadId(t), &event, walker);
                }
            });
        }

        while Instant::now() < deadline {
            let profile = profiler.dump();
            // Every sampled trace has its frames in the same snapshot.
            let traces = profile.trace_index();
            for sample in &profile.samples {
                assert!(traces.get(&sample.trace_id).is_some_and(|t| !t.frames.is_empty()));
            }
            thread::sleep(Duration::from_millis(5));
        }
    });

    let stats = profiler.stats().failures;
    assert!(stats.total_samples > 0);
}
