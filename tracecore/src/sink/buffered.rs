//! # Buffered Event Sink
//!
//! One bounded `crossbeam-channel` queue per stripe. Since a stripe has at
//! most one holder, each queue has a single producer at a time.
//!
//! ```text
//!  stripe 0 ──try_send──► [■■■□□□] ─┐
//!  stripe 1 ──try_send──► [■□□□□□] ─┼──► drain() on a regular thread
//!  stripe N ──try_send──► [■■■■■■] ─┘      (full queue: record dropped)
//! ```
//!
//! The write path never blocks or allocates: queue storage is reserved at
//! construction and a full queue just bumps the dropped counter. Receivers
//! only ever poll with `try_recv`, so no sender has to wake anyone.

use std::sync::atomic::{AtomicU64, Ordering};

use crossbeam_channel::{bounded, Receiver, Sender, TrySendError};
use serde::Serialize;

use crate::domain::{StripeIndex, ThreadId, TraceId};
use crate::recorder::{Event, EventSink};
use crate::session::SessionConfig;

/// One recorded sample as seen by the sink
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SinkRecord {
    pub stripe: StripeIndex,
    pub tid: ThreadId,
    pub trace_id: TraceId,
    pub event: Event,
}

struct Queue {
    tx: Sender<SinkRecord>,
    rx: Receiver<SinkRecord>,
}

/// Per-stripe bounded queues drained off the signal path
pub struct BufferedEventSink {
    queues: Box<[Queue]>,
    written: AtomicU64,
    dropped: AtomicU64,
}

impl BufferedEventSink {
    /// `stripes` queues of `capacity` records each
    #[must_use]
    pub fn new(stripes: usize, capacity: usize) -> Self {
        let queues = (0..stripes)
            .map(|_| {
                let (tx, rx) = bounded(capacity);
                Queue { tx, rx }
            })
            .collect();
        Self { queues, written: AtomicU64::new(0), dropped: AtomicU64::new(0) }
    }

    /// Sized from a session's stripe count and sink capacity
    #[must_use]
    pub fn for_config(config: &SessionConfig) -> Self {
        Self::new(config.stripes, config.sink_capacity)
    }

    /// Move every queued record into `out`, stripe by stripe. Returns how
    /// many were moved.
    pub fn drain(&self, out: &mut Vec<SinkRecord>) -> usize {
        let before = out.len();
        for queue in &*self.queues {
            out.extend(queue.rx.try_iter());
        }
        out.len() - before
    }

    /// Records currently waiting in all queues
    #[must_use]
    pub fn pending(&self) -> usize {
        self.queues.iter().map(|q| q.rx.len()).sum()
    }

    /// Records accepted since construction
    #[must_use]
    pub fn written(&self) -> u64 {
        self.written.load(Ordering::Relaxed)
    }

    /// Records lost to full queues or unknown stripes
    #[must_use]
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

impl EventSink for BufferedEventSink {
    fn write(&self, stripe: StripeIndex, tid: ThreadId, trace_id: TraceId, event: &Event) {
        let Some(queue) = self.queues.get(stripe.0) else {
            self.dropped.fetch_add(1, Ordering::Relaxed);
            return;
        };

        let record = SinkRecord { stripe, tid, trace_id, event: *event };
        match queue.tx.try_send(record) {
            Ok(()) => {
                self.written.fetch_add(1, Ordering::Relaxed);
            }
            Err(TrySendError::Full(_) | TrySendError::Disconnected(_)) => {
                self.dropped.fetch_add(1, Ordering::Relaxed);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn park(ns: u64) -> Event {
        Event::Park { duration_ns: ns }
    }

    #[test]
    fn test_write_then_drain() {
        let sink = BufferedEventSink::new(2, 8);
        sink.write(StripeIndex(0), ThreadId(1), TraceId(3), &park(1));
        sink.write(StripeIndex(1), ThreadId(2), TraceId(4), &park(2));
        assert_eq!(sink.pending(), 2);

        let mut out = Vec::new();
        assert_eq!(sink.drain(&mut out), 2);
        assert_eq!(out[0].trace_id, TraceId(3));
        assert_eq!(out[1].tid, ThreadId(2));
        assert_eq!(sink.pending(), 0);
        assert_eq!(sink.written(), 2);
    }

    #[test]
    fn test_full_queue_drops_without_blocking() {
        let sink = BufferedEventSink::new(1, 2);
        for i in 0..5 {
            sink.write(StripeIndex(0), ThreadId(1), TraceId(1), &park(i));
        }
        assert_eq!(sink.written(), 2);
        assert_eq!(sink.dropped(), 3);

        let mut out = Vec::new();
        sink.drain(&mut out);
        assert_eq!(out.iter().map(|r| r.event.weight()).collect::<Vec<_>>(), vec![0, 1]);
    }

    #[test]
    fn test_unknown_stripe_is_dropped() {
        let sink = BufferedEventSink::new(1, 2);
        sink.write(StripeIndex(5), ThreadId(1), TraceId(1), &park(1));
        assert_eq!(sink.dropped(), 1);
        assert_eq!(sink.pending(), 0);
    }

    #[test]
    fn test_sized_from_config() {
        let config = SessionConfig::default().with_stripes(3).with_sink_capacity(1);
        let sink = BufferedEventSink::for_config(&config);
        for stripe in 0..3 {
            sink.write(StripeIndex(stripe), ThreadId(1), TraceId(1), &park(1));
            sink.write(StripeIndex(stripe), ThreadId(1), TraceId(1), &park(1));
        }
        assert_eq!(sink.written(), 3);
        assert_eq!(sink.dropped(), 3);
    }

    #[test]
    fn test_record_serializes() {
        let record = SinkRecord {
            stripe: StripeIndex(1),
            tid: ThreadId(42),
            trace_id: TraceId(7),
            event: park(9),
        };
        let json = serde_json::to_value(record).unwrap();
        assert_eq!(json["tid"], 42);
        assert_eq!(json["event"]["kind"], "park");
    }
}
