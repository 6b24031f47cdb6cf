//! Bounded, deduplicating holding area for spans awaiting export.

use crate::model::{SpanId, TraceId};
use serde_json::Value;
use std::collections::HashSet;
use std::sync::{Mutex, MutexGuard, PoisonError};
use tracing::debug;

/// Dedup key: the `(trace id, span id)` pair, unique per live entry.
pub(crate) type SpanKey = (TraceId, SpanId);

/// One serialized span together with the key used to deduplicate it.
#[derive(Clone, Debug)]
pub(crate) struct BufferedSpan {
    pub(crate) key: SpanKey,
    pub(crate) body: Value,
}

/// Per-call accounting for [`SpanBuffer::add`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub(crate) struct AddOutcome {
    pub(crate) added: usize,
    pub(crate) dropped: usize,
    pub(crate) duplicates: usize,
}

/// Thread-safe span buffer with a hard capacity bound.
///
/// A single mutex guards both the span list and the dedup-key set, so adds,
/// drains, and requeues are all atomic with respect to each other. Dedup keys
/// outlive a drain: they are only released once the flusher confirms delivery
/// (or deliberately abandons the spans), which keeps a span that failed to
/// send deduplicated against re-additions until it is actually delivered.
#[derive(Debug)]
pub(crate) struct SpanBuffer {
    max_spans: usize,
    inner: Mutex<BufferInner>,
}

#[derive(Debug, Default)]
struct BufferInner {
    spans: Vec<BufferedSpan>,
    keys: HashSet<SpanKey>,
}

impl SpanBuffer {
    pub(crate) fn new(max_spans: usize) -> Self {
        SpanBuffer {
            max_spans,
            inner: Mutex::new(BufferInner::default()),
        }
    }

    /// Append spans, discarding duplicates and anything past capacity.
    pub(crate) fn add(&self, spans: Vec<BufferedSpan>) -> AddOutcome {
        let mut inner = self.lock();
        let mut outcome = AddOutcome::default();
        for span in spans {
            if inner.keys.contains(&span.key) {
                outcome.duplicates += 1;
            } else if inner.spans.len() >= self.max_spans {
                outcome.dropped += 1;
            } else {
                inner.keys.insert(span.key);
                inner.spans.push(span);
                outcome.added += 1;
            }
        }
        outcome
    }

    /// Atomically swap out all buffered spans. Never returns a partial view.
    /// Dedup keys stay tracked until [`SpanBuffer::release_keys`].
    pub(crate) fn drain(&self) -> Vec<BufferedSpan> {
        std::mem::take(&mut self.lock().spans)
    }

    /// Put spans that could not be sent back at the front of the buffer,
    /// preserving their original order, under the same lock `add` uses.
    ///
    /// Their keys are normally still tracked, so requeued spans never
    /// re-count as drops or duplicates; re-inserting the keys here covers a
    /// flush that already released some of them.
    ///
    /// Requeue never drops: if the buffer refilled while the snapshot was in
    /// flight, the result can transiently exceed `max_spans` (at most by one
    /// full snapshot) until the next successful flush. `add` keeps enforcing
    /// the bound for new arrivals.
    pub(crate) fn requeue(&self, mut spans: Vec<BufferedSpan>) {
        let mut inner = self.lock();
        for span in &spans {
            inner.keys.insert(span.key);
        }
        spans.extend(inner.spans.drain(..));
        inner.spans = spans;
        if inner.spans.len() > self.max_spans {
            debug!(
                buffered = inner.spans.len(),
                capacity = self.max_spans,
                "requeue pushed the buffer past capacity until the next flush"
            );
        }
    }

    /// Stop tracking keys whose spans were delivered or deliberately dropped.
    pub(crate) fn release_keys<'a>(&self, keys: impl IntoIterator<Item = &'a SpanKey>) {
        let mut inner = self.lock();
        for key in keys {
            inner.keys.remove(key);
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.lock().spans.len()
    }

    // The buffer must stay usable from the add path even if a panic poisoned
    // the mutex elsewhere.
    fn lock(&self) -> MutexGuard<'_, BufferInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{SpanId, TraceId};
    use serde_json::json;

    fn span(trace: u128, id: u64) -> BufferedSpan {
        BufferedSpan {
            key: (
                TraceId::from_bytes(trace.to_be_bytes()),
                SpanId::from_bytes(id.to_be_bytes()),
            ),
            body: json!({ "trace": trace.to_string(), "span": id }),
        }
    }

    #[test]
    fn duplicate_keys_are_discarded() {
        let buffer = SpanBuffer::new(16);
        let outcome = buffer.add(vec![span(1, 1), span(1, 1), span(1, 2)]);
        assert_eq!(
            outcome,
            AddOutcome {
                added: 2,
                dropped: 0,
                duplicates: 1
            }
        );
        assert_eq!(buffer.len(), 2);

        // Still deduplicated on a later call.
        let outcome = buffer.add(vec![span(1, 2)]);
        assert_eq!(outcome.duplicates, 1);
        assert_eq!(buffer.len(), 2);
    }

    #[test]
    fn capacity_overflow_drops_exactly_the_excess() {
        let buffer = SpanBuffer::new(3);
        let spans: Vec<_> = (0..4).map(|id| span(9, id)).collect();
        let outcome = buffer.add(spans);
        assert_eq!(
            outcome,
            AddOutcome {
                added: 3,
                dropped: 1,
                duplicates: 0
            }
        );
        assert_eq!(buffer.len(), 3);
    }

    #[test]
    fn dropped_spans_do_not_reserve_their_key() {
        let buffer = SpanBuffer::new(1);
        buffer.add(vec![span(1, 1), span(1, 2)]);
        let drained = buffer.drain();
        buffer.release_keys(drained.iter().map(|s| &s.key));
        // The dropped span can be buffered once there is room again.
        let outcome = buffer.add(vec![span(1, 2)]);
        assert_eq!(outcome.added, 1);
    }

    #[test]
    fn drain_keeps_dedup_keys_until_released() {
        let buffer = SpanBuffer::new(16);
        buffer.add(vec![span(1, 1)]);
        let drained = buffer.drain();
        assert_eq!(drained.len(), 1);
        assert_eq!(buffer.len(), 0);

        // Key still tracked: re-adding the same span is a duplicate.
        let outcome = buffer.add(vec![span(1, 1)]);
        assert_eq!(outcome.duplicates, 1);

        buffer.release_keys(drained.iter().map(|s| &s.key));
        let outcome = buffer.add(vec![span(1, 1)]);
        assert_eq!(outcome.added, 1);
    }

    #[test]
    fn requeue_prepends_preserving_order() {
        let buffer = SpanBuffer::new(16);
        buffer.add(vec![span(1, 1), span(1, 2), span(1, 3)]);
        let drained = buffer.drain();

        // New arrivals while the drained snapshot is in flight.
        buffer.add(vec![span(1, 4)]);
        buffer.requeue(drained);

        let order: Vec<_> = buffer
            .drain()
            .into_iter()
            .map(|s| s.key.1.to_string())
            .collect();
        assert_eq!(
            order,
            vec![
                "0000000000000001",
                "0000000000000002",
                "0000000000000003",
                "0000000000000004"
            ]
        );
    }

    #[test]
    fn requeue_never_drops_even_past_capacity() {
        let buffer = SpanBuffer::new(2);
        buffer.add(vec![span(1, 1), span(1, 2)]);
        let drained = buffer.drain();

        // The buffer refills to capacity while the snapshot is in flight.
        buffer.add(vec![span(1, 3), span(1, 4)]);
        buffer.requeue(drained);

        // Everything survives; only new arrivals see the bound again.
        assert_eq!(buffer.len(), 4);
        let outcome = buffer.add(vec![span(1, 5)]);
        assert_eq!(outcome.dropped, 1);
    }

    #[test]
    fn concurrent_adds_never_exceed_capacity() {
        use std::sync::Arc;
        use std::thread;

        let buffer = Arc::new(SpanBuffer::new(100));
        let handles: Vec<_> = (0..4u64)
            .map(|t| {
                let buffer = Arc::clone(&buffer);
                thread::spawn(move || {
                    let mut dropped = 0;
                    for id in 0..50u64 {
                        dropped += buffer.add(vec![span(u128::from(t), id)]).dropped;
                    }
                    dropped
                })
            })
            .collect();
        let dropped: usize = handles.into_iter().map(|h| h.join().unwrap()).sum();
        assert_eq!(buffer.len(), 100);
        assert_eq!(dropped, 100);
    }
}
