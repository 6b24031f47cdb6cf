//! Byte-budget batch splitting.

use crate::buffer::BufferedSpan;
use tracing::warn;

/// Size assumed for a span whose body cannot be measured.
const FALLBACK_SPAN_SIZE: usize = 1024;

/// Partition spans into order-preserving batches whose estimated serialized
/// size stays within `max_bytes`.
///
/// Greedy packing: spans accumulate into the current batch until the next one
/// would overflow it. A single span larger than `max_bytes` is emitted alone
/// in its own batch with a warning; it is never dropped for being oversized.
pub(crate) fn split_batches(
    spans: Vec<BufferedSpan>,
    max_bytes: usize,
) -> Vec<Vec<BufferedSpan>> {
    let mut batches = Vec::new();
    let mut current = Vec::new();
    let mut current_size = 0usize;

    for span in spans {
        let size = estimated_size(&span);

        if size > max_bytes {
            if !current.is_empty() {
                batches.push(std::mem::take(&mut current));
                current_size = 0;
            }
            warn!(
                name = span.body.get("name").and_then(|n| n.as_str()).unwrap_or("unknown"),
                trace_id = %span.key.0,
                size,
                limit = max_bytes,
                "span exceeds the batch size limit; sending it in its own batch"
            );
            batches.push(vec![span]);
            continue;
        }

        if !current.is_empty() && current_size + size > max_bytes {
            batches.push(std::mem::take(&mut current));
            current_size = 0;
        }
        current_size += size;
        current.push(span);
    }

    if !current.is_empty() {
        batches.push(current);
    }
    batches
}

fn estimated_size(span: &BufferedSpan) -> usize {
    serde_json::to_vec(&span.body)
        .map(|encoded| encoded.len())
        .unwrap_or(FALLBACK_SPAN_SIZE)
}
