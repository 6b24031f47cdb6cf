//! Deterministic trace-id ratio sampling.

use crate::model::TraceId;

const FNV_OFFSET_BASIS: u64 = 0xcbf2_9ce4_8422_2325;
const FNV_PRIME: u64 = 0x0000_0100_0000_01b3;

/// The sampling verdict for a trace.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SamplingDecision {
    /// Spans of this trace are recorded and exported.
    Record,
    /// Spans of this trace are discarded.
    Drop,
}

/// Keeps a fixed fraction of traces by hashing the trace id.
///
/// The decision is a pure function of `(trace_id, rate)`: the same trace id
/// with the same rate always yields the same verdict, in any process, thread,
/// or call order. This keeps all spans of one trace sampled consistently even
/// when each span is evaluated independently.
#[derive(Clone, Debug)]
pub struct TraceIdRatioSampler {
    rate: f64,
}

impl TraceIdRatioSampler {
    /// Create a sampler recording roughly `rate` of all traces.
    ///
    /// Rates at or below zero drop everything; rates at or above one record
    /// everything.
    pub fn new(rate: f64) -> Self {
        TraceIdRatioSampler { rate }
    }

    /// Decide whether spans of this trace should be recorded.
    pub fn should_sample(&self, trace_id: TraceId) -> SamplingDecision {
        if self.rate <= 0.0 {
            return SamplingDecision::Drop;
        }
        if self.rate >= 1.0 {
            return SamplingDecision::Record;
        }
        let hash = fnv1a64(&trace_id.to_bytes());
        // Normalize into [0, 1) against the full u64 range.
        let value = hash as f64 / u64::MAX as f64;
        if value < self.rate {
            SamplingDecision::Record
        } else {
            SamplingDecision::Drop
        }
    }
}

fn fnv1a64(bytes: &[u8]) -> u64 {
    bytes.iter().fold(FNV_OFFSET_BASIS, |hash, byte| {
        (hash ^ u64::from(*byte)).wrapping_mul(FNV_PRIME)
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn trace_id(n: u128) -> TraceId {
        TraceId::from_bytes(n.to_be_bytes())
    }

    #[test]
    fn zero_rate_always_drops() {
        let sampler = TraceIdRatioSampler::new(0.0);
        for n in 0..100u128 {
            assert_eq!(sampler.should_sample(trace_id(n)), SamplingDecision::Drop);
        }
        let negative = TraceIdRatioSampler::new(-0.5);
        assert_eq!(negative.should_sample(trace_id(7)), SamplingDecision::Drop);
    }

    #[test]
    fn full_rate_always_records() {
        let sampler = TraceIdRatioSampler::new(1.0);
        for n in 0..100u128 {
            assert_eq!(sampler.should_sample(trace_id(n)), SamplingDecision::Record);
        }
        let above = TraceIdRatioSampler::new(1.5);
        assert_eq!(above.should_sample(trace_id(7)), SamplingDecision::Record);
    }

    #[test]
    fn decisions_are_deterministic_per_trace() {
        let sampler = TraceIdRatioSampler::new(0.5);
        for n in 0..256u128 {
            let id = trace_id(n * 7919);
            let first = sampler.should_sample(id);
            for _ in 0..10 {
                assert_eq!(sampler.should_sample(id), first);
            }
        }
    }

    #[test]
    fn decisions_agree_across_sampler_instances() {
        let a = TraceIdRatioSampler::new(0.37);
        let b = TraceIdRatioSampler::new(0.37);
        for n in 0..256u128 {
            let id = trace_id(n * 104729);
            assert_eq!(a.should_sample(id), b.should_sample(id));
        }
    }

    #[test]
    fn mid_rate_records_roughly_that_fraction() {
        let sampler = TraceIdRatioSampler::new(0.5);
        let recorded = (0..10_000u128)
            .filter(|n| {
                sampler.should_sample(trace_id(n.wrapping_mul(0x9e3779b97f4a7c15)))
                    == SamplingDecision::Record
            })
            .count();
        // Loose bound; FNV-1a spreads well enough for this tolerance.
        assert!((3_500..=6_500).contains(&recorded), "recorded {recorded}");
    }

    #[test]
    fn fnv1a_matches_reference_vectors() {
        assert_eq!(fnv1a64(b""), 0xcbf2_9ce4_8422_2325);
        assert_eq!(fnv1a64(b"a"), 0xaf63_dc4c_8601_ec8c);
        assert_eq!(fnv1a64(b"foobar"), 0x8594_4171_f739_67e8);
    }
}
