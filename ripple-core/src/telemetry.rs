//! Metrics reporting contract.
//!
//! A pluggable provider trait behind a small config struct: the store
//! facade depends only on the trait, and production wiring supplies
//! whichever concrete reporter (StatsD, OTel, a test spy) fits.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Where metrics are reported to and how heavily sampled they are.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricsConfig {
    /// Fraction of events actually forwarded to the inner reporter, in
    /// `[0.0, 1.0]`. `1.0` reports everything.
    pub sampling_rate: f64,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self { sampling_rate: 1.0 }
    }
}

/// A sink for counters and durations emitted by the store, sync engine,
/// saga coordinator, and compliance spine.
pub trait MetricsReporter: Send + Sync {
    fn record_counter(&self, name: &'static str, value: u64);
    fn record_duration(&self, name: &'static str, value: Duration);
}

/// A `MetricsReporter` that never reports (the default when no provider is
/// configured).
#[derive(Debug, Default, Clone, Copy)]
pub struct NullReporter;

impl MetricsReporter for NullReporter {
    fn record_counter(&self, _name: &'static str, _value: u64) {}
    fn record_duration(&self, _name: &'static str, _value: Duration) {}
}

/// Wraps an inner reporter and forwards only a sampled fraction of events,
/// using a counter-based deterministic sampler rather than `rand` so the
/// sampling decision doesn't depend on a thread-local RNG.
pub struct SampledReporter<R: MetricsReporter> {
    inner: R,
    sampling_rate: f64,
    seen: AtomicU64,
}

impl<R: MetricsReporter> SampledReporter<R> {
    pub fn new(inner: R, config: MetricsConfig) -> Self {
        Self {
            inner,
            sampling_rate: config.sampling_rate.clamp(0.0, 1.0),
            seen: AtomicU64::new(0),
        }
    }

    fn should_report(&self) -> bool {
        if self.sampling_rate >= 1.0 {
            return true;
        }
        if self.sampling_rate <= 0.0 {
            return false;
        }
        let n = self.seen.fetch_add(1, Ordering::Relaxed);
        // Report every `1 / sampling_rate`-th event, e.g. rate 0.25 -> every 4th.
        let stride = (1.0 / self.sampling_rate).round().max(1.0) as u64;
        n % stride == 0
    }
}

impl<R: MetricsReporter> MetricsReporter for SampledReporter<R> {
    fn record_counter(&self, name: &'static str, value: u64) {
        if self.should_report() {
            self.inner.record_counter(name, value);
        }
    }

    fn record_duration(&self, name: &'static str, value: Duration) {
        if self.should_report() {
            self.inner.record_duration(name, value);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicU64 as Counter;
    use std::sync::Arc;

    struct SpyReporter {
        counters: Arc<Counter>,
    }

    impl MetricsReporter for SpyReporter {
        fn record_counter(&self, _name: &'static str, value: u64) {
            self.counters.fetch_add(value, Ordering::Relaxed);
        }
        fn record_duration(&self, _name: &'static str, _value: Duration) {}
    }

    #[test]
    fn full_sampling_forwards_every_event() {
        let counters = Arc::new(Counter::new(0));
        let spy = SpyReporter {
            counters: counters.clone(),
        };
        let sampled = SampledReporter::new(spy, MetricsConfig { sampling_rate: 1.0 });
        for _ in 0..5 {
            sampled.record_counter("op", 1);
        }
        assert_eq!(counters.load(Ordering::Relaxed), 5);
    }

    #[test]
    fn zero_sampling_forwards_nothing() {
        let counters = Arc::new(Counter::new(0));
        let spy = SpyReporter {
            counters: counters.clone(),
        };
        let sampled = SampledReporter::new(spy, MetricsConfig { sampling_rate: 0.0 });
        for _ in 0..5 {
            sampled.record_counter("op", 1);
        }
        assert_eq!(counters.load(Ordering::Relaxed), 0);
    }

    #[test]
    fn half_sampling_forwards_roughly_half() {
        let counters = Arc::new(Counter::new(0));
        let spy = SpyReporter {
            counters: counters.clone(),
        };
        let sampled = SampledReporter::new(spy, MetricsConfig { sampling_rate: 0.5 });
        for _ in 0..10 {
            sampled.record_counter("op", 1);
        }
        assert_eq!(counters.load(Ordering::Relaxed), 5);
    }
}
