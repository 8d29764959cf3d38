//! Counter/gauge/histogram primitives and the aggregate statistics
//! structures for the forwarder and the NFP routing protocol.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

/* ---------------------------------------------------------------- *
 * Counter
 * ---------------------------------------------------------------- */

/// A monotonically increasing counter.
#[derive(Debug, Default)]
pub struct Counter {
    value: AtomicU64,
}

impl Counter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn increment(&self) {
        self.value.fetch_add(1, Ordering::Relaxed);
    }

    pub fn add(&self, value: u64) {
        self.value.fetch_add(value, Ordering::Relaxed);
    }

    pub fn value(&self) -> u64 {
        self.value.load(Ordering::Relaxed)
    }
}

impl Clone for Counter {
    fn clone(&self) -> Self {
        let c = Counter::new();
        c.value.store(self.value(), Ordering::Relaxed);
        c
    }
}

/* ---------------------------------------------------------------- *
 * Gauge
 * ---------------------------------------------------------------- */

/// A value that can move up and down, e.g. a table's current size.
#[derive(Debug, Default)]
pub struct Gauge {
    value: AtomicU64,
}

impl Gauge {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, value: u64) {
        self.value.store(value, Ordering::Relaxed);
    }

    pub fn increment(&self) {
        self.value.fetch_add(1, Ordering::Relaxed);
    }

    pub fn decrement(&self) {
        self.value.fetch_sub(1, Ordering::Relaxed);
    }

    pub fn value(&self) -> u64 {
        self.value.load(Ordering::Relaxed)
    }
}

impl Clone for Gauge {
    fn clone(&self) -> Self {
        let g = Gauge::new();
        g.value.store(self.value(), Ordering::Relaxed);
        g
    }
}

/* ---------------------------------------------------------------- *
 * Timer
 * ---------------------------------------------------------------- */

/// Accumulates wall-clock durations, e.g. per-packet service time.
#[derive(Debug)]
pub struct Timer {
    sum_micros: AtomicU64,
    count: AtomicU64,
}

impl Default for Timer {
    fn default() -> Self {
        Self {
            sum_micros: AtomicU64::new(0),
            count: AtomicU64::new(0),
        }
    }
}

impl Timer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn observe(&self, elapsed: Duration) {
        self.sum_micros
            .fetch_add(elapsed.as_micros() as u64, Ordering::Relaxed);
        self.count.fetch_add(1, Ordering::Relaxed);
    }

    pub fn count(&self) -> u64 {
        self.count.load(Ordering::Relaxed)
    }

    pub fn average_micros(&self) -> f64 {
        let c = self.count();
        if c == 0 {
            0.0
        } else {
            self.sum_micros.load(Ordering::Relaxed) as f64 / c as f64
        }
    }
}

impl Clone for Timer {
    fn clone(&self) -> Self {
        Self {
            sum_micros: AtomicU64::new(self.sum_micros.load(Ordering::Relaxed)),
            count: AtomicU64::new(self.count()),
        }
    }
}

/// Scoped helper: `start()` an instant, `stop()` it into a `Timer`.
#[derive(Debug, Clone, Copy)]
pub struct Stopwatch(Instant);

impl Stopwatch {
    pub fn start() -> Self {
        Self(Instant::now())
    }

    pub fn stop(self, timer: &Timer) -> Duration {
        let elapsed = self.0.elapsed();
        timer.observe(elapsed);
        elapsed
    }
}

/* ---------------------------------------------------------------- *
 * Aggregate metrics
 * ---------------------------------------------------------------- */

/// Forwarder-wide statistics, per spec.md §4.5 ("Statistics").
#[derive(Debug, Default)]
pub struct ForwarderMetrics {
    pub packets_in: Counter,
    pub packets_out: Counter,
    pub drop_unsupported_packet_type: Counter,

    pub interests_to_pit: Counter,
    pub interests_pit_forward: Counter,
    pub interests_pit_aggregate: Counter,
    pub interests_to_cs: Counter,
    pub interests_cs_hit: Counter,
    pub interests_cs_miss: Counter,
    pub interests_to_fib: Counter,
    pub interests_fib_hit: Counter,
    pub interests_fib_miss: Counter,

    pub content_objects_to_pit: Counter,
    pub content_objects_pit_hit: Counter,
    pub content_objects_pit_miss: Counter,
    pub content_objects_to_cs: Counter,
    pub content_objects_cs_stored: Counter,

    pub pit_size: Gauge,
    pub fib_size: Gauge,
    pub cs_size: Gauge,

    pub pipeline_service_time: Timer,
}

impl ForwarderMetrics {
    pub fn new() -> Self {
        Self::default()
    }
}

/// NFP routing protocol statistics.
#[derive(Debug, Default)]
pub struct NfpMetrics {
    pub hellos_sent: Counter,
    pub hellos_received: Counter,
    pub advertisements_sent: Counter,
    pub advertisements_received: Counter,
    pub withdraws_sent: Counter,
    pub withdraws_received: Counter,
    pub payloads_dropped_out_of_order: Counter,
    pub payloads_dropped_self: Counter,
    pub neighbors_up: Gauge,
    pub neighbors_down: Gauge,
    pub neighbors_dead_total: Counter,
    pub routes_installed: Counter,
    pub routes_withdrawn: Counter,
}

impl NfpMetrics {
    pub fn new() -> Self {
        Self::default()
    }
}

/// QUIC transport statistics, kept alongside the forwarder and NFP
/// metrics so a node can report all three from one place.
#[derive(Debug, Default)]
pub struct TransportMetrics {
    pub faces_opened: Counter,
    pub faces_closed: Counter,
    pub packets_sent: Counter,
    pub packets_received: Counter,
    pub send_errors: Counter,
    pub decode_errors: Counter,
}

impl TransportMetrics {
    pub fn new() -> Self {
        Self::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counter_accumulates() {
        let c = Counter::new();
        c.increment();
        c.add(4);
        assert_eq!(c.value(), 5);
    }

    #[test]
    fn gauge_tracks_current_value() {
        let g = Gauge::new();
        g.increment();
        g.increment();
        g.decrement();
        assert_eq!(g.value(), 1);
    }

    #[test]
    fn timer_averages() {
        let t = Timer::new();
        t.observe(Duration::from_micros(10));
        t.observe(Duration::from_micros(20));
        assert_eq!(t.count(), 2);
        assert!((t.average_micros() - 15.0).abs() < 1e-9);
    }
}
