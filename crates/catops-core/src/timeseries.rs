//! Fixed-capacity ring-buffer time series with windowed statistics and
//! spike classification (spec.md §4.2 "Ring-Buffer Timeseries").
//!
//! Modeled as a flat array with two cursors rather than a linked list
//! (spec.md §9 "Arena + indices"): `head` is the index of the oldest
//! entry, `count` the number of live entries, and inserts write at
//! `(head + count) mod capacity`.

use serde::{Deserialize, Serialize};

/// Default ring-buffer capacity (spec.md §3).
pub const DEFAULT_CAPACITY: usize = 20;
/// Default statistics window (spec.md §3).
pub const DEFAULT_WINDOW_SECS: i64 = 300;

/// Default thresholds for [`RingBuffer::detect_spike`] (spec.md §8 scenario
/// tests use these).
pub const DEFAULT_SUDDEN_THRESHOLD_PERCENT: f64 = 50.0;
pub const DEFAULT_GRADUAL_THRESHOLD_PERCENT: f64 = 10.0;
pub const DEFAULT_Z_THRESHOLD: f64 = 4.0;

#[derive(Clone, Copy, Serialize, Deserialize, Debug, PartialEq)]
pub struct TimeseriesEntry {
    pub timestamp: i64,
    pub value: f64,
}

/// Fixed-capacity, O(1)-insert ring buffer of `(timestamp, value)` pairs.
#[derive(Clone, Serialize, Deserialize, Debug)]
pub struct RingBuffer {
    entries: Vec<Option<TimeseriesEntry>>,
    capacity: usize,
    head: usize,
    count: usize,
}

/// Min/max/mean/percentiles over a statistics window. An empty window
/// with at least one point returns only `current` (spec.md §4.2 edge
/// case); a genuinely empty buffer zeroes everything.
#[derive(Clone, Copy, Serialize, Deserialize, Debug, Default, PartialEq)]
pub struct Statistics {
    pub min: f64,
    pub max: f64,
    pub mean: f64,
    pub p50: f64,
    pub p95: f64,
    pub p99: f64,
    pub stddev: f64,
    pub current: f64,
    pub count: usize,
}

/// Three independent spike flags plus diagnostic numbers (spec.md §3
/// "SpikeResult").
#[derive(Clone, Copy, Serialize, Deserialize, Debug, Default, PartialEq)]
pub struct SpikeResult {
    pub sudden: bool,
    pub gradual: bool,
    pub anomalous: bool,
    pub percent_change: f64,
    pub change_over_window: f64,
    pub z_score: f64,
}

impl RingBuffer {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            entries: vec![None; capacity],
            capacity,
            head: 0,
            count: 0,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.count
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    /// Inserts a new entry, overwriting the oldest one once full. O(1).
    pub fn insert(&mut self, timestamp: i64, value: f64) {
        let write_idx = (self.head + self.count) % self.capacity;
        self.entries[write_idx] = Some(TimeseriesEntry { timestamp, value });
        if self.count < self.capacity {
            self.count += 1;
        } else {
            self.head = (self.head + 1) % self.capacity;
        }
    }

    /// Iterates entries oldest-to-newest.
    pub fn iter(&self) -> impl Iterator<Item = TimeseriesEntry> + '_ {
        (0..self.count).map(move |i| self.entries[(self.head + i) % self.capacity].unwrap())
    }

    /// Returns the most recently inserted entry.
    pub fn latest(&self) -> Option<TimeseriesEntry> {
        if self.count == 0 {
            return None;
        }
        self.entries[(self.head + self.count - 1) % self.capacity]
    }

    /// Computes [`Statistics`] over all entries with `timestamp > now -
    /// window_secs`.
    pub fn statistics(&self, now: i64, window_secs: i64) -> Statistics {
        let Some(latest) = self.latest() else {
            return Statistics::default();
        };

        let mut values: Vec<f64> = self
            .iter()
            .filter(|e| e.timestamp > now - window_secs)
            .map(|e| e.value)
            .collect();

        if values.is_empty() {
            return Statistics {
                current: latest.value,
                count: 0,
                ..Default::default()
            };
        }

        values.sort_by(f64::total_cmp);
        let n = values.len();
        let min = values[0];
        let max = values[n - 1];
        let sum: f64 = values.iter().sum();
        let mean = sum / n as f64;
        let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n as f64;
        let stddev = variance.sqrt();

        Statistics {
            min,
            max,
            mean,
            p50: percentile(&values, 50.0),
            p95: percentile(&values, 95.0),
            p99: percentile(&values, 99.0),
            stddev,
            current: latest.value,
            count: n,
        }
    }

    /// Classifies the latest value against `sudden`/`gradual`/`anomalous`
    /// thresholds, comparing against the previous entry (sudden) and the
    /// oldest entry still inside the window (gradual), per spec.md §3.
    pub fn detect_spike(
        &self,
        now: i64,
        window_secs: i64,
        sudden_threshold: f64,
        gradual_threshold: f64,
        z_threshold: f64,
    ) -> SpikeResult {
        let stats = self.statistics(now, window_secs);
        let mut result = SpikeResult::default();

        if self.count < 2 {
            return result;
        }

        let entries: Vec<TimeseriesEntry> = self.iter().collect();
        let current = entries[entries.len() - 1];
        let previous = entries[entries.len() - 2];

        // Sudden: compare against the immediately-previous sample.
        let (sudden, pct) = step_exceeds(previous.value, current.value, sudden_threshold);
        result.sudden = sudden;
        result.percent_change = pct;

        // Gradual: compare against the oldest sample still inside the window.
        let windowed: Vec<TimeseriesEntry> = entries
            .iter()
            .copied()
            .filter(|e| e.timestamp > now - window_secs)
            .collect();
        if let Some(oldest) = windowed.first() {
            let (gradual, change) = step_exceeds(oldest.value, current.value, gradual_threshold);
            result.gradual = gradual;
            result.change_over_window = change_over_window(oldest.value, current.value, change);
        }

        // Anomalous: z-score against the window's mean/stddev.
        if stats.stddev > 0.0 {
            let z = (current.value - stats.mean).abs() / stats.stddev;
            result.z_score = z;
            result.anomalous = z > z_threshold && current.value > 10.0;
        }

        result
    }
}

/// Evaluates the three-condition "step" rule shared by `sudden` and
/// `gradual`: `(cur-prev)/prev*100 > threshold AND cur > 10 AND cur-prev >
/// 5`. When `prev == 0`, compares the absolute change directly against
/// `threshold` instead (avoids divide-by-zero, spec.md §4.2 edge case).
/// Returns `(flag, percent_or_absolute_change)`.
fn step_exceeds(prev: f64, cur: f64, threshold: f64) -> (bool, f64) {
    let delta = cur - prev;
    if prev == 0.0 {
        let flag = delta > threshold && cur > 10.0 && delta > 5.0;
        return (flag, delta);
    }
    let pct = delta / prev * 100.0;
    let flag = pct > threshold && cur > 10.0 && delta > 5.0;
    (flag, pct)
}

fn change_over_window(oldest: f64, current: f64, computed: f64) -> f64 {
    if oldest == 0.0 {
        current - oldest
    } else {
        computed
    }
}

/// Nearest-rank percentile over an already-sorted slice.
fn percentile(sorted: &[f64], p: f64) -> f64 {
    if sorted.is_empty() {
        return 0.0;
    }
    if sorted.len() == 1 {
        return sorted[0];
    }
    let rank = (p / 100.0) * (sorted.len() - 1) as f64;
    let lower = rank.floor() as usize;
    let upper = rank.ceil() as usize;
    if lower == upper {
        sorted[lower]
    } else {
        let frac = rank - lower as f64;
        sorted[lower] + (sorted[upper] - sorted[lower]) * frac
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn capacity_is_never_exceeded() {
        let mut rb = RingBuffer::new(5);
        for i in 0..20 {
            rb.insert(i, i as f64);
        }
        assert_eq!(rb.len(), 5);
        let values: Vec<f64> = rb.iter().map(|e| e.value).collect();
        assert_eq!(values, vec![15.0, 16.0, 17.0, 18.0, 19.0]);
    }

    #[test]
    fn iteration_order_is_oldest_to_newest() {
        let mut rb = RingBuffer::new(3);
        rb.insert(1, 10.0);
        rb.insert(2, 20.0);
        let values: Vec<f64> = rb.iter().map(|e| e.value).collect();
        assert_eq!(values, vec![10.0, 20.0]);
    }

    #[test]
    fn empty_buffer_has_zeroed_stats_and_no_spikes() {
        let rb = RingBuffer::new(10);
        let stats = rb.statistics(0, 300);
        assert_eq!(stats, Statistics::default());
        let spike = rb.detect_spike(0, 300, 50.0, 10.0, 4.0);
        assert!(!spike.sudden && !spike.gradual && !spike.anomalous);
    }

    #[test]
    fn single_point_has_only_current() {
        let mut rb = RingBuffer::new(10);
        rb.insert(0, 42.0);
        let stats = rb.statistics(10, 300);
        assert_eq!(stats.current, 42.0);
        assert_eq!(stats.count, 1);
        let spike = rb.detect_spike(10, 300, 50.0, 10.0, 4.0);
        assert!(!spike.sudden && !spike.gradual && !spike.anomalous);
    }

    #[test]
    fn percentile_monotonicity_holds() {
        let mut rb = RingBuffer::new(20);
        for (i, v) in [5.0, 1.0, 9.0, 3.0, 7.0, 2.0, 8.0, 4.0, 6.0].into_iter().enumerate() {
            rb.insert(i as i64, v);
        }
        let stats = rb.statistics(100, 300);
        assert!(stats.p50 <= stats.p95);
        assert!(stats.p95 <= stats.p99);
        assert!(stats.p99 <= stats.max);
        assert!(stats.min <= stats.mean);
        assert!(stats.mean <= stats.max);
    }

    /// spec.md §8 scenario 1: sudden CPU spike.
    #[test]
    fn sudden_cpu_spike() {
        let mut rb = RingBuffer::new(20);
        for i in 0..10 {
            rb.insert(i, 30.0);
        }
        rb.insert(10, 95.0);
        let spike = rb.detect_spike(10, 300, 50.0, 10.0, 4.0);
        assert!(spike.sudden);
        assert!((spike.percent_change - 216.666_67).abs() < 0.01);
        assert!(spike.anomalous);
    }

    /// spec.md §8 scenario 2: gradual rise.
    #[test]
    fn gradual_rise() {
        let mut rb = RingBuffer::new(20);
        let mut v = 50.0;
        for i in 0..20 {
            rb.insert(i, v);
            v += 0.75;
        }
        let spike = rb.detect_spike(19, 300, 50.0, 10.0, 4.0);
        assert!(spike.gradual);
        assert!(!spike.sudden);
        assert!((spike.change_over_window - 14.25).abs() < 0.01);
    }

    /// spec.md §8 scenario 3: no false positive on fluctuation.
    #[test]
    fn no_false_positive_on_fluctuation() {
        let mut rb = RingBuffer::new(20);
        for (i, v) in [45.0, 47.0, 46.0, 48.0, 47.0, 49.0, 48.0, 46.0, 47.0, 48.0]
            .into_iter()
            .enumerate()
        {
            rb.insert(i as i64, v);
        }
        let spike = rb.detect_spike(10, 300, 50.0, 10.0, 4.0);
        assert!(!spike.sudden);
        assert!(!spike.gradual);
        assert!(!spike.anomalous);
    }

    /// spec.md §8 "spike disjointness": constant series never spikes, and
    /// a single qualifying step sets `sudden` only.
    #[test]
    fn spike_disjointness_constant_series() {
        let mut rb = RingBuffer::new(20);
        for i in 0..15 {
            rb.insert(i, 20.0);
        }
        let spike = rb.detect_spike(14, 300, 50.0, 10.0, 4.0);
        assert!(!spike.sudden && !spike.gradual && !spike.anomalous);
    }

    #[test]
    fn spike_disjointness_single_step() {
        let mut rb = RingBuffer::new(20);
        for i in 0..10 {
            rb.insert(i, 20.0);
        }
        rb.insert(10, 30.0); // (30-20)/20*100 = 50, not > 50 threshold
        rb.insert(11, 45.0); // (45-30)/30*100 = 50, still not >
        rb.insert(12, 100.0); // (100-45)/45*100 = 122 > 50, cur>10, delta=55>5
        let spike = rb.detect_spike(12, 300, 50.0, 10.0, 4.0);
        assert!(spike.sudden);
    }

    #[test]
    fn gradual_rise_oldest_zero_uses_absolute_change() {
        let mut rb = RingBuffer::new(20);
        rb.insert(0, 0.0);
        rb.insert(1, 20.0);
        let spike = rb.detect_spike(1, 300, 50.0, 10.0, 4.0);
        assert!(spike.gradual);
        assert_eq!(spike.change_over_window, 20.0);
    }
}
