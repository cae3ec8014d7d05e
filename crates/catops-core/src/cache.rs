//! Single-writer/many-reader snapshot cache (spec.md §4.5 "Snapshot Cache").
//!
//! The Supervisor is the only writer; OTLP gauge callbacks and the HTTP
//! sender are readers. Publication is one atomic pointer swap under the
//! write lock — readers never observe a partially-built [`Snapshot`]
//! (spec.md §3 invariant).

use std::sync::{Arc, RwLock};

use crate::model::Snapshot;

/// Maximum percentage-point drift across CPU/memory/disk usage still
/// considered "the same" by the delta-suppression policy.
pub const DELTA_SUPPRESSION_THRESHOLD_PP: f64 = 1.0;
/// A tick is always published once this many seconds have elapsed since
/// the last publication, regardless of how small the delta is.
pub const DELTA_SUPPRESSION_MAX_AGE_SECS: i64 = 60;

/// Holds the current [`Snapshot`] behind a `RwLock`, with the optional
/// delta-suppression policy of spec.md §4.5 applied at publish time.
pub struct SnapshotCache {
    current: RwLock<Option<Arc<Snapshot>>>,
    suppress_unchanged: bool,
}

impl Default for SnapshotCache {
    fn default() -> Self {
        Self::new()
    }
}

impl SnapshotCache {
    /// A cache with delta-suppression on, matching the spec's default.
    pub fn new() -> Self {
        Self { current: RwLock::new(None), suppress_unchanged: true }
    }

    /// A cache with delta-suppression disabled — every tick is published.
    pub fn without_suppression() -> Self {
        Self { current: RwLock::new(None), suppress_unchanged: false }
    }

    /// Read path: take the read lock, clone the `Arc`, release the lock.
    /// The caller then observes the aliased, immutable `Snapshot` with no
    /// lock held.
    pub fn current(&self) -> Option<Arc<Snapshot>> {
        self.current.read().expect("snapshot cache lock poisoned").clone()
    }

    /// Write path: applies the delta-suppression policy (spec.md §4.5),
    /// then publishes `snapshot` as the new current value in one atomic
    /// assignment under the write lock. Returns whether it was actually
    /// published (`false` means the previous snapshot was retained).
    pub fn publish(&self, snapshot: Snapshot) -> bool {
        let mut guard = self.current.write().expect("snapshot cache lock poisoned");

        if self.suppress_unchanged
            && let Some(previous) = guard.as_ref()
            && should_suppress(previous, &snapshot)
        {
            return false;
        }

        *guard = Some(Arc::new(snapshot));
        true
    }
}

/// True iff `new` should be discarded in favor of `previous`: all three
/// tracked percentages are within [`DELTA_SUPPRESSION_THRESHOLD_PP`] AND
/// less than [`DELTA_SUPPRESSION_MAX_AGE_SECS`] have elapsed since
/// `previous` was published (spec.md §4.5).
fn should_suppress(previous: &Snapshot, new: &Snapshot) -> bool {
    let elapsed = new.timestamp - previous.timestamp;
    if elapsed >= DELTA_SUPPRESSION_MAX_AGE_SECS {
        return false;
    }

    let cpu_delta = (new.summary.cpu.usage - previous.summary.cpu.usage).abs();
    let mem_delta = (new.summary.memory.usage_percent - previous.summary.memory.usage_percent).abs();
    let disk_delta = (new.summary.disk.usage_percent - previous.summary.disk.usage_percent).abs();

    cpu_delta <= DELTA_SUPPRESSION_THRESHOLD_PP
        && mem_delta <= DELTA_SUPPRESSION_THRESHOLD_PP
        && disk_delta <= DELTA_SUPPRESSION_THRESHOLD_PP
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snapshot_at(timestamp: i64, cpu: f64, mem: f64, disk: f64) -> Snapshot {
        let mut s = Snapshot::empty(timestamp);
        s.summary.cpu.usage = cpu;
        s.summary.memory.usage_percent = mem;
        s.summary.disk.usage_percent = disk;
        s
    }

    #[test]
    fn first_publication_always_succeeds() {
        let cache = SnapshotCache::new();
        assert!(cache.publish(snapshot_at(0, 10.0, 10.0, 10.0)));
        assert!(cache.current().is_some());
    }

    #[test]
    fn small_delta_within_window_is_suppressed() {
        let cache = SnapshotCache::new();
        cache.publish(snapshot_at(0, 10.0, 10.0, 10.0));
        let published = cache.publish(snapshot_at(5, 10.5, 10.2, 9.8));
        assert!(!published);
        assert_eq!(cache.current().unwrap().timestamp, 0);
    }

    #[test]
    fn large_delta_is_always_published() {
        let cache = SnapshotCache::new();
        cache.publish(snapshot_at(0, 10.0, 10.0, 10.0));
        let published = cache.publish(snapshot_at(5, 50.0, 10.0, 10.0));
        assert!(published);
        assert_eq!(cache.current().unwrap().timestamp, 5);
    }

    #[test]
    fn elapsed_past_max_age_always_publishes() {
        let cache = SnapshotCache::new();
        cache.publish(snapshot_at(0, 10.0, 10.0, 10.0));
        let published = cache.publish(snapshot_at(61, 10.1, 10.1, 10.1));
        assert!(published);
    }

    #[test]
    fn suppression_disabled_publishes_everything() {
        let cache = SnapshotCache::without_suppression();
        cache.publish(snapshot_at(0, 10.0, 10.0, 10.0));
        assert!(cache.publish(snapshot_at(1, 10.0, 10.0, 10.0)));
    }
}
