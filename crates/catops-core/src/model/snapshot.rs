//! The top-level, immutable per-tick value (spec.md §3 "Snapshot").

use serde::{Deserialize, Serialize};

use super::container::ContainerInfo;
use super::process::ProcessInfo;
use super::service::ServiceInfo;
use super::system::{CpuUsage, DiskInfo, MemoryDetail, NetworkInterface, SystemSummary};

/// An immutable bundle of every sample taken in one tick. Never mutated
/// after publication (spec.md §3 invariant) — readers either see this
/// value or the next one, never a partial one.
#[derive(Clone, Serialize, Deserialize, Debug, PartialEq)]
pub struct Snapshot {
    /// Unix timestamp (seconds) of the wall-clock read taken at the start
    /// of the tick; every per-core/per-mount/per-interface partial in this
    /// snapshot derives its timestamp from this single read (spec.md §5).
    pub timestamp: i64,
    pub summary: SystemSummary,
    pub cpu_cores: Vec<CpuUsage>,
    pub memory_detail: MemoryDetail,
    pub disks: Vec<DiskInfo>,
    pub networks: Vec<NetworkInterface>,
    pub processes: Vec<ProcessInfo>,
    pub services: Vec<ServiceInfo>,
    pub containers: Vec<ContainerInfo>,
}

impl Snapshot {
    /// An empty snapshot stamped at `timestamp`, used as a starting point
    /// by providers that build it up block by block.
    pub fn empty(timestamp: i64) -> Self {
        Self {
            timestamp,
            summary: SystemSummary::default(),
            cpu_cores: Vec::new(),
            memory_detail: MemoryDetail::default(),
            disks: Vec::new(),
            networks: Vec::new(),
            processes: Vec::new(),
            services: Vec::new(),
            containers: Vec::new(),
        }
    }
}
