//! Aggregate and per-resource system metrics.
//!
//! Field layout mirrors spec.md §3: a `SystemSummary` carrying the
//! aggregate view plus `cpu_cores`/`disks`/`networks` breakdowns living
//! alongside it on `Snapshot`.

use serde::{Deserialize, Serialize};

/// CPU usage percentages, clamped to `[0, 100]`. Used both for the
/// system-wide aggregate and for each entry in `Snapshot::cpu_cores`.
#[derive(Clone, Copy, Serialize, Deserialize, Debug, PartialEq, Default)]
pub struct CpuUsage {
    /// Core index; `None` for the aggregate ("all cores") reading.
    pub core_id: Option<u32>,
    pub usage: f64,
    pub user: f64,
    pub system: f64,
    pub idle: f64,
    pub iowait: f64,
    pub steal: f64,
}

/// System-wide memory, same shape used standalone (summary) and extended
/// by [`MemoryDetail`] for the per-tick detailed block.
#[derive(Clone, Copy, Serialize, Deserialize, Debug, PartialEq, Default)]
pub struct MemorySummary {
    pub total_kb: u64,
    pub used_kb: u64,
    pub free_kb: u64,
    pub available_kb: u64,
    pub cached_kb: u64,
    pub buffers_kb: u64,
    pub swap_total_kb: u64,
    pub swap_used_kb: u64,
    pub usage_percent: f64,
}

/// Detailed memory block: summary fields plus slab/shared/swap_cached,
/// per spec.md §3 `memory_detail`.
#[derive(Clone, Copy, Serialize, Deserialize, Debug, PartialEq, Default)]
pub struct MemoryDetail {
    pub summary: MemorySummary,
    pub slab_kb: u64,
    pub shared_kb: u64,
    pub swap_cached_kb: u64,
}

/// Aggregated disk view (summed across all non-pseudo mounts) plus rate
/// totals. Per-mount detail lives in [`DiskInfo`] / `Snapshot::disks`.
#[derive(Clone, Copy, Serialize, Deserialize, Debug, PartialEq, Default)]
pub struct DiskSummary {
    pub total_kb: u64,
    pub used_kb: u64,
    pub usage_percent: f64,
    pub read_iops: f64,
    pub write_iops: f64,
    pub read_bytes_per_sec: f64,
    pub write_bytes_per_sec: f64,
}

/// One non-pseudo mount point.
#[derive(Clone, Serialize, Deserialize, Debug, PartialEq, Default)]
pub struct DiskInfo {
    pub device: String,
    pub mountpoint: String,
    pub fstype: String,
    pub total_kb: u64,
    pub used_kb: u64,
    pub free_kb: u64,
    pub inodes_total: u64,
    pub inodes_used: u64,
    pub read_iops: f64,
    pub write_iops: f64,
    pub read_bytes_per_sec: f64,
    pub write_bytes_per_sec: f64,
}

/// TCP connection-state histogram. Exactly the eight buckets named in
/// spec.md §3, plus the total used as the `total` attribute axis in C6.
#[derive(Clone, Copy, Serialize, Deserialize, Debug, PartialEq, Default)]
pub struct ConnectionStates {
    pub established: u64,
    pub time_wait: u64,
    pub close_wait: u64,
    pub listen: u64,
    pub syn_sent: u64,
    pub syn_recv: u64,
    pub fin_wait1: u64,
    pub fin_wait2: u64,
}

impl ConnectionStates {
    pub fn total(&self) -> u64 {
        self.established
            + self.time_wait
            + self.close_wait
            + self.listen
            + self.syn_sent
            + self.syn_recv
            + self.fin_wait1
            + self.fin_wait2
    }
}

/// Aggregated network view plus the connection-state histogram.
#[derive(Clone, Copy, Serialize, Deserialize, Debug, PartialEq, Default)]
pub struct NetworkSummary {
    pub rx_bytes_per_sec: f64,
    pub tx_bytes_per_sec: f64,
    pub rx_packets_per_sec: f64,
    pub tx_packets_per_sec: f64,
    pub errors: u64,
    pub drops: u64,
    pub connections: ConnectionStates,
}

/// One physical/virtual network interface (loopback and `veth*` excluded
/// per spec.md §3).
#[derive(Clone, Serialize, Deserialize, Debug, PartialEq, Default)]
pub struct NetworkInterface {
    pub name: String,
    pub mac: Option<String>,
    pub ips: Vec<String>,
    pub up: bool,
    pub mtu: u32,
    pub speed_mbps: Option<u64>,
    pub rx_bytes: u64,
    pub tx_bytes: u64,
    pub rx_packets: u64,
    pub tx_packets: u64,
    pub rx_errors: u64,
    pub tx_errors: u64,
    pub rx_drops: u64,
    pub tx_drops: u64,
    pub rx_bytes_per_sec: f64,
    pub tx_bytes_per_sec: f64,
}

/// Process counters for the summary block.
#[derive(Clone, Copy, Serialize, Deserialize, Debug, PartialEq, Default)]
pub struct ProcessCounters {
    pub total: u64,
    pub running: u64,
    pub sleeping: u64,
}

/// The aggregate, system-wide view carried by `Snapshot::summary`.
#[derive(Clone, Copy, Serialize, Deserialize, Debug, PartialEq, Default)]
pub struct SystemSummary {
    pub cpu: CpuUsage,
    pub memory: MemorySummary,
    pub disk: DiskSummary,
    pub network: NetworkSummary,
    pub processes: ProcessCounters,
    pub uptime_secs: u64,
    pub boot_time_unix: i64,
    pub load1: f64,
    pub load5: f64,
    pub load15: f64,
}
