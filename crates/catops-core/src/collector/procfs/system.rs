//! System-wide sample providers: CPU, memory, disk and network (spec.md
//! §4.1 "System sampling"). Rates (CPU%, disk IOPS/throughput, network
//! throughput) are all derived from cached cumulative counters rather than
//! blocking — each call caches the raw counters and divides the delta by
//! the wall-clock delta since the previous call, exactly like
//! [`super::process::ProcessCollector`] does for per-process CPU%.

use std::collections::HashMap;
use std::path::Path;

use crate::collector::procfs::parser::{
    CpuStat, DiskStats, NetDevStats, TcpState, parse_diskstats, parse_global_stat, parse_loadavg,
    parse_meminfo, parse_mounts, parse_net_dev, parse_net_tcp,
};
use crate::collector::traits::FileSystem;
use crate::model::{
    ConnectionStates, CpuUsage, DiskInfo, DiskSummary, MemoryDetail, MemorySummary,
    NetworkInterface, NetworkSummary, clamp_percent,
};

/// Pseudo/virtual filesystem types excluded from the disk inventory
/// (spec.md §3 "Disk sampling" edge case).
const PSEUDO_FSTYPES: &[&str] = &[
    "proc", "sysfs", "devtmpfs", "tmpfs", "devpts", "cgroup", "cgroup2", "overlay", "squashfs",
    "autofs", "mqueue", "debugfs", "tracefs", "securityfs", "pstore", "bpf", "configfs", "ramfs",
    "binfmt_misc", "fusectl", "hugetlbfs", "nsfs",
];

/// Interfaces excluded from the network inventory (spec.md §3 "Network
/// sampling"): loopback and virtual veth pairs.
fn is_excluded_interface(name: &str) -> bool {
    name == "lo" || name.starts_with("veth") || name.starts_with("docker") || name.starts_with("br-")
}

#[derive(Debug)]
pub enum CollectError {
    Io(std::io::Error),
    Parse(String),
}

impl std::fmt::Display for CollectError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CollectError::Io(e) => write!(f, "I/O error: {e}"),
            CollectError::Parse(msg) => write!(f, "parse error: {msg}"),
        }
    }
}

impl std::error::Error for CollectError {}

impl From<std::io::Error> for CollectError {
    fn from(e: std::io::Error) -> Self {
        CollectError::Io(e)
    }
}

#[derive(Clone, Debug)]
struct CpuSample {
    timestamp: i64,
    aggregate: CpuStat,
    cores: Vec<CpuStat>,
}

#[derive(Clone, Copy, Debug)]
struct DiskSample {
    timestamp: i64,
    stats: DiskStats,
}

#[derive(Clone, Copy, Debug)]
struct NetSample {
    timestamp: i64,
    stats: NetDevStats,
}

pub struct SystemCollector<F: FileSystem> {
    fs: F,
    proc_path: String,
    prev_cpu: Option<CpuSample>,
    prev_disks: HashMap<String, DiskSample>,
    prev_net: HashMap<String, NetSample>,
}

impl<F: FileSystem> SystemCollector<F> {
    pub fn new(fs: F, proc_path: impl Into<String>) -> Self {
        Self {
            fs,
            proc_path: proc_path.into(),
            prev_cpu: None,
            prev_disks: HashMap::new(),
            prev_net: HashMap::new(),
        }
    }

    fn path(&self, suffix: &str) -> String {
        format!("{}{}", self.proc_path, suffix)
    }

    /// Returns `(aggregate, per_core)`. The first call after startup
    /// returns zeroed usage for every entry since there is no prior sample
    /// to diff against (spec.md §4.1 edge case).
    pub fn collect_cpu(&mut self, now: i64) -> Result<(CpuUsage, Vec<CpuUsage>), CollectError> {
        let content = self.fs.read_to_string(Path::new(&self.path("/stat")))?;
        let stat = parse_global_stat(&content).map_err(|e| CollectError::Parse(e.message))?;

        let aggregate_raw = stat
            .cpus
            .iter()
            .find(|c| c.cpu_id.is_none())
            .cloned()
            .unwrap_or_default();
        let cores_raw: Vec<CpuStat> = stat.cpus.iter().filter(|c| c.cpu_id.is_some()).cloned().collect();

        let (aggregate, cores) = match &self.prev_cpu {
            Some(prev) => {
                let aggregate = cpu_delta(None, &prev.aggregate, &aggregate_raw);
                let cores = cores_raw
                    .iter()
                    .map(|cur| {
                        let prev_core = prev.cores.iter().find(|c| c.cpu_id == cur.cpu_id);
                        match prev_core {
                            Some(p) => cpu_delta(cur.cpu_id, p, cur),
                            None => CpuUsage { core_id: cur.cpu_id, ..Default::default() },
                        }
                    })
                    .collect();
                (aggregate, cores)
            }
            None => (
                CpuUsage::default(),
                cores_raw.iter().map(|c| CpuUsage { core_id: c.cpu_id, ..Default::default() }).collect(),
            ),
        };

        self.prev_cpu = Some(CpuSample { timestamp: now, aggregate: aggregate_raw, cores: cores_raw });
        Ok((aggregate, cores))
    }

    pub fn collect_memory(&self) -> Result<MemoryDetail, CollectError> {
        let content = self.fs.read_to_string(Path::new(&self.path("/meminfo")))?;
        let mem = parse_meminfo(&content).map_err(|e| CollectError::Parse(e.message))?;

        let used_kb = mem.mem_total.saturating_sub(mem.mem_available.max(mem.mem_free));
        let usage_percent = if mem.mem_total > 0 {
            clamp_percent(used_kb as f64 / mem.mem_total as f64 * 100.0)
        } else {
            0.0
        };

        Ok(MemoryDetail {
            summary: MemorySummary {
                total_kb: mem.mem_total,
                used_kb,
                free_kb: mem.mem_free,
                available_kb: mem.mem_available,
                cached_kb: mem.cached,
                buffers_kb: mem.buffers,
                swap_total_kb: mem.swap_total,
                swap_used_kb: mem.swap_total.saturating_sub(mem.swap_free),
                usage_percent,
            },
            slab_kb: mem.slab,
            shared_kb: mem.shmem,
            swap_cached_kb: mem.swap_cached,
        })
    }

    /// Returns every non-pseudo mount and the aggregate disk summary.
    pub fn collect_disks(&mut self, now: i64) -> Result<(Vec<DiskInfo>, DiskSummary), CollectError> {
        let diskstats_content = self.fs.read_to_string(Path::new(&self.path("/diskstats")))?;
        let diskstats = parse_diskstats(&diskstats_content).map_err(|e| CollectError::Parse(e.message))?;
        let by_device: HashMap<&str, &DiskStats> = diskstats.iter().map(|d| (d.device.as_str(), d)).collect();

        let mounts_content = self.fs.read_to_string(Path::new(&self.path("/mounts"))).unwrap_or_default();
        let mounts = parse_mounts(&mounts_content);

        let mut disks = Vec::new();
        for mount in mounts.iter().filter(|m| !PSEUDO_FSTYPES.contains(&m.fstype.as_str())) {
            let device_name = mount.device.rsplit('/').next().unwrap_or(&mount.device);
            let rates = by_device.get(device_name).map(|cur| {
                let rate = match self.prev_disks.get(device_name) {
                    Some(prev) => disk_rate(&prev.stats, cur, (now - prev.timestamp) as f64),
                    None => (0.0, 0.0, 0.0, 0.0),
                };
                self.prev_disks.insert(device_name.to_string(), DiskSample { timestamp: now, stats: (**cur).clone() });
                rate
            }).unwrap_or((0.0, 0.0, 0.0, 0.0));

            let vfs = self.fs.statvfs(Path::new(&mount.mountpoint)).unwrap_or_default();

            disks.push(DiskInfo {
                device: mount.device.clone(),
                mountpoint: mount.mountpoint.clone(),
                fstype: mount.fstype.clone(),
                total_kb: vfs.total_kb,
                used_kb: vfs.total_kb.saturating_sub(vfs.free_kb),
                free_kb: vfs.avail_kb,
                inodes_total: vfs.inodes_total,
                inodes_used: vfs.inodes_total.saturating_sub(vfs.inodes_free),
                read_iops: rates.0,
                write_iops: rates.1,
                read_bytes_per_sec: rates.2,
                write_bytes_per_sec: rates.3,
            });
        }

        let total_kb: u64 = disks.iter().map(|d| d.total_kb).sum();
        let used_kb: u64 = disks.iter().map(|d| d.used_kb).sum();
        let summary = DiskSummary {
            total_kb,
            used_kb,
            usage_percent: if total_kb > 0 { clamp_percent(used_kb as f64 / total_kb as f64 * 100.0) } else { 0.0 },
            read_iops: disks.iter().map(|d| d.read_iops).sum(),
            write_iops: disks.iter().map(|d| d.write_iops).sum(),
            read_bytes_per_sec: disks.iter().map(|d| d.read_bytes_per_sec).sum(),
            write_bytes_per_sec: disks.iter().map(|d| d.write_bytes_per_sec).sum(),
        };

        Ok((disks, summary))
    }

    /// Returns every non-excluded interface and the aggregate network
    /// summary (connection-state histogram included).
    pub fn collect_network(&mut self, now: i64) -> Result<(Vec<NetworkInterface>, NetworkSummary), CollectError> {
        let content = self.fs.read_to_string(Path::new(&self.path("/net/dev")))?;
        let devices = parse_net_dev(&content).map_err(|e| CollectError::Parse(e.message))?;

        let mut interfaces = Vec::new();
        for dev in devices.iter().filter(|d| !is_excluded_interface(&d.interface)) {
            let (rx_rate, tx_rate) = match self.prev_net.get(&dev.interface) {
                Some(prev) => {
                    let elapsed = (now - prev.timestamp) as f64;
                    if elapsed > 0.0 {
                        (
                            dev.rx_bytes.saturating_sub(prev.stats.rx_bytes) as f64 / elapsed,
                            dev.tx_bytes.saturating_sub(prev.stats.tx_bytes) as f64 / elapsed,
                        )
                    } else {
                        (0.0, 0.0)
                    }
                }
                None => (0.0, 0.0),
            };
            self.prev_net.insert(dev.interface.clone(), NetSample { timestamp: now, stats: dev.clone() });

            let sysfs_base = format!("/sys/class/net/{}", dev.interface);
            let mac = self.fs.read_to_string(Path::new(&format!("{sysfs_base}/address"))).ok().map(|s| s.trim().to_string());
            let mtu = self
                .fs
                .read_to_string(Path::new(&format!("{sysfs_base}/mtu")))
                .ok()
                .and_then(|s| s.trim().parse().ok())
                .unwrap_or(0);
            let up = self
                .fs
                .read_to_string(Path::new(&format!("{sysfs_base}/operstate")))
                .map(|s| s.trim() == "up")
                .unwrap_or(false);
            let speed_mbps = self
                .fs
                .read_to_string(Path::new(&format!("{sysfs_base}/speed")))
                .ok()
                .and_then(|s| s.trim().parse::<i64>().ok())
                .filter(|v| *v > 0)
                .map(|v| v as u64);

            interfaces.push(NetworkInterface {
                name: dev.interface.clone(),
                mac,
                ips: Vec::new(),
                up,
                mtu,
                speed_mbps,
                rx_bytes: dev.rx_bytes,
                tx_bytes: dev.tx_bytes,
                rx_packets: dev.rx_packets,
                tx_packets: dev.tx_packets,
                rx_errors: dev.rx_errs,
                tx_errors: dev.tx_errs,
                rx_drops: dev.rx_drop,
                tx_drops: dev.tx_drop,
                rx_bytes_per_sec: rx_rate,
                tx_bytes_per_sec: tx_rate,
            });
        }

        let connections = self.collect_connection_states();
        let summary = NetworkSummary {
            rx_bytes_per_sec: interfaces.iter().map(|i| i.rx_bytes_per_sec).sum(),
            tx_bytes_per_sec: interfaces.iter().map(|i| i.tx_bytes_per_sec).sum(),
            rx_packets_per_sec: 0.0,
            tx_packets_per_sec: 0.0,
            errors: interfaces.iter().map(|i| i.rx_errors + i.tx_errors).sum(),
            drops: interfaces.iter().map(|i| i.rx_drops + i.tx_drops).sum(),
            connections,
        };

        Ok((interfaces, summary))
    }

    /// Histogram of TCP connection states across IPv4 and IPv6 sockets.
    pub fn collect_connection_states(&self) -> ConnectionStates {
        let mut states = ConnectionStates::default();
        for suffix in ["/net/tcp", "/net/tcp6"] {
            let Ok(content) = self.fs.read_to_string(Path::new(&self.path(suffix))) else {
                continue;
            };
            for conn in parse_net_tcp(&content) {
                match conn.state {
                    TcpState::Established => states.established += 1,
                    TcpState::TimeWait => states.time_wait += 1,
                    TcpState::CloseWait => states.close_wait += 1,
                    TcpState::Listen => states.listen += 1,
                    TcpState::SynSent => states.syn_sent += 1,
                    TcpState::SynRecv => states.syn_recv += 1,
                    TcpState::FinWait1 => states.fin_wait1 += 1,
                    TcpState::FinWait2 => states.fin_wait2 += 1,
                    _ => {}
                }
            }
        }
        states
    }

    pub fn collect_load(&self) -> Result<(f64, f64, f64), CollectError> {
        let content = self.fs.read_to_string(Path::new(&self.path("/loadavg")))?;
        let load = parse_loadavg(&content).map_err(|e| CollectError::Parse(e.message))?;
        Ok((load.load1, load.load5, load.load15))
    }

    pub fn boot_time(&self) -> u64 {
        self.fs
            .read_to_string(Path::new(&self.path("/stat")))
            .ok()
            .and_then(|content| parse_global_stat(&content).ok())
            .map(|stat| stat.btime)
            .unwrap_or(0)
    }

    pub fn uptime_secs(&self, now: i64, boot_time: u64) -> u64 {
        (now - boot_time as i64).max(0) as u64
    }
}

fn cpu_delta(core_id: Option<u32>, prev: &CpuStat, cur: &CpuStat) -> CpuUsage {
    let d_user = cur.user.saturating_sub(prev.user) as f64;
    let d_nice = cur.nice.saturating_sub(prev.nice) as f64;
    let d_system = cur.system.saturating_sub(prev.system) as f64;
    let d_idle = cur.idle.saturating_sub(prev.idle) as f64;
    let d_iowait = cur.iowait.saturating_sub(prev.iowait) as f64;
    let d_irq = cur.irq.saturating_sub(prev.irq) as f64;
    let d_softirq = cur.softirq.saturating_sub(prev.softirq) as f64;
    let d_steal = cur.steal.saturating_sub(prev.steal) as f64;

    let total = d_user + d_nice + d_system + d_idle + d_iowait + d_irq + d_softirq + d_steal;
    if total <= 0.0 {
        return CpuUsage { core_id, ..Default::default() };
    }

    CpuUsage {
        core_id,
        usage: clamp_percent(100.0 - (d_idle + d_iowait) / total * 100.0),
        user: clamp_percent((d_user + d_nice) / total * 100.0),
        system: clamp_percent(d_system / total * 100.0),
        idle: clamp_percent(d_idle / total * 100.0),
        iowait: clamp_percent(d_iowait / total * 100.0),
        steal: clamp_percent(d_steal / total * 100.0),
    }
}

/// Returns `(read_iops, write_iops, read_bytes_per_sec, write_bytes_per_sec)`.
/// Sector size is always 512 bytes per `man 5 proc` diskstats.
fn disk_rate(prev: &DiskStats, cur: &DiskStats, elapsed_secs: f64) -> (f64, f64, f64, f64) {
    if elapsed_secs <= 0.0 {
        return (0.0, 0.0, 0.0, 0.0);
    }
    let reads = cur.reads.saturating_sub(prev.reads) as f64 / elapsed_secs;
    let writes = cur.writes.saturating_sub(prev.writes) as f64 / elapsed_secs;
    let read_bytes = cur.read_sectors.saturating_sub(prev.read_sectors) as f64 * 512.0 / elapsed_secs;
    let write_bytes = cur.write_sectors.saturating_sub(prev.write_sectors) as f64 * 512.0 / elapsed_secs;
    (reads, writes, read_bytes, write_bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collector::mock::MockFs;

    #[test]
    fn first_cpu_sample_is_zeroed() {
        let fs = MockFs::typical_system();
        let mut collector = SystemCollector::new(fs, "/proc");
        let (agg, cores) = collector.collect_cpu(0).unwrap();
        assert_eq!(agg.usage, 0.0);
        assert_eq!(cores.len(), 4);
    }

    #[test]
    fn second_cpu_sample_derives_usage_from_delta() {
        let mut fs = MockFs::typical_system();
        let mut collector = SystemCollector::new(fs.clone(), "/proc");
        collector.collect_cpu(0).unwrap();

        fs.add_file(
            "/proc/stat",
            "\
cpu  10100 500 3100 80100 1000 200 100 0 0 0
cpu0 2525 125 775 20025 250 50 25 0 0 0
cpu1 2525 125 775 20025 250 50 25 0 0 0
cpu2 2525 125 775 20025 250 50 25 0 0 0
cpu3 2525 125 775 20025 250 50 25 0 0 0
intr 1000000 50 0 0 0 0 0 0 0 1 0 0 0 100 0 0 1000
ctxt 500000
btime 1700000000
processes 10000
procs_running 2
procs_blocked 0
",
        );
        collector.fs = fs;
        let (agg, _cores) = collector.collect_cpu(10).unwrap();
        assert!(agg.usage > 0.0);
        assert!(agg.usage < 100.0);
    }

    #[test]
    fn memory_usage_percent_is_bounded() {
        let fs = MockFs::typical_system();
        let collector = SystemCollector::new(fs, "/proc");
        let mem = collector.collect_memory().unwrap();
        assert!(mem.summary.usage_percent >= 0.0 && mem.summary.usage_percent <= 100.0);
        assert_eq!(mem.summary.total_kb, 16384000);
    }

    #[test]
    fn load_average_is_parsed() {
        let fs = MockFs::typical_system();
        let collector = SystemCollector::new(fs, "/proc");
        let (load1, _, _) = collector.collect_load().unwrap();
        assert_eq!(load1, 0.15);
    }

    #[test]
    fn connection_states_default_to_zero_without_tcp_files() {
        let fs = MockFs::typical_system();
        let collector = SystemCollector::new(fs, "/proc");
        let states = collector.collect_connection_states();
        assert_eq!(states.total(), 0);
    }

    #[test]
    fn loopback_interface_is_excluded() {
        let fs = MockFs::typical_system();
        let mut collector = SystemCollector::new(fs, "/proc");
        let (interfaces, _summary) = collector.collect_network(0).unwrap();
        assert!(interfaces.iter().all(|i| i.name != "lo"));
        assert!(interfaces.iter().any(|i| i.name == "eth0"));
    }
}
