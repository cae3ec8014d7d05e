//! Top-level tick: runs every sample provider and merges the result into
//! one [`Snapshot`] (spec.md §4.1).
//!
//! Providers share two expensive per-cycle enumerations — the process list
//! and the TCP connection table — computed once here and handed to every
//! provider that needs them (service detection, the connection-state
//! histogram), per spec.md §4.1 "A per-cycle cache holds two expensive
//! enumerations". A provider that fails is logged at WARN and its section
//! is simply absent from the snapshot; it never fails the whole tick
//! (spec.md §4.1 "Error policy", §7.3).

use std::path::Path;
use std::time::{SystemTime, UNIX_EPOCH};

use tracing::warn;

use crate::collector::containers;
use crate::collector::procfs::parser::parse_net_tcp;
use crate::collector::procfs::{ProcessCollector, SystemCollector, UserResolver};
use crate::collector::services;
use crate::collector::traits::FileSystem;
use crate::model::{ProcessCounters, Snapshot, clamp_percent, rank_cmp};

/// Top-K cutoff for `Snapshot::processes` (spec.md §3 "top-K ranked").
/// The HTTP sender further narrows this to 30 per direction (spec.md §6).
pub const TOP_K_PROCESSES: usize = 100;

/// Processes below this memory-percent floor are dropped from the top-K
/// list entirely to keep it meaningful (spec.md §4.1 "Process CPU%").
const MIN_MEMORY_PERCENT: f64 = 0.1;

pub struct Collector<F: FileSystem + Clone> {
    fs: F,
    proc_path: String,
    process_collector: ProcessCollector<F>,
    system_collector: SystemCollector<F>,
    user_resolver: UserResolver,
    boot_time: u64,
}

impl<F: FileSystem + Clone> Collector<F> {
    pub fn new(fs: F, proc_path: impl Into<String>) -> Self {
        let proc_path = proc_path.into();
        Self {
            fs: fs.clone(),
            process_collector: ProcessCollector::new(fs.clone(), proc_path.clone()),
            system_collector: SystemCollector::new(fs, proc_path.clone()),
            proc_path,
            user_resolver: UserResolver::new(),
            boot_time: 0,
        }
    }

    /// Loads `/etc/passwd` once so process UIDs resolve to names. Safe to
    /// call repeatedly; a cheap no-op if the file hasn't changed, and
    /// harmless if it's missing (UIDs are then reported as numeric
    /// strings by the resolver's own fallback).
    pub fn refresh_users(&mut self) {
        if let Ok(content) = self.fs.read_to_string(Path::new("/etc/passwd")) {
            self.user_resolver.load_from_content(&content);
        }
    }

    fn now() -> i64 {
        SystemTime::now().duration_since(UNIX_EPOCH).map(|d| d.as_secs() as i64).unwrap_or(0)
    }

    /// Runs every provider and merges the result into a fresh [`Snapshot`].
    /// Never fails: a missing section just means that provider's part of
    /// the tick is absent.
    pub fn collect_snapshot(&mut self) -> Snapshot {
        let now = Self::now();
        let mut snapshot = Snapshot::empty(now);

        if self.boot_time == 0 {
            self.boot_time = self.system_collector.boot_time();
            self.process_collector.set_boot_time(self.boot_time);
        }
        snapshot.summary.boot_time_unix = self.boot_time as i64;
        snapshot.summary.uptime_secs = self.system_collector.uptime_secs(now, self.boot_time);

        match self.system_collector.collect_cpu(now) {
            Ok((agg, cores)) => {
                snapshot.summary.cpu = agg;
                snapshot.cpu_cores = cores;
            }
            Err(e) => warn!("cpu provider failed: {e}"),
        }

        match self.system_collector.collect_memory() {
            Ok(detail) => {
                snapshot.summary.memory = detail.summary;
                snapshot.memory_detail = detail;
            }
            Err(e) => warn!("memory provider failed: {e}"),
        }

        match self.system_collector.collect_disks(now) {
            Ok((disks, summary)) => {
                snapshot.disks = disks;
                snapshot.summary.disk = summary;
            }
            Err(e) => warn!("disk provider failed: {e}"),
        }

        match self.system_collector.collect_network(now) {
            Ok((interfaces, summary)) => {
                snapshot.networks = interfaces;
                snapshot.summary.network = summary;
            }
            Err(e) => warn!("network provider failed: {e}"),
        }

        match self.system_collector.collect_load() {
            Ok((l1, l5, l15)) => {
                snapshot.summary.load1 = l1;
                snapshot.summary.load5 = l5;
                snapshot.summary.load15 = l15;
            }
            Err(e) => warn!("load provider failed: {e}"),
        }

        let total_mem_kb = snapshot.summary.memory.total_kb;
        // Falls back to 1 when the CPU provider failed this tick and left
        // `cpu_cores` empty, rather than dividing by zero (spec.md §4.1
        // "Process CPU%": `... / numCPU`).
        let num_cpus = snapshot.cpu_cores.len().max(1);
        match self.process_collector.collect_all_processes(now, total_mem_kb, &self.user_resolver, num_cpus) {
            Ok(mut all_processes) => {
                snapshot.summary.processes = process_counters(&all_processes);

                let listening = self.listening_sockets();
                snapshot.services = services::detect_services(&self.fs, &self.proc_path, &all_processes, &listening);

                all_processes.retain(|p| p.mem.percent >= MIN_MEMORY_PERCENT);
                all_processes.sort_by(rank_cmp);
                all_processes.truncate(TOP_K_PROCESSES);
                snapshot.processes = all_processes;
            }
            Err(e) => warn!("process provider failed: {e}"),
        }

        snapshot.containers = containers::discover();

        snapshot
    }

    /// `(port, socket_inode)` pairs for every `LISTEN`-state TCP socket,
    /// read once per tick and shared with [`services::detect_services`]
    /// (spec.md §4.1 "Connection-state histogram" / per-cycle cache).
    fn listening_sockets(&self) -> Vec<(u16, u64)> {
        let mut connections = Vec::new();
        for suffix in ["/net/tcp", "/net/tcp6"] {
            let path = format!("{}{}", self.proc_path, suffix);
            if let Ok(content) = self.fs.read_to_string(Path::new(&path)) {
                connections.extend(parse_net_tcp(&content));
            }
        }
        services::listening_sockets(&connections)
    }
}

fn process_counters(processes: &[crate::model::ProcessInfo]) -> ProcessCounters {
    let mut counters = ProcessCounters { total: processes.len() as u64, ..Default::default() };
    for p in processes {
        match p.status {
            'R' => counters.running += 1,
            'S' | 'D' => counters.sleeping += 1,
            _ => {}
        }
    }
    counters
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collector::mock::MockFs;

    #[test]
    fn collect_snapshot_merges_all_providers() {
        let fs = MockFs::typical_system();
        let mut collector = Collector::new(fs, "/proc");
        collector.refresh_users();

        let snapshot = collector.collect_snapshot();
        assert_eq!(snapshot.summary.cpu.usage, clamp_percent(snapshot.summary.cpu.usage));
        assert!(snapshot.summary.processes.total > 0);
    }

    #[test]
    fn process_counters_cover_at_least_the_top_k_list() {
        let fs = MockFs::typical_system();
        let mut collector = Collector::new(fs, "/proc");
        let snapshot = collector.collect_snapshot();
        assert!(snapshot.summary.processes.total >= snapshot.processes.len() as u64);
    }
}
