//! Process sample provider: reads `/proc/[pid]/{stat,status,io,cmdline,comm}`
//! and produces [`ProcessInfo`] records (spec.md §4.1 "Process sampling").
//!
//! CPU percentage is derived from cached cumulative tick counts rather than
//! blocking on a sleep: each call caches `(utime+stime, timestamp)` per pid
//! and divides the delta by the wall-clock delta since the previous call.

use std::collections::HashMap;
use std::path::Path;

use crate::collector::procfs::parser::{UserResolver, parse_proc_io, parse_proc_stat, parse_proc_status};
use crate::collector::traits::FileSystem;
use crate::model::{ProcessCpuInfo, ProcessInfo, ProcessIoInfo, ProcessMemInfo, truncate_command};

/// Clock ticks per second (USER_HZ). Standard value for Linux.
const CLK_TCK: u64 = 100;

#[derive(Debug)]
pub enum CollectError {
    ProcessGone(u32),
    Io(std::io::Error),
    Parse(String),
}

impl std::fmt::Display for CollectError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CollectError::ProcessGone(pid) => write!(f, "process {} disappeared", pid),
            CollectError::Io(e) => write!(f, "I/O error: {}", e),
            CollectError::Parse(msg) => write!(f, "parse error: {}", msg),
        }
    }
}

impl std::error::Error for CollectError {}

impl From<std::io::Error> for CollectError {
    fn from(e: std::io::Error) -> Self {
        CollectError::Io(e)
    }
}

#[derive(Clone, Copy, Debug)]
struct CpuSample {
    total_ticks: u64,
    timestamp: i64,
}

pub struct ProcessCollector<F: FileSystem> {
    fs: F,
    proc_path: String,
    page_size_kb: u64,
    boot_time: u64,
    prev_cpu: HashMap<u32, CpuSample>,
}

impl<F: FileSystem> ProcessCollector<F> {
    pub fn new(fs: F, proc_path: impl Into<String>) -> Self {
        Self {
            fs,
            proc_path: proc_path.into(),
            page_size_kb: 4, // 4096-byte pages, standard on Linux.
            boot_time: 0,
            prev_cpu: HashMap::new(),
        }
    }

    pub fn set_boot_time(&mut self, boot_time: u64) {
        self.boot_time = boot_time;
    }

    /// Collects one process. `now` is the wall-clock timestamp of this
    /// sampling cycle, used both for CPU-rate deltas and process age.
    /// `num_cpus` is the core count CPU% is normalized against (spec.md
    /// §4.1 "Process CPU%": `(Δcputime / Δwall) × 100 / numCPU`); callers
    /// pass at least 1 even when the core count is momentarily unknown.
    pub fn collect_process(
        &mut self,
        pid: u32,
        now: i64,
        total_mem_kb: u64,
        users: &UserResolver,
        num_cpus: usize,
    ) -> Result<ProcessInfo, CollectError> {
        let proc_dir = format!("{}/{}", self.proc_path, pid);

        let stat_content = self
            .fs
            .read_to_string(Path::new(&format!("{proc_dir}/stat")))
            .map_err(|_| CollectError::ProcessGone(pid))?;
        let stat =
            parse_proc_stat(&stat_content).map_err(|e| CollectError::Parse(e.message.clone()))?;

        let status_content = self
            .fs
            .read_to_string(Path::new(&format!("{proc_dir}/status")))
            .map_err(|_| CollectError::ProcessGone(pid))?;
        let status = parse_proc_status(&status_content)
            .map_err(|e| CollectError::Parse(e.message.clone()))?;

        let io = self
            .fs
            .read_to_string(Path::new(&format!("{proc_dir}/io")))
            .ok()
            .and_then(|content| parse_proc_io(&content).ok())
            .unwrap_or_default();

        let cmdline = self
            .fs
            .read_to_string(Path::new(&format!("{proc_dir}/cmdline")))
            .unwrap_or_default()
            .replace('\0', " ")
            .trim()
            .to_string();

        let comm = self
            .fs
            .read_to_string(Path::new(&format!("{proc_dir}/comm")))
            .unwrap_or_else(|_| stat.comm.clone())
            .trim()
            .to_string();

        let num_fds = self
            .fs
            .read_dir(Path::new(&format!("{proc_dir}/fd")))
            .map(|v| v.len() as u32)
            .unwrap_or(0);

        let total_ticks = stat.utime + stat.stime;
        let cpu_percent = match self.prev_cpu.insert(pid, CpuSample { total_ticks, timestamp: now }) {
            Some(prev) => {
                let elapsed = (now - prev.timestamp) as f64;
                if elapsed > 0.0 {
                    let delta_ticks = total_ticks.saturating_sub(prev.total_ticks);
                    let num_cpus = num_cpus.max(1) as f64;
                    crate::model::clamp_percent((delta_ticks as f64 / CLK_TCK as f64) / elapsed * 100.0 / num_cpus)
                } else {
                    0.0
                }
            }
            None => 0.0,
        };

        let rss_kb = (stat.rss.max(0) as u64) * self.page_size_kb;
        let mem_percent = if total_mem_kb > 0 {
            crate::model::clamp_percent(rss_kb as f64 / total_mem_kb as f64 * 100.0)
        } else {
            0.0
        };

        let command = if cmdline.is_empty() { comm.clone() } else { cmdline };

        Ok(ProcessInfo {
            pid: stat.pid,
            ppid: stat.ppid,
            name: comm,
            command: truncate_command(&command),
            user: users.resolve(status.uid),
            mem: ProcessMemInfo {
                rss_kb,
                vms_kb: stat.vsize / 1024,
                shared_kb: 0,
                percent: mem_percent,
            },
            cpu: ProcessCpuInfo {
                percent: cpu_percent,
                user_time_secs: stat.utime as f64 / CLK_TCK as f64,
                system_time_secs: stat.stime as f64 / CLK_TCK as f64,
            },
            io: ProcessIoInfo {
                read_bytes: io.read_bytes,
                write_bytes: io.write_bytes,
            },
            status: stat.state,
            num_threads: stat.num_threads.max(0) as u32,
            num_fds,
            nice: stat.nice,
            priority: stat.priority,
        })
    }

    /// Collects every running process, dropping ones that exit mid-scan
    /// (spec.md §4.1 edge case: "process gone"). `num_cpus` is forwarded
    /// to [`Self::collect_process`] to normalize each process's CPU%.
    pub fn collect_all_processes(
        &mut self,
        now: i64,
        total_mem_kb: u64,
        users: &UserResolver,
        num_cpus: usize,
    ) -> Result<Vec<ProcessInfo>, CollectError> {
        let proc_path = Path::new(&self.proc_path);
        let entries = self.fs.read_dir(proc_path)?;

        let mut processes = Vec::new();
        let mut seen = std::collections::HashSet::new();

        for entry in entries {
            let Some(pid) = entry
                .file_name()
                .and_then(|n| n.to_str())
                .and_then(|n| n.parse::<u32>().ok())
            else {
                continue;
            };
            seen.insert(pid);

            match self.collect_process(pid, now, total_mem_kb, users, num_cpus) {
                Ok(info) => processes.push(info),
                Err(CollectError::ProcessGone(_)) => continue,
                Err(e) => eprintln!("warning: failed to collect process {}: {}", pid, e),
            }
        }

        // Drop cached CPU samples for processes that no longer exist so the
        // cache does not grow unbounded across the lifetime of the agent.
        self.prev_cpu.retain(|pid, _| seen.contains(pid));

        Ok(processes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collector::mock::MockFs;

    #[test]
    fn collects_single_process() {
        let fs = MockFs::typical_system();
        let mut collector = ProcessCollector::new(fs, "/proc");
        let users = UserResolver::new();

        let info = collector.collect_process(1, 1_700_000_100, 1_000_000, &users, 1).unwrap();

        assert_eq!(info.pid, 1);
        assert_eq!(info.ppid, 0);
    }

    #[test]
    fn first_sample_has_zero_cpu_percent() {
        let fs = MockFs::typical_system();
        let mut collector = ProcessCollector::new(fs, "/proc");
        let users = UserResolver::new();

        let info = collector.collect_process(1000, 1_700_000_000, 1_000_000, &users, 1).unwrap();
        assert_eq!(info.cpu.percent, 0.0);
    }

    #[test]
    fn second_sample_derives_cpu_percent_from_delta() {
        let mut fs = MockFs::typical_system();
        fs.add_process(
            6000,
            "6000 (worker) S 1 6000 6000 34816 1001 4194304 5000 50000 0 0 100 50 200 100 20 0 1 0 100000 25000000 2000 18446744073709551615 0 0 0 0 0 0 65536 3670020 1266777851 0 0 0 17 2 0 0 0 0 0 0 0 0 0 0 0 0 0",
            "Name:\tworker\nPid:\t6000\nPPid:\t1\nUid:\t0\t0\t0\t0\nGid:\t0\t0\t0\t0\n",
            "",
            "worker\0",
            "worker\n",
        );
        let mut collector = ProcessCollector::new(fs, "/proc");
        let users = UserResolver::new();

        let first = collector.collect_process(6000, 0, 1_000_000, &users, 1).unwrap();
        assert_eq!(first.cpu.percent, 0.0);

        // Same cumulative ticks one second later means no further cpu used.
        let second = collector.collect_process(6000, 1, 1_000_000, &users, 1).unwrap();
        assert_eq!(second.cpu.percent, 0.0);
    }

    #[test]
    fn process_gone_is_reported() {
        let mut fs = MockFs::new();
        fs.add_dir("/proc/9999");
        let mut collector = ProcessCollector::new(fs, "/proc");
        let users = UserResolver::new();

        let result = collector.collect_process(9999, 0, 1_000_000, &users, 1);
        assert!(matches!(result, Err(CollectError::ProcessGone(9999))));
    }

    #[test]
    fn user_resolver_maps_uid_to_name() {
        let fs = MockFs::typical_system();
        let mut collector = ProcessCollector::new(fs, "/proc");
        let mut users = UserResolver::new();
        users.load_from_content("root:x:0:0:root:/root:/bin/bash\npostgres:x:999:999::/var/lib/postgresql:/bin/bash\n");

        let info = collector.collect_process(1, 0, 1_000_000, &users, 1).unwrap();
        assert_eq!(info.user, "root");
    }

    #[test]
    fn collect_all_processes_drops_disappeared_entries() {
        let fs = MockFs::typical_system();
        let mut collector = ProcessCollector::new(fs, "/proc");
        let users = UserResolver::new();

        let processes = collector.collect_all_processes(0, 1_000_000, &users, 1).unwrap();
        assert_eq!(processes.len(), 3);
    }
}
