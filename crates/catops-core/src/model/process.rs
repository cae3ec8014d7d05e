//! Per-process metrics, ranked into the top-K list carried on `Snapshot`.

use serde::{Deserialize, Serialize};

/// Maximum length of `command` before truncation, per spec.md §3.
pub const MAX_COMMAND_LEN: usize = 200;

#[derive(Clone, Serialize, Deserialize, Debug, PartialEq, Default)]
pub struct ProcessMemInfo {
    pub rss_kb: u64,
    pub vms_kb: u64,
    pub shared_kb: u64,
    pub percent: f64,
}

#[derive(Clone, Serialize, Deserialize, Debug, PartialEq, Default)]
pub struct ProcessCpuInfo {
    pub percent: f64,
    pub user_time_secs: f64,
    pub system_time_secs: f64,
}

#[derive(Clone, Serialize, Deserialize, Debug, PartialEq, Default)]
pub struct ProcessIoInfo {
    pub read_bytes: u64,
    pub write_bytes: u64,
}

/// One entry of the top-K process table. Ranked primary by CPU%, secondary
/// by memory% (spec.md §4.1 "Process CPU%").
#[derive(Clone, Serialize, Deserialize, Debug, PartialEq, Default)]
pub struct ProcessInfo {
    pub pid: u32,
    pub ppid: u32,
    pub name: String,
    /// Truncated to [`MAX_COMMAND_LEN`] chars.
    pub command: String,
    pub user: String,
    pub mem: ProcessMemInfo,
    pub cpu: ProcessCpuInfo,
    pub io: ProcessIoInfo,
    /// `/proc/[pid]/stat` state character (R, S, D, Z, T, ...).
    pub status: char,
    pub num_threads: u32,
    pub num_fds: u32,
    pub nice: i32,
    pub priority: i32,
}

/// Truncates `s` to at most `MAX_COMMAND_LEN` chars, respecting UTF-8
/// boundaries, matching a char count rather than a byte count.
pub fn truncate_command(s: &str) -> String {
    if s.chars().count() <= MAX_COMMAND_LEN {
        return s.to_string();
    }
    s.chars().take(MAX_COMMAND_LEN).collect()
}

/// Orders two candidates the way the top-K ranking does: CPU% descending,
/// ties broken by memory% descending.
pub fn rank_cmp(a: &ProcessInfo, b: &ProcessInfo) -> std::cmp::Ordering {
    b.cpu
        .percent
        .total_cmp(&a.cpu.percent)
        .then_with(|| b.mem.percent.total_cmp(&a.mem.percent))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn truncate_respects_utf8_boundaries() {
        let long = "é".repeat(250);
        let truncated = truncate_command(&long);
        assert_eq!(truncated.chars().count(), MAX_COMMAND_LEN);
    }

    #[test]
    fn truncate_noop_under_limit() {
        assert_eq!(truncate_command("short"), "short");
    }
}
