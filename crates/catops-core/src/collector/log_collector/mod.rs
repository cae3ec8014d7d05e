//! Log discovery, tailing, cross-cycle dedup and "interesting" filtering
//! (spec.md §4.3 "Log Discovery & Tailing (C3)"). Parsing the resulting
//! lines into structured records is [`parser`]'s job, not this module's.
//!
//! Per cycle the inventory is rebuilt from scratch: the caller (the top-
//! level [`crate::collector::Collector`]) re-derives which sources are
//! live from the container/service lists it already collected and calls
//! [`LogCollector::retain_sources`] before polling, so a source that
//! disappeared between two ticks doesn't keep a tailer open forever.

pub mod parser;
pub mod tailer;

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::{LazyLock, Mutex};

use regex::Regex;

use crate::model::{ContainerInfo, ProcessInfo, ServiceInfo};
use crate::util::hash::md5_hex;
use tailer::FileTailer;

/// Cross-cycle dedup entry TTL (spec.md §4.3 "Deduplication").
pub const DEDUP_TTL_SECS: i64 = 600;
/// How often the dedup cleaner sweep runs, driven by the Supervisor's
/// ambient timers rather than a thread owned by this module (spec.md §4.3,
/// §5 "background cleaner evicts expired entries").
pub const DEDUP_CLEAN_INTERVAL_SECS: i64 = 300;
/// Lines longer than this are truncated with an ellipsis (spec.md §4.3).
pub const MAX_LINE_LEN: usize = 2000;
/// Lines kept per file-based source on its first-ever tail (spec.md §4.3's
/// "keep the last N full lines").
pub const INITIAL_TAIL_LINES: usize = 200;
/// Ancestor hops walked when matching a service to a container by PID
/// (spec.md §4.3 "up to four levels of parent-PID walk").
const MAX_PARENT_WALK: usize = 4;

/// Process-wide, lazily-initialized cross-cycle line dedup table (spec.md
/// §5 "The log collector is a process-wide singleton initialized lazily on
/// first use").
static DEDUP_TABLE: LazyLock<Mutex<DedupTable>> = LazyLock::new(|| Mutex::new(DedupTable::new()));

/// Handle to the process-wide dedup table singleton.
pub fn dedup_table() -> &'static Mutex<DedupTable> {
    &DEDUP_TABLE
}

/// `MD5(container_or_service || raw_line) -> insertion_time` (spec.md
/// §4.3 "Deduplication (cross-cycle)").
#[derive(Default)]
pub struct DedupTable {
    entries: HashMap<String, i64>,
}

impl DedupTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `true` (and records the entry) iff `source || line` has not
    /// been seen within the last [`DEDUP_TTL_SECS`].
    pub fn observe(&mut self, source: &str, line: &str, now: i64) -> bool {
        let key = md5_hex(&format!("{source}{line}"));
        if self.entries.contains_key(&key) {
            return false;
        }
        self.entries.insert(key, now);
        true
    }

    /// Evicts entries older than [`DEDUP_TTL_SECS`]. Called from the
    /// Supervisor's 5-minute timer, not spawned by this module.
    pub fn evict_expired(&mut self, now: i64) {
        self.entries.retain(|_, inserted_at| now - *inserted_at < DEDUP_TTL_SECS);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Keyword families a line must match at least one of to survive filtering
/// (spec.md §4.3 "Filtering"): failure/error, warning, network/timeout,
/// resource exhaustion, and access-control denial.
static INTERESTING: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)(error|err\b|fail(?:ure)?|exception|panic|fatal|critical|warn(?:ing)?|timeout|connection refused|connection reset|out of memory|\boom\b|killed|segfault|denied|unauthorized|forbidden|permission)",
    )
    .unwrap()
});

/// True iff `line` matches the "interesting" keyword set (spec.md §4.3).
pub fn is_interesting(line: &str) -> bool {
    INTERESTING.is_match(line)
}

/// Truncates `line` to [`MAX_LINE_LEN`] chars, appending an ellipsis if it
/// was cut (spec.md §4.3).
pub fn truncate_line(line: &str) -> String {
    if line.chars().count() <= MAX_LINE_LEN {
        return line.to_string();
    }
    let truncated: String = line.chars().take(MAX_LINE_LEN).collect();
    format!("{truncated}\u{2026}")
}

/// Default on-disk location of a container's Docker json-file log, used
/// when no bind-mounted log file is known for it.
pub fn docker_json_log_path(container_id: &str) -> PathBuf {
    PathBuf::from(format!("/var/lib/docker/containers/{container_id}/{container_id}-json.log"))
}

/// Unwraps one line of Docker's `json-file` log driver format
/// (`{"log":"actual line\n","stream":"stdout","time":"..."}`) to the raw
/// application line. Lines that aren't in this shape (bind-mounted plain
/// text logs, for instance) pass through unchanged.
pub fn unwrap_docker_json_log(line: &str) -> String {
    let Ok(value) = serde_json::from_str::<serde_json::Value>(line) else {
        return line.to_string();
    };
    match value.get("log").and_then(serde_json::Value::as_str) {
        Some(inner) => inner.trim_end_matches(['\n', '\r']).to_string(),
        None => line.to_string(),
    }
}

/// Matches a service to a container using the three keys of spec.md §4.3,
/// tried in order: an already-known container id, a main-PID walk (up to
/// [`MAX_PARENT_WALK`] ancestor hops, to catch forked workers), then fuzzy
/// name containment in either direction.
pub fn match_container_for_service(
    service: &ServiceInfo,
    containers: &[ContainerInfo],
    processes: &[ProcessInfo],
) -> Option<String> {
    if let Some(id) = &service.container_id {
        return Some(id.clone());
    }

    let parent_of: HashMap<u32, u32> = processes.iter().map(|p| (p.pid, p.ppid)).collect();
    for &pid in &service.pids {
        let mut current = pid;
        for _ in 0..=MAX_PARENT_WALK {
            if let Some(container) = containers.iter().find(|c| c.main_pid == Some(current)) {
                return Some(container.id.clone());
            }
            match parent_of.get(&current) {
                Some(&ppid) if ppid != current => current = ppid,
                _ => break,
            }
        }
    }

    let service_name = service.name.to_ascii_lowercase();
    containers
        .iter()
        .find(|c| {
            let container_name = c.name.to_ascii_lowercase();
            if container_name.is_empty() {
                return false;
            }
            service_name.contains(&container_name)
                || container_name.contains(&service_name)
                || service
                    .framework
                    .as_deref()
                    .is_some_and(|f| container_name.contains(&f.to_ascii_lowercase()))
        })
        .map(|c| c.id.clone())
}

/// Owns one [`FileTailer`] per file-based log source and applies the
/// dedup/filter/truncate pipeline to whatever each one yields per cycle.
pub struct LogCollector {
    tailers: HashMap<String, FileTailer>,
}

impl Default for LogCollector {
    fn default() -> Self {
        Self::new()
    }
}

impl LogCollector {
    pub fn new() -> Self {
        Self { tailers: HashMap::new() }
    }

    /// Polls the source registered under `key` (typically a container id or
    /// synthesized service name — the same string used as the dedup
    /// table's source key). On the first call for a given `key` the tailer
    /// is created with an [`INITIAL_TAIL_LINES`]-line backlog; every call
    /// after that only sees lines appended since the previous poll.
    ///
    /// Returns lines that are new (per the cross-cycle dedup table),
    /// "interesting" (spec.md §4.3 filtering), and truncated to
    /// [`MAX_LINE_LEN`]. A missing or unreadable file yields an empty
    /// vec, never an error — a single dead log source must not fail the
    /// tick (spec.md §4.1 error policy, applied here too).
    pub fn poll_file(&mut self, key: &str, path: &Path, now: i64) -> Vec<String> {
        let lines = if let Some(tailer) = self.tailers.get_mut(key) {
            tailer.read_new_lines().unwrap_or_default()
        } else {
            match FileTailer::with_initial_tail(path.to_path_buf(), INITIAL_TAIL_LINES) {
                Ok(mut tailer) => {
                    let initial = tailer.take_initial_lines();
                    self.tailers.insert(key.to_string(), tailer);
                    initial
                }
                Err(_) => return Vec::new(),
            }
        };

        self.filter_new_lines(key, lines, now)
    }

    fn filter_new_lines(&self, key: &str, lines: Vec<String>, now: i64) -> Vec<String> {
        let mut dedup = dedup_table().lock().expect("dedup table lock poisoned");
        lines
            .into_iter()
            .filter(|line| dedup.observe(key, line, now))
            .filter(|line| is_interesting(line))
            .map(|line| truncate_line(&line))
            .collect()
    }

    /// Drops tailers for sources not present in `active_keys` this cycle,
    /// matching the "rebuilt fully every cycle" lifecycle of the rest of
    /// the collector (spec.md §4.3).
    pub fn retain_sources(&mut self, active_keys: &HashSet<String>) {
        self.tailers.retain(|key, _| active_keys.contains(key));
    }

    pub fn source_count(&self) -> usize {
        self.tailers.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{ContainerRuntime, ProcessCpuInfo, ProcessIoInfo, ProcessMemInfo, ServiceType};

    #[test]
    fn dedup_drops_repeated_lines_within_ttl() {
        let mut table = DedupTable::new();
        assert!(table.observe("svc", "boom", 0));
        assert!(!table.observe("svc", "boom", 5));
        assert!(table.observe("svc", "different", 5));
    }

    #[test]
    fn dedup_evicts_after_ttl() {
        let mut table = DedupTable::new();
        table.observe("svc", "boom", 0);
        table.evict_expired(DEDUP_TTL_SECS + 1);
        assert!(table.is_empty());
    }

    #[test]
    fn dedup_key_includes_source_so_same_line_from_two_sources_both_pass() {
        let mut table = DedupTable::new();
        assert!(table.observe("svc-a", "boom", 0));
        assert!(table.observe("svc-b", "boom", 0));
    }

    #[test]
    fn interesting_filter_matches_known_keyword_families() {
        assert!(is_interesting("2024 ERROR something broke"));
        assert!(is_interesting("connection refused by peer"));
        assert!(is_interesting("process killed: out of memory"));
        assert!(is_interesting("403 Forbidden: permission denied"));
        assert!(!is_interesting("handled request in 4ms"));
    }

    #[test]
    fn truncate_line_adds_ellipsis_past_limit() {
        let long = "x".repeat(MAX_LINE_LEN + 50);
        let truncated = truncate_line(&long);
        assert_eq!(truncated.chars().count(), MAX_LINE_LEN + 1);
        assert!(truncated.ends_with('\u{2026}'));
    }

    #[test]
    fn truncate_line_is_noop_under_limit() {
        assert_eq!(truncate_line("short line"), "short line");
    }

    #[test]
    fn unwraps_docker_json_log_line() {
        let raw = r#"{"log":"panic: disk full\n","stream":"stderr","time":"2024-01-01T00:00:00Z"}"#;
        assert_eq!(unwrap_docker_json_log(raw), "panic: disk full");
    }

    #[test]
    fn unwrap_docker_json_log_passes_through_plain_lines() {
        assert_eq!(unwrap_docker_json_log("plain text line"), "plain text line");
    }

    fn process(pid: u32, ppid: u32) -> ProcessInfo {
        ProcessInfo {
            pid,
            ppid,
            name: "worker".to_string(),
            command: "worker".to_string(),
            user: "root".to_string(),
            mem: ProcessMemInfo::default(),
            cpu: ProcessCpuInfo::default(),
            io: ProcessIoInfo::default(),
            status: 'S',
            num_threads: 1,
            num_fds: 0,
            nice: 0,
            priority: 20,
        }
    }

    fn container(id: &str, name: &str, main_pid: Option<u32>) -> ContainerInfo {
        ContainerInfo {
            id: id.to_string(),
            name: name.to_string(),
            image: "img:latest".to_string(),
            runtime: ContainerRuntime::Docker,
            status: "running".to_string(),
            health: None,
            started_at_unix: None,
            main_pid,
            cpu_percent: None,
            memory_usage_bytes: None,
        }
    }

    fn service(pids: Vec<u32>, name: &str) -> ServiceInfo {
        ServiceInfo {
            service_type: ServiceType::WebServer,
            name: name.to_string(),
            framework: None,
            pids,
            ports: Vec::new(),
            container_id: None,
            recent_logs: Vec::new(),
            log_source: None,
        }
    }

    #[test]
    fn matches_container_by_direct_main_pid() {
        let processes = vec![process(100, 1)];
        let containers = vec![container("c1", "web", Some(100))];
        let svc = service(vec![100], "Web Server");
        assert_eq!(match_container_for_service(&svc, &containers, &processes), Some("c1".to_string()));
    }

    #[test]
    fn matches_container_via_parent_pid_walk() {
        // pid 103 forked from 102, forked from 101, whose container main pid is 101.
        let processes = vec![process(101, 1), process(102, 101), process(103, 102)];
        let containers = vec![container("c1", "web", Some(101))];
        let svc = service(vec![103], "Web Server");
        assert_eq!(match_container_for_service(&svc, &containers, &processes), Some("c1".to_string()));
    }

    #[test]
    fn matches_container_by_fuzzy_name_when_pid_walk_fails() {
        let processes = vec![process(200, 1)];
        let containers = vec![container("c2", "my-nginx-proxy", Some(999))];
        let svc = service(vec![200], "nginx");
        assert_eq!(match_container_for_service(&svc, &containers, &processes), Some("c2".to_string()));
    }

    #[test]
    fn no_match_when_nothing_lines_up() {
        let processes = vec![process(300, 1)];
        let containers = vec![container("c3", "unrelated", Some(999))];
        let svc = service(vec![300], "redis");
        assert_eq!(match_container_for_service(&svc, &containers, &processes), None);
    }

    #[test]
    fn poll_file_returns_empty_for_missing_path() {
        let mut collector = LogCollector::new();
        let lines = collector.poll_file("missing", Path::new("/nonexistent/path.log"), 0);
        assert!(lines.is_empty());
        assert_eq!(collector.source_count(), 0);
    }

    #[test]
    fn poll_file_tails_initial_backlog_then_only_new_lines() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("app.log");
        std::fs::write(&path, "starting up\nERROR disk almost full\n").unwrap();

        let mut collector = LogCollector::new();
        let first = collector.poll_file("app-key-1", &path, 1_000_000);
        assert_eq!(first, vec!["ERROR disk almost full"]);

        let second = collector.poll_file("app-key-1", &path, 1_000_001);
        assert!(second.is_empty());
    }

    #[test]
    fn retain_sources_drops_tailers_for_vanished_keys() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("app.log");
        std::fs::write(&path, "line one\n").unwrap();

        let mut collector = LogCollector::new();
        collector.poll_file("app-key-2", &path, 0);
        assert_eq!(collector.source_count(), 1);

        collector.retain_sources(&HashSet::new());
        assert_eq!(collector.source_count(), 0);
    }
}
