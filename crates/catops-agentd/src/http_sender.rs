//! HTTP Batch Sender (spec.md §4.7 "HTTP Batch Sender (C7)").
//!
//! Fire-and-forget, per-endpoint POST/PUT: every call spawns its own
//! tokio task with a 10s client timeout, no retries, no queue. A failure
//! is logged and dropped — the Sender never blocks the tick that invoked
//! it (spec.md §7.2).

use std::time::Duration;

use chrono::{DateTime, Utc};
use reqwest::{Client, Method};
use serde::Serialize;
use serde_json::Value;
use tracing::warn;

use catops_core::alert::Alert;
use catops_core::model::{ConnectionStates, ProcessInfo, SystemSummary};

use crate::config::Config;

const CLIENT_TIMEOUT: Duration = Duration::from_secs(10);
const AGENT_NAME: &str = "catops";
const AGENT_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Fixed set of event types the `/api/cli/events` endpoint accepts
/// (spec.md §6).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EventType {
    ServiceStart,
    ServiceStop,
    ServiceRestart,
    SystemMonitoring,
    UpdateInstalled,
    ConfigChange,
}

impl EventType {
    fn as_str(&self) -> &'static str {
        match self {
            EventType::ServiceStart => "service_start",
            EventType::ServiceStop => "service_stop",
            EventType::ServiceRestart => "service_restart",
            EventType::SystemMonitoring => "system_monitoring",
            EventType::UpdateInstalled => "update_installed",
            EventType::ConfigChange => "config_change",
        }
    }
}

#[derive(Serialize)]
pub struct BaseMetric {
    pub timestamp: DateTime<Utc>,
    pub server_id: String,
    pub metric_type: String,
    pub metric_name: String,
    pub metric_value: f64,
    pub metric_unit: String,
    pub tags: Value,
    pub metadata: Value,
}

/// Builds the per-tick `BaseMetric` batch for `/api/cli/metrics` (spec.md
/// §6) from a snapshot's aggregate summary: one gauge each for CPU,
/// memory, disk and network usage, matching the minimum set the
/// `catops.system.*` OTLP gauges (spec.md §4.6) also export.
pub fn summary_metrics(now: DateTime<Utc>, server_id: &str, summary: &SystemSummary) -> Vec<BaseMetric> {
    let gauge = |metric_name: &str, metric_value: f64, metric_unit: &str| BaseMetric {
        timestamp: now,
        server_id: server_id.to_string(),
        metric_type: "gauge".to_string(),
        metric_name: metric_name.to_string(),
        metric_value,
        metric_unit: metric_unit.to_string(),
        tags: Value::Object(Default::default()),
        metadata: Value::Object(Default::default()),
    };

    vec![
        gauge("cpu.usage", summary.cpu.usage, "percent"),
        gauge("cpu.user", summary.cpu.user, "percent"),
        gauge("cpu.system", summary.cpu.system, "percent"),
        gauge("cpu.iowait", summary.cpu.iowait, "percent"),
        gauge("memory.usage", summary.memory.usage_percent, "percent"),
        gauge("disk.usage", summary.disk.usage_percent, "percent"),
        gauge("network.rx_bytes_per_sec", summary.network.rx_bytes_per_sec, "bytes_per_sec"),
        gauge("network.tx_bytes_per_sec", summary.network.tx_bytes_per_sec, "bytes_per_sec"),
        gauge("load.1m", summary.load1, "load"),
    ]
}

#[derive(Serialize)]
struct MetricsBatch {
    user_token: Option<String>,
    server_id: String,
    metrics: Vec<BaseMetric>,
}

#[derive(Serialize)]
struct ProcessSummary {
    total: u64,
    running: u64,
    sleeping: u64,
    other_processes_count: u64,
    other_processes_cpu_percent: f64,
    other_processes_memory_percent: f64,
}

#[derive(Serialize)]
struct ProcessesPayload {
    timestamp: DateTime<Utc>,
    user_token: Option<String>,
    server_id: String,
    top_cpu_processes: Vec<ProcessInfo>,
    top_memory_processes: Vec<ProcessInfo>,
    process_summary: ProcessSummary,
}

#[derive(Serialize)]
struct NetworkPayload {
    timestamp: DateTime<Utc>,
    user_token: Option<String>,
    server_id: String,
    connections: ConnectionStates,
    rx_bytes_per_sec: f64,
    tx_bytes_per_sec: f64,
    top_connections: Vec<Value>,
}

#[derive(Serialize)]
struct Event {
    timestamp: DateTime<Utc>,
    server_id: String,
    event_type: &'static str,
    service_name: Option<String>,
    pid: Option<u32>,
    message: String,
    severity: &'static str,
    tags: Value,
    metadata: Value,
}

#[derive(Serialize)]
struct EventsBatch {
    user_token: Option<String>,
    events: Vec<Event>,
}

#[derive(Serialize)]
struct AlertPayload<'a> {
    user_token: Option<String>,
    server_id: String,
    fingerprint: &'a str,
    metric_name: &'a str,
    subtype: &'static str,
    severity: &'static str,
    title: &'a str,
    message: &'a str,
    value: f64,
    threshold: f64,
    details: &'a Value,
}

#[derive(Serialize)]
struct ResolvePayload<'a> {
    user_token: Option<String>,
    server_id: String,
    fingerprint: &'a str,
}

/// Top-K narrowed to 30 per direction for the `/api/cli/processes`
/// endpoint (spec.md §6), distinct from [`catops_core::collector::TOP_K_PROCESSES`]
/// which bounds the in-memory `Snapshot::processes` list at 100.
pub const HTTP_TOP_K_PROCESSES: usize = 30;

/// Fire-and-forget sender for every `/api/cli/*` endpoint (spec.md §6).
pub struct HttpSender {
    client: Client,
    backend_url: String,
    user_token: Option<String>,
    server_id: String,
}

impl HttpSender {
    pub fn new(config: &Config) -> Self {
        let client = Client::builder()
            .timeout(CLIENT_TIMEOUT)
            .user_agent(format!("{AGENT_NAME}-CLI/1.0.0"))
            .build()
            .expect("reqwest client builder with static config never fails");

        Self {
            client,
            backend_url: config.backend_url.clone(),
            user_token: config.auth_token.clone(),
            server_id: config.server_id_or_local().to_string(),
        }
    }

    fn request(&self, method: Method, path: &str) -> reqwest::RequestBuilder {
        self.client
            .request(method, format!("{}{}", self.backend_url, path))
            .header("X-Platform", std::env::consts::OS)
            .header("X-Version", AGENT_VERSION)
    }

    /// Spawns a fire-and-forget POST/PUT; failures are logged, never
    /// propagated (spec.md §4.7 "no retries, no queue").
    fn spawn_send(&self, method: Method, path: String, body: Value) {
        let req = self.request(method, &path).json(&body);
        tokio::spawn(async move {
            match req.send().await {
                Ok(resp) if !resp.status().is_success() => {
                    warn!("sender: {path} returned {}", resp.status());
                }
                Ok(_) => {}
                Err(e) => warn!("sender: {path} failed: {e}"),
            }
        });
    }

    pub fn send_metrics(&self, metrics: Vec<BaseMetric>) {
        if metrics.is_empty() {
            return;
        }
        let batch = MetricsBatch { user_token: self.user_token.clone(), server_id: self.server_id.clone(), metrics };
        self.spawn_send(Method::POST, "/api/cli/metrics".to_string(), serde_json::to_value(batch).unwrap());
    }

    pub fn send_processes(&self, now: DateTime<Utc>, processes: &[ProcessInfo], total_counters: catops_core::model::ProcessCounters) {
        let mut by_cpu: Vec<ProcessInfo> = processes.to_vec();
        by_cpu.sort_by(catops_core::model::rank_cmp);
        let top_cpu: Vec<ProcessInfo> = by_cpu.iter().take(HTTP_TOP_K_PROCESSES).cloned().collect();

        let mut by_mem = processes.to_vec();
        by_mem.sort_by(|a, b| b.mem.percent.total_cmp(&a.mem.percent));
        let top_mem: Vec<ProcessInfo> = by_mem.iter().take(HTTP_TOP_K_PROCESSES).cloned().collect();

        let union_pids: std::collections::HashSet<u32> =
            top_cpu.iter().chain(top_mem.iter()).map(|p| p.pid).collect();
        let others: Vec<&ProcessInfo> = processes.iter().filter(|p| !union_pids.contains(&p.pid)).collect();
        let other_cpu: f64 = others.iter().map(|p| p.cpu.percent).sum();
        // Percentage of total system memory, per spec.md §9's open-question
        // note: treat the field as "percent of total memory", not as a
        // faithful reproduction of the source's KB/bytes mixing bug.
        let other_mem: f64 = others.iter().map(|p| p.mem.percent).sum();

        let summary = ProcessSummary {
            total: total_counters.total,
            running: total_counters.running,
            sleeping: total_counters.sleeping,
            other_processes_count: others.len() as u64,
            other_processes_cpu_percent: catops_core::model::clamp_percent(other_cpu),
            other_processes_memory_percent: catops_core::model::clamp_percent(other_mem),
        };

        let payload = ProcessesPayload {
            timestamp: now,
            user_token: self.user_token.clone(),
            server_id: self.server_id.clone(),
            top_cpu_processes: top_cpu,
            top_memory_processes: top_mem,
            process_summary: summary,
        };
        self.spawn_send(Method::POST, "/api/cli/processes".to_string(), serde_json::to_value(payload).unwrap());
    }

    pub fn send_network(
        &self,
        now: DateTime<Utc>,
        connections: ConnectionStates,
        rx_bytes_per_sec: f64,
        tx_bytes_per_sec: f64,
    ) {
        let payload = NetworkPayload {
            timestamp: now,
            user_token: self.user_token.clone(),
            server_id: self.server_id.clone(),
            connections,
            rx_bytes_per_sec,
            tx_bytes_per_sec,
            top_connections: Vec::new(),
        };
        self.spawn_send(Method::POST, "/api/cli/network".to_string(), serde_json::to_value(payload).unwrap());
    }

    pub fn send_event(
        &self,
        now: DateTime<Utc>,
        event_type: EventType,
        service_name: Option<String>,
        pid: Option<u32>,
        message: impl Into<String>,
        severity: &'static str,
    ) {
        let event = Event {
            timestamp: now,
            server_id: self.server_id.clone(),
            event_type: event_type.as_str(),
            service_name,
            pid,
            message: message.into(),
            severity,
            tags: Value::Object(Default::default()),
            metadata: Value::Object(Default::default()),
        };
        let batch = EventsBatch { user_token: self.user_token.clone(), events: vec![event] };
        self.spawn_send(Method::POST, "/api/cli/events".to_string(), serde_json::to_value(batch).unwrap());
    }

    /// `process(alert)`: initial POST creating/refreshing the remote
    /// alert (spec.md §4.7 "Alert lifecycle sub-protocol").
    pub fn process_alert(&self, alert: &Alert) {
        let payload = AlertPayload {
            user_token: self.user_token.clone(),
            server_id: self.server_id.clone(),
            fingerprint: &alert.fingerprint,
            metric_name: &alert.metric_name,
            subtype: alert.subtype.as_str(),
            severity: match alert.severity {
                catops_core::alert::Severity::Critical => "critical",
                catops_core::alert::Severity::Warning => "warning",
                catops_core::alert::Severity::Info => "info",
            },
            title: &alert.title,
            message: &alert.message,
            value: alert.value,
            threshold: alert.threshold,
            details: &alert.details,
        };
        self.spawn_send(Method::POST, "/api/cli/alerts/process".to_string(), serde_json::to_value(payload).unwrap());
    }

    /// `heartbeat(fingerprint)`: PUT sent periodically while the
    /// condition persists, keeping the remote alert alive.
    pub fn heartbeat_alert(&self, fingerprint: &str) {
        let path = format!("/api/cli/alerts/{fingerprint}/heartbeat");
        self.spawn_send(Method::PUT, path, Value::Object(Default::default()));
    }

    /// `resolve(fingerprint)`: POST when the spike condition clears.
    pub fn resolve_alert(&self, fingerprint: &str) {
        let payload = ResolvePayload { user_token: self.user_token.clone(), server_id: self.server_id.clone(), fingerprint };
        self.spawn_send(Method::POST, "/api/cli/alerts/resolve".to_string(), serde_json::to_value(payload).unwrap());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use catops_core::model::{ProcessCpuInfo, ProcessIoInfo, ProcessMemInfo};

    fn process(pid: u32, cpu: f64, mem: f64) -> ProcessInfo {
        ProcessInfo {
            pid,
            ppid: 1,
            name: "worker".to_string(),
            command: "worker".to_string(),
            user: "root".to_string(),
            mem: ProcessMemInfo { percent: mem, ..Default::default() },
            cpu: ProcessCpuInfo { percent: cpu, ..Default::default() },
            io: ProcessIoInfo::default(),
            status: 'R',
            num_threads: 1,
            num_fds: 4,
            nice: 0,
            priority: 20,
        }
    }

    fn test_config() -> Config {
        Config {
            collection_interval: Duration::from_secs(30),
            backend_url: "https://example.invalid".to_string(),
            auth_token: Some("tok".to_string()),
            server_id: Some("srv-1".to_string()),
            otlp_endpoint: "https://example.invalid".to_string(),
            otlp_path: "/v1/metrics".to_string(),
            cloud: true,
            suppress_unchanged: true,
        }
    }

    #[test]
    fn event_type_strings_match_spec_exactly() {
        assert_eq!(EventType::ServiceStart.as_str(), "service_start");
        assert_eq!(EventType::ServiceStop.as_str(), "service_stop");
        assert_eq!(EventType::ServiceRestart.as_str(), "service_restart");
        assert_eq!(EventType::SystemMonitoring.as_str(), "system_monitoring");
        assert_eq!(EventType::UpdateInstalled.as_str(), "update_installed");
        assert_eq!(EventType::ConfigChange.as_str(), "config_change");
    }

    #[test]
    fn sender_builds_with_static_user_agent() {
        let _sender = HttpSender::new(&test_config());
    }

    #[test]
    fn top_k_unions_leave_remainder_accounted_for() {
        let processes = vec![process(1, 90.0, 1.0), process(2, 1.0, 90.0), process(3, 0.5, 0.5)];
        let union_pids: std::collections::HashSet<u32> = [1u32, 2].into_iter().collect();
        let others: Vec<&ProcessInfo> = processes.iter().filter(|p| !union_pids.contains(&p.pid)).collect();
        assert_eq!(others.len(), 1);
        assert_eq!(others[0].pid, 3);
    }

    #[test]
    fn summary_metrics_cover_cpu_memory_disk_network() {
        let mut summary = SystemSummary::default();
        summary.cpu.usage = 42.0;
        summary.memory.usage_percent = 55.0;
        summary.disk.usage_percent = 10.0;
        summary.network.rx_bytes_per_sec = 1234.0;

        let metrics = summary_metrics(Utc::now(), "srv-1", &summary);
        let names: Vec<&str> = metrics.iter().map(|m| m.metric_name.as_str()).collect();
        assert!(names.contains(&"cpu.usage"));
        assert!(names.contains(&"memory.usage"));
        assert!(names.contains(&"disk.usage"));
        assert!(names.contains(&"network.rx_bytes_per_sec"));
        assert!(metrics.iter().all(|m| m.server_id == "srv-1"));
    }
}
