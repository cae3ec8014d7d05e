//! OTLP Exporter (spec.md §4.6 "OTLP Exporter (C6)").
//!
//! Wraps an OTLP/HTTP metrics pipeline with a periodic reader. Every
//! registered gauge's callback is a side-effect-free read of the
//! [`SnapshotCache`] (spec.md §4.5) — no syscalls, no allocation-heavy
//! work, exactly the constraint spec.md §9 "Callbacks and event loops"
//! calls out.

use std::sync::Arc;
use std::time::Duration;

use catops_core::cache::SnapshotCache;
use catops_core::util::hash::fnv1a_16hex;
use opentelemetry::KeyValue;
use opentelemetry::metrics::{MeterProvider as _, ObservableGauge};
use opentelemetry_otlp::{MetricExporter, Protocol, WithExportConfig};
use opentelemetry_sdk::Resource;
use opentelemetry_sdk::metrics::{PeriodicReader, SdkMeterProvider};
use opentelemetry_sdk::runtime;
use tracing::{debug, warn};

use crate::config::Config;
use crate::error::ExportError;

/// Default sample/collection interval for the periodic reader (spec.md
/// §4.6), separate from the Supervisor's own sample tick though they're
/// normally configured to the same value.
pub const DEFAULT_COLLECTION_INTERVAL: Duration = Duration::from_secs(30);
/// Per-RPC timeout for the OTLP exporter (spec.md §4.6, §5).
const RPC_TIMEOUT: Duration = Duration::from_secs(30);
/// Retry backoff parameters for [`Exporter::force_flush`] (spec.md §4.6
/// "Retry, flush, health").
const RETRY_INITIAL: Duration = Duration::from_secs(5);
const RETRY_MAX: Duration = Duration::from_secs(30);
const RETRY_BUDGET: Duration = Duration::from_secs(120);
/// Health-check flush deadline (spec.md §4.6).
const HEALTH_CHECK_DEADLINE: Duration = Duration::from_secs(15);

/// Holds the meter provider plus every registered [`ObservableGauge`] (kept
/// alive for the provider's lifetime — dropping them would unregister
/// their callbacks).
pub struct Exporter {
    provider: SdkMeterProvider,
    _gauges: Vec<ObservableGauge<f64>>,
    cache: Arc<SnapshotCache>,
    server_id: String,
}

impl Exporter {
    /// Builds the OTLP/HTTP pipeline and registers every gauge named in
    /// spec.md §4.6's table, reading from `cache` at each collection.
    pub fn new(config: &Config, cache: Arc<SnapshotCache>) -> Result<Self, ExportError> {
        let mut headers = std::collections::HashMap::new();
        if let Some(token) = &config.auth_token {
            headers.insert("Authorization".to_string(), format!("Bearer {token}"));
        }
        headers.insert("X-Catops-Server-ID".to_string(), config.server_id_or_local().to_string());

        let exporter = MetricExporter::builder()
            .with_http()
            .with_endpoint(config.otlp_url())
            .with_protocol(Protocol::HttpBinary)
            .with_timeout(RPC_TIMEOUT)
            .with_headers(headers)
            .build()
            .map_err(|e| ExportError::Otlp(e.to_string()))?;

        let reader = PeriodicReader::builder(exporter, runtime::Tokio)
            .with_interval(DEFAULT_COLLECTION_INTERVAL)
            .build();

        let resource = Resource::new(vec![
            KeyValue::new("service.name", "catops-agentd"),
            KeyValue::new("service.instance.id", config.server_id_or_local().to_string()),
        ]);

        let provider = SdkMeterProvider::builder().with_reader(reader).with_resource(resource).build();

        let meter = provider.meter("catops-agentd");
        let gauges = register_gauges(&meter, cache.clone());

        Ok(Self { provider, _gauges: gauges, cache, server_id: config.server_id_or_local().to_string() })
    }

    /// Sends the current batch immediately. Called once after the first
    /// sample so dashboards populate instantly, and again by the health
    /// FSM after an exporter restart (spec.md §4.6, §4.8).
    ///
    /// Retries with exponential backoff (5s initial, 30s max, 2min total
    /// budget) before giving up.
    pub fn force_flush(&self) -> Result<(), ExportError> {
        let deadline = std::time::Instant::now() + RETRY_BUDGET;
        let mut backoff = RETRY_INITIAL;
        loop {
            match self.provider.force_flush() {
                Ok(()) => return Ok(()),
                Err(e) => {
                    if std::time::Instant::now() >= deadline {
                        return Err(ExportError::Otlp(e.to_string()));
                    }
                    warn!("otlp flush failed, retrying in {:?}: {e}", backoff);
                    std::thread::sleep(backoff.min(deadline.saturating_duration_since(std::time::Instant::now())));
                    backoff = (backoff * 2).min(RETRY_MAX);
                }
            }
        }
    }

    /// Flushes with a bounded [`HEALTH_CHECK_DEADLINE`], run by the
    /// Supervisor every 5 minutes (spec.md §4.6, §4.8).
    pub fn health_check(&self) -> bool {
        let (tx, rx) = std::sync::mpsc::channel();
        let provider = self.provider.clone();
        std::thread::spawn(move || {
            let _ = tx.send(provider.force_flush());
        });
        match rx.recv_timeout(HEALTH_CHECK_DEADLINE) {
            Ok(Ok(())) => true,
            Ok(Err(e)) => {
                warn!("otlp health check flush failed: {e}");
                false
            }
            Err(_) => {
                warn!("otlp health check timed out after {:?}", HEALTH_CHECK_DEADLINE);
                false
            }
        }
    }

    /// Shuts the meter provider down with a 5s deadline (spec.md §4.8
    /// "Shutdown sequence"). `opentelemetry_sdk`'s shutdown has no native
    /// timeout, so it is enforced the same way [`health_check`] bounds
    /// the flush: run it on a helper thread and give up on the result
    /// if it overruns.
    pub fn shutdown(self, deadline: Duration) {
        let provider = self.provider;
        let (tx, rx) = std::sync::mpsc::channel();
        std::thread::spawn(move || {
            let _ = tx.send(provider.shutdown());
        });
        match rx.recv_timeout(deadline) {
            Ok(Ok(())) => debug!("otlp exporter shut down cleanly"),
            Ok(Err(e)) => warn!("otlp exporter shutdown error: {e}"),
            Err(_) => warn!("otlp exporter shutdown exceeded {:?} deadline", deadline),
        }
    }

    pub fn server_id(&self) -> &str {
        &self.server_id
    }

    pub fn cache(&self) -> &Arc<SnapshotCache> {
        &self.cache
    }
}

/// Registers every gauge named in spec.md §4.6. Each closure captures a
/// clone of `cache` and reads the current [`Snapshot`] (or does nothing
/// when none has been published yet).
fn register_gauges(meter: &opentelemetry::metrics::Meter, cache: Arc<SnapshotCache>) -> Vec<ObservableGauge<f64>> {
    let mut gauges = Vec::new();

    {
        let cache = cache.clone();
        gauges.push(
            meter
                .f64_observable_gauge("catops.system.cpu")
                .with_callback(move |obs| {
                    let Some(s) = cache.current() else { return };
                    let cpu = &s.summary.cpu;
                    obs.observe(cpu.usage, &[KeyValue::new("type", "usage")]);
                    obs.observe(cpu.user, &[KeyValue::new("type", "user")]);
                    obs.observe(cpu.system, &[KeyValue::new("type", "system")]);
                    obs.observe(cpu.idle, &[KeyValue::new("type", "idle")]);
                    obs.observe(cpu.iowait, &[KeyValue::new("type", "iowait")]);
                })
                .build(),
        );
    }
    {
        let cache = cache.clone();
        gauges.push(
            meter
                .f64_observable_gauge("catops.system.load")
                .with_callback(move |obs| {
                    let Some(s) = cache.current() else { return };
                    obs.observe(s.summary.load1, &[KeyValue::new("period", "1m")]);
                    obs.observe(s.summary.load5, &[KeyValue::new("period", "5m")]);
                    obs.observe(s.summary.load15, &[KeyValue::new("period", "15m")]);
                })
                .build(),
        );
    }
    {
        let cache = cache.clone();
        gauges.push(
            meter
                .f64_observable_gauge("catops.system.memory")
                .with_callback(move |obs| {
                    let Some(s) = cache.current() else { return };
                    let m = &s.summary.memory;
                    obs.observe(m.total_kb as f64, &[KeyValue::new("type", "total")]);
                    obs.observe(m.used_kb as f64, &[KeyValue::new("type", "used")]);
                    obs.observe(m.available_kb as f64, &[KeyValue::new("type", "available")]);
                    obs.observe(m.cached_kb as f64, &[KeyValue::new("type", "cached")]);
                    obs.observe(m.buffers_kb as f64, &[KeyValue::new("type", "buffers")]);
                })
                .build(),
        );
    }
    {
        let cache = cache.clone();
        gauges.push(
            meter
                .f64_observable_gauge("catops.system.memory.usage")
                .with_callback(move |obs| {
                    if let Some(s) = cache.current() {
                        obs.observe(s.summary.memory.usage_percent, &[]);
                    }
                })
                .build(),
        );
    }
    {
        let cache = cache.clone();
        gauges.push(
            meter
                .f64_observable_gauge("catops.system.swap")
                .with_callback(move |obs| {
                    let Some(s) = cache.current() else { return };
                    let m = &s.summary.memory;
                    obs.observe(m.swap_total_kb as f64, &[KeyValue::new("type", "total")]);
                    obs.observe(m.swap_used_kb as f64, &[KeyValue::new("type", "used")]);
                    let free = m.swap_total_kb.saturating_sub(m.swap_used_kb);
                    obs.observe(free as f64, &[KeyValue::new("type", "free")]);
                })
                .build(),
        );
    }
    {
        let cache = cache.clone();
        gauges.push(
            meter
                .f64_observable_gauge("catops.system.disk")
                .with_callback(move |obs| {
                    let Some(s) = cache.current() else { return };
                    obs.observe(s.summary.disk.total_kb as f64, &[KeyValue::new("type", "total")]);
                    obs.observe(s.summary.disk.used_kb as f64, &[KeyValue::new("type", "used")]);
                })
                .build(),
        );
    }
    {
        let cache = cache.clone();
        gauges.push(
            meter
                .f64_observable_gauge("catops.system.disk.usage")
                .with_callback(move |obs| {
                    if let Some(s) = cache.current() {
                        obs.observe(s.summary.disk.usage_percent, &[]);
                    }
                })
                .build(),
        );
    }
    {
        let cache = cache.clone();
        gauges.push(
            meter
                .f64_observable_gauge("catops.system.disk.iops")
                .with_callback(move |obs| {
                    let Some(s) = cache.current() else { return };
                    obs.observe(s.summary.disk.read_iops, &[KeyValue::new("direction", "read")]);
                    obs.observe(s.summary.disk.write_iops, &[KeyValue::new("direction", "write")]);
                })
                .build(),
        );
    }
    {
        let cache = cache.clone();
        gauges.push(
            meter
                .f64_observable_gauge("catops.system.network")
                .with_callback(move |obs| {
                    let Some(s) = cache.current() else { return };
                    let n = &s.summary.network;
                    obs.observe(n.rx_bytes_per_sec, &[KeyValue::new("direction", "rx")]);
                    obs.observe(n.tx_bytes_per_sec, &[KeyValue::new("direction", "tx")]);
                })
                .build(),
        );
    }
    {
        let cache = cache.clone();
        gauges.push(
            meter
                .f64_observable_gauge("catops.system.network.connections")
                .with_callback(move |obs| {
                    let Some(s) = cache.current() else { return };
                    let c = &s.summary.network.connections;
                    obs.observe(c.total() as f64, &[KeyValue::new("state", "total")]);
                    obs.observe(c.established as f64, &[KeyValue::new("state", "established")]);
                    obs.observe(c.time_wait as f64, &[KeyValue::new("state", "time_wait")]);
                    obs.observe(c.close_wait as f64, &[KeyValue::new("state", "close_wait")]);
                    obs.observe(c.listen as f64, &[KeyValue::new("state", "listen")]);
                    obs.observe(c.syn_sent as f64, &[KeyValue::new("state", "syn_sent")]);
                    obs.observe(c.syn_recv as f64, &[KeyValue::new("state", "syn_recv")]);
                    obs.observe(c.fin_wait1 as f64, &[KeyValue::new("state", "fin_wait1")]);
                    obs.observe(c.fin_wait2 as f64, &[KeyValue::new("state", "fin_wait2")]);
                })
                .build(),
        );
    }
    {
        let cache = cache.clone();
        gauges.push(
            meter
                .f64_observable_gauge("catops.system.processes")
                .with_callback(move |obs| {
                    let Some(s) = cache.current() else { return };
                    let p = &s.summary.processes;
                    obs.observe(p.total as f64, &[KeyValue::new("state", "total")]);
                    obs.observe(p.running as f64, &[KeyValue::new("state", "running")]);
                    obs.observe(p.sleeping as f64, &[KeyValue::new("state", "sleeping")]);
                })
                .build(),
        );
    }
    {
        let cache = cache.clone();
        gauges.push(
            meter
                .f64_observable_gauge("catops.system.uptime")
                .with_callback(move |obs| {
                    if let Some(s) = cache.current() {
                        obs.observe(s.summary.uptime_secs as f64, &[]);
                    }
                })
                .build(),
        );
    }
    {
        let cache = cache.clone();
        gauges.push(
            meter
                .f64_observable_gauge("catops.cpu.core")
                .with_callback(move |obs| {
                    let Some(s) = cache.current() else { return };
                    for core in &s.cpu_cores {
                        let core_id = core.core_id.map(|c| c.to_string()).unwrap_or_default();
                        obs.observe(core.usage, &[KeyValue::new("core_id", core_id.clone()), KeyValue::new("type", "usage")]);
                        obs.observe(core.user, &[KeyValue::new("core_id", core_id.clone()), KeyValue::new("type", "user")]);
                        obs.observe(core.system, &[KeyValue::new("core_id", core_id), KeyValue::new("type", "system")]);
                    }
                })
                .build(),
        );
    }
    {
        let cache = cache.clone();
        gauges.push(
            meter
                .f64_observable_gauge("catops.memory.detailed")
                .with_callback(move |obs| {
                    let Some(s) = cache.current() else { return };
                    let d = &s.memory_detail;
                    obs.observe(d.slab_kb as f64, &[KeyValue::new("type", "slab")]);
                    obs.observe(d.shared_kb as f64, &[KeyValue::new("type", "shared")]);
                    obs.observe(d.swap_cached_kb as f64, &[KeyValue::new("type", "swap_cached")]);
                })
                .build(),
        );
    }
    {
        let cache = cache.clone();
        gauges.push(
            meter
                .f64_observable_gauge("catops.disk.mount.bytes")
                .with_callback(move |obs| {
                    let Some(s) = cache.current() else { return };
                    for d in &s.disks {
                        let attrs = |direction: &str| {
                            vec![
                                KeyValue::new("device", d.device.clone()),
                                KeyValue::new("mount_point", d.mountpoint.clone()),
                                KeyValue::new("fs_type", d.fstype.clone()),
                                KeyValue::new("type", direction.to_string()),
                            ]
                        };
                        obs.observe((d.total_kb * 1024) as f64, &attrs("total"));
                        obs.observe((d.used_kb * 1024) as f64, &attrs("used"));
                        obs.observe((d.free_kb * 1024) as f64, &attrs("free"));
                    }
                })
                .build(),
        );
    }
    {
        let cache = cache.clone();
        gauges.push(
            meter
                .f64_observable_gauge("catops.disk.mount.iops")
                .with_callback(move |obs| {
                    let Some(s) = cache.current() else { return };
                    for d in &s.disks {
                        let base = |direction: &str| {
                            vec![
                                KeyValue::new("device", d.device.clone()),
                                KeyValue::new("mount_point", d.mountpoint.clone()),
                                KeyValue::new("fs_type", d.fstype.clone()),
                                KeyValue::new("direction", direction.to_string()),
                            ]
                        };
                        obs.observe(d.read_iops, &base("read"));
                        obs.observe(d.write_iops, &base("write"));
                    }
                })
                .build(),
        );
    }
    {
        let cache = cache.clone();
        gauges.push(
            meter
                .f64_observable_gauge("catops.network.interface.bytes")
                .with_callback(move |obs| {
                    let Some(s) = cache.current() else { return };
                    for n in &s.networks {
                        obs.observe(
                            n.rx_bytes as f64,
                            &[KeyValue::new("interface", n.name.clone()), KeyValue::new("direction", "rx")],
                        );
                        obs.observe(
                            n.tx_bytes as f64,
                            &[KeyValue::new("interface", n.name.clone()), KeyValue::new("direction", "tx")],
                        );
                    }
                })
                .build(),
        );
    }
    {
        let cache = cache.clone();
        gauges.push(
            meter
                .f64_observable_gauge("catops.network.interface.packets")
                .with_callback(move |obs| {
                    let Some(s) = cache.current() else { return };
                    for n in &s.networks {
                        obs.observe(
                            n.rx_packets as f64,
                            &[KeyValue::new("interface", n.name.clone()), KeyValue::new("direction", "rx")],
                        );
                        obs.observe(
                            n.tx_packets as f64,
                            &[KeyValue::new("interface", n.name.clone()), KeyValue::new("direction", "tx")],
                        );
                    }
                })
                .build(),
        );
    }
    {
        let cache = cache.clone();
        gauges.push(
            meter
                .f64_observable_gauge("catops.network.interface.errors")
                .with_callback(move |obs| {
                    let Some(s) = cache.current() else { return };
                    for n in &s.networks {
                        obs.observe(
                            n.rx_errors as f64,
                            &[KeyValue::new("interface", n.name.clone()), KeyValue::new("direction", "rx")],
                        );
                        obs.observe(
                            n.tx_errors as f64,
                            &[KeyValue::new("interface", n.name.clone()), KeyValue::new("direction", "tx")],
                        );
                    }
                })
                .build(),
        );
    }
    {
        let cache = cache.clone();
        gauges.push(
            meter
                .f64_observable_gauge("catops.network.interface.rate")
                .with_callback(move |obs| {
                    let Some(s) = cache.current() else { return };
                    for n in &s.networks {
                        obs.observe(
                            n.rx_bytes_per_sec,
                            &[KeyValue::new("interface", n.name.clone()), KeyValue::new("direction", "rx")],
                        );
                        obs.observe(
                            n.tx_bytes_per_sec,
                            &[KeyValue::new("interface", n.name.clone()), KeyValue::new("direction", "tx")],
                        );
                    }
                })
                .build(),
        );
    }
    {
        let cache = cache.clone();
        gauges.push(
            meter
                .f64_observable_gauge("catops.process")
                .with_description("constant 1; one timeseries per reported process")
                .with_callback(move |obs| {
                    let Some(s) = cache.current() else { return };
                    for p in &s.processes {
                        obs.observe(
                            1.0,
                            &[
                                KeyValue::new("pid", p.pid as i64),
                                KeyValue::new("name", p.name.clone()),
                                KeyValue::new("command", p.command.clone()),
                                KeyValue::new("user", p.user.clone()),
                                KeyValue::new("status", p.status.to_string()),
                                KeyValue::new("cpu_percent", p.cpu.percent),
                                KeyValue::new("memory_percent", p.mem.percent),
                            ],
                        );
                    }
                })
                .build(),
        );
    }
    {
        let cache = cache.clone();
        gauges.push(
            meter
                .f64_observable_gauge("catops.service")
                .with_callback(move |obs| {
                    let Some(s) = cache.current() else { return };
                    for svc in &s.services {
                        obs.observe(
                            1.0,
                            &[
                                KeyValue::new("service_type", format!("{:?}", svc.service_type)),
                                KeyValue::new("service_name", svc.name.clone()),
                                KeyValue::new("pids", format!("{:?}", svc.pids)),
                                KeyValue::new("ports", format!("{:?}", svc.ports)),
                                KeyValue::new(
                                    "recent_logs",
                                    svc.recent_logs
                                        .iter()
                                        .map(|e| e.message.as_deref().unwrap_or(&e.raw))
                                        .collect::<Vec<_>>()
                                        .join("\n"),
                                ),
                                KeyValue::new("log_source", svc.log_source.clone().unwrap_or_default()),
                            ],
                        );
                    }
                })
                .build(),
        );
    }
    {
        let cache = cache.clone();
        gauges.push(
            meter
                .f64_observable_gauge("catops.container")
                .with_callback(move |obs| {
                    let Some(s) = cache.current() else { return };
                    for c in &s.containers {
                        obs.observe(
                            1.0,
                            &[
                                KeyValue::new("container_id", c.id.clone()),
                                KeyValue::new("name", c.name.clone()),
                                KeyValue::new("image", c.image.clone()),
                                KeyValue::new("runtime", c.runtime.as_str()),
                                KeyValue::new("status", c.status.clone()),
                                KeyValue::new("health", c.health.clone().unwrap_or_default()),
                            ],
                        );
                    }
                })
                .build(),
        );
    }
    {
        gauges.push(
            meter
                .f64_observable_gauge("catops.log")
                .with_description("constant 1; uniqueness is carried entirely by the attribute set")
                .with_callback(move |obs| {
                    let Some(s) = cache.current() else { return };
                    for svc in &s.services {
                        let pid = svc.pids.first().copied();
                        observe_log_lines(obs, svc.container_id.as_deref(), Some(svc.name.as_str()), pid, &svc.recent_logs);
                    }
                })
                .build(),
        );
    }

    gauges
}

/// Emits one observation per log line, each made unique within this
/// collection cycle by the `message_hash` attribute (spec.md §4.6
/// "`catops.log`" — otherwise the SDK would collapse observations that
/// share an attribute key-set). Carries `level` and `pid` through from
/// the structured [`catops_core::model::ParsedLogEntry`] and the
/// service's own pid, per spec.md §4.6's attribute list (`source, level,
/// message, container_id, service, message_hash, pid`).
fn observe_log_lines(
    obs: &dyn opentelemetry::metrics::Observer<f64>,
    container_id: Option<&str>,
    service: Option<&str>,
    pid: Option<u32>,
    entries: &[catops_core::model::ParsedLogEntry],
) {
    for entry in entries {
        let source = container_id.unwrap_or_else(|| service.unwrap_or(""));
        let message = entry.message.as_deref().unwrap_or(&entry.raw);
        let hash = fnv1a_16hex(&format!("{source}{}", entry.raw));
        let level = entry.level.map(|l| l.as_str()).unwrap_or("INFO");
        obs.observe(
            1.0,
            &[
                KeyValue::new("source", source.to_string()),
                KeyValue::new("level", level),
                KeyValue::new("message", message.to_string()),
                KeyValue::new("container_id", container_id.unwrap_or_default().to_string()),
                KeyValue::new("service", service.unwrap_or_default().to_string()),
                KeyValue::new("message_hash", hash),
                KeyValue::new("pid", pid.map(|p| p as i64).unwrap_or(-1)),
            ],
        );
    }
}

