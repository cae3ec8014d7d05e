//! Agent Supervisor (spec.md §4.8 "Agent Supervisor (C8)").
//!
//! Owns the sample tick, the health tick, the exporter recovery FSM, and
//! the startup/shutdown sequence. A single failed provider is absorbed
//! by [`catops_core::collector::Collector`] itself; everything this
//! module does with the result is either publish it, derive alerts from
//! it, or log and move on (spec.md §7 "Nothing crashes the agent from a
//! remote response code").

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tracing::{debug, error, info, warn};

use catops_core::alert::{self, Alert, SubType};
use catops_core::cache::SnapshotCache;
use catops_core::collector::Collector;
use catops_core::collector::log_collector::LogCollector;
#[cfg(target_os = "linux")]
use catops_core::collector::RealFs;
#[cfg(not(target_os = "linux"))]
use catops_core::collector::MockFs;
use catops_core::model::Snapshot;
use catops_core::timeseries::{
    DEFAULT_CAPACITY, DEFAULT_GRADUAL_THRESHOLD_PERCENT, DEFAULT_SUDDEN_THRESHOLD_PERCENT,
    DEFAULT_WINDOW_SECS, DEFAULT_Z_THRESHOLD, RingBuffer,
};

use crate::config::Config;
use crate::http_sender::{EventType, HttpSender};
use crate::log_attach;
use crate::otlp::Exporter;

/// Health tick cadence (spec.md §4.8).
const HEALTH_TICK_INTERVAL: Duration = Duration::from_secs(5 * 60);
/// Consecutive health-check failures that trigger exporter recovery
/// (spec.md §4.8).
const MAX_CONSECUTIVE_FAILURES: u32 = 3;
/// Pause between stopping and restarting the exporter during recovery.
const RECOVERY_PAUSE: Duration = Duration::from_secs(5);
/// Deadline for the exporter shutdown step of the shutdown sequence.
const SHUTDOWN_DEADLINE: Duration = Duration::from_secs(5);

/// The three resources the ring-buffer spike detector watches, matching
/// the gauges most likely to page someone (spec.md §4.2 feeding §4.7's
/// alert lifecycle).
const WATCHED_METRICS: &[&str] = &["cpu.usage", "memory.usage", "disk.usage"];

#[cfg(target_os = "linux")]
type HostFs = RealFs;
#[cfg(not(target_os = "linux"))]
type HostFs = MockFs;

fn host_fs() -> HostFs {
    #[cfg(target_os = "linux")]
    {
        RealFs
    }
    #[cfg(not(target_os = "linux"))]
    {
        MockFs::typical_system()
    }
}

/// Owns every piece of per-process state the Supervisor's loop touches:
/// the sample collector, the snapshot cache, the ring buffers behind
/// spike detection, the log collector, and the outbound senders.
pub struct Supervisor {
    config: Config,
    collector: Collector<HostFs>,
    cache: Arc<SnapshotCache>,
    log_collector: LogCollector,
    sender: HttpSender,
    exporter: Option<Exporter>,
    timeseries: HashMap<&'static str, RingBuffer>,
    active_alerts: std::collections::HashSet<String>,
    health_failures: u32,
    tick_count: u64,
}

impl Supervisor {
    /// Startup sequence (spec.md §4.8): build the cache, start the
    /// exporter (if cloud mode is enabled), sample once and flush, send
    /// `service_start`.
    pub async fn start(config: Config) -> Self {
        let cache = Arc::new(if config.suppress_unchanged { SnapshotCache::new() } else { SnapshotCache::without_suppression() });

        let mut collector = Collector::new(host_fs(), "/proc");
        collector.refresh_users();

        let sender = HttpSender::new(&config);

        let exporter = if config.cloud {
            match Exporter::new(&config, cache.clone()) {
                Ok(exporter) => {
                    info!("otlp exporter started, target {}", config.otlp_url());
                    Some(exporter)
                }
                Err(e) => {
                    error!("otlp exporter failed to start: {e}");
                    None
                }
            }
        } else {
            info!("running in local mode, no remote export");
            None
        };

        let timeseries = WATCHED_METRICS.iter().map(|name| (*name, RingBuffer::new(DEFAULT_CAPACITY))).collect();

        let mut supervisor = Supervisor {
            config,
            collector,
            cache,
            log_collector: LogCollector::new(),
            sender,
            exporter,
            timeseries,
            active_alerts: std::collections::HashSet::new(),
            health_failures: 0,
            tick_count: 0,
        };

        // One eager sample + flush so dashboards populate instantly
        // (spec.md §4.8 "Startup sequence").
        supervisor.run_sample_tick();
        if let Some(exporter) = &supervisor.exporter
            && let Err(e) = exporter.force_flush()
        {
            warn!("initial flush failed: {e}");
        }

        supervisor.sender.send_event(Utc::now(), EventType::ServiceStart, None, None, "agent started", "info");

        supervisor
    }

    /// Runs the main ticker loop until a shutdown signal arrives.
    pub async fn run(mut self) {
        let mut sample_ticker = tokio::time::interval(self.config.collection_interval);
        sample_ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        let mut health_ticker = tokio::time::interval(HEALTH_TICK_INTERVAL);
        health_ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        // The first tick of an interval fires immediately; skip it since
        // `start()` already ran one eager sample.
        sample_ticker.tick().await;
        health_ticker.tick().await;

        loop {
            tokio::select! {
                _ = sample_ticker.tick() => {
                    self.run_sample_tick();
                }
                _ = health_ticker.tick() => {
                    self.run_health_tick().await;
                }
                _ = shutdown_signal() => {
                    break;
                }
            }
        }

        self.shutdown().await;
    }

    /// One sample tick: collect, attach logs, evaluate spikes, publish,
    /// send the HTTP batches (spec.md §4.8 "Sample tick").
    fn run_sample_tick(&mut self) {
        let started = std::time::Instant::now();
        self.tick_count += 1;

        let mut snapshot = self.collector.collect_snapshot();
        log_attach::attach_logs(&mut snapshot, &mut self.log_collector, snapshot.timestamp);

        self.evaluate_spikes(&snapshot);

        let published = self.cache.publish(snapshot.clone());
        if published {
            self.send_http_batches(&snapshot);
        }

        debug!(
            "tick #{}: published={} duration={:?} processes={} services={} containers={}",
            self.tick_count,
            published,
            started.elapsed(),
            snapshot.processes.len(),
            snapshot.services.len(),
            snapshot.containers.len(),
        );

        // Mirrors rpglotd's "memory stats every 60 snapshots" cadence
        // (SPEC_FULL.md "Collector timing").
        if self.tick_count.is_multiple_of(60) {
            info!("collector timing: {} ticks completed, last tick {:?}", self.tick_count, started.elapsed());
        }
    }

    /// Inserts the tick's watched metrics into their ring buffers,
    /// classifies spikes, and drives the alert lifecycle sub-protocol
    /// (spec.md §4.2, §4.7).
    fn evaluate_spikes(&mut self, snapshot: &Snapshot) {
        let values: [(&'static str, f64); 3] = [
            ("cpu.usage", snapshot.summary.cpu.usage),
            ("memory.usage", snapshot.summary.memory.usage_percent),
            ("disk.usage", snapshot.summary.disk.usage_percent),
        ];

        let mut still_active: std::collections::HashSet<String> = std::collections::HashSet::new();

        for (metric_name, value) in values {
            let buffer = self.timeseries.get_mut(metric_name).expect("all watched metrics are pre-registered");
            buffer.insert(snapshot.timestamp, value);

            let spike = buffer.detect_spike(
                snapshot.timestamp,
                DEFAULT_WINDOW_SECS,
                DEFAULT_SUDDEN_THRESHOLD_PERCENT,
                DEFAULT_GRADUAL_THRESHOLD_PERCENT,
                DEFAULT_Z_THRESHOLD,
            );

            let flags_and_thresholds = [
                (spike.sudden, SubType::Sudden, DEFAULT_SUDDEN_THRESHOLD_PERCENT),
                (spike.gradual, SubType::Gradual, DEFAULT_GRADUAL_THRESHOLD_PERCENT),
                (spike.anomalous, SubType::Anomalous, DEFAULT_Z_THRESHOLD),
            ];
            for (flag, subtype, threshold) in flags_and_thresholds {
                if !flag {
                    continue;
                }
                let fingerprint = alert::fingerprint(self.server_id(), metric_name, subtype);
                still_active.insert(fingerprint.clone());

                let alert: Alert = alert::build_alert(self.server_id(), metric_name, subtype, value, threshold);
                if self.active_alerts.contains(&fingerprint) {
                    self.sender.heartbeat_alert(&fingerprint);
                } else {
                    self.sender.process_alert(&alert);
                }
            }
        }

        for fingerprint in self.active_alerts.difference(&still_active) {
            self.sender.resolve_alert(fingerprint);
        }
        self.active_alerts = still_active;
    }

    fn send_http_batches(&self, snapshot: &Snapshot) {
        let now = Utc::now();
        self.sender.send_metrics(crate::http_sender::summary_metrics(now, self.server_id(), &snapshot.summary));
        self.sender.send_processes(now, &snapshot.processes, snapshot.summary.processes);
        self.sender.send_network(
            now,
            snapshot.summary.network.connections,
            snapshot.summary.network.rx_bytes_per_sec,
            snapshot.summary.network.tx_bytes_per_sec,
        );
    }

    fn server_id(&self) -> &str {
        self.config.server_id_or_local()
    }

    /// Health tick (spec.md §4.8): checks the exporter, drives the
    /// recovery FSM after [`MAX_CONSECUTIVE_FAILURES`], and sweeps the
    /// log dedup table.
    async fn run_health_tick(&mut self) {
        log_attach::evict_expired_dedup_entries(Utc::now().timestamp());
        crate::release_memory_to_os();

        let Some(exporter) = &self.exporter else { return };
        let healthy = exporter.health_check();

        match health_fsm_step(self.health_failures, healthy, MAX_CONSECUTIVE_FAILURES) {
            HealthAction::Ok => self.health_failures = 0,
            HealthAction::KeepCounting(n) => {
                self.health_failures = n;
                warn!("otlp health check failed ({n}/{MAX_CONSECUTIVE_FAILURES} consecutive)");
            }
            HealthAction::Restart => {
                info!("restarting otlp exporter after {} consecutive health-check failures", self.health_failures);
                let old = self.exporter.take().expect("checked above");
                old.shutdown(SHUTDOWN_DEADLINE);
                tokio::time::sleep(RECOVERY_PAUSE).await;

                match Exporter::new(&self.config, self.cache.clone()) {
                    Ok(new_exporter) => {
                        if let Err(e) = new_exporter.force_flush() {
                            warn!("post-restart flush failed: {e}");
                        }
                        self.exporter = Some(new_exporter);
                        self.health_failures = 0;
                        info!("otlp exporter restarted");
                    }
                    Err(e) => {
                        error!("otlp exporter restart failed: {e}");
                    }
                }
            }
        }
    }

    /// Shutdown sequence (spec.md §4.8): stop sampling (implicit — the
    /// loop already exited), send `service_stop` synchronously, shut the
    /// exporter down with a bounded deadline.
    async fn shutdown(self) {
        info!("shutting down");
        self.sender.send_event(Utc::now(), EventType::ServiceStop, None, None, "agent stopping", "info");
        // The sender is fire-and-forget; give the spawned task a moment
        // to actually leave the process before the exporter (and runtime)
        // tear down.
        tokio::time::sleep(Duration::from_millis(200)).await;

        if let Some(exporter) = self.exporter {
            exporter.shutdown(SHUTDOWN_DEADLINE);
        }
        info!("shutdown complete");
    }
}

/// What [`Supervisor::run_health_tick`] should do next, given the previous
/// failure count and this tick's health-check result (spec.md §4.8, §8
/// scenario 7). Pulled out as a pure function so the counting/reset logic
/// is testable without standing up a real OTLP exporter.
#[derive(Debug, PartialEq, Eq)]
enum HealthAction {
    /// The check passed; the counter resets to zero.
    Ok,
    /// The check failed but hasn't hit the threshold yet.
    KeepCounting(u32),
    /// The check failed for the `max`th consecutive time; restart.
    Restart,
}

fn health_fsm_step(failures_so_far: u32, healthy: bool, max_failures: u32) -> HealthAction {
    if healthy {
        return HealthAction::Ok;
    }
    let failures = failures_so_far + 1;
    if failures >= max_failures { HealthAction::Restart } else { HealthAction::KeepCounting(failures) }
}

#[cfg(test)]
mod health_fsm_tests {
    use super::*;

    /// spec.md §8 scenario 7: three consecutive forced-flush failures
    /// trigger a restart; a healthy check resets the counter to 0.
    #[test]
    fn three_consecutive_failures_trigger_restart() {
        assert_eq!(health_fsm_step(0, false, 3), HealthAction::KeepCounting(1));
        assert_eq!(health_fsm_step(1, false, 3), HealthAction::KeepCounting(2));
        assert_eq!(health_fsm_step(2, false, 3), HealthAction::Restart);
    }

    #[test]
    fn a_healthy_check_resets_the_counter() {
        assert_eq!(health_fsm_step(2, true, 3), HealthAction::Ok);
    }

    #[test]
    fn single_failure_below_threshold_does_not_restart() {
        assert_eq!(health_fsm_step(0, false, 3), HealthAction::KeepCounting(1));
    }
}

#[cfg(unix)]
async fn shutdown_signal() {
    use tokio::signal::unix::{SignalKind, signal};
    let mut sigterm = signal(SignalKind::terminate()).expect("failed to install SIGTERM handler");
    tokio::select! {
        _ = tokio::signal::ctrl_c() => {}
        _ = sigterm.recv() => {}
    }
}

#[cfg(not(unix))]
async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
}
