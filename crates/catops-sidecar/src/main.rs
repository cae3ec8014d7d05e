//! catops-sidecar — per-node Kubernetes telemetry sidecar (spec.md §4.9
//! "Kubernetes Sampler Variant (C9)").
//!
//! Reuses `catops-core`'s host sampler unchanged for the per-node
//! snapshot, enumerates pods assigned to `NODE_NAME` via the cluster API,
//! optionally enriches them from the metrics store, and — on the node
//! whose name sorts lexicographically smallest — also emits a
//! cluster-wide pod tally. One combined payload per tick goes to
//! `/api/kubernetes/metrics` (spec.md §6).

mod aggregator;
mod config;
mod error;
mod k8s;
mod sender;

use chrono::Utc;
use clap::Parser;
use kube::Client;
use tracing::{Level, error, info, warn};
use tracing_subscriber::EnvFilter;

use catops_core::collector::Collector;
#[cfg(not(target_os = "linux"))]
use catops_core::collector::MockFs;
#[cfg(target_os = "linux")]
use catops_core::collector::RealFs;

use aggregator::{build_cluster_aggregate, is_leader};
use config::{Args, Config};
use sender::Sender;

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

/// Same `-v`/`-vv`/`-q` → `tracing` level mapping as `catops-agentd`'s
/// `main.rs`.
fn init_logging(verbose: u8, quiet: bool) {
    let level = if quiet {
        Level::ERROR
    } else {
        match verbose {
            0 => Level::INFO,
            1 => Level::DEBUG,
            _ => Level::TRACE,
        }
    };

    let filter = EnvFilter::from_default_env()
        .add_directive(format!("catops_sidecar={level}").parse().unwrap())
        .add_directive(format!("catops_core={level}").parse().unwrap());

    tracing_subscriber::fmt().with_env_filter(filter).with_target(false).init();
}

fn main() {
    let args = Args::parse();
    init_logging(args.verbose, args.quiet);

    let config = match Config::from_args(&args) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("catops-sidecar: {e}");
            std::process::exit(1);
        }
    };

    info!("catops-sidecar {} starting, node={}", env!("CARGO_PKG_VERSION"), config.node_name);

    let runtime = match tokio::runtime::Builder::new_multi_thread().enable_all().build() {
        Ok(rt) => rt,
        Err(e) => {
            error!("failed to start tokio runtime: {e}");
            std::process::exit(1);
        }
    };

    let exit_code = runtime.block_on(run(config));
    std::process::exit(exit_code);
}

async fn run(config: Config) -> i32 {
    let client = match Client::try_default().await {
        Ok(client) => client,
        Err(e) => {
            error!("failed to build kubernetes client: {e}");
            return 1;
        }
    };

    let mut collector = Collector::new(host_fs(), "/proc");
    collector.refresh_users();
    let sender = Sender::new(&config);

    let mut ticker = tokio::time::interval(config.collection_interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                run_sample_tick(&config, &client, &mut collector, &sender).await;
            }
            _ = shutdown_signal() => {
                info!("shutting down");
                break;
            }
        }
    }

    0
}

/// One sample tick (spec.md §4.9): sample this node with the unchanged
/// host sampler, enumerate the node's pods, enrich from the metrics store
/// when reachable, fold in the cluster-wide aggregate if this node is the
/// elected leader, and send the combined payload.
async fn run_sample_tick(config: &Config, client: &Client, collector: &mut Collector<HostFs>, sender: &Sender) {
    let snapshot = collector.collect_snapshot();

    let mut pods = match k8s::list_node_pods(client, &config.namespace, &config.node_name).await {
        Ok(pods) => pods,
        Err(e) => {
            warn!("pod enumeration failed: {e}");
            Vec::new()
        }
    };

    if config.prometheus_url.is_some() {
        if let Err(e) = k8s::enrich_with_metrics_store(client, &config.namespace, &mut pods).await {
            warn!("metrics-store enrichment unavailable: {e}");
        }
    }

    let cluster = match k8s::list_node_names(client).await {
        Ok(nodes) if is_leader(&config.node_name, &nodes) => {
            match build_cluster_aggregate(client, nodes.len()).await {
                Ok(aggregate) => Some(aggregate),
                Err(e) => {
                    warn!("cluster aggregate failed: {e}");
                    None
                }
            }
        }
        Ok(_) => None,
        Err(e) => {
            warn!("node enumeration failed: {e}");
            None
        }
    };

    sender.send_kubernetes_metrics(
        Utc::now(),
        config.node_name.clone(),
        config.namespace.clone(),
        snapshot.summary.cpu,
        snapshot.summary.memory,
        pods,
        cluster,
    );
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
