//! catops-agentd — host-level telemetry agent daemon.
//!
//! Samples the host, maintains short-horizon spike-detection state,
//! collects structured logs from collocated services/containers, and
//! exports the result as OTLP/HTTP metric streams plus HTTP batches to a
//! remote backend (spec.md §1-§2).

mod config;
mod error;
mod http_sender;
mod log_attach;
mod otlp;
mod supervisor;

use tikv_jemallocator::Jemalloc;
#[global_allocator]
static GLOBAL: Jemalloc = Jemalloc;

/// Releases unused memory back to the operating system. Invoked once at
/// startup and then after every health tick's dedup-table cleanup
/// ([`supervisor::Supervisor::run_health_tick`]), matching the teacher's
/// post-chunk-flush jemalloc purge (SPEC_FULL.md "jemalloc + memory-purge
/// helper").
fn release_memory_to_os() {
    // SAFETY: `arena.0.purge` takes no arguments and has no output; this
    // is the documented jemalloc mallctl call for returning unused pages.
    unsafe {
        tikv_jemalloc_sys::mallctl(
            c"arena.0.purge".as_ptr().cast(),
            std::ptr::null_mut(),
            std::ptr::null_mut(),
            std::ptr::null_mut(),
            0,
        );
    }
}

use clap::Parser;
use tracing::{Level, error, info};
use tracing_subscriber::EnvFilter;

use config::{Args, Config};
use supervisor::Supervisor;

/// Initializes the tracing subscriber. Default level is INFO; `-v`/`-vv`
/// raise it to DEBUG/TRACE, `-q` lowers it to ERROR only.
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
        .add_directive(format!("catops_agentd={level}").parse().unwrap())
        .add_directive(format!("catops_core={level}").parse().unwrap());

    tracing_subscriber::fmt().with_env_filter(filter).with_target(false).init();
}

fn main() {
    let args = Args::parse();
    init_logging(args.verbose, args.quiet);

    let config = match Config::from_args(&args) {
        Ok(config) => config,
        Err(e) => {
            // Config errors are fatal (spec.md §7.1): exit nonzero before
            // any loop starts.
            eprintln!("catops-agentd: {e}");
            std::process::exit(1);
        }
    };

    info!("catops-agentd {} starting", env!("CARGO_PKG_VERSION"));
    info!(
        "mode={} interval={:?} backend={}",
        if config.cloud { "cloud" } else { "local" },
        config.collection_interval,
        config.backend_url,
    );

    let runtime = match tokio::runtime::Builder::new_multi_thread().enable_all().build() {
        Ok(rt) => rt,
        Err(e) => {
            error!("failed to start tokio runtime: {e}");
            std::process::exit(1);
        }
    };

    runtime.block_on(async move {
        let supervisor = Supervisor::start(config).await;
        release_memory_to_os();
        supervisor.run().await;
    });

    info!("exited cleanly");
}
