//! catops-core — shared sampling, ring-buffer timeseries and log-parsing
//! library for the catops host agent.
//!
//! Provides:
//! - `model` — the per-tick data model ([`model::Snapshot`] and friends)
//! - `collector` — sample providers reading `/proc`, container runtimes and
//!   supervised-application log sources, merged into a `Snapshot`
//! - `timeseries` — fixed-capacity ring buffer with windowed statistics and
//!   spike classification
//! - `cache` — the single-writer/many-reader snapshot cache with
//!   delta-suppression
//! - `alert` — alert fingerprinting and the alert lifecycle sum types
//! - `util` — small helpers (content hashing)
//!
//! Networking (OTLP export, HTTP batch sending) lives in the `catops-agentd`
//! and `catops-sidecar` binaries, not here.

pub mod alert;
pub mod cache;
pub mod collector;
pub mod model;
pub mod timeseries;
pub mod util;
