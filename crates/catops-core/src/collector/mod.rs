//! Sample collection from Linux `/proc`, container runtimes and supervised
//! application log sources.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                          Collector                           │
//! │  ┌────────────────────┐   ┌─────────────────────────────┐    │
//! │  │  ProcessCollector   │   │      SystemCollector        │    │
//! │  │  - /proc/[pid]/*    │   │  - /proc/meminfo, /stat     │    │
//! │  └──────────┬──────────┘   │  - /proc/net/dev, diskstats │    │
//! │             │              └──────────────┬──────────────┘   │
//! │             └──────────────┬──────────────┘                  │
//! │                            │                                 │
//! │                     ┌──────▼──────┐                          │
//! │                     │  FileSystem │ (trait)                  │
//! │                     └──────┬──────┘                          │
//! └────────────────────────────┼─────────────────────────────────┘
//!                              │
//!              ┌───────────────┼───────────────┐
//!              │               │               │
//!       ┌──────▼──────┐ ┌──────▼──────┐ ┌──────▼──────┐
//!       │   RealFs    │ │   MockFs    │ │  Scenarios  │
//!       │ (Linux)     │ │ (Testing)   │ │ (Fixtures)  │
//!       └─────────────┘ └─────────────┘ └─────────────┘
//! ```
//!
//! ## Testing (with MockFs)
//!
//! ```
//! use catops_core::collector::mock::MockFs;
//! use catops_core::collector::procfs::ProcessCollector;
//!
//! let fs = MockFs::typical_system();
//! let mut collector = ProcessCollector::new(fs, "/proc");
//! ```

#[allow(clippy::module_inception)]
mod collector;
pub mod containers;
pub mod log_collector;
pub mod mock;
pub mod procfs;
pub mod services;
pub mod traits;

pub use collector::{Collector, TOP_K_PROCESSES};
pub use mock::MockFs;
pub use procfs::UserResolver;
pub use traits::{FileSystem, RealFs};
