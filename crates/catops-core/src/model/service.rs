//! Detected service records (spec.md §4.1 "Service detection").

use serde::{Deserialize, Serialize};

use super::log::ParsedLogEntry;

/// Closed enumeration of service kinds the name-table classifier recognizes.
/// Framework refinement (flask/django/..., next.js/..., spring-boot/...) is
/// carried separately as a free-form `framework` tag rather than further
/// variants, since the substring rules keep growing.
#[derive(Clone, Copy, Serialize, Deserialize, Debug, PartialEq, Eq, Hash)]
pub enum ServiceType {
    WebServer,
    Database,
    Cache,
    MessageQueue,
    Runtime,
    ContainerRuntime,
    Orchestrator,
    Other,
}

impl ServiceType {
    /// Human-readable "Kind" used in the synthesized service name, e.g.
    /// `"Database"` in `"Database postgres (port 5432)"`.
    pub fn label(&self) -> &'static str {
        match self {
            ServiceType::WebServer => "Web Server",
            ServiceType::Database => "Database",
            ServiceType::Cache => "Cache",
            ServiceType::MessageQueue => "Message Queue",
            ServiceType::Runtime => "Runtime",
            ServiceType::ContainerRuntime => "Container Runtime",
            ServiceType::Orchestrator => "Orchestrator",
            ServiceType::Other => "Service",
        }
    }
}

/// One detected service instance, synthesized from the process table by
/// joining against the per-cycle TCP connection cache for listening ports.
#[derive(Clone, Serialize, Deserialize, Debug, PartialEq)]
pub struct ServiceInfo {
    pub service_type: ServiceType,
    /// Synthesized as `"<Kind> <framework?> (port <n>)?"`.
    pub name: String,
    pub framework: Option<String>,
    pub pids: Vec<u32>,
    pub ports: Vec<u16>,
    pub container_id: Option<String>,
    /// Parsed, deduplicated, "interesting" lines tailed from this
    /// service's log source, kept structured (not collapsed to bare
    /// strings) so level/pid survive to the `catops.log` gauge
    /// (spec.md §4.6).
    pub recent_logs: Vec<ParsedLogEntry>,
    pub log_source: Option<String>,
}
