//! Running container-runtime instances, rebuilt fully each log-collection
//! cycle (spec.md §3 "Container inventory").

use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Serialize, Deserialize, Debug, PartialEq, Eq, Hash)]
pub enum ContainerRuntime {
    Docker,
    Containerd,
    Podman,
}

impl ContainerRuntime {
    pub fn as_str(&self) -> &'static str {
        match self {
            ContainerRuntime::Docker => "docker",
            ContainerRuntime::Containerd => "containerd",
            ContainerRuntime::Podman => "podman",
        }
    }
}

#[derive(Clone, Serialize, Deserialize, Debug, PartialEq)]
pub struct ContainerInfo {
    pub id: String,
    pub name: String,
    pub image: String,
    pub runtime: ContainerRuntime,
    pub status: String,
    pub health: Option<String>,
    pub started_at_unix: Option<i64>,
    pub main_pid: Option<u32>,
    pub cpu_percent: Option<f64>,
    pub memory_usage_bytes: Option<u64>,
}
