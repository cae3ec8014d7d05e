//! Cluster-API pod enumeration and metrics-store enrichment (spec.md
//! §4.9 "Kubernetes Sampler Variant").

use k8s_openapi::api::core::v1::Pod;
use kube::api::{Api, ApiResource, DynamicObject, ListParams};
use kube::{Client, ResourceExt};
use serde::Serialize;

use crate::error::K8sError;

/// One pod assigned to this node, with whatever enrichment was
/// available. CPU/memory come from the cluster metrics store when
/// reachable; labels/owner/image/age are always derived from the Pod
/// object itself (spec.md §4.9: "when an auxiliary metrics endpoint is
/// available, enriches with labels, owner kind/name, container image
/// list, and pod age").
#[derive(Debug, Clone, Serialize)]
pub struct PodSample {
    pub name: String,
    pub namespace: String,
    pub labels: std::collections::BTreeMap<String, String>,
    pub owner_kind: Option<String>,
    pub owner_name: Option<String>,
    pub images: Vec<String>,
    pub age_secs: Option<i64>,
    pub cpu_millicores: Option<i64>,
    pub memory_bytes: Option<i64>,
}

/// Lists pods in `namespace` whose `spec.nodeName` matches `node_name`.
/// A cluster-API failure is absorbed the same way a host provider
/// failure is (spec.md §7.3): logged by the caller, empty list returned.
pub async fn list_node_pods(client: &Client, namespace: &str, node_name: &str) -> Result<Vec<PodSample>, K8sError> {
    let pods: Api<Pod> = Api::namespaced(client.clone(), namespace);
    let lp = ListParams::default().fields(&format!("spec.nodeName={node_name}"));
    let list = pods.list(&lp).await.map_err(|e| K8sError::Client(e.to_string()))?;

    Ok(list.items.iter().map(pod_to_sample).collect())
}

fn pod_to_sample(pod: &Pod) -> PodSample {
    let name = pod.name_any();
    let namespace = pod.namespace().unwrap_or_default();
    let labels = pod.labels().iter().map(|(k, v)| (k.clone(), v.clone())).collect();

    let owner = pod.owner_references().and_then(|refs| refs.first());
    let owner_kind = owner.map(|o| o.kind.clone());
    let owner_name = owner.map(|o| o.name.clone());

    let images = pod
        .spec
        .as_ref()
        .map(|spec| spec.containers.iter().filter_map(|c| c.image.clone()).collect())
        .unwrap_or_default();

    let age_secs = pod
        .metadata
        .creation_timestamp
        .as_ref()
        .map(|t| (chrono::Utc::now() - t.0).num_seconds());

    PodSample {
        name,
        namespace,
        labels,
        owner_kind,
        owner_name,
        images,
        age_secs,
        cpu_millicores: None,
        memory_bytes: None,
    }
}

/// Queries `metrics.k8s.io/v1beta1` `PodMetrics` (the metrics-server
/// aggregated API) and merges CPU/memory usage into `samples` by pod
/// name. `metrics.k8s.io` has no generated types in `k8s-openapi`
/// (it's a metrics-server CRD, not a core API group), so this goes
/// through `kube`'s dynamic object API.
pub async fn enrich_with_metrics_store(client: &Client, namespace: &str, samples: &mut [PodSample]) -> Result<(), K8sError> {
    let ar = ApiResource::from_gvk(&kube::core::GroupVersionKind::gvk("metrics.k8s.io", "v1beta1", "PodMetrics"));
    let api: Api<DynamicObject> = Api::namespaced_with(client.clone(), namespace, &ar);

    let list = api.list(&ListParams::default()).await.map_err(|e| K8sError::MetricsUnavailable(e.to_string()))?;

    for item in &list.items {
        let Some(name) = item.metadata.name.as_deref() else { continue };
        let Some(sample) = samples.iter_mut().find(|s| s.name == name) else { continue };

        let Some(containers) = item.data.get("containers").and_then(|v| v.as_array()) else { continue };
        let mut total_cpu_nanos: i64 = 0;
        let mut total_mem_bytes: i64 = 0;
        for container in containers {
            if let Some(cpu) = container.pointer("/usage/cpu").and_then(|v| v.as_str()) {
                total_cpu_nanos += parse_cpu_quantity(cpu);
            }
            if let Some(mem) = container.pointer("/usage/memory").and_then(|v| v.as_str()) {
                total_mem_bytes += parse_memory_quantity(mem);
            }
        }
        sample.cpu_millicores = Some(total_cpu_nanos / 1_000_000);
        sample.memory_bytes = Some(total_mem_bytes);
    }

    Ok(())
}

/// Parses a Kubernetes CPU resource quantity (`"123n"`, `"5m"`, `"2"`)
/// into nanocores. Unrecognized suffixes return 0 rather than erroring —
/// this is enrichment, not a required field.
fn parse_cpu_quantity(raw: &str) -> i64 {
    if let Some(n) = raw.strip_suffix('n') {
        n.parse().unwrap_or(0)
    } else if let Some(m) = raw.strip_suffix('m') {
        m.parse::<i64>().unwrap_or(0) * 1_000_000
    } else {
        raw.parse::<f64>().map(|cores| (cores * 1_000_000_000.0) as i64).unwrap_or(0)
    }
}

/// Parses a Kubernetes memory resource quantity (`"128974848"`,
/// `"512Ki"`, `"1Gi"`) into bytes.
fn parse_memory_quantity(raw: &str) -> i64 {
    const UNITS: &[(&str, i64)] = &[
        ("Ki", 1024),
        ("Mi", 1024 * 1024),
        ("Gi", 1024 * 1024 * 1024),
        ("Ti", 1024_i64.pow(4)),
        ("K", 1000),
        ("M", 1_000_000),
        ("G", 1_000_000_000),
    ];
    for (suffix, multiplier) in UNITS {
        if let Some(n) = raw.strip_suffix(suffix) {
            return n.parse::<i64>().unwrap_or(0) * multiplier;
        }
    }
    raw.parse().unwrap_or(0)
}

/// Lists all node names in the cluster, for leader election (spec.md
/// §4.9: "the node whose name is lexicographically smallest").
pub async fn list_node_names(client: &Client) -> Result<Vec<String>, K8sError> {
    use k8s_openapi::api::core::v1::Node;
    let nodes: Api<Node> = Api::all(client.clone());
    let list = nodes.list(&ListParams::default()).await.map_err(|e| K8sError::Client(e.to_string()))?;
    Ok(list.items.iter().map(|n| n.name_any()).collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cpu_quantity_parses_nano_milli_and_core_suffixes() {
        assert_eq!(parse_cpu_quantity("500000000n"), 500_000_000);
        assert_eq!(parse_cpu_quantity("250m"), 250_000_000);
        assert_eq!(parse_cpu_quantity("2"), 2_000_000_000);
    }

    #[test]
    fn memory_quantity_parses_binary_and_decimal_suffixes() {
        assert_eq!(parse_memory_quantity("512Ki"), 512 * 1024);
        assert_eq!(parse_memory_quantity("1Gi"), 1024 * 1024 * 1024);
        assert_eq!(parse_memory_quantity("1000000"), 1_000_000);
    }

    #[test]
    fn unrecognized_quantity_suffix_yields_zero_not_a_panic() {
        assert_eq!(parse_cpu_quantity("???"), 0);
        assert_eq!(parse_memory_quantity("???"), 0);
    }
}
