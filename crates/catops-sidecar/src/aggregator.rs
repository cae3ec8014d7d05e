//! Leader election and cluster-wide aggregation (spec.md §4.9: "computed
//! by one node at a time (the node whose name is lexicographically
//! smallest), to avoid duplicate writes; until proper leader election is
//! added, the single-writer guarantee is enforced server-side by
//! deduplication").
//!
//! This is deliberately the cheapest thing that satisfies that sentence:
//! a pure comparison against the current node list, re-evaluated every
//! tick. No lease object, no lock — the backend is the source of truth
//! for "only the smallest name's writes count" (see DESIGN.md, Open
//! Question on leader election).

use std::collections::BTreeMap;

use k8s_openapi::api::core::v1::Pod;
use kube::api::{Api, ListParams};
use kube::{Client, ResourceExt};
use serde::Serialize;

use crate::error::K8sError;

/// True if `own_node_name` sorts first among `all_node_names`. An empty
/// node list never elects a leader — there's nothing to aggregate over.
pub fn is_leader(own_node_name: &str, all_node_names: &[String]) -> bool {
    all_node_names.iter().min().is_some_and(|smallest| smallest == own_node_name)
}

#[derive(Debug, Clone, Serialize)]
pub struct ClusterAggregate {
    pub total_nodes: usize,
    pub total_pods: usize,
    pub pods_by_namespace: BTreeMap<String, usize>,
    pub pods_by_phase: BTreeMap<String, usize>,
}

/// Cluster-wide pod tally across all namespaces. Only called by the
/// elected leader (spec.md §4.9).
pub async fn build_cluster_aggregate(client: &Client, node_count: usize) -> Result<ClusterAggregate, K8sError> {
    let pods: Api<Pod> = Api::all(client.clone());
    let list = pods.list(&ListParams::default()).await.map_err(|e| K8sError::Client(e.to_string()))?;

    let mut pods_by_namespace: BTreeMap<String, usize> = BTreeMap::new();
    let mut pods_by_phase: BTreeMap<String, usize> = BTreeMap::new();

    for pod in &list.items {
        *pods_by_namespace.entry(pod.namespace().unwrap_or_default()).or_insert(0) += 1;
        let phase = pod.status.as_ref().and_then(|s| s.phase.clone()).unwrap_or_else(|| "Unknown".to_string());
        *pods_by_phase.entry(phase).or_insert(0) += 1;
    }

    Ok(ClusterAggregate {
        total_nodes: node_count,
        total_pods: list.items.len(),
        pods_by_namespace,
        pods_by_phase,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn smallest_name_is_leader() {
        let nodes = vec!["node-b".to_string(), "node-a".to_string(), "node-c".to_string()];
        assert!(is_leader("node-a", &nodes));
        assert!(!is_leader("node-b", &nodes));
    }

    #[test]
    fn empty_node_list_elects_nobody() {
        assert!(!is_leader("node-a", &[]));
    }

    #[test]
    fn sole_node_is_always_leader() {
        assert!(is_leader("only-node", &["only-node".to_string()]));
    }
}
