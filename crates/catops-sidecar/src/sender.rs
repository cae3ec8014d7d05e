//! HTTP sender for the sidecar's one endpoint (spec.md §6:
//! `/api/kubernetes/metrics` — "combined payload `{timestamp, node_name,
//! namespace, node_metrics, pods[], cluster?, user_token}`"). Same
//! fire-and-forget, bounded-timeout shape as `catops-agentd`'s sender
//! (C7), scoped down to the single payload this variant emits.

use std::time::Duration;

use chrono::{DateTime, Utc};
use reqwest::Client;
use serde::Serialize;
use tracing::warn;

use catops_core::model::{CpuUsage, MemorySummary};

use crate::aggregator::ClusterAggregate;
use crate::config::Config;
use crate::k8s::PodSample;

const SENDER_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Serialize)]
struct NodeMetrics {
    cpu: CpuUsage,
    memory: MemorySummary,
}

#[derive(Debug, Serialize)]
struct KubernetesMetricsPayload {
    timestamp: DateTime<Utc>,
    node_name: String,
    namespace: String,
    node_metrics: NodeMetrics,
    pods: Vec<PodSample>,
    #[serde(skip_serializing_if = "Option::is_none")]
    cluster: Option<ClusterAggregate>,
    user_token: String,
}

pub struct Sender {
    client: Client,
    backend_url: String,
    auth_token: String,
}

impl Sender {
    pub fn new(config: &Config) -> Self {
        let client = Client::builder()
            .timeout(SENDER_TIMEOUT)
            .user_agent(concat!("catops-sidecar/", env!("CARGO_PKG_VERSION")))
            .build()
            .expect("reqwest client config is static and always valid");

        Sender { client, backend_url: config.backend_url.clone(), auth_token: config.auth_token.clone() }
    }

    /// Posts the combined per-tick payload. Fire-and-forget, matching
    /// the agent's "nothing is retried automatically at the HTTP sender
    /// layer" rule (spec.md §5) — a failed send is logged and dropped.
    #[allow(clippy::too_many_arguments)]
    pub fn send_kubernetes_metrics(
        &self,
        now: DateTime<Utc>,
        node_name: String,
        namespace: String,
        cpu: CpuUsage,
        memory: MemorySummary,
        pods: Vec<PodSample>,
        cluster: Option<ClusterAggregate>,
    ) {
        let payload = KubernetesMetricsPayload {
            timestamp: now,
            node_name,
            namespace,
            node_metrics: NodeMetrics { cpu, memory },
            pods,
            cluster,
            user_token: self.auth_token.clone(),
        };

        let client = self.client.clone();
        let url = format!("{}/api/kubernetes/metrics", self.backend_url);
        let auth_token = self.auth_token.clone();

        tokio::spawn(async move {
            let result = client
                .post(&url)
                .bearer_auth(&auth_token)
                .header("X-Platform", "kubernetes")
                .header("X-Version", env!("CARGO_PKG_VERSION"))
                .json(&payload)
                .send()
                .await;

            match result {
                Ok(resp) if !resp.status().is_success() => {
                    warn!("kubernetes metrics post to {url} returned {}", resp.status());
                }
                Err(e) => warn!("kubernetes metrics post to {url} failed: {e}"),
                Ok(_) => {}
            }
        });
    }
}
