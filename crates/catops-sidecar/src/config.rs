//! Command-line/environment configuration for the sidecar (spec.md §6).

use std::time::Duration;

use clap::Parser;

use crate::error::ConfigError;

const DEFAULT_COLLECTION_INTERVAL_SECS: u64 = 30;
const MIN_COLLECTION_INTERVAL_SECS: u64 = 10;
const MAX_COLLECTION_INTERVAL_SECS: u64 = 300;
const DEFAULT_NAMESPACE: &str = "default";

/// CLI arguments, each with an environment-variable fallback matching
/// spec.md §6's configuration table.
#[derive(Parser, Debug)]
#[command(name = "catops-sidecar", version, about = "Per-node Kubernetes telemetry sidecar")]
pub struct Args {
    /// Sample tick interval in seconds (clamped to 10..=300).
    #[arg(long, env = "COLLECTION_INTERVAL")]
    pub interval: Option<u64>,

    /// Base URL for the HTTP Sender endpoints.
    #[arg(long, env = "BACKEND_URL", default_value = "https://api.catops.io")]
    pub backend_url: String,

    /// Bearer-equivalent user token.
    #[arg(long, env = "AUTH_TOKEN")]
    pub auth_token: Option<String>,

    /// This node's name, used to select pods assigned to it and for
    /// leader election (spec.md §4.9).
    #[arg(long, env = "NODE_NAME")]
    pub node_name: Option<String>,

    /// Namespace to enumerate pods in.
    #[arg(long, env = "NAMESPACE", default_value = DEFAULT_NAMESPACE)]
    pub namespace: String,

    /// Optional Prometheus-compatible endpoint for label/owner/age
    /// enrichment.
    #[arg(long, env = "PROMETHEUS_URL")]
    pub prometheus_url: Option<String>,

    /// Increase log verbosity (-v debug, -vv trace).
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Only log warnings and errors.
    #[arg(short, long)]
    pub quiet: bool,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub collection_interval: Duration,
    pub backend_url: String,
    pub auth_token: String,
    pub node_name: String,
    pub namespace: String,
    pub prometheus_url: Option<String>,
}

impl Config {
    pub fn from_args(args: &Args) -> Result<Self, ConfigError> {
        let requested_interval = args.interval.unwrap_or(DEFAULT_COLLECTION_INTERVAL_SECS);
        let collection_interval_secs =
            requested_interval.clamp(MIN_COLLECTION_INTERVAL_SECS, MAX_COLLECTION_INTERVAL_SECS);

        let node_name = args.node_name.clone().filter(|s| !s.is_empty()).ok_or(ConfigError::MissingRequired("NODE_NAME"))?;
        let auth_token = args.auth_token.clone().filter(|s| !s.is_empty()).ok_or(ConfigError::MissingRequired("AUTH_TOKEN"))?;

        Ok(Config {
            collection_interval: Duration::from_secs(collection_interval_secs),
            backend_url: args.backend_url.trim_end_matches('/').to_string(),
            auth_token,
            node_name,
            namespace: args.namespace.clone(),
            prometheus_url: args.prometheus_url.clone().filter(|s| !s.is_empty()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_args() -> Args {
        Args {
            interval: None,
            backend_url: "https://api.catops.io".to_string(),
            auth_token: Some("tok".to_string()),
            node_name: Some("node-a".to_string()),
            namespace: DEFAULT_NAMESPACE.to_string(),
            prometheus_url: None,
            verbose: 0,
            quiet: false,
        }
    }

    #[test]
    fn missing_node_name_is_an_error() {
        let mut args = base_args();
        args.node_name = None;
        assert!(matches!(Config::from_args(&args), Err(ConfigError::MissingRequired("NODE_NAME"))));
    }

    #[test]
    fn missing_auth_token_is_an_error() {
        let mut args = base_args();
        args.auth_token = None;
        assert!(matches!(Config::from_args(&args), Err(ConfigError::MissingRequired("AUTH_TOKEN"))));
    }

    #[test]
    fn interval_clamps_to_bounds() {
        let mut args = base_args();
        args.interval = Some(1);
        assert_eq!(Config::from_args(&args).unwrap().collection_interval, Duration::from_secs(MIN_COLLECTION_INTERVAL_SECS));

        args.interval = Some(10_000);
        assert_eq!(Config::from_args(&args).unwrap().collection_interval, Duration::from_secs(MAX_COLLECTION_INTERVAL_SECS));
    }

    #[test]
    fn default_namespace_is_default() {
        let args = base_args();
        assert_eq!(Config::from_args(&args).unwrap().namespace, "default");
    }
}
