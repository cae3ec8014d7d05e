//! Environment-driven configuration (spec.md §6 "Agent configuration").
//!
//! The on-disk config file and its parsing are the named external black
//! box (spec.md §1); this binary only reads environment variables plus
//! `clap`-parsed CLI flags that override them, mirroring `rpglotd`'s
//! `Args` struct.

use std::time::Duration;

use clap::Parser;

use crate::error::ConfigError;

/// Sample-tick interval is clamped into this range regardless of what the
/// environment/CLI asks for (spec.md §4.8 "Sample tick").
pub const MIN_COLLECTION_INTERVAL_SECS: u64 = 10;
pub const MAX_COLLECTION_INTERVAL_SECS: u64 = 300;
const DEFAULT_COLLECTION_INTERVAL_SECS: u64 = 30;

const DEFAULT_OTLP_ENDPOINT: &str = "https://otel.catops.io";
const DEFAULT_OTLP_PATH: &str = "/v1/metrics";
const DEFAULT_BACKEND_URL: &str = "https://api.catops.io";

/// catops-agentd: host-level telemetry agent daemon.
#[derive(Parser, Debug)]
#[command(name = "catops-agentd", about = "Host telemetry agent", version)]
pub struct Args {
    /// Sample tick interval in seconds (clamped to [10, 300]).
    #[arg(short, long, env = "COLLECTION_INTERVAL")]
    pub interval: Option<u64>,

    /// Backend base URL used by the HTTP batch sender.
    #[arg(long, env = "BACKEND_URL")]
    pub backend_url: Option<String>,

    /// Bearer-equivalent user token (required once --cloud is set).
    #[arg(long, env = "AUTH_TOKEN")]
    pub auth_token: Option<String>,

    /// Registered server identity (required once --cloud is set).
    #[arg(long, env = "SERVER_ID")]
    pub server_id: Option<String>,

    /// OTLP/HTTP exporter endpoint base.
    #[arg(long, env = "OTLP_ENDPOINT")]
    pub otlp_endpoint: Option<String>,

    /// OTLP/HTTP exporter path, appended to `otlp_endpoint`.
    #[arg(long, env = "OTLP_PATH")]
    pub otlp_path: Option<String>,

    /// Require AUTH_TOKEN/SERVER_ID and enable remote export. Without this
    /// flag the agent runs locally (sampling and spike detection only, no
    /// outbound traffic) — useful for the `catops-agentd --local` smoke
    /// test path.
    #[arg(long)]
    pub cloud: bool,

    /// Disable the delta-suppression policy on the snapshot cache
    /// (spec.md §4.5); every tick is published and exported.
    #[arg(long)]
    pub no_delta_suppression: bool,

    /// Increase logging verbosity (-v debug, -vv trace). Default is info.
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Quiet mode - only show errors.
    #[arg(short, long)]
    pub quiet: bool,
}

/// Resolved runtime configuration, after env/CLI merge and validation.
#[derive(Clone, Debug)]
pub struct Config {
    pub collection_interval: Duration,
    pub backend_url: String,
    pub auth_token: Option<String>,
    pub server_id: Option<String>,
    pub otlp_endpoint: String,
    pub otlp_path: String,
    pub cloud: bool,
    pub suppress_unchanged: bool,
}

impl Config {
    /// Builds a [`Config`] from parsed CLI args (which themselves fall
    /// back to environment variables via `clap`'s `env` attribute),
    /// applying the validation and clamping rules of spec.md §6/§4.8.
    pub fn from_args(args: &Args) -> Result<Self, ConfigError> {
        let requested_interval = args.interval.unwrap_or(DEFAULT_COLLECTION_INTERVAL_SECS);
        let collection_interval_secs =
            requested_interval.clamp(MIN_COLLECTION_INTERVAL_SECS, MAX_COLLECTION_INTERVAL_SECS);

        if args.cloud && args.auth_token.as_deref().unwrap_or("").is_empty() {
            return Err(ConfigError::MissingRequired("AUTH_TOKEN"));
        }
        if args.cloud && args.server_id.as_deref().unwrap_or("").is_empty() {
            return Err(ConfigError::MissingRequired("SERVER_ID"));
        }

        Ok(Config {
            collection_interval: Duration::from_secs(collection_interval_secs),
            backend_url: args.backend_url.clone().unwrap_or_else(|| DEFAULT_BACKEND_URL.to_string()),
            auth_token: args.auth_token.clone(),
            server_id: args.server_id.clone(),
            otlp_endpoint: args.otlp_endpoint.clone().unwrap_or_else(|| DEFAULT_OTLP_ENDPOINT.to_string()),
            otlp_path: args.otlp_path.clone().unwrap_or_else(|| DEFAULT_OTLP_PATH.to_string()),
            cloud: args.cloud,
            suppress_unchanged: !args.no_delta_suppression,
        })
    }

    pub fn otlp_url(&self) -> String {
        format!("{}{}", self.otlp_endpoint, self.otlp_path)
    }

    /// `server_id` if one has been assigned, or the literal `"local"` for
    /// the non-cloud smoke-test path where no registration has happened.
    pub fn server_id_or_local(&self) -> &str {
        self.server_id.as_deref().unwrap_or("local")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    fn parse(argv: &[&str]) -> Args {
        Args::parse_from(argv)
    }

    #[test]
    fn interval_clamps_to_minimum() {
        let args = parse(&["catops-agentd", "--interval", "1"]);
        let cfg = Config::from_args(&args).unwrap();
        assert_eq!(cfg.collection_interval, Duration::from_secs(MIN_COLLECTION_INTERVAL_SECS));
    }

    #[test]
    fn interval_clamps_to_maximum() {
        let args = parse(&["catops-agentd", "--interval", "10000"]);
        let cfg = Config::from_args(&args).unwrap();
        assert_eq!(cfg.collection_interval, Duration::from_secs(MAX_COLLECTION_INTERVAL_SECS));
    }

    #[test]
    fn default_interval_is_30s() {
        let args = parse(&["catops-agentd"]);
        let cfg = Config::from_args(&args).unwrap();
        assert_eq!(cfg.collection_interval, Duration::from_secs(30));
    }

    #[test]
    fn cloud_mode_requires_auth_token() {
        let args = parse(&["catops-agentd", "--cloud", "--server-id", "srv-1"]);
        assert!(matches!(Config::from_args(&args), Err(ConfigError::MissingRequired("AUTH_TOKEN"))));
    }

    #[test]
    fn cloud_mode_requires_server_id() {
        let args = parse(&["catops-agentd", "--cloud", "--auth-token", "tok"]);
        assert!(matches!(Config::from_args(&args), Err(ConfigError::MissingRequired("SERVER_ID"))));
    }

    #[test]
    fn local_mode_needs_no_credentials() {
        let args = parse(&["catops-agentd"]);
        assert!(Config::from_args(&args).is_ok());
    }

    #[test]
    fn otlp_url_joins_endpoint_and_path() {
        let args = parse(&["catops-agentd", "--otlp-endpoint", "https://h", "--otlp-path", "/v1/metrics"]);
        let cfg = Config::from_args(&args).unwrap();
        assert_eq!(cfg.otlp_url(), "https://h/v1/metrics");
    }
}
