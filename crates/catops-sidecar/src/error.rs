//! Error taxonomy for the sidecar binary (spec.md §7, §4.9).

#[derive(Debug)]
pub enum ConfigError {
    MissingRequired(&'static str),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::MissingRequired(field) => write!(f, "missing required config: {field}"),
        }
    }
}

impl std::error::Error for ConfigError {}

/// Failure talking to the cluster API or the metrics store. Logged at
/// WARN and absorbed the same way a provider error is (spec.md §4.1, §7.3)
/// — a failed cluster query yields an empty pod list for this node, not a
/// fatal error.
#[derive(Debug)]
pub enum K8sError {
    Client(String),
    MetricsUnavailable(String),
}

impl std::fmt::Display for K8sError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            K8sError::Client(msg) => write!(f, "kubernetes API error: {msg}"),
            K8sError::MetricsUnavailable(msg) => write!(f, "metrics store unavailable: {msg}"),
        }
    }
}

impl std::error::Error for K8sError {}
