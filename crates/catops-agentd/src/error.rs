//! Error taxonomy for the daemon binary (spec.md §7).
//!
//! Config errors are fatal and abort `main` before the loop starts.
//! Export errors (OTLP/HTTP) are logged and handled by the health FSM;
//! they never propagate out of the Supervisor's tick.

/// Missing/invalid required configuration (spec.md §7.1). Causes the
/// process to exit nonzero before the sample loop starts.
#[derive(Debug)]
pub enum ConfigError {
    MissingRequired(&'static str),
    Invalid { field: &'static str, reason: String },
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::MissingRequired(field) => write!(f, "missing required config: {field}"),
            ConfigError::Invalid { field, reason } => write!(f, "invalid config {field}: {reason}"),
        }
    }
}

impl std::error::Error for ConfigError {}

/// Failure sending a batch to the remote backend or flushing the OTLP
/// exporter (spec.md §7.2 "Transient remote errors"). Logged and dropped
/// by the caller; never fatal.
#[derive(Debug)]
pub enum ExportError {
    Http(String),
    Otlp(String),
    Timeout,
}

impl std::fmt::Display for ExportError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ExportError::Http(msg) => write!(f, "HTTP sender error: {msg}"),
            ExportError::Otlp(msg) => write!(f, "OTLP exporter error: {msg}"),
            ExportError::Timeout => write!(f, "export deadline exceeded"),
        }
    }
}

impl std::error::Error for ExportError {}
