//! The canonical log record produced by the log parser (C4).

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Canonical log level, normalized from any source-specific spelling
/// (alphabetic aliases, numeric Pino levels, syslog priority) per
/// spec.md §4.4 "Level normalization".
#[derive(Clone, Copy, Serialize, Deserialize, Debug, PartialEq, Eq, Hash)]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
    Fatal,
}

impl LogLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Trace => "TRACE",
            LogLevel::Debug => "DEBUG",
            LogLevel::Info => "INFO",
            LogLevel::Warn => "WARN",
            LogLevel::Error => "ERROR",
            LogLevel::Fatal => "FATAL",
        }
    }

    /// Maps an alphabetic alias to its canonical level. Case-insensitive.
    pub fn from_alias(s: &str) -> Option<Self> {
        match s.to_ascii_uppercase().as_str() {
            "E" | "ERR" | "ERROR" => Some(LogLevel::Error),
            "W" | "WRN" | "WARNING" | "WARN" => Some(LogLevel::Warn),
            "I" | "INF" | "INFO" => Some(LogLevel::Info),
            "D" | "DBG" | "DEBUG" => Some(LogLevel::Debug),
            "T" | "TRC" | "TRACE" => Some(LogLevel::Trace),
            "F" | "CRIT" | "CRITICAL" | "FATAL" | "PANIC" => Some(LogLevel::Fatal),
            _ => None,
        }
    }

    /// Maps a numeric Pino level to its canonical level, per spec.md §4.4.
    pub fn from_pino_level(n: i64) -> Self {
        match n {
            n if n <= 10 => LogLevel::Trace,
            n if n <= 20 => LogLevel::Debug,
            n if n <= 30 => LogLevel::Info,
            n if n <= 40 => LogLevel::Warn,
            n if n <= 50 => LogLevel::Error,
            _ => LogLevel::Fatal,
        }
    }

    /// Maps a syslog PRI value (`facility*8 + severity`) to a canonical
    /// level via `severity = pri mod 8`, per spec.md §4.4.
    pub fn from_syslog_pri(pri: u32) -> Self {
        match pri % 8 {
            0..=2 => LogLevel::Fatal,
            3 => LogLevel::Error,
            4 => LogLevel::Warn,
            5 | 6 => LogLevel::Info,
            _ => LogLevel::Debug,
        }
    }

    /// Derives a level from an HTTP status code, per spec.md §4.4 "HTTP
    /// extraction": ≥500 ERROR, ≥400 WARN, else INFO.
    pub fn from_http_status(status: u16) -> Self {
        if status >= 500 {
            LogLevel::Error
        } else if status >= 400 {
            LogLevel::Warn
        } else {
            LogLevel::Info
        }
    }
}

/// Canonical structured record produced for every input line. Only `raw`
/// is guaranteed non-empty; the parser's total-ness property (spec.md §8)
/// holds because the fallback handler always returns a complete entry.
#[derive(Clone, Serialize, Deserialize, Debug, PartialEq, Default)]
pub struct ParsedLogEntry {
    pub raw: String,
    pub timestamp: Option<i64>,
    pub level: Option<LogLevel>,
    pub message: Option<String>,
    pub trace_id: Option<String>,
    pub span_id: Option<String>,
    pub request_id: Option<String>,
    pub user_id: Option<String>,
    pub session_id: Option<String>,
    pub http_method: Option<String>,
    pub http_path: Option<String>,
    pub http_status: Option<u16>,
    pub http_duration_ms: Option<f64>,
    pub error_type: Option<String>,
    pub stack_trace: Option<String>,
    pub source_ip: Option<String>,
    pub user_agent: Option<String>,
    pub attributes: HashMap<String, String>,
}

impl ParsedLogEntry {
    pub fn with_raw(raw: impl Into<String>) -> Self {
        Self {
            raw: raw.into(),
            ..Default::default()
        }
    }
}
