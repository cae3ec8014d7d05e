//! Alert fingerprinting and the alert lifecycle sum types (spec.md §4.7
//! "HTTP Batch Sender", §8 "Alert fingerprint determinism").
//!
//! The ring buffer ([`crate::timeseries`]) decides *whether* a resource is
//! spiking; this module turns that decision into the identity and shape of
//! an alert the Sender posts upstream. It holds no network code of its own
//! — `catops-agentd`'s sender builds the request bodies from [`Alert`].

use serde::{Deserialize, Serialize};

use crate::util::hash::md5_hex;

/// The three spike kinds plus a static threshold crossing, exactly the set
/// named in spec.md §4.7.
#[derive(Clone, Copy, Serialize, Deserialize, Debug, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum SubType {
    Sudden,
    Gradual,
    Anomalous,
    Threshold,
}

impl SubType {
    pub fn as_str(&self) -> &'static str {
        match self {
            SubType::Sudden => "sudden",
            SubType::Gradual => "gradual",
            SubType::Anomalous => "anomalous",
            SubType::Threshold => "threshold",
        }
    }
}

/// Alert severity. Not enumerated explicitly in spec.md beyond "closed
/// enumeration"; `critical`/`warning`/`info` is the conventional three-tier
/// split used by every alerting payload in §6, so it's adopted here.
#[derive(Clone, Copy, Serialize, Deserialize, Debug, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Critical,
    Warning,
    Info,
}

/// An alert condition for one (resource, metric) pair, ready to be handed
/// to the Sender's `process`/`heartbeat`/`resolve` verbs.
#[derive(Clone, Serialize, Deserialize, Debug, PartialEq)]
pub struct Alert {
    pub fingerprint: String,
    pub metric_name: String,
    pub subtype: SubType,
    pub severity: Severity,
    pub title: String,
    pub message: String,
    pub value: f64,
    pub threshold: f64,
    pub details: serde_json::Value,
}

/// Computes the alert fingerprint as a pure function of
/// `(server_id, metric_name, subtype)` (spec.md §8 "Alert fingerprint
/// determinism"). Two calls with the same three inputs always produce the
/// same fingerprint, regardless of value/severity/timestamp, so the
/// lifecycle sub-protocol can heartbeat and resolve the same remote alert
/// across ticks.
pub fn fingerprint(server_id: &str, metric_name: &str, subtype: SubType) -> String {
    md5_hex(&format!("{server_id}|{metric_name}|{}", subtype.as_str()))
}

/// Builds an [`Alert`] from a spike classification, assigning severity by
/// how far over threshold the reading is: `anomalous` always reads as
/// `critical` (it's a statistical outlier by construction), a `sudden`
/// jump is `critical` once the metric itself is already high, otherwise
/// `warning`.
pub fn build_alert(
    server_id: &str,
    metric_name: &str,
    subtype: SubType,
    value: f64,
    threshold: f64,
) -> Alert {
    let severity = match subtype {
        SubType::Anomalous => Severity::Critical,
        SubType::Sudden if value >= 90.0 => Severity::Critical,
        _ => Severity::Warning,
    };

    let title = format!("{metric_name} {} spike", subtype.as_str());
    let message = format!("{metric_name} is {value:.1}, {} spike detected (threshold {threshold:.1})", subtype.as_str());

    Alert {
        fingerprint: fingerprint(server_id, metric_name, subtype),
        metric_name: metric_name.to_string(),
        subtype,
        severity,
        title,
        message,
        value,
        threshold,
        details: serde_json::json!({}),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fingerprint_is_pure_function_of_three_inputs() {
        let a = fingerprint("srv-1", "cpu.usage", SubType::Sudden);
        let b = fingerprint("srv-1", "cpu.usage", SubType::Sudden);
        assert_eq!(a, b);
    }

    #[test]
    fn fingerprint_ignores_value_and_severity() {
        let a = build_alert("srv-1", "cpu.usage", SubType::Sudden, 95.0, 50.0);
        let b = build_alert("srv-1", "cpu.usage", SubType::Sudden, 40.0, 50.0);
        assert_eq!(a.fingerprint, b.fingerprint);
    }

    #[test]
    fn fingerprint_differs_by_server_metric_or_subtype() {
        let base = fingerprint("srv-1", "cpu.usage", SubType::Sudden);
        assert_ne!(base, fingerprint("srv-2", "cpu.usage", SubType::Sudden));
        assert_ne!(base, fingerprint("srv-1", "memory.usage", SubType::Sudden));
        assert_ne!(base, fingerprint("srv-1", "cpu.usage", SubType::Gradual));
    }

    #[test]
    fn anomalous_is_always_critical() {
        let alert = build_alert("srv-1", "cpu.usage", SubType::Anomalous, 15.0, 4.0);
        assert_eq!(alert.severity, Severity::Critical);
    }
}
