//! Metrics infrastructure for the sensor network nodes.
//!
//! Every metric the nodes emit is declared here as a [`Metric`] constant so
//! names and label keys stay consistent between the packet path and the
//! modem path. Without an installed recorder the `metrics` macros are no-ops.
//!
//! ```rust
//! use firenet_metrics::{metric_defs, MetricLabels};
//!
//! let labels = MetricLabels::new("0x11", "gateway");
//! metrics::counter!(metric_defs::PACKETS_DECODED.name, &labels.to_labels()).increment(1);
//! ```

pub use metrics;

use metrics::{describe_counter, describe_histogram, Unit};

/// The kind of metric (counter or histogram).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetricKind {
    /// A monotonically increasing counter.
    Counter,
    /// A histogram for recording distributions.
    Histogram,
}

impl MetricKind {
    /// Returns the kind as a lowercase string.
    pub const fn as_str(&self) -> &'static str {
        match self {
            MetricKind::Counter => "counter",
            MetricKind::Histogram => "histogram",
        }
    }
}

/// A metric declaration with its metadata.
#[derive(Debug, Clone)]
pub struct Metric {
    /// The metric name (e.g., "firenet.packet.encoded").
    pub name: &'static str,
    /// The kind of metric.
    pub kind: MetricKind,
    /// Human-readable description.
    pub description: &'static str,
    /// The unit of measurement (optional).
    pub unit: Option<Unit>,
    /// Expected label keys.
    pub labels: &'static [&'static str],
}

impl Metric {
    const fn new(name: &'static str, kind: MetricKind) -> Self {
        Self {
            name,
            kind,
            description: "",
            unit: None,
            labels: &[],
        }
    }

    /// Creates a new counter metric.
    pub const fn counter(name: &'static str) -> Self {
        Self::new(name, MetricKind::Counter)
    }

    /// Creates a new histogram metric.
    pub const fn histogram(name: &'static str) -> Self {
        Self::new(name, MetricKind::Histogram)
    }

    /// Sets the description.
    pub const fn with_description(mut self, description: &'static str) -> Self {
        self.description = description;
        self
    }

    /// Sets the unit.
    pub const fn with_unit(mut self, unit: Unit) -> Self {
        self.unit = Some(unit);
        self
    }

    /// Sets the expected label keys.
    pub const fn with_labels(mut self, labels: &'static [&'static str]) -> Self {
        self.labels = labels;
        self
    }

    /// Registers this metric's description with the installed recorder.
    pub fn describe(&self) {
        match (self.kind, self.unit) {
            (MetricKind::Counter, Some(unit)) => {
                describe_counter!(self.name, unit, self.description);
            }
            (MetricKind::Counter, None) => {
                describe_counter!(self.name, self.description);
            }
            (MetricKind::Histogram, Some(unit)) => {
                describe_histogram!(self.name, unit, self.description);
            }
            (MetricKind::Histogram, None) => {
                describe_histogram!(self.name, self.description);
            }
        }
    }
}

/// All metric definitions.
pub mod metric_defs {
    use super::{Metric, Unit};

    /// Labels present on every node-scoped metric.
    pub const STANDARD_LABELS: &[&str] = &["node", "role"];

    // ========================================================================
    // Radio Packet Metrics
    // ========================================================================

    /// Packets encoded for transmission.
    pub const PACKETS_ENCODED: Metric = Metric::counter("firenet.packet.encoded")
        .with_description("Sensor packets encoded for transmission")
        .with_unit(Unit::Count)
        .with_labels(STANDARD_LABELS);

    /// Fields sent as the error sentinel because they did not fit.
    pub const FIELDS_OVERFLOWED: Metric = Metric::counter("firenet.packet.overflowed_fields")
        .with_description("Fields replaced by the error sentinel at encode time")
        .with_unit(Unit::Count)
        .with_labels(&["node", "role", "field"]);

    /// Packets handed to the radio.
    pub const PACKETS_TRANSMITTED: Metric = Metric::counter("firenet.packet.transmitted")
        .with_description("Sensor packets handed to the radio")
        .with_unit(Unit::Count)
        .with_labels(STANDARD_LABELS);

    /// Packets decoded on the gateway.
    pub const PACKETS_DECODED: Metric = Metric::counter("firenet.packet.decoded")
        .with_description("Sensor packets decoded")
        .with_unit(Unit::Count)
        .with_labels(STANDARD_LABELS);

    /// Decoded packets carrying the error sentinel.
    pub const PACKETS_INVALID: Metric = Metric::counter("firenet.packet.invalid")
        .with_description("Decoded packets rejected because a field held the error sentinel")
        .with_unit(Unit::Count)
        .with_labels(STANDARD_LABELS);

    /// Radio reads that failed (CRC or I/O).
    pub const RADIO_RX_ERRORS: Metric = Metric::counter("firenet.radio.rx_errors")
        .with_description("Radio receive failures")
        .with_unit(Unit::Count)
        .with_labels(&["node", "role", "kind"]);

    // ========================================================================
    // Modem Metrics
    // ========================================================================

    /// Modem exchanges by outcome.
    pub const MODEM_EXCHANGES: Metric = Metric::counter("firenet.modem.exchanges")
        .with_description("AT command exchanges with the modem")
        .with_unit(Unit::Count)
        .with_labels(&["node", "role", "step", "outcome"]);

    /// Time spent waiting on a single exchange.
    pub const MODEM_EXCHANGE_TIME: Metric = Metric::histogram("firenet.modem.exchange_time_ms")
        .with_description("Wall-clock time of one modem exchange in milliseconds")
        .with_unit(Unit::Milliseconds)
        .with_labels(&["node", "role", "step"]);

    /// Complete upload cycles.
    pub const UPLOAD_CYCLES: Metric = Metric::counter("firenet.modem.upload_cycles")
        .with_description("Upload cycles run to completion")
        .with_unit(Unit::Count)
        .with_labels(&["node", "role", "outcome"]);

    /// Returns a slice of all defined metrics.
    pub const ALL: &[&Metric] = &[
        &PACKETS_ENCODED,
        &FIELDS_OVERFLOWED,
        &PACKETS_TRANSMITTED,
        &PACKETS_DECODED,
        &PACKETS_INVALID,
        &RADIO_RX_ERRORS,
        &MODEM_EXCHANGES,
        &MODEM_EXCHANGE_TIME,
        &UPLOAD_CYCLES,
    ];
}

/// Labels identifying the node a metric belongs to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetricLabels {
    /// Node identifier (usually its radio address).
    pub node: String,
    /// Node role (transmitter, gateway, uplink).
    pub role: String,
}

impl MetricLabels {
    /// Creates labels for a node.
    pub fn new(node: impl Into<String>, role: impl Into<String>) -> Self {
        Self {
            node: node.into(),
            role: role.into(),
        }
    }

    /// Converts the labels to the `metrics` crate label format.
    pub fn to_labels(&self) -> Vec<(&'static str, String)> {
        vec![("node", self.node.clone()), ("role", self.role.clone())]
    }

    /// Returns labels with additional key-value pairs.
    pub fn with(&self, extra: &[(&'static str, String)]) -> Vec<(&'static str, String)> {
        let mut labels = self.to_labels();
        labels.extend_from_slice(extra);
        labels
    }
}

impl Default for MetricLabels {
    fn default() -> Self {
        MetricLabels::new("unknown", "uplink")
    }
}

/// Describes all metrics. Call once at startup after installing a recorder.
pub fn describe_metrics() {
    for metric in metric_defs::ALL {
        metric.describe();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_to_labels() {
        let labels = MetricLabels::new("0x11", "gateway");
        let label_vec = labels.to_labels();
        assert_eq!(label_vec.len(), 2);
        assert!(label_vec.contains(&("node", "0x11".to_string())));
        assert!(label_vec.contains(&("role", "gateway".to_string())));
    }

    #[test]
    fn test_with_extra_labels() {
        let labels = MetricLabels::new("0x11", "gateway");
        let extended = labels.with(&[("outcome", "matched".to_string())]);
        assert_eq!(extended.len(), 3);
        assert!(extended.contains(&("outcome", "matched".to_string())));
    }

    #[test]
    fn test_metric_definitions() {
        assert_eq!(metric_defs::MODEM_EXCHANGES.name, "firenet.modem.exchanges");
        assert_eq!(metric_defs::MODEM_EXCHANGES.kind, MetricKind::Counter);
        assert_eq!(metric_defs::MODEM_EXCHANGE_TIME.kind, MetricKind::Histogram);
        assert_eq!(metric_defs::MODEM_EXCHANGE_TIME.unit, Some(Unit::Milliseconds));
        assert_eq!(metric_defs::PACKETS_INVALID.labels, &["node", "role"]);
    }

    #[test]
    fn test_all_metrics_unique() {
        let mut names: Vec<_> = metric_defs::ALL.iter().map(|m| m.name).collect();
        names.sort_unstable();
        names.dedup();
        assert_eq!(names.len(), metric_defs::ALL.len());
    }

    #[test]
    fn test_only_exchange_time_is_histogram() {
        let histograms: Vec<_> = metric_defs::ALL
            .iter()
            .filter(|m| m.kind == MetricKind::Histogram)
            .map(|m| m.name)
            .collect();
        assert_eq!(histograms, vec![metric_defs::MODEM_EXCHANGE_TIME.name]);
        assert_eq!(MetricKind::Histogram.as_str(), "histogram");
    }

    #[test]
    fn test_describe_without_recorder() {
        describe_metrics();
    }
}
