//! Wire-format adapters for metrics and traces (C12). No concrete
//! socket/HTTP transport is implemented; [`SendFacade`] is the seam a
//! caller plugs a transport into.

use std::collections::BTreeMap;

use crate::monitoring::metrics::Metric;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportFormat {
    PrometheusText,
    PrometheusProtobuf,
    StatsDPlain,
    StatsDDataDog,
    OTLPGrpc,
    OTLPHttpJson,
    OTLPHttpProtobuf,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpanKind {
    Unspecified,
    Internal,
    Server,
    Client,
    Producer,
    Consumer,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusCode {
    Unset,
    Ok,
    Error,
}

#[derive(Debug, Clone)]
pub struct Span {
    pub name: String,
    pub kind: SpanKind,
    pub status: StatusCode,
    pub status_message: Option<String>,
    pub tags: BTreeMap<String, String>,
}

impl Span {
    pub fn new(name: impl Into<String>, kind: SpanKind) -> Self {
        Self {
            name: name.into(),
            kind,
            status: StatusCode::Unset,
            status_message: None,
            tags: BTreeMap::new(),
        }
    }

    /// Maps `kind`/`status` onto the `span.kind`/`error`/`error.message`
    /// tag convention used by every exporter in this module.
    pub fn exportable_tags(&self) -> BTreeMap<String, String> {
        let mut tags = self.tags.clone();
        tags.insert("span.kind".to_string(), span_kind_name(self.kind).to_string());
        if self.status == StatusCode::Error {
            tags.insert("error".to_string(), "true".to_string());
            if let Some(message) = &self.status_message {
                tags.insert("error.message".to_string(), message.clone());
            }
        }
        tags
    }
}

fn span_kind_name(kind: SpanKind) -> &'static str {
    match kind {
        SpanKind::Unspecified => "unspecified",
        SpanKind::Internal => "internal",
        SpanKind::Server => "server",
        SpanKind::Client => "client",
        SpanKind::Producer => "producer",
        SpanKind::Consumer => "consumer",
    }
}

/// Injectable transport seam. No concrete implementation ships here.
pub trait SendFacade: Send + Sync {
    fn send(&self, format: ExportFormat, payload: &[u8]) -> Result<(), String>;
}

/// Replaces every byte outside `[A-Za-z0-9_:]` with `_`, and prefixes
/// with `_` if the first character isn't a letter, underscore, or colon.
pub fn sanitize_metric_name(name: &str) -> String {
    let mut out: String = name
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '_' || c == ':' { c } else { '_' })
        .collect();
    if let Some(first) = out.chars().next() {
        if !(first.is_ascii_alphabetic() || first == '_' || first == ':') {
            out.insert(0, '_');
        }
    } else {
        out.push('_');
    }
    out
}

/// Replaces every byte outside `[A-Za-z0-9_]` with `_`, prefixing with
/// `_` if the first character isn't a letter or underscore.
pub fn sanitize_label_name(name: &str) -> String {
    let mut out: String = name
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '_' { c } else { '_' })
        .collect();
    if let Some(first) = out.chars().next() {
        if !(first.is_ascii_alphabetic() || first == '_') {
            out.insert(0, '_');
        }
    } else {
        out.push('_');
    }
    out
}

/// Escapes a label value for inclusion inside `"..."` in exposition text.
pub fn escape_label_value(value: &str) -> String {
    value.replace('\\', "\\\\").replace('"', "\\\"").replace('\n', "\\n")
}

/// Infers a Prometheus metric-type suffix from substrings in the name,
/// used when a caller hasn't tagged the metric explicitly.
pub fn infer_metric_type(name: &str) -> &'static str {
    let lowercase = name.to_lowercase();
    if lowercase.contains("count") || lowercase.contains("total") {
        "counter"
    } else if lowercase.contains("duration") || lowercase.contains("latency") || lowercase.contains("time") {
        "histogram"
    } else {
        "gauge"
    }
}

/// Renders a single metric as one line of Prometheus text exposition
/// format: `name{label="value",...} value`.
pub fn render_prometheus_text(metric: &Metric) -> String {
    let name = sanitize_metric_name(&metric.name);
    let value = match &metric.value {
        crate::monitoring::metrics::MetricValue::Float(v) => *v,
        crate::monitoring::metrics::MetricValue::Int(v) => *v as f64,
        crate::monitoring::metrics::MetricValue::Text(_) => 0.0,
    };

    if metric.tags.is_empty() {
        return format!("{name} {value}");
    }

    let labels: Vec<String> = metric
        .tags
        .iter()
        .map(|(k, v)| format!("{}=\"{}\"", sanitize_label_name(k), escape_label_value(v)))
        .collect();
    format!("{name}{{{}}} {value}", labels.join(","))
}
