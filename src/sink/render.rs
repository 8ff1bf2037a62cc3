//! Event rendering.

use chrono::Utc;
use serde::Serialize;
use serde_json::{json, Map, Value};

use super::{DnsUpdateEvent, ProbeEvent};
use crate::probe::{as_millis, TaskDefinition};
use crate::stats::StatsSnapshot;

/// Output rendering selected by `output_format`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Format {
    /// One JSON object per line.
    Json,
    /// The human-readable message only.
    Text,
    /// Discard events.
    Discard,
}

impl Format {
    /// Parse a format name; unknown names fall back to JSON.
    pub fn parse(name: &str) -> Self {
        match name.to_ascii_lowercase().as_str() {
            "json" => Self::Json,
            "text" => Self::Text,
            "none" => Self::Discard,
            other => {
                tracing::warn!("Unknown output format '{}', using json", other);
                Self::Json
            }
        }
    }
}

/// `count` object of a stats line.
#[derive(Debug, Serialize)]
struct Counts {
    total: u64,
    ok: u64,
    ko: u64,
    consecutive: Consecutive,
}

#[derive(Debug, Serialize)]
struct Consecutive {
    ok: u64,
    ko: u64,
}

/// `latency` object of a stats line, in milliseconds.
#[derive(Debug, Serialize)]
struct WindowLatency {
    min: f64,
    max: f64,
    avg: f64,
    sigma: f64,
    skew: f64,
    samples: u16,
    overall: Overall,
}

/// Lifetime extremes.
#[derive(Debug, Serialize)]
struct Overall {
    min: f64,
    max: f64,
}

/// Renders events of one task into output lines.
#[derive(Debug, Clone)]
pub struct Renderer {
    format: Format,
    id: String,
    log_name: String,
}

impl Renderer {
    pub fn new(format: Format, id: impl Into<String>, log_name: impl Into<String>) -> Self {
        Self {
            format,
            id: id.into(),
            log_name: log_name.into(),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    fn base(&self, task: &TaskDefinition) -> Map<String, Value> {
        let mut obj = Map::new();
        obj.insert("id".into(), json!(self.id));
        obj.insert("logName".into(), json!(self.log_name));
        obj.insert("host".into(), json!(task.host()));
        obj.insert("time".into(), json!(Utc::now().to_rfc3339()));
        obj
    }

    fn finish(&self, mut obj: Map<String, Value>, message: String) -> String {
        match self.format {
            Format::Text => message,
            _ => {
                obj.insert("message".into(), json!(message));
                Value::Object(obj).to_string()
            }
        }
    }

    pub fn probe(&self, task: &TaskDefinition, event: &ProbeEvent) -> String {
        let mut obj = self.base(task);

        if let Some(err) = &event.error {
            obj.insert("severity".into(), json!("ERROR"));
            obj.insert("error".into(), json!(err.to_string()));
        }
        obj.insert("serial".into(), json!(event.attempt));
        obj.insert("target".into(), json!(event.target.to_string()));
        obj.insert("latency".into(), json!(as_millis(event.latency)));
        obj.insert("delta".into(), json!(event.delta));

        let message = if task.kind.is_raw() {
            format!(
                "#:{} | @:{} | latency:{:?}",
                event.attempt, event.target, event.latency
            )
        } else {
            format!(
                "#:{} | @:{}/{} | latency:{:?}",
                event.attempt, task.hostname, event.target, event.latency
            )
        };

        self.finish(obj, message)
    }

    pub fn stats(&self, task: &TaskDefinition, snapshot: &StatsSnapshot) -> String {
        let mut obj = self.base(task);
        let s = &snapshot.stats;

        obj.insert(
            "count".into(),
            json!(Counts {
                total: s.total_probes,
                ok: s.total_successful,
                ko: s.total_failures,
                consecutive: Consecutive {
                    ok: s.consecutive_successful,
                    ko: s.consecutive_failures,
                },
            }),
        );
        obj.insert(
            "latency".into(),
            json!(WindowLatency {
                min: s.min_latency,
                max: s.max_latency,
                avg: s.average_latency,
                sigma: s.standard_deviation,
                skew: s.skewness,
                samples: snapshot.samples,
                overall: Overall {
                    min: s.overall_min_latency,
                    max: s.overall_max_latency,
                },
            }),
        );

        let message = format!(
            "{} | [last {}]: min/max/avg/sigma/skew={}/{}/{}/{}/{} | [total: {}]: min/max={}/{}",
            task.host(),
            snapshot.samples,
            s.min_latency,
            s.max_latency,
            s.average_latency,
            s.standard_deviation,
            s.skewness,
            s.total_probes,
            s.overall_min_latency,
            s.overall_max_latency,
        );

        self.finish(obj, message)
    }

    pub fn dns_update(&self, task: &TaskDefinition, event: &DnsUpdateEvent) -> String {
        let mut obj = self.base(task);

        obj.insert("required".into(), json!(event.required));
        obj.insert("latency".into(), json!(as_millis(event.latency)));
        obj.insert("hostname".into(), json!(event.hostname));

        let mut ip = Map::new();
        ip.insert("before".into(), json!(event.previous.to_string()));

        let message = match (&event.error, event.current) {
            (None, Some(current)) => {
                ip.insert("after".into(), json!(current.to_string()));
                format!(
                    "'{}' IP mapping updated [ {:?} ]: {} => {}",
                    event.hostname, event.latency, event.previous, current
                )
            }
            (Some(err), _) => {
                obj.insert("severity".into(), json!("ERROR"));
                obj.insert("error".into(), json!(err));
                format!("'{}' IP mapping update failed: {}", event.hostname, err)
            }
            (None, None) => format!("'{}' IP mapping unchanged", event.hostname),
        };
        obj.insert("IP".into(), Value::Object(ip));

        self.finish(obj, message)
    }
}
