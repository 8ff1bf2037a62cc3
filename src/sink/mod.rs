//! Event sinks.
//!
//! Every task loop owns one sink and reports probe results, statistics
//! snapshots and DNS updates to it.

mod console;
mod render;
mod rotating;

pub use console::*;
pub use render::*;
pub use rotating::*;

use std::net::{IpAddr, SocketAddr};
use std::time::Duration;

use uuid::Uuid;

use crate::probe::{ProbeError, TaskDefinition};
use crate::stats::StatsSnapshot;

/// Result of one probe attempt.
#[derive(Debug, Clone, PartialEq)]
pub struct ProbeEvent {
    pub attempt: u64,
    pub target: SocketAddr,
    pub latency: Duration,
    /// Latency change from the previous attempt, in milliseconds.
    pub delta: f64,
    pub error: Option<ProbeError>,
}

/// Outcome of a DNS refresh.
#[derive(Debug, Clone, PartialEq)]
pub struct DnsUpdateEvent {
    pub hostname: String,
    pub previous: IpAddr,
    pub current: Option<IpAddr>,
    pub required: bool,
    pub latency: Duration,
    pub error: Option<String>,
}

/// Receiver of task observations.
pub trait EventSink: Send {
    fn probe(&mut self, task: &TaskDefinition, event: &ProbeEvent);
    fn stats(&mut self, task: &TaskDefinition, snapshot: &StatsSnapshot);
    fn dns_update(&mut self, task: &TaskDefinition, event: &DnsUpdateEvent);
}

/// Sink that drops every event.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopSink;

impl EventSink for NoopSink {
    fn probe(&mut self, _task: &TaskDefinition, _event: &ProbeEvent) {}
    fn stats(&mut self, _task: &TaskDefinition, _snapshot: &StatsSnapshot) {}
    fn dns_update(&mut self, _task: &TaskDefinition, _event: &DnsUpdateEvent) {}
}

/// Build the sink configured by a task's parameters.
///
/// Output goes to rotating files when `logz_dir` is set, stdout otherwise.
pub fn for_task(task: &TaskDefinition, project_id: &str) -> Box<dyn EventSink> {
    let format = Format::parse(&task.params.output_format);
    if format == Format::Discard {
        return Box::new(NoopSink);
    }

    let id = Uuid::new_v4().simple().to_string();
    let log_name = format!("projects/{}/tcpping/{}", project_id, id);
    let renderer = Renderer::new(format, id, log_name);

    let Some(options) = RotationOptions::from_params(&task.params) else {
        return Box::new(ConsoleSink::new(renderer));
    };

    match RotatingFileSink::open(renderer.clone(), options) {
        Ok(sink) => Box::new(sink),
        Err(e) => {
            tracing::warn!(
                "Cannot write logs for {} to files, using stdout: {}",
                task.raw,
                e
            );
            Box::new(ConsoleSink::new(renderer))
        }
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_for_task_writes_to_directory() {
        let dir = tempfile::tempdir().unwrap();
        let raw = format!(
            "ipv4://192.0.2.1:80?logz_dir={}&logz_name=probe",
            dir.path().display()
        );
        let task = TaskDefinition::parse(&raw).unwrap();
        let mut sink = for_task(&task, "demo");
        sink.stats(&task, &crate::stats::StatsEngine::new(4).snapshot());

        let entries: Vec<_> = std::fs::read_dir(dir.path()).unwrap().collect();
        assert_eq!(entries.len(), 1);
    }
}
