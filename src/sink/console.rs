//! Stdout sink.

use std::io::{self, Write};

use super::{DnsUpdateEvent, EventSink, ProbeEvent, Renderer};
use crate::probe::TaskDefinition;
use crate::stats::StatsSnapshot;

/// Writes one rendered line per event to stdout.
#[derive(Debug, Clone)]
pub struct ConsoleSink {
    renderer: Renderer,
}

impl ConsoleSink {
    pub fn new(renderer: Renderer) -> Self {
        Self { renderer }
    }

    fn emit(&self, line: String) {
        let mut out = io::stdout().lock();
        if let Err(e) = writeln!(out, "{}", line) {
            tracing::warn!("Failed to write event for {}: {}", self.renderer.id(), e);
        }
    }
}

impl EventSink for ConsoleSink {
    fn probe(&mut self, task: &TaskDefinition, event: &ProbeEvent) {
        self.emit(self.renderer.probe(task, event));
    }

    fn stats(&mut self, task: &TaskDefinition, snapshot: &StatsSnapshot) {
        self.emit(self.renderer.stats(task, snapshot));
    }

    fn dns_update(&mut self, task: &TaskDefinition, event: &DnsUpdateEvent) {
        self.emit(self.renderer.dns_update(task, event));
    }
}
