//! A single probe task: its definition plus the state its loop owns.

use std::net::{IpAddr, SocketAddr};

use tokio_util::sync::CancellationToken;

use crate::probe::{
    execute_probe, refresh_for_attempt, Connector, DnsRefresh, ProbeOutcome, Resolver,
    TaskDefinition, TaskError,
};
use crate::sink::{DnsUpdateEvent, EventSink, ProbeEvent};
use crate::stats::{snapshot_due, StatsEngine, StatsSnapshot};

/// State mutated by the task loop only.
#[derive(Debug)]
pub struct TaskState {
    pub ip: IpAddr,
    pub target: SocketAddr,
    pub engine: StatsEngine,
}

/// One configured target with everything needed to probe it.
pub struct Prober<R, C> {
    definition: TaskDefinition,
    state: TaskState,
    attempts: u64,
    resolver: R,
    connector: C,
    sink: Box<dyn EventSink>,
}

impl<R: Resolver, C: Connector> Prober<R, C> {
    /// Build a task from its definition, resolving the initial address for
    /// DNS kinds.
    pub async fn new(
        definition: TaskDefinition,
        resolver: R,
        connector: C,
        sink: Box<dyn EventSink>,
    ) -> Result<Self, TaskError> {
        let ip = definition.initial_address(&resolver).await?;
        let state = TaskState {
            ip,
            target: SocketAddr::new(ip, definition.port),
            engine: StatsEngine::new(definition.params.log_size),
        };

        Ok(Self {
            definition,
            state,
            attempts: 0,
            resolver,
            connector,
            sink,
        })
    }

    pub fn definition(&self) -> &TaskDefinition {
        &self.definition
    }

    pub fn state(&self) -> &TaskState {
        &self.state
    }

    /// Number of attempts started so far.
    pub fn attempts(&self) -> u64 {
        self.attempts
    }

    /// Run one probe cycle and return its attempt number.
    pub async fn run_attempt(&mut self, cancel: &CancellationToken) -> u64 {
        self.attempts += 1;
        let attempt = self.attempts;
        let stats_interval = self.definition.params.stats_interval;

        self.refresh_address(attempt).await;

        if snapshot_due(attempt, stats_interval) {
            self.snapshot();
        }

        let target = SocketAddr::new(self.state.ip, self.definition.port);
        self.state.target = target;

        let outcome = execute_probe(
            &self.connector,
            self.definition.network_mode(),
            target,
            self.definition.params.timeout,
            cancel,
        )
        .await;

        self.record(attempt, target, outcome);
        attempt
    }

    async fn refresh_address(&mut self, attempt: u64) {
        let def = &self.definition;
        let (ip, refresh) = refresh_for_attempt(
            &self.resolver,
            &def.hostname,
            def.kind.family(),
            def.kind.is_raw(),
            self.state.ip,
            attempt,
            def.params.dns_interval,
        )
        .await;

        let event = match refresh {
            DnsRefresh::NotRequired => return,
            DnsRefresh::Updated {
                previous,
                current,
                latency,
            } => DnsUpdateEvent {
                hostname: def.hostname.clone(),
                previous,
                current: Some(current),
                required: true,
                latency,
                error: None,
            },
            DnsRefresh::Failed {
                previous,
                latency,
                error,
            } => {
                tracing::warn!("DNS refresh for {} failed: {}", def.hostname, error);
                DnsUpdateEvent {
                    hostname: def.hostname.clone(),
                    previous,
                    current: None,
                    required: true,
                    latency,
                    error: Some(error.to_string()),
                }
            }
        };

        self.sink.dns_update(&self.definition, &event);
        self.state.ip = ip;
    }

    fn record(&mut self, attempt: u64, target: SocketAddr, outcome: ProbeOutcome) {
        let latency_ms = outcome.latency_ms();
        self.state
            .engine
            .record(attempt, latency_ms, !outcome.is_success());

        let event = ProbeEvent {
            attempt,
            target,
            latency: outcome.latency,
            delta: self.state.engine.stats().delta_latency,
            error: outcome.error,
        };
        self.sink.probe(&self.definition, &event);
    }

    /// Materialize windowed stats and report them.
    pub fn snapshot(&mut self) -> StatsSnapshot {
        let snapshot = self.state.engine.snapshot();
        self.sink.stats(&self.definition, &snapshot);
        snapshot
    }
}
