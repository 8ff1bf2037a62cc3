//! Scheduler module for running probe tasks.

mod prober;

pub use prober::*;

use std::time::{Duration, Instant};

use rand::Rng;
use tokio::task::JoinSet;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use crate::probe::{Connector, Resolver};

/// Fraction of the interval used as the upper bound of the per-tick delay.
pub const JITTER_FACTOR: f64 = 0.8787;

/// First tick used when `now + interval` is not representable.
const FAR_FUTURE: Duration = Duration::from_secs(86400 * 365 * 30);

/// Summary of a finished task loop.
#[derive(Debug, Clone)]
pub struct TaskReport {
    pub descriptor: String,
    pub attempts: u64,
    pub elapsed: Duration,
}

/// Runs every task in its own loop until the shared token is cancelled.
pub struct Scheduler {
    cancel: CancellationToken,
    tasks: JoinSet<TaskReport>,
}

impl Scheduler {
    pub fn new(cancel: CancellationToken) -> Self {
        Self {
            cancel,
            tasks: JoinSet::new(),
        }
    }

    /// Start probing a task.
    pub fn spawn<R: Resolver, C: Connector>(&mut self, prober: Prober<R, C>) {
        let cancel = self.cancel.clone();
        tracing::info!("Scheduler: Adding task {}", prober.definition().raw);

        self.tasks.spawn(async move {
            let descriptor = prober.definition().raw.clone();
            let start = Instant::now();
            let attempts = run_probe_loop(prober, cancel).await;
            TaskReport {
                descriptor,
                attempts,
                elapsed: start.elapsed(),
            }
        });
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    /// Wait for every loop to observe cancellation and finish.
    pub async fn join(mut self) -> Vec<TaskReport> {
        let mut reports = Vec::with_capacity(self.tasks.len());
        while let Some(result) = self.tasks.join_next().await {
            match result {
                Ok(report) => reports.push(report),
                Err(e) => tracing::error!("Scheduler: task loop failed: {}", e),
            }
        }
        reports
    }
}

/// Delay applied after each tick before the probe fires.
pub fn jitter_delay(interval: Duration) -> Duration {
    let scale = rand::thread_rng().gen_range(0.0..1.0) * JITTER_FACTOR;
    interval.mul_f64(scale)
}

/// Drive one task until `cancel` fires; returns the number of attempts.
pub async fn run_probe_loop<R: Resolver, C: Connector>(
    mut prober: Prober<R, C>,
    cancel: CancellationToken,
) -> u64 {
    let period = prober.definition().params.interval;

    let now = tokio::time::Instant::now();
    let start = now
        .checked_add(period)
        .unwrap_or_else(|| now + FAR_FUTURE);

    let mut interval = tokio::time::interval_at(start, period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            _ = interval.tick() => {
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => break,
                    _ = tokio::time::sleep(jitter_delay(period)) => {}
                }
                prober.run_attempt(&cancel).await;
            }
        }
    }

    prober.snapshot();
    prober.attempts()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::probe::testing::StaticResolver;
    use crate::probe::{NetworkMode, ProbeError, TaskDefinition};
    use crate::sink::testing::{Event, RecordingSink};
    use std::io;
    use std::net::SocketAddr;

    #[derive(Clone, Copy)]
    struct Immediate;

    impl Connector for Immediate {
        async fn connect(&self, _mode: NetworkMode, _target: SocketAddr) -> io::Result<()> {
            Ok(())
        }
    }

    /// Connector whose connect never completes.
    #[derive(Clone, Copy)]
    struct Hang;

    impl Connector for Hang {
        async fn connect(&self, _mode: NetworkMode, _target: SocketAddr) -> io::Result<()> {
            std::future::pending::<()>().await;
            Ok(())
        }
    }

    async fn prober(raw: &str, sink: &RecordingSink) -> Prober<StaticResolver, Immediate> {
        prober_with(raw, sink, Immediate).await
    }

    async fn prober_with<C: Connector>(
        raw: &str,
        sink: &RecordingSink,
        connector: C,
    ) -> Prober<StaticResolver, C> {
        let def = TaskDefinition::parse(raw).unwrap();
        Prober::new(def, StaticResolver::default(), connector, Box::new(sink.clone()))
            .await
            .unwrap()
    }

    #[test]
    fn test_jitter_bounds() {
        let interval = Duration::from_secs(2);
        for _ in 0..1000 {
            let d = jitter_delay(interval);
            assert!(d < interval.mul_f64(JITTER_FACTOR));
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_loop_counts_ticks_and_snapshots_on_exit() {
        let sink = RecordingSink::default();
        let p = prober("ipv4://192.0.2.1:80?probe_interval=1", &sink).await;

        let cancel = CancellationToken::new();
        let handle = tokio::spawn(run_probe_loop(p, cancel.clone()));

        tokio::time::sleep(Duration::from_millis(5950)).await;
        cancel.cancel();

        let attempts = handle.await.unwrap();
        assert_eq!(attempts, 5);

        let events = sink.events();
        let probes: Vec<u64> = events
            .iter()
            .filter_map(|e| match e {
                Event::Probe(p) => Some(p.attempt),
                _ => None,
            })
            .collect();
        assert_eq!(probes, vec![1, 2, 3, 4, 5]);

        match events.last() {
            Some(Event::Stats(s)) => {
                assert_eq!(s.stats.total_probes, 5);
                assert_eq!(s.samples, 5);
            }
            other => panic!("expected final snapshot, got {:?}", other),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_before_first_tick() {
        let sink = RecordingSink::default();
        let p = prober("ipv4://192.0.2.1:80?probe_interval=10", &sink).await;

        let cancel = CancellationToken::new();
        cancel.cancel();
        assert_eq!(run_probe_loop(p, cancel).await, 0);

        match &sink.events()[..] {
            [Event::Stats(s)] => {
                assert_eq!(s.samples, 0);
                assert_eq!(s.stats.standard_deviation, 0.0);
                assert_eq!(s.stats.skewness, 0.0);
            }
            other => panic!("unexpected events {:?}", other),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_scheduler_waits_for_every_task() {
        let cancel = CancellationToken::new();
        let mut scheduler = Scheduler::new(cancel.clone());

        let first = RecordingSink::default();
        let second = RecordingSink::default();
        scheduler.spawn(prober("ipv4://192.0.2.1:80?probe_interval=1", &first).await);
        scheduler.spawn(prober("ipv4://192.0.2.2:80?probe_interval=2", &second).await);
        assert_eq!(scheduler.len(), 2);

        tokio::time::sleep(Duration::from_millis(5950)).await;
        cancel.cancel();

        let mut reports = scheduler.join().await;
        reports.sort_by(|a, b| a.descriptor.cmp(&b.descriptor));
        assert_eq!(reports.len(), 2);
        assert_eq!(reports[0].attempts, 5);
        assert_eq!(reports[1].attempts, 2);

        for sink in [&first, &second] {
            assert!(matches!(sink.events().last(), Some(Event::Stats(_))));
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_interrupts_in_flight_connect() {
        let sink = RecordingSink::default();
        let p = prober_with("ipv4://192.0.2.1:80?probe_interval=1&probe_timeout=5000", &sink, Hang)
            .await;

        let cancel = CancellationToken::new();
        let handle = tokio::spawn(run_probe_loop(p, cancel.clone()));

        // First tick at 1s plus under 0.88s of jitter; the connect then hangs.
        tokio::time::sleep(Duration::from_millis(2500)).await;
        cancel.cancel();

        assert_eq!(handle.await.unwrap(), 1);

        match &sink.events()[..] {
            [Event::Probe(p), Event::Stats(s)] => {
                assert_eq!(p.attempt, 1);
                assert_eq!(p.error, Some(ProbeError::Cancelled));
                assert!(p.latency < Duration::from_millis(5000));
                assert_eq!(s.stats.total_probes, 1);
                assert_eq!(s.stats.total_failures, 1);
            }
            other => panic!("unexpected events {:?}", other),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_huge_interval_does_not_overflow() {
        let sink = RecordingSink::default();
        let p = prober("ipv4://192.0.2.1:80?probe_interval=18446744073709551615", &sink).await;
        assert_eq!(p.definition().params.interval, Duration::from_secs(u64::MAX));

        let cancel = CancellationToken::new();
        let handle = tokio::spawn(run_probe_loop(p, cancel.clone()));

        tokio::time::sleep(Duration::from_secs(60)).await;
        cancel.cancel();

        assert_eq!(handle.await.unwrap(), 0);
        assert!(matches!(&sink.events()[..], [Event::Stats(_)]));
    }
}
