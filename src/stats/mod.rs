//! Latency statistics for a single task.
//!
//! Running counters are updated on every attempt; windowed aggregates are
//! recomputed from the latency history whenever a snapshot is taken.

mod window;

pub use window::*;

/// Counters and latency aggregates of one task, in milliseconds.
#[derive(Debug, Clone, PartialEq)]
pub struct Stats {
    pub total_probes: u64,
    pub total_successful: u64,
    pub total_failures: u64,
    pub consecutive_successful: u64,
    pub consecutive_failures: u64,
    pub last_latency: f64,
    /// Previous latency minus the current one.
    pub delta_latency: f64,
    pub overall_min_latency: f64,
    pub overall_max_latency: f64,
    pub min_latency: f64,
    pub max_latency: f64,
    pub average_latency: f64,
    pub standard_deviation: f64,
    pub skewness: f64,
}

impl Default for Stats {
    fn default() -> Self {
        Self {
            total_probes: 0,
            total_successful: 0,
            total_failures: 0,
            consecutive_successful: 0,
            consecutive_failures: 0,
            last_latency: 0.0,
            delta_latency: 0.0,
            // any first observation is a new extreme
            overall_min_latency: f64::MAX,
            overall_max_latency: 0.0,
            min_latency: 0.0,
            max_latency: 0.0,
            average_latency: 0.0,
            standard_deviation: 0.0,
            skewness: 0.0,
        }
    }
}

/// Stats as of a snapshot, with the number of window samples behind them.
#[derive(Debug, Clone, PartialEq)]
pub struct StatsSnapshot {
    pub stats: Stats,
    pub samples: u16,
}

/// Latency history plus running counters.
#[derive(Debug, Clone)]
pub struct StatsEngine {
    window: LatencyWindow,
    stats: Stats,
}

impl StatsEngine {
    pub fn new(window_size: u16) -> Self {
        Self {
            window: LatencyWindow::new(window_size),
            stats: Stats::default(),
        }
    }

    /// Account for one attempt. Called exactly once per attempt.
    pub fn record(&mut self, attempt: u64, latency: f64, failed: bool) {
        self.window.push(latency);

        let stats = &mut self.stats;

        stats.delta_latency = stats.last_latency - latency;
        stats.last_latency = latency;

        // follows attempt numbering rather than counting calls
        stats.total_probes = attempt;

        if latency > stats.overall_max_latency {
            stats.overall_max_latency = latency;
        }
        if latency < stats.overall_min_latency {
            stats.overall_min_latency = latency;
        }

        if failed {
            stats.total_failures += 1;
            stats.consecutive_failures += 1;
            stats.consecutive_successful = 0;
        } else {
            stats.total_successful += 1;
            stats.consecutive_successful += 1;
            stats.consecutive_failures = 0;
        }
    }

    /// Recompute the windowed aggregates and return the resulting stats.
    pub fn snapshot(&mut self) -> StatsSnapshot {
        let summary = self.window.summarize();

        let stats = &mut self.stats;
        stats.min_latency = summary.min;
        stats.max_latency = summary.max;
        stats.average_latency = summary.mean;
        stats.standard_deviation = summary.std_dev;
        stats.skewness = summary.skewness;

        StatsSnapshot {
            stats: stats.clone(),
            samples: u16::try_from(summary.samples).unwrap_or(u16::MAX),
        }
    }

    pub fn stats(&self) -> &Stats {
        &self.stats
    }

    pub fn window(&self) -> &LatencyWindow {
        &self.window
    }
}

/// Whether a snapshot is due before `attempt`.
pub fn snapshot_due(attempt: u64, stats_interval: u8) -> bool {
    stats_interval > 0 && attempt > 1 && attempt % u64::from(stats_interval) == 1
}
