//! Rotating log file sink.

use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::PathBuf;
use std::time::Duration;

use chrono::{DateTime, Utc};

use super::{DnsUpdateEvent, EventSink, ProbeEvent, Renderer};
use crate::probe::{parse_bool, ProbeParams, TaskDefinition};
use crate::stats::StatsSnapshot;

pub const PARAM_LOGZ_DIR: &str = "logz_dir";
pub const PARAM_LOGZ_NAME: &str = "logz_name";
pub const PARAM_LOGZ_ROTATE_SECS: &str = "logz_rotate_secs";
pub const PARAM_LOGZ_SYNC: &str = "logz_sync";

const DEFAULT_LOGZ_NAME: &str = "tcpping";
const DEFAULT_ROTATE_PERIOD: Duration = Duration::from_secs(3600);

/// Where and how often to rotate log files.
#[derive(Debug, Clone, PartialEq)]
pub struct RotationOptions {
    pub dir: PathBuf,
    pub name: String,
    pub period: Duration,
    /// fsync after every line
    pub sync: bool,
}

impl RotationOptions {
    /// Read the `logz_*` sink options; `None` unless `logz_dir` is set.
    pub fn from_params(params: &ProbeParams) -> Option<Self> {
        let dir = params.sink_option(PARAM_LOGZ_DIR).filter(|d| !d.is_empty())?;

        let name = params
            .sink_option(PARAM_LOGZ_NAME)
            .filter(|n| !n.is_empty())
            .unwrap_or(DEFAULT_LOGZ_NAME);

        let period = params
            .sink_option(PARAM_LOGZ_ROTATE_SECS)
            .and_then(|s| s.parse::<u64>().ok())
            .filter(|s| *s > 0)
            .map(Duration::from_secs)
            .unwrap_or(DEFAULT_ROTATE_PERIOD);

        let sync = params
            .sink_option(PARAM_LOGZ_SYNC)
            .and_then(parse_bool)
            .unwrap_or(false);

        Some(Self {
            dir: PathBuf::from(dir),
            name: name.to_string(),
            period,
            sync,
        })
    }
}

/// Appends lines to a file that is replaced every rotation period.
#[derive(Debug)]
pub struct RotatingWriter {
    options: RotationOptions,
    current: Option<(File, DateTime<Utc>)>,
    rotations: u64,
}

impl RotatingWriter {
    pub fn open(options: RotationOptions) -> io::Result<Self> {
        fs::create_dir_all(&options.dir)?;
        Ok(Self {
            options,
            current: None,
            rotations: 0,
        })
    }

    fn expired(&self, now: DateTime<Utc>) -> bool {
        match &self.current {
            None => true,
            Some((_, opened)) => {
                now.signed_duration_since(*opened)
                    .to_std()
                    .unwrap_or_default()
                    >= self.options.period
            }
        }
    }

    fn path_for(&self, now: DateTime<Utc>) -> PathBuf {
        self.options.dir.join(format!(
            "{}.{}.{}.log",
            self.options.name,
            now.format("%Y%m%dT%H%M%SZ"),
            self.rotations
        ))
    }

    pub fn write_line(&mut self, line: &str) -> io::Result<()> {
        let now = Utc::now();
        if self.expired(now) {
            let path = self.path_for(now);
            let file = OpenOptions::new().create(true).append(true).open(&path)?;
            tracing::debug!("Rotated log file to {}", path.display());
            self.current = Some((file, now));
            self.rotations += 1;
        }

        if let Some((file, _)) = self.current.as_mut() {
            writeln!(file, "{}", line)?;
            if self.options.sync {
                file.sync_all()?;
            }
        }
        Ok(())
    }
}

/// Writes rendered events to rotating files.
#[derive(Debug)]
pub struct RotatingFileSink {
    renderer: Renderer,
    writer: RotatingWriter,
}

impl RotatingFileSink {
    pub fn open(renderer: Renderer, options: RotationOptions) -> io::Result<Self> {
        Ok(Self {
            renderer,
            writer: RotatingWriter::open(options)?,
        })
    }

    fn emit(&mut self, line: String) {
        if let Err(e) = self.writer.write_line(&line) {
            tracing::warn!("Failed to write event for {}: {}", self.renderer.id(), e);
        }
    }
}

impl EventSink for RotatingFileSink {
    fn probe(&mut self, task: &TaskDefinition, event: &ProbeEvent) {
        let line = self.renderer.probe(task, event);
        self.emit(line);
    }

    fn stats(&mut self, task: &TaskDefinition, snapshot: &StatsSnapshot) {
        let line = self.renderer.stats(task, snapshot);
        self.emit(line);
    }

    fn dns_update(&mut self, task: &TaskDefinition, event: &DnsUpdateEvent) {
        let line = self.renderer.dns_update(task, event);
        self.emit(line);
    }
}
