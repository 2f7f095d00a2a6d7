//! Seam to the persistence collaborator.
//!
//! The engine calls the sink fire-and-forget: any error is logged and dropped,
//! and the engine's own state never depends on whether a call succeeded.

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::Context;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::session::SessionRecord;

/// Throttled speed telemetry sample
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SpeedLogEntry {
    pub device_id: String,
    pub speed: f64,
    pub timestamp: DateTime<Utc>,
}

pub trait SessionSink {
    fn log_speed(&mut self, entry: &SpeedLogEntry) -> anyhow::Result<()>;
    fn save_session(&mut self, record: &SessionRecord) -> anyhow::Result<()>;
}

/// Keeps every call in memory; used by tests and dry runs
#[derive(Debug, Default)]
pub struct RecordingSink {
    pub speed_logs: Vec<SpeedLogEntry>,
    pub sessions: Vec<SessionRecord>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SessionSink for RecordingSink {
    fn log_speed(&mut self, entry: &SpeedLogEntry) -> anyhow::Result<()> {
        self.speed_logs.push(entry.clone());
        Ok(())
    }

    fn save_session(&mut self, record: &SessionRecord) -> anyhow::Result<()> {
        self.sessions.push(record.clone());
        Ok(())
    }
}

/// Appends one JSON document per line to `speed_log.jsonl` and `sessions.jsonl`
#[derive(Debug)]
pub struct JsonLinesSink {
    dir: PathBuf,
}

impl JsonLinesSink {
    pub const SPEED_LOG_FILE: &'static str = "speed_log.jsonl";
    pub const SESSIONS_FILE: &'static str = "sessions.jsonl";

    pub fn new(dir: impl AsRef<Path>) -> anyhow::Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir)
            .with_context(|| format!("creating output directory {}", dir.display()))?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn append<T: Serialize>(&self, file: &str, value: &T) -> anyhow::Result<()> {
        let path = self.dir.join(file);
        let line = serde_json::to_string(value)?;
        let mut out = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .with_context(|| format!("opening {}", path.display()))?;
        writeln!(out, "{line}")?;
        Ok(())
    }
}

impl SessionSink for JsonLinesSink {
    fn log_speed(&mut self, entry: &SpeedLogEntry) -> anyhow::Result<()> {
        self.append(Self::SPEED_LOG_FILE, entry)
    }

    fn save_session(&mut self, record: &SessionRecord) -> anyhow::Result<()> {
        self.append(Self::SESSIONS_FILE, record)
    }
}
