//! Recorded fix traces
//!
//! Traces are JSONL files, one delivery per line:
//! - a fix: `{"lat": 47.16, "lng": 27.6, "accuracy": 12.0, "timestamp": 1767617600000}`
//!   with optional `heading` and `speed`
//! - an acquisition error: `{"error": "timeout", "message": "no fix in 10s"}`
//!
//! `TraceSource` replays a trace as a `LocationSource`, either as fast as the
//! session consumes it or paced by the recorded timestamps.

use crate::domain::types::{LocationError, RawFix};
use crate::io::location::{FixResult, LocationSource, WatchOptions};
use anyhow::{bail, Context};
use serde::Deserialize;
use std::fs;
use std::path::Path;
use std::time::Duration;
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info};

/// Longest pause honored between two paced deliveries
const MAX_PACED_GAP: Duration = Duration::from_secs(30);

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum TraceLine {
    Error {
        error: String,
        #[serde(default)]
        message: String,
    },
    Fix(RawFix),
}

fn to_location_error(kind: &str, message: String) -> anyhow::Result<LocationError> {
    Ok(match kind {
        "permission_denied" => LocationError::PermissionDenied(message),
        "unavailable" => LocationError::Unavailable(message),
        "timeout" => LocationError::Timeout(message),
        other => bail!("unknown location error kind {other:?}"),
    })
}

/// RFC 3339 rendering of an epoch-ms fix timestamp, for logs
pub fn format_timestamp(epoch_ms: u64) -> String {
    OffsetDateTime::from_unix_timestamp_nanos(i128::from(epoch_ms) * 1_000_000)
        .ok()
        .and_then(|t| t.format(&Rfc3339).ok())
        .unwrap_or_else(|| epoch_ms.to_string())
}

/// Parse a JSONL trace
pub fn parse_trace(content: &str) -> anyhow::Result<Vec<FixResult>> {
    let mut entries = Vec::new();
    for (idx, line) in content.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let parsed: TraceLine = serde_json::from_str(line)
            .with_context(|| format!("Invalid trace entry on line {}", idx + 1))?;
        let entry = match parsed {
            TraceLine::Fix(fix) => Ok(fix),
            TraceLine::Error { error, message } => Err(to_location_error(&error, message)
                .with_context(|| format!("Invalid trace entry on line {}", idx + 1))?),
        };
        entries.push(entry);
    }
    Ok(entries)
}

/// Load a JSONL trace from disk
pub fn load_trace<P: AsRef<Path>>(path: P) -> anyhow::Result<Vec<FixResult>> {
    let path = path.as_ref();
    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read trace file {}", path.display()))?;
    parse_trace(&content).with_context(|| format!("Failed to parse trace file {}", path.display()))
}

/// Replays recorded deliveries as a location watch
pub struct TraceSource {
    entries: Vec<FixResult>,
    paced: bool,
    task: Option<JoinHandle<()>>,
}

impl TraceSource {
    pub fn new(entries: Vec<FixResult>) -> Self {
        Self { entries, paced: false, task: None }
    }

    /// Sleep between deliveries according to recorded timestamps
    pub fn paced(mut self, paced: bool) -> Self {
        self.paced = paced;
        self
    }
}

impl LocationSource for TraceSource {
    fn start(&mut self, tx: mpsc::Sender<FixResult>, options: WatchOptions) -> anyhow::Result<()> {
        if self.task.is_some() {
            bail!("trace replay already started");
        }

        let entries = std::mem::take(&mut self.entries);
        let paced = self.paced;
        let mut fixes = entries.iter().filter_map(|e| e.as_ref().ok());
        let first = fixes.next().map(|f| f.timestamp);
        let last = fixes.last().map(|f| f.timestamp).or(first);
        info!(
            entries = %entries.len(),
            from = %first.map(format_timestamp).unwrap_or_default(),
            to = %last.map(format_timestamp).unwrap_or_default(),
            paced = %paced,
            high_accuracy = %options.high_accuracy,
            "trace_replay_started"
        );

        self.task = Some(tokio::spawn(async move {
            let mut last_ts: Option<u64> = None;
            for entry in entries {
                if paced {
                    if let Ok(fix) = &entry {
                        if let Some(prev) = last_ts {
                            let gap = Duration::from_millis(fix.timestamp.saturating_sub(prev));
                            tokio::time::sleep(gap.min(MAX_PACED_GAP)).await;
                        }
                        last_ts = Some(fix.timestamp);
                    }
                }
                if tx.send(entry).await.is_err() {
                    debug!("trace_replay_receiver_closed");
                    return;
                }
            }
            info!("trace_replay_finished");
        }));

        Ok(())
    }

    fn stop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
            debug!("trace_replay_stopped");
        }
    }
}

impl Drop for TraceSource {
    fn drop(&mut self) {
        self.stop();
    }
}
