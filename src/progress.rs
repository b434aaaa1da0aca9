//! Ingest progress reporting.
//!
//! Reports one event per batch so users see how far a run has come.
//! Progress is emitted on **stderr** so stdout remains parseable for scripts.

use std::io::Write;

use vector_ingest_core::batch::BatchReport;

/// A single progress event for an ingest run.
#[derive(Clone, Debug)]
pub enum ProgressEvent {
    /// Loading the entries of a batch (sources or images).
    Loading {
        phase: String,
        batch: usize,
        total: usize,
    },
    /// A batch finished (inserted and persisted, or nothing new).
    BatchDone {
        phase: String,
        total: usize,
        report: BatchReport,
    },
}

/// Reports progress. Implementations write to stderr (human or JSON).
pub trait ProgressReporter: Send + Sync {
    fn report(&self, event: ProgressEvent);
}

/// Human-friendly progress on stderr:
/// "ingest documents  batch 3 / 12  seen 50  new 4  duplicates 46  failed 0".
pub struct StderrProgress;

impl ProgressReporter for StderrProgress {
    fn report(&self, event: ProgressEvent) {
        let line = match &event {
            ProgressEvent::Loading {
                phase,
                batch,
                total,
            } => format!(
                "ingest {}  batch {} / {}  loading...\n",
                phase,
                format_number(*batch as u64),
                format_number(*total as u64)
            ),
            ProgressEvent::BatchDone {
                phase,
                total,
                report,
            } => format!(
                "ingest {}  batch {} / {}  seen {}  new {}  duplicates {}  failed {}\n",
                phase,
                format_number(report.batch as u64),
                format_number(*total as u64),
                format_number(report.seen as u64),
                format_number(report.committed as u64),
                format_number(report.duplicates as u64),
                format_number(report.failed as u64)
            ),
        };
        let mut stderr = std::io::stderr().lock();
        let _ = stderr.write_all(line.as_bytes());
        let _ = stderr.flush();
    }
}

/// Machine-readable progress: one JSON object per line on stderr.
pub struct JsonProgress;

impl ProgressReporter for JsonProgress {
    fn report(&self, event: ProgressEvent) {
        let obj = match &event {
            ProgressEvent::Loading {
                phase,
                batch,
                total,
            } => serde_json::json!({
                "event": "progress",
                "phase": phase,
                "state": "loading",
                "batch": batch,
                "total": total
            }),
            ProgressEvent::BatchDone {
                phase,
                total,
                report,
            } => serde_json::json!({
                "event": "progress",
                "phase": phase,
                "state": "done",
                "batch": report.batch,
                "total": total,
                "seen": report.seen,
                "duplicates": report.duplicates,
                "committed": report.committed,
                "failed": report.failed
            }),
        };
        if let Ok(line) = serde_json::to_string(&obj) {
            let mut stderr = std::io::stderr().lock();
            let _ = writeln!(stderr, "{}", line);
            let _ = stderr.flush();
        }
    }
}

/// No-op reporter when progress is disabled.
pub struct NoProgress;

impl ProgressReporter for NoProgress {
    fn report(&self, _event: ProgressEvent) {}
}

pub(crate) fn format_number(n: u64) -> String {
    let s = n.to_string();
    let mut result = String::with_capacity(s.len() + (s.len() - 1) / 3);
    let chars: Vec<char> = s.chars().rev().collect();
    for (i, c) in chars.iter().enumerate() {
        if i > 0 && i % 3 == 0 {
            result.push(',');
        }
        result.push(*c);
    }
    result.chars().rev().collect()
}

/// Progress mode for the CLI: off, human (stderr), or JSON (stderr).
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ProgressMode {
    Off,
    Human,
    Json,
}

impl ProgressMode {
    /// Default: human progress when stderr is a TTY, otherwise off.
    pub fn default_for_tty() -> Self {
        if atty::is(atty::Stream::Stderr) {
            ProgressMode::Human
        } else {
            ProgressMode::Off
        }
    }

    pub fn parse(value: &str) -> anyhow::Result<Self> {
        match value {
            "off" => Ok(ProgressMode::Off),
            "human" => Ok(ProgressMode::Human),
            "json" => Ok(ProgressMode::Json),
            other => anyhow::bail!("Unknown progress mode: '{}'. Use human, json, or off.", other),
        }
    }

    pub fn reporter(&self) -> Box<dyn ProgressReporter> {
        match self {
            ProgressMode::Off => Box::new(NoProgress),
            ProgressMode::Human => Box::new(StderrProgress),
            ProgressMode::Json => Box::new(JsonProgress),
        }
    }
}
