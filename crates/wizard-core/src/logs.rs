//! Run artifacts: conversation logs, improvement records and the run counter
//!
//! Writing is best-effort. `emit` logs sink failures at `warn` and carries on;
//! nothing here can stop the controller.

use anyhow::{Context, Result};
use chrono::{DateTime, SecondsFormat, Utc};
use serde::Serialize;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};
use tracing::{debug, warn};

use crate::controller::{ImprovementRecord, ImprovementStatus};
use crate::conversation::ConversationLog;

const RUN_COUNTER_FILE: &str = "run_counter.txt";
const IMPROVED_PROMPTS_FILE: &str = "improved_prompts.txt";
const IMPROVEMENTS_FILE: &str = "improvements.jsonl";
const WRAP_WIDTH: usize = 150;

/// Something worth persisting
#[derive(Debug, Clone, Copy)]
pub enum LogRecord<'a> {
    Conversation(&'a ConversationLog),
    Improvement(&'a ImprovementRecord),
}

pub trait LogSink: Send + Sync {
    fn append(&self, record: &LogRecord<'_>) -> Result<()>;
}

/// Append a record, downgrading failures to a warning
pub fn emit(sink: &dyn LogSink, record: LogRecord<'_>) {
    if let Err(e) = sink.append(&record) {
        warn!("Failed to write log record: {:#}", e);
    }
}

/// Discards everything
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSink;

impl LogSink for NullSink {
    fn append(&self, _record: &LogRecord<'_>) -> Result<()> {
        Ok(())
    }
}

/// Keeps records in memory, for embedding and inspection
#[derive(Debug, Default)]
pub struct MemorySink {
    conversations: Mutex<Vec<ConversationLog>>,
    improvements: Mutex<Vec<ImprovementRecord>>,
}

impl MemorySink {
    pub fn conversations(&self) -> Vec<ConversationLog> {
        lock(&self.conversations).clone()
    }

    pub fn improvements(&self) -> Vec<ImprovementRecord> {
        lock(&self.improvements).clone()
    }
}

impl LogSink for MemorySink {
    fn append(&self, record: &LogRecord<'_>) -> Result<()> {
        match record {
            LogRecord::Conversation(log) => lock(&self.conversations).push((*log).clone()),
            LogRecord::Improvement(r) => lock(&self.improvements).push((*r).clone()),
        }
        Ok(())
    }
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Writes records under a logs directory
///
/// - each conversation: `{wizard_id}_{persona_id}_{timestamp}.json`
/// - each improvement: one line in `improvements.jsonl`, and for improved
///   prompts one line in `improved_prompts.txt`
#[derive(Debug, Clone)]
pub struct JsonFileSink {
    dir: PathBuf,
    run_no: u64,
}

impl JsonFileSink {
    pub fn new(dir: impl Into<PathBuf>, run_no: u64) -> Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir).with_context(|| format!("creating logs dir {}", dir.display()))?;
        Ok(Self { dir, run_no })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn write_conversation(&self, log: &ConversationLog) -> Result<()> {
        let filename = format!(
            "{}_{}_{}.json",
            log.wizard_id,
            log.persona_id,
            compact_timestamp(Utc::now())
        );
        let path = self.dir.join(filename);
        save_json(&path, log)?;
        debug!("Saved conversation log to {}", path.display());
        Ok(())
    }

    fn write_improvement(&self, record: &ImprovementRecord) -> Result<()> {
        let line = serde_json::to_string(record)?;
        append_line(&self.dir.join(IMPROVEMENTS_FILE), &line)?;

        if record.status == ImprovementStatus::Improved {
            let line = format!(
                "{} run={} instructions=\"{}\"",
                record.timestamp.to_rfc3339(),
                self.run_no,
                wrap_text(&record.new_prompt, WRAP_WIDTH)
            );
            append_line(&self.dir.join(IMPROVED_PROMPTS_FILE), &line)?;
        }
        Ok(())
    }
}

impl LogSink for JsonFileSink {
    fn append(&self, record: &LogRecord<'_>) -> Result<()> {
        match record {
            LogRecord::Conversation(log) => self.write_conversation(log),
            LogRecord::Improvement(record) => self.write_improvement(record),
        }
    }
}

fn append_line(path: &Path, line: &str) -> Result<()> {
    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .with_context(|| format!("opening {}", path.display()))?;
    writeln!(file, "{}", line)?;
    Ok(())
}

/// Pretty-printed JSON, parent directories created as needed
pub fn save_json<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let content = serde_json::to_string_pretty(value)?;
    fs::write(path, content).with_context(|| format!("writing {}", path.display()))?;
    Ok(())
}

/// RFC 3339 timestamp without `:` and `-`, safe for file names
pub fn compact_timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Micros, true)
        .replace(':', "")
        .replace('-', "")
}

/// `{run}.{index}_{compact timestamp}`
pub fn format_agent_id(run_no: u64, index: usize) -> String {
    format!("{}.{}_{}", run_no, index, compact_timestamp(Utc::now()))
}

/// Hard-wrap every line at `width` characters
pub fn wrap_text(text: &str, width: usize) -> String {
    let mut lines = Vec::new();
    for line in text.lines() {
        let chars: Vec<char> = line.chars().collect();
        if chars.is_empty() {
            lines.push(String::new());
            continue;
        }
        for chunk in chars.chunks(width.max(1)) {
            lines.push(chunk.iter().collect::<String>());
        }
    }
    lines.join("\n")
}

/// Persistent run number stored in `run_counter.txt`
pub struct RunCounter {
    path: PathBuf,
}

impl RunCounter {
    pub fn new(logs_dir: impl AsRef<Path>) -> Self {
        Self {
            path: logs_dir.as_ref().join(RUN_COUNTER_FILE),
        }
    }

    /// Current value; 0 if the file is missing or unreadable
    pub fn current(&self) -> u64 {
        fs::read_to_string(&self.path)
            .ok()
            .and_then(|s| s.trim().parse().ok())
            .unwrap_or(0)
    }

    /// Bump, persist and return the new run number
    pub fn increment(&self) -> Result<u64> {
        let next = self.current() + 1;
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&self.path, next.to_string())
            .with_context(|| format!("writing {}", self.path.display()))?;
        Ok(next)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::controller::ImprovementRecord;
    use crate::optimizer::OptimizationMetrics;
    use crate::testing::judged_log;

    fn record(status: ImprovementStatus, new_prompt: &str) -> ImprovementRecord {
        ImprovementRecord {
            timestamp: Utc::now(),
            old_prompt: "old".to_string(),
            new_prompt: new_prompt.to_string(),
            metrics: OptimizationMetrics::default(),
            conversation_count: 1,
            status,
        }
    }

    #[test]
    fn test_run_counter_starts_at_one_and_persists() {
        let dir = tempfile::tempdir().unwrap();
        let counter = RunCounter::new(dir.path());
        assert_eq!(counter.current(), 0);
        assert_eq!(counter.increment().unwrap(), 1);
        assert_eq!(RunCounter::new(dir.path()).increment().unwrap(), 2);
    }

    #[test]
    fn test_run_counter_ignores_garbage() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join(RUN_COUNTER_FILE), "not a number").unwrap();
        assert_eq!(RunCounter::new(dir.path()).increment().unwrap(), 1);
    }

    #[test]
    fn test_agent_id_shape() {
        let id = format_agent_id(3, 7);
        assert!(id.starts_with("3.7_"));
        let ts = &id["3.7_".len()..];
        assert!(!ts.contains(':'));
        assert!(!ts.contains('-'));
        assert!(ts.ends_with('Z'));
    }

    #[test]
    fn test_wrap_text_at_width() {
        let long = "a".repeat(320);
        let wrapped = wrap_text(&long, 150);
        let lines: Vec<&str> = wrapped.split('\n').collect();
        assert_eq!(lines.iter().map(|l| l.len()).collect::<Vec<_>>(), vec![150, 150, 20]);
        assert_eq!(wrap_text("short\n\nlines", 150), "short\n\nlines");
    }

    #[test]
    fn test_conversation_written_as_json() {
        let dir = tempfile::tempdir().unwrap();
        let sink = JsonFileSink::new(dir.path(), 1).unwrap();
        let log = judged_log("1.1_x", 0.5);

        sink.append(&LogRecord::Conversation(&log)).unwrap();

        let files: Vec<PathBuf> = fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().path())
            .collect();
        assert_eq!(files.len(), 1);
        let name = files[0].file_name().unwrap().to_string_lossy().to_string();
        assert!(name.starts_with("Wizard_001_1.1_x_"));
        assert!(name.ends_with(".json"));

        let parsed: ConversationLog =
            serde_json::from_str(&fs::read_to_string(&files[0]).unwrap()).unwrap();
        assert_eq!(parsed, log);
    }

    #[test]
    fn test_improvements_logged() {
        let dir = tempfile::tempdir().unwrap();
        let sink = JsonFileSink::new(dir.path(), 4).unwrap();

        sink.append(&LogRecord::Improvement(&record(ImprovementStatus::Improved, "Ask to buy")))
            .unwrap();
        sink.append(&LogRecord::Improvement(&record(ImprovementStatus::NoUsablePrompt, "")))
            .unwrap();

        let prompts = fs::read_to_string(dir.path().join(IMPROVED_PROMPTS_FILE)).unwrap();
        assert_eq!(prompts.lines().count(), 1);
        assert!(prompts.contains(" run=4 instructions=\"Ask to buy\""));

        let records = fs::read_to_string(dir.path().join(IMPROVEMENTS_FILE)).unwrap();
        assert_eq!(records.lines().count(), 2);
    }

    #[test]
    fn test_memory_sink_keeps_records() {
        let sink = MemorySink::default();
        let log = judged_log("p", 0.5);
        emit(&sink, LogRecord::Conversation(&log));
        emit(&sink, LogRecord::Improvement(&record(ImprovementStatus::Improved, "new")));

        assert_eq!(sink.conversations(), vec![log]);
        assert_eq!(sink.improvements().len(), 1);
        assert_eq!(sink.improvements()[0].new_prompt, "new");
    }

    #[test]
    fn test_emit_swallows_errors() {
        struct Broken;
        impl LogSink for Broken {
            fn append(&self, _record: &LogRecord<'_>) -> Result<()> {
                anyhow::bail!("disk full")
            }
        }
        let log = judged_log("p", 0.1);
        emit(&Broken, LogRecord::Conversation(&log));
        emit(&NullSink, LogRecord::Conversation(&log));
    }
}
