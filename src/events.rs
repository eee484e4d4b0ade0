//! Event log for answered questions.
//!
//! Each handled question produces one record: what was asked, what was
//! answered, where the click landed, and what the completion cost. The log is
//! an append-only CSV opened per write for crash safety; rows written before
//! a crash survive it.

use anyhow::{Context, Result};
use chrono::{DateTime, Local};
use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

/// CSV header row.
const CSV_HEADER: &str = "timestamp,question,answer,x,y,input_tokens,output_tokens,cost";

/// One answered (or cache-hit, or failed) question.
#[derive(Clone, Debug, PartialEq)]
pub struct QuizEvent {
    pub timestamp: DateTime<Local>,
    pub question: String,
    pub answer: String,
    pub x: i32,
    pub y: i32,
    pub input_tokens: u32,
    pub output_tokens: u32,
    pub cost: f64,
}

/// Sink for quiz events.
pub trait EventLog: Send {
    fn append(&mut self, event: &QuizEvent) -> Result<()>;
}

/// Append-only CSV event log.
pub struct CsvEventLog {
    path: PathBuf,
}

impl CsvEventLog {
    /// Opens the log, writing the header if the file is new or empty.
    /// Existing rows are preserved.
    pub fn new(path: &Path) -> Result<Self> {
        if path.exists() {
            let file = File::open(path).context("Failed to open existing event log")?;
            let reader = BufReader::new(file);
            if reader.lines().next().is_some() {
                return Ok(Self { path: path.to_path_buf() });
            }
        }

        let mut file = File::create(path).context("Failed to create event log")?;
        writeln!(file, "{}", CSV_HEADER).context("Failed to write event log header")?;
        Ok(Self { path: path.to_path_buf() })
    }
}

impl EventLog for CsvEventLog {
    fn append(&mut self, event: &QuizEvent) -> Result<()> {
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .context("Failed to open event log for append")?;

        let line = format!(
            "{},{},{},{},{},{},{},{:.6}",
            event.timestamp.format("%Y-%m-%dT%H:%M:%S"),
            escape_field(&event.question),
            escape_field(&event.answer),
            event.x,
            event.y,
            event.input_tokens,
            event.output_tokens,
            event.cost,
        );

        writeln!(file, "{}", line).context("Failed to write event log row")?;
        Ok(())
    }
}

/// Quotes a field when it contains CSV metacharacters.
fn escape_field(field: &str) -> String {
    if field.contains(',') || field.contains('"') || field.contains('\n') {
        format!("\"{}\"", field.replace('"', "\"\""))
    } else {
        field.to_string()
    }
}
