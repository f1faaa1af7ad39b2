// --- File: src/sink.rs ---

//! Scalar sinks receiving finalized results.
//!
//! A sink is a time-series store of `(tag, value, step)` events. The
//! recorder forwards results through a [`RecordFilter`] after every
//! finalize.

use crate::config::ConfigError;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fs::{self, File, OpenOptions};
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use thiserror::Error;

/// File name used by [`JsonlSink`] inside its log directory.
pub const SCALARS_FILE: &str = "scalars.jsonl";

#[derive(Error, Debug)]
pub enum SinkError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// One forwarded value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScalarRecord {
    pub tag: String,
    pub value: f64,
    pub step: u64,
}

/// Destination for scalar events.
pub trait ScalarSink: Send {
    fn add_scalar(&mut self, tag: &str, value: f64, step: u64) -> Result<(), SinkError>;

    /// Makes buffered events durable.
    fn flush(&mut self) -> Result<(), SinkError> {
        Ok(())
    }

    /// Human-readable location, used in log messages.
    fn describe(&self) -> String;
}

/// In-memory sink. Clones share the same record list.
#[derive(Debug, Clone, Default)]
pub struct MemorySink {
    records: Arc<Mutex<Vec<ScalarRecord>>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of every record received so far.
    pub fn records(&self) -> Vec<ScalarRecord> {
        match self.records.lock() {
            Ok(records) => records.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    pub fn tags(&self) -> Vec<String> {
        self.records().into_iter().map(|r| r.tag).collect()
    }
}

impl ScalarSink for MemorySink {
    fn add_scalar(&mut self, tag: &str, value: f64, step: u64) -> Result<(), SinkError> {
        let record = ScalarRecord {
            tag: tag.to_string(),
            value,
            step,
        };
        match self.records.lock() {
            Ok(mut records) => records.push(record),
            Err(poisoned) => poisoned.into_inner().push(record),
        }
        Ok(())
    }

    fn describe(&self) -> String {
        "memory".to_string()
    }
}

/// Appends one JSON object per event to `<log_dir>/scalars.jsonl`.
#[derive(Debug)]
pub struct JsonlSink {
    path: PathBuf,
    writer: BufWriter<File>,
}

impl JsonlSink {
    /// Creates `log_dir` if needed and opens the event file for appending.
    pub fn create(log_dir: impl AsRef<Path>) -> Result<Self, SinkError> {
        let log_dir = log_dir.as_ref();
        fs::create_dir_all(log_dir)?;
        let path = log_dir.join(SCALARS_FILE);
        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        Ok(Self {
            path,
            writer: BufWriter::new(file),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Reads back every event of a file written by this sink.
    pub fn read_records(path: impl AsRef<Path>) -> Result<Vec<ScalarRecord>, SinkError> {
        let reader = BufReader::new(File::open(path)?);
        let mut records = Vec::new();
        for line in reader.lines() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            records.push(serde_json::from_str(&line)?);
        }
        Ok(records)
    }
}

impl ScalarSink for JsonlSink {
    fn add_scalar(&mut self, tag: &str, value: f64, step: u64) -> Result<(), SinkError> {
        let record = ScalarRecord {
            tag: tag.to_string(),
            value,
            step,
        };
        serde_json::to_writer(&mut self.writer, &record)?;
        self.writer.write_all(b"\n")?;
        Ok(())
    }

    fn flush(&mut self) -> Result<(), SinkError> {
        self.writer.flush()?;
        Ok(())
    }

    fn describe(&self) -> String {
        self.path.display().to_string()
    }
}

/// Allow-list of result keys forwarded to a sink.
///
/// A key passes when any pattern matches at its start. An absent or empty
/// list lets every key through.
#[derive(Debug, Clone, Default)]
pub struct RecordFilter {
    patterns: Vec<(String, Regex)>,
}

impl RecordFilter {
    pub fn allow_all() -> Self {
        Self::default()
    }

    /// Compiles every pattern; an invalid pattern is a configuration error.
    pub fn new<S: AsRef<str>>(patterns: &[S]) -> Result<Self, ConfigError> {
        let patterns = patterns
            .iter()
            .map(|p| {
                let p = p.as_ref();
                Regex::new(&format!("^(?:{})", p))
                    .map(|re| (p.to_string(), re))
                    .map_err(|source| ConfigError::InvalidPattern {
                        pattern: p.to_string(),
                        source,
                    })
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { patterns })
    }

    pub fn from_option(patterns: Option<&[String]>) -> Result<Self, ConfigError> {
        match patterns {
            Some(p) => Self::new(p),
            None => Ok(Self::allow_all()),
        }
    }

    pub fn is_allow_all(&self) -> bool {
        self.patterns.is_empty()
    }

    pub fn patterns(&self) -> Vec<&str> {
        self.patterns.iter().map(|(p, _)| p.as_str()).collect()
    }

    pub fn matches(&self, key: &str) -> bool {
        self.is_allow_all() || self.patterns.iter().any(|(_, re)| re.is_match(key))
    }
}
