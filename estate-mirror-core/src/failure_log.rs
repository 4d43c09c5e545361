//! Append-only, timestamped record of per-job failures for operators.
//!
//! One file per process invocation, named after the invocation's start time so
//! repeated runs never clobber each other. Concurrent jobs share a single
//! handle; writes are serialized so records never interleave.

use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use chrono::{DateTime, Local, SecondsFormat};
use tracing::error;

use crate::error::FailureLogError;

#[derive(Debug)]
pub struct FailureLog {
    path: PathBuf,
    file: Mutex<File>,
}

impl FailureLog {
    /// Open `<dir>/error-YYYYMMDD-HHMMSS.log` for appending.
    pub fn create(dir: &Path, started_at: DateTime<Local>) -> Result<Self, FailureLogError> {
        let path = dir.join(Self::file_name(started_at));
        let open_err = |source: std::io::Error| FailureLogError::Open {
            path: path.clone(),
            source,
        };

        std::fs::create_dir_all(dir).map_err(open_err)?;
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(open_err)?;

        Ok(Self {
            path,
            file: Mutex::new(file),
        })
    }

    pub fn file_name(started_at: DateTime<Local>) -> String {
        format!("error-{}.log", started_at.format("%Y%m%d-%H%M%S"))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append one `ERROR` record. Continuation lines of a multi-line message
    /// are indented so the record stays one contiguous block.
    pub fn record(&self, message: &str) -> Result<(), FailureLogError> {
        let timestamp = Local::now().to_rfc3339_opts(SecondsFormat::Millis, false);
        let mut lines = message.trim_end().lines();
        let mut entry = format!("{timestamp} - ERROR - {}\n", lines.next().unwrap_or(""));
        for line in lines {
            entry.push_str("    ");
            entry.push_str(line);
            entry.push('\n');
        }

        // Poisoning is ignored; the handle stays valid.
        let mut file = self.file.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        file.write_all(entry.as_bytes())?;
        file.flush()?;
        Ok(())
    }

    /// Like [`FailureLog::record`], for callers that must not fail: a write
    /// error is reported through tracing instead.
    pub fn record_or_trace(&self, message: &str) {
        if let Err(e) = self.record(message) {
            error!(error = %e, path = %self.path.display(), "Failed to write failure log record");
        }
    }
}
