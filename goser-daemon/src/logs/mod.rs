//! Per-service log capture.
//!
//! Each managed service gets a [`LogCollector`] that fans every captured
//! line into three places: a size-rotated log file, a bounded in-memory
//! ring for tail queries, and an optional subscriber callback for push
//! delivery. The rotation policy (size, backups, age, compression) is
//! fixed daemon-wide.

mod collector;
mod rotate;

pub use collector::{LogCallback, LogCollector};
pub use rotate::{RotatingFileWriter, SharedRotatingWriter};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Rotate a log file once it reaches this size.
pub const MAX_LOG_FILE_SIZE: u64 = 50 * 1024 * 1024;

/// Keep at most this many rotated backups per log file.
pub const MAX_LOG_BACKUPS: usize = 3;

/// Drop rotated backups older than this many days.
pub const MAX_LOG_AGE_DAYS: i64 = 7;

/// Number of log lines each service keeps in memory for tail queries.
pub const RING_CAPACITY: usize = 1000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogStream {
    Stdout,
    Stderr,
}

impl LogStream {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogStream::Stdout => "stdout",
            LogStream::Stderr => "stderr",
        }
    }
}

impl std::fmt::Display for LogStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A single captured log line.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogEntry {
    pub service: String,
    pub line: String,
    pub stream: LogStream,
    pub timestamp: DateTime<Utc>,
}

#[cfg(test)]
mod tests;
