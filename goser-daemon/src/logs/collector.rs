//! Line-oriented capture from a service's stdout/stderr.

use chrono::Utc;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tracing::debug;

use super::{LogEntry, LogStream, RotatingFileWriter, RING_CAPACITY};

/// Callback invoked for every captured line. Must not block: the
/// supervisor's implementation only enqueues an event and returns.
pub type LogCallback = Arc<dyn Fn(LogEntry) + Send + Sync>;

/// Captures both output streams of one service.
///
/// The two stream readers run concurrently; the ring and the file writer
/// are each guarded by their own lock, taken per line and never across an
/// await.
pub struct LogCollector {
    service: String,
    writer: Mutex<RotatingFileWriter>,
    ring: Mutex<VecDeque<LogEntry>>,
    callback: Option<LogCallback>,
}

impl LogCollector {
    pub fn new(service: &str, log_file: PathBuf, callback: Option<LogCallback>) -> Self {
        Self {
            service: service.to_string(),
            writer: Mutex::new(RotatingFileWriter::new(log_file)),
            ring: Mutex::new(VecDeque::with_capacity(RING_CAPACITY)),
            callback,
        }
    }

    /// Read one stream line by line until EOF. A partial line at EOF is
    /// flushed as its own entry.
    pub async fn collect(self: Arc<Self>, stream: impl AsyncRead + Unpin, label: LogStream) {
        let reader = BufReader::new(stream);
        let mut lines = reader.lines();
        while let Ok(Some(line)) = lines.next_line().await {
            self.record(line, label);
        }
        debug!("{} {} stream closed", self.service, label);
    }

    /// Fan one completed line out to the file, the ring and the subscriber.
    fn record(&self, line: String, label: LogStream) {
        let entry = LogEntry {
            service: self.service.clone(),
            line,
            stream: label,
            timestamp: Utc::now(),
        };

        {
            let mut writer = self.writer.lock();
            let formatted = format!(
                "{} [{}] {}\n",
                entry.timestamp.to_rfc3339(),
                label,
                entry.line
            );
            let _ = writer.write_all(formatted.as_bytes());
        }

        {
            let mut ring = self.ring.lock();
            ring.push_back(entry.clone());
            while ring.len() > RING_CAPACITY {
                ring.pop_front();
            }
        }

        if let Some(callback) = &self.callback {
            callback(entry);
        }
    }

    /// Last `min(n, buffered)` entries, oldest first.
    pub fn get_lines(&self, n: usize) -> Vec<LogEntry> {
        let ring = self.ring.lock();
        let skip = ring.len().saturating_sub(n);
        ring.iter().skip(skip).cloned().collect()
    }

    /// Flush buffered file output. Safe to call after the process exited.
    pub fn close(&self) {
        self.writer.lock().flush_file();
    }
}
