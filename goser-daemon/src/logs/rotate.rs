//! Size-based rotating file writer with compressed, age-bounded backups.

use chrono::{DateTime, Utc};
use flate2::write::GzEncoder;
use flate2::Compression;
use parking_lot::Mutex;
use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, warn};

use super::{MAX_LOG_AGE_DAYS, MAX_LOG_BACKUPS, MAX_LOG_FILE_SIZE};

/// Append-only writer that rotates the file once it reaches `max_size`.
///
/// On rotation the current file is renamed to a timestamped backup; a
/// background thread then gzips the backup and prunes backups beyond the
/// count or age bound, keeping compression off the write path.
///
/// Write errors are logged and swallowed: losing a log line must never
/// take a service down with it.
pub struct RotatingFileWriter {
    path: PathBuf,
    file: Option<File>,
    max_size: u64,
    max_backups: usize,
    max_age: chrono::Duration,
    bytes_written: u64,
}

impl RotatingFileWriter {
    pub fn new(path: PathBuf) -> Self {
        Self::with_limits(path, MAX_LOG_FILE_SIZE, MAX_LOG_BACKUPS, MAX_LOG_AGE_DAYS)
    }

    pub fn with_limits(path: PathBuf, max_size: u64, max_backups: usize, max_age_days: i64) -> Self {
        if let Some(parent) = path.parent() {
            let _ = fs::create_dir_all(parent);
        }
        let bytes_written = fs::metadata(&path).map(|m| m.len()).unwrap_or(0);
        Self {
            path,
            file: None,
            max_size,
            max_backups,
            max_age: chrono::Duration::days(max_age_days),
            bytes_written,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn open(&mut self) -> Option<&mut File> {
        if self.file.is_none() {
            match OpenOptions::new().create(true).append(true).open(&self.path) {
                Ok(f) => self.file = Some(f),
                Err(e) => {
                    warn!("failed to open log file {:?}: {}", self.path, e);
                    return None;
                }
            }
        }
        self.file.as_mut()
    }

    fn append(&mut self, data: &[u8]) {
        if self.bytes_written + data.len() as u64 > self.max_size {
            self.rotate();
        }
        if let Some(file) = self.open() {
            match file.write_all(data) {
                Ok(()) => self.bytes_written += data.len() as u64,
                Err(e) => {
                    warn!("failed to write to log file: {}", e);
                    self.file = None;
                }
            }
        }
    }

    /// Rename the active file to a timestamped backup and hand compression
    /// and pruning to a background thread.
    fn rotate(&mut self) {
        self.file = None;

        let backup = backup_path(&self.path, Utc::now());
        if let Err(e) = fs::rename(&self.path, &backup) {
            warn!("failed to rotate log file {:?}: {}", self.path, e);
            return;
        }
        self.bytes_written = 0;
        debug!("rotated {:?} to {:?}", self.path, backup);

        let path = self.path.clone();
        let max_backups = self.max_backups;
        let max_age = self.max_age;
        std::thread::spawn(move || {
            if let Err(e) = compress_backup(&backup) {
                warn!("failed to compress {:?}: {}", backup, e);
            }
            prune_backups(&path, max_backups, max_age);
        });
    }

    pub fn flush_file(&mut self) {
        if let Some(file) = self.file.as_mut() {
            let _ = file.flush();
        }
    }
}

impl Write for RotatingFileWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.append(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.flush_file();
        Ok(())
    }
}

/// Cloneable handle around a shared [`RotatingFileWriter`], usable as a
/// `tracing_subscriber` writer.
#[derive(Clone)]
pub struct SharedRotatingWriter(Arc<Mutex<RotatingFileWriter>>);

impl SharedRotatingWriter {
    pub fn new(writer: RotatingFileWriter) -> Self {
        Self(Arc::new(Mutex::new(writer)))
    }
}

impl Write for SharedRotatingWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.0.lock().flush()
    }
}

fn backup_path(path: &Path, at: DateTime<Utc>) -> PathBuf {
    let stem = path
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("log");
    let stamp = at.format("%Y%m%dT%H%M%S%.3f");
    path.with_file_name(format!("{}-{}.log", stem, stamp))
}

fn compress_backup(backup: &Path) -> io::Result<()> {
    let mut input = File::open(backup)?;
    let gz_path = PathBuf::from(format!("{}.gz", backup.display()));
    let out = File::create(&gz_path)?;
    let mut encoder = GzEncoder::new(out, Compression::default());
    io::copy(&mut input, &mut encoder)?;
    encoder.finish()?.sync_all()?;
    fs::remove_file(backup)?;
    Ok(())
}

/// Remove backups beyond the count bound or older than the age bound.
/// Backups sort newest-first by name thanks to the fixed-width timestamp.
fn prune_backups(path: &Path, max_backups: usize, max_age: chrono::Duration) {
    let Some(dir) = path.parent() else { return };
    let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else {
        return;
    };
    let prefix = format!("{}-", stem);

    let Ok(entries) = fs::read_dir(dir) else { return };
    let mut backups: Vec<PathBuf> = entries
        .flatten()
        .map(|e| e.path())
        .filter(|p| {
            p.file_name()
                .and_then(|n| n.to_str())
                .is_some_and(|n| {
                    n.starts_with(&prefix) && (n.ends_with(".log") || n.ends_with(".log.gz"))
                })
        })
        .collect();
    backups.sort();
    backups.reverse();

    let cutoff = Utc::now() - max_age;
    for (i, backup) in backups.iter().enumerate() {
        let expired = fs::metadata(backup)
            .and_then(|m| m.modified())
            .map(|mtime| DateTime::<Utc>::from(mtime) < cutoff)
            .unwrap_or(false);
        if i >= max_backups || expired {
            debug!("pruning old log backup {:?}", backup);
            let _ = fs::remove_file(backup);
        }
    }
}
