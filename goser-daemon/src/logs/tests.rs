use super::*;
use std::fs;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use tempfile::TempDir;

#[tokio::test]
async fn captures_lines_in_order_with_stream_labels() {
    let dir = TempDir::new().unwrap();
    let collector = Arc::new(LogCollector::new(
        "demo",
        dir.path().join("demo.log"),
        None,
    ));

    let stdout: &[u8] = b"one\ntwo\nthree\n";
    collector.clone().collect(stdout, LogStream::Stdout).await;

    let lines = collector.get_lines(10);
    assert_eq!(lines.len(), 3);
    assert_eq!(
        lines.iter().map(|l| l.line.as_str()).collect::<Vec<_>>(),
        vec!["one", "two", "three"]
    );
    assert!(lines.iter().all(|l| l.stream == LogStream::Stdout));
    assert!(lines.iter().all(|l| l.service == "demo"));
}

#[tokio::test]
async fn partial_line_at_eof_is_flushed() {
    let dir = TempDir::new().unwrap();
    let collector = Arc::new(LogCollector::new("demo", dir.path().join("demo.log"), None));

    let stdout: &[u8] = b"complete\ntrailing without newline";
    collector.clone().collect(stdout, LogStream::Stderr).await;

    let lines = collector.get_lines(10);
    assert_eq!(lines.len(), 2);
    assert_eq!(lines[1].line, "trailing without newline");
    assert_eq!(lines[1].stream, LogStream::Stderr);
}

#[tokio::test]
async fn ring_is_bounded_and_tail_returns_newest() {
    let dir = TempDir::new().unwrap();
    let collector = Arc::new(LogCollector::new("demo", dir.path().join("demo.log"), None));

    let mut input = String::new();
    for i in 0..(RING_CAPACITY + 50) {
        input.push_str(&format!("line {}\n", i));
    }
    collector
        .clone()
        .collect(input.as_bytes(), LogStream::Stdout)
        .await;

    let all = collector.get_lines(usize::MAX);
    assert_eq!(all.len(), RING_CAPACITY);
    assert_eq!(all[0].line, "line 50");
    assert_eq!(all.last().unwrap().line, format!("line {}", RING_CAPACITY + 49));

    let tail = collector.get_lines(3);
    assert_eq!(tail.len(), 3);
    assert_eq!(tail[0].line, format!("line {}", RING_CAPACITY + 47));
}

#[tokio::test]
async fn callback_sees_every_line() {
    let dir = TempDir::new().unwrap();
    let seen = Arc::new(AtomicUsize::new(0));
    let counter = seen.clone();
    let callback: LogCallback = Arc::new(move |entry| {
        assert_eq!(entry.service, "demo");
        counter.fetch_add(1, Ordering::SeqCst);
    });

    let collector = Arc::new(LogCollector::new(
        "demo",
        dir.path().join("demo.log"),
        Some(callback),
    ));
    let stdout: &[u8] = b"a\nb\nc\n";
    collector.clone().collect(stdout, LogStream::Stdout).await;

    assert_eq!(seen.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn lines_land_in_the_log_file() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("demo.log");
    let collector = Arc::new(LogCollector::new("demo", path.clone(), None));

    let stdout: &[u8] = b"hello\n";
    collector.clone().collect(stdout, LogStream::Stdout).await;
    collector.close();

    let content = fs::read_to_string(&path).unwrap();
    assert!(content.contains("[stdout] hello"), "got: {content:?}");
}

#[test]
fn rotation_keeps_a_bounded_set_of_backups() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("rot.log");
    // Tiny max size so every write rotates.
    let mut writer = RotatingFileWriter::with_limits(path.clone(), 64, 2, 7);

    use std::io::Write;
    for i in 0..6 {
        let line = format!("{:02} {}\n", i, "x".repeat(80));
        writer.write_all(line.as_bytes()).unwrap();
    }
    writer.flush().unwrap();

    // Rotation hands compression/pruning to a background thread.
    std::thread::sleep(std::time::Duration::from_millis(300));

    let backups: Vec<_> = fs::read_dir(dir.path())
        .unwrap()
        .flatten()
        .map(|e| e.file_name().to_string_lossy().into_owned())
        .filter(|n| n.starts_with("rot-"))
        .collect();
    assert!(
        backups.len() <= 2,
        "expected at most 2 backups, got {:?}",
        backups
    );
    assert!(path.exists(), "active log file must survive rotation");
}
