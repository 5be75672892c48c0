//! Log capture through the full supervisor path.

use goser_daemon::logs::LogStream;
use goser_daemon::process::ServiceState;
use goser_daemon::supervisor::EventType;
use goser_tests::helpers::config_builder::TestServiceBuilder;
use goser_tests::helpers::harness::TestHarness;
use goser_tests::helpers::wait::wait_for;
use std::time::Duration;

#[tokio::test]
async fn tail_returns_captured_lines_in_order() {
    let harness = TestHarness::new();
    let name = harness
        .add(TestServiceBuilder::shell("talker", "echo one; echo two; echo three").build())
        .await;

    harness.supervisor.start_service(&name).await.unwrap();

    wait_for("service stopped", Duration::from_secs(5), || {
        harness.supervisor.service_info(&name).unwrap().state == ServiceState::Stopped
    })
    .await;
    wait_for("all lines captured", Duration::from_secs(5), || {
        harness.supervisor.service_logs(&name, 10).unwrap().len() == 3
    })
    .await;

    let lines = harness.supervisor.service_logs(&name, 10).unwrap();
    assert_eq!(
        lines.iter().map(|l| l.line.as_str()).collect::<Vec<_>>(),
        vec!["one", "two", "three"]
    );
    assert!(lines.iter().all(|l| l.stream == LogStream::Stdout));
    assert!(lines.iter().all(|l| l.service == name));
}

#[tokio::test]
async fn stderr_is_labeled_separately() {
    let harness = TestHarness::new();
    let name = harness
        .add(TestServiceBuilder::shell("mixed", "echo out; echo err 1>&2").build())
        .await;

    harness.supervisor.start_service(&name).await.unwrap();
    wait_for("both lines captured", Duration::from_secs(5), || {
        harness.supervisor.service_logs(&name, 10).unwrap().len() == 2
    })
    .await;

    let lines = harness.supervisor.service_logs(&name, 10).unwrap();
    let stream_of = |text: &str| {
        lines
            .iter()
            .find(|l| l.line == text)
            .map(|l| l.stream)
            .unwrap()
    };
    assert_eq!(stream_of("out"), LogStream::Stdout);
    assert_eq!(stream_of("err"), LogStream::Stderr);
}

#[tokio::test]
async fn tail_is_bounded_by_n() {
    let harness = TestHarness::new();
    let name = harness
        .add(TestServiceBuilder::shell("chatty", "for i in 1 2 3 4 5; do echo line$i; done").build())
        .await;

    harness.supervisor.start_service(&name).await.unwrap();
    wait_for("five lines captured", Duration::from_secs(5), || {
        harness.supervisor.service_logs(&name, 100).unwrap().len() == 5
    })
    .await;

    let tail = harness.supervisor.service_logs(&name, 2).unwrap();
    assert_eq!(
        tail.iter().map(|l| l.line.as_str()).collect::<Vec<_>>(),
        vec!["line4", "line5"]
    );
}

#[tokio::test]
async fn log_lines_become_push_events() {
    let harness = TestHarness::new();
    let name = harness
        .add(TestServiceBuilder::shell("pusher", "echo hello-push").build())
        .await;

    harness.supervisor.start_service(&name).await.unwrap();

    wait_for("service.log event", Duration::from_secs(5), || {
        harness.recorded_events().iter().any(|e| {
            e.kind == EventType::ServiceLog
                && e.service.as_deref() == Some(name.as_str())
                && e.message.as_deref() == Some("hello-push")
        })
    })
    .await;

    let events = harness.recorded_events();
    let log_event = events
        .iter()
        .find(|e| e.kind == EventType::ServiceLog)
        .unwrap();
    let data = log_event.data.as_ref().expect("log events carry the entry");
    assert_eq!(data["line"], "hello-push");
    assert_eq!(data["stream"], "stdout");
}

#[tokio::test]
async fn log_file_lands_in_the_daemon_log_dir() {
    let harness = TestHarness::new();
    let name = harness
        .add(TestServiceBuilder::shell("filer", "echo persisted").build())
        .await;

    harness.supervisor.start_service(&name).await.unwrap();
    wait_for("line captured", Duration::from_secs(5), || {
        !harness.supervisor.service_logs(&name, 1).unwrap().is_empty()
    })
    .await;
    harness.supervisor.stop_all().await;

    let log_path = harness.home().join("logs").join("filer.log");
    let content = std::fs::read_to_string(&log_path).expect("service log file exists");
    assert!(content.contains("[stdout] persisted"), "got {content:?}");
}
