//! Child-process lifecycle state machine.
//!
//! A [`Process`] wraps one managed child: it owns the runtime state
//! (state, pid, timestamps, exit code, restart counter) behind a single
//! lock, and installs fresh done/shutdown channels for every run. The
//! waiter task owns the [`tokio::process::Child`] handle; stopping a
//! service is a request to the waiter, which delivers the configured
//! signal and enforces the stop timeout with a hard kill on expiry.

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;
use tokio::process::{Child, Command};
use tokio::sync::{oneshot, watch};
use tracing::{debug, info, warn};

use crate::config::ServiceConfig;
use crate::errors::{DaemonError, Result};
use crate::logs::{LogCollector, LogStream};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ServiceState {
    Stopped,
    Starting,
    Running,
    Stopping,
    Failed,
}

impl ServiceState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ServiceState::Stopped => "stopped",
            ServiceState::Starting => "starting",
            ServiceState::Running => "running",
            ServiceState::Stopping => "stopping",
            ServiceState::Failed => "failed",
        }
    }
}

impl std::fmt::Display for ServiceState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Point-in-time snapshot of a service for control-plane consumers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceInfo {
    pub name: String,
    pub state: ServiceState,
    #[serde(default, skip_serializing_if = "pid_is_zero")]
    pub pid: u32,
    pub command: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub args: Vec<String>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub working_dir: String,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub env: HashMap<String, String>,
    pub auto_start: bool,
    pub auto_restart: bool,
    pub restart_count: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stopped_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uptime: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exit_code: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

fn pid_is_zero(pid: &u32) -> bool {
    *pid == 0
}

struct Inner {
    config: ServiceConfig,
    state: ServiceState,
    pid: u32,
    started_at: Option<DateTime<Utc>>,
    stopped_at: Option<DateTime<Utc>>,
    exit_code: Option<i32>,
    last_error: Option<String>,
    restart_count: u32,
    /// True while the current exit was requested through `stop`.
    stop_requested: bool,
    /// Closed (set true) by the waiter once the run is fully finalized.
    done_rx: Option<watch::Receiver<bool>>,
    /// Single-use request to the waiter carrying the mapped stop signal.
    shutdown_tx: Option<oneshot::Sender<Option<i32>>>,
}

pub struct Process {
    inner: RwLock<Inner>,
    collector: Arc<LogCollector>,
}

impl Process {
    pub fn new(config: ServiceConfig, collector: Arc<LogCollector>) -> Self {
        Self {
            inner: RwLock::new(Inner {
                config,
                state: ServiceState::Stopped,
                pid: 0,
                started_at: None,
                stopped_at: None,
                exit_code: None,
                last_error: None,
                restart_count: 0,
                stop_requested: false,
                done_rx: None,
                shutdown_tx: None,
            }),
            collector,
        }
    }

    pub fn collector(&self) -> &Arc<LogCollector> {
        &self.collector
    }

    /// Launch the child. Refused unless the current state is Stopped or
    /// Failed; a concurrent second start observes Starting and fails.
    pub fn start(self: &Arc<Self>) -> Result<()> {
        let config = {
            let mut inner = self.inner.write();
            match inner.state {
                ServiceState::Stopped | ServiceState::Failed => {}
                state => {
                    return Err(DaemonError::IllegalState {
                        service: inner.config.name.clone(),
                        op: "start",
                        state,
                    });
                }
            }
            inner.state = ServiceState::Starting;
            inner.config.clone()
        };

        info!("starting service {}", config.name);

        let mut cmd = Command::new(&config.command);
        cmd.args(&config.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        if !config.working_dir.is_empty() {
            cmd.current_dir(&config.working_dir);
        }
        // The child inherits the daemon environment; config env is merged on top.
        cmd.envs(&config.env);
        // Own process group so stop signals reach the whole tree.
        #[cfg(unix)]
        cmd.process_group(0);

        let mut child = match cmd.spawn() {
            Ok(child) => child,
            Err(e) => {
                let mut inner = self.inner.write();
                inner.state = ServiceState::Failed;
                inner.last_error = Some(format!("spawn: {e}"));
                inner.stopped_at = Some(Utc::now());
                inner.pid = 0;
                return Err(DaemonError::ProcessSpawn {
                    service: config.name.clone(),
                    source: e,
                });
            }
        };

        let pid = child.id().unwrap_or(0);
        let stdout = child.stdout.take();
        let stderr = child.stderr.take();
        let (done_tx, done_rx) = watch::channel(false);
        let (shutdown_tx, shutdown_rx) = oneshot::channel();

        {
            let mut inner = self.inner.write();
            inner.pid = pid;
            inner.started_at = Some(Utc::now());
            inner.stopped_at = None;
            inner.exit_code = None;
            inner.last_error = None;
            inner.stop_requested = false;
            inner.state = ServiceState::Running;
            inner.done_rx = Some(done_rx);
            inner.shutdown_tx = Some(shutdown_tx);
        }

        info!("service {} started with pid {}", config.name, pid);

        if let Some(stdout) = stdout {
            tokio::spawn(self.collector.clone().collect(stdout, LogStream::Stdout));
        }
        if let Some(stderr) = stderr {
            tokio::spawn(self.collector.clone().collect(stderr, LogStream::Stderr));
        }

        let proc = self.clone();
        let stop_timeout = config.stop_timeout;
        tokio::spawn(async move {
            proc.wait(child, shutdown_rx, stop_timeout, done_tx).await;
        });

        Ok(())
    }

    /// Waiter task: blocks on child exit, or on a stop request followed by
    /// a `stop_timeout`-bounded wait and a forced kill on expiry. Exactly
    /// one waiter exists per run; it finalizes all terminal fields before
    /// signaling done.
    async fn wait(
        self: Arc<Self>,
        mut child: Child,
        shutdown_rx: oneshot::Receiver<Option<i32>>,
        stop_timeout: Duration,
        done_tx: watch::Sender<bool>,
    ) {
        let result = tokio::select! {
            status = child.wait() => status,
            request = shutdown_rx => {
                let signal = request.unwrap_or(None);
                deliver_stop_signal(&mut child, signal);
                match tokio::time::timeout(stop_timeout, child.wait()).await {
                    Ok(status) => status,
                    Err(_) => {
                        warn!(
                            "service {} did not exit within {:?}, force killing",
                            self.name(),
                            stop_timeout
                        );
                        force_kill(&mut child);
                        child.wait().await
                    }
                }
            }
        };

        let (name, state) = {
            let mut inner = self.inner.write();
            inner.stopped_at = Some(Utc::now());
            match &result {
                Ok(status) => {
                    inner.exit_code = status.code();
                    if inner.state == ServiceState::Stopping {
                        inner.state = ServiceState::Stopped;
                    } else if status.success() {
                        inner.exit_code = Some(0);
                        inner.state = ServiceState::Stopped;
                    } else {
                        inner.state = ServiceState::Failed;
                        inner.last_error = Some(match status.code() {
                            Some(code) => format!("exited with code {code}"),
                            None => "terminated by signal".to_string(),
                        });
                    }
                }
                Err(e) => {
                    if inner.state == ServiceState::Stopping {
                        inner.state = ServiceState::Stopped;
                    } else {
                        inner.state = ServiceState::Failed;
                        inner.last_error = Some(format!("wait: {e}"));
                    }
                }
            }
            inner.pid = 0;
            inner.shutdown_tx = None;
            (inner.config.name.clone(), inner.state)
        };

        info!(
            "service {} exited (exit_code={:?}, state={})",
            name,
            self.exit_code(),
            state
        );

        // Signal done only after every terminal field is visible.
        let _ = done_tx.send(true);
    }

    /// Request a graceful stop. Refused unless Running. Returns once the
    /// waiter has finalized the run, bounded by the configured timeout
    /// plus the forced kill.
    pub async fn stop(&self) -> Result<()> {
        let (shutdown_tx, done_rx, signal, name) = {
            let mut inner = self.inner.write();
            if inner.state != ServiceState::Running {
                return Err(DaemonError::IllegalState {
                    service: inner.config.name.clone(),
                    op: "stop",
                    state: inner.state,
                });
            }
            inner.state = ServiceState::Stopping;
            inner.stop_requested = true;
            (
                inner.shutdown_tx.take(),
                inner.done_rx.clone(),
                parse_signal(&inner.config.stop_signal),
                inner.config.name.clone(),
            )
        };

        info!("stopping service {}", name);

        if let Some(tx) = shutdown_tx {
            // Err means the waiter already finalized a concurrent exit.
            let _ = tx.send(signal);
        }
        if let Some(mut rx) = done_rx {
            let _ = rx.wait_for(|done| *done).await;
        }
        Ok(())
    }

    /// Resolve once the current run has finalized. Resolves immediately
    /// when the process has never run.
    pub async fn done(&self) {
        let done_rx = self.inner.read().done_rx.clone();
        if let Some(mut rx) = done_rx {
            let _ = rx.wait_for(|done| *done).await;
        }
    }

    /// Atomically replace the configuration. Restart policy fields take
    /// effect on the next exit; command fields on the next start.
    pub fn update_config(&self, config: ServiceConfig) {
        self.inner.write().config = config;
    }

    pub fn config(&self) -> ServiceConfig {
        self.inner.read().config.clone()
    }

    pub fn name(&self) -> String {
        self.inner.read().config.name.clone()
    }

    pub fn state(&self) -> ServiceState {
        self.inner.read().state
    }

    pub fn exit_code(&self) -> Option<i32> {
        self.inner.read().exit_code
    }

    pub(crate) fn stop_requested(&self) -> bool {
        self.inner.read().stop_requested
    }

    pub fn restart_count(&self) -> u32 {
        self.inner.read().restart_count
    }

    pub fn increment_restart_count(&self) {
        self.inner.write().restart_count += 1;
    }

    pub fn reset_restart_count(&self) {
        self.inner.write().restart_count = 0;
    }

    pub fn info(&self) -> ServiceInfo {
        let inner = self.inner.read();
        let uptime = match (inner.state, inner.started_at) {
            (ServiceState::Running, Some(started_at)) => {
                let elapsed = (Utc::now() - started_at)
                    .to_std()
                    .unwrap_or(Duration::ZERO);
                Some(format_uptime(elapsed))
            }
            _ => None,
        };

        ServiceInfo {
            name: inner.config.name.clone(),
            state: inner.state,
            pid: inner.pid,
            command: inner.config.command.clone(),
            args: inner.config.args.clone(),
            working_dir: inner.config.working_dir.clone(),
            env: inner.config.env.clone(),
            auto_start: inner.config.auto_start,
            auto_restart: inner.config.auto_restart,
            restart_count: inner.restart_count,
            started_at: inner.started_at,
            stopped_at: inner.stopped_at,
            uptime,
            exit_code: inner.exit_code,
            error: inner.last_error.clone(),
        }
    }
}

/// Map a signal name like "SIGTERM", "term" or "15" to its number.
pub fn parse_signal(name: &str) -> Option<i32> {
    match name.to_uppercase().trim_start_matches("SIG") {
        "TERM" => Some(15),
        "KILL" => Some(9),
        "INT" => Some(2),
        "HUP" => Some(1),
        "QUIT" => Some(3),
        "USR1" => Some(10),
        "USR2" => Some(12),
        other => other.parse::<i32>().ok(),
    }
}

/// Deliver the configured stop signal to the child's process group.
/// Platforms without POSIX signals terminate outright; the stop timeout
/// still applies either way.
#[cfg(unix)]
fn deliver_stop_signal(child: &mut Child, signal: Option<i32>) {
    use nix::sys::signal::{killpg, Signal};
    use nix::unistd::Pid;

    let Some(pid) = child.id() else { return };
    let sig = signal
        .and_then(|n| Signal::try_from(n).ok())
        .unwrap_or(Signal::SIGTERM);
    debug!("sending {} to process group {}", sig, pid);
    if let Err(e) = killpg(Pid::from_raw(pid as i32), sig) {
        warn!("failed to signal process group {}: {}", pid, e);
        let _ = child.start_kill();
    }
}

#[cfg(not(unix))]
fn deliver_stop_signal(child: &mut Child, _signal: Option<i32>) {
    let _ = child.start_kill();
}

#[cfg(unix)]
fn force_kill(child: &mut Child) {
    use nix::sys::signal::{killpg, Signal};
    use nix::unistd::Pid;

    if let Some(pid) = child.id() {
        let _ = killpg(Pid::from_raw(pid as i32), Signal::SIGKILL);
    }
    let _ = child.start_kill();
}

#[cfg(not(unix))]
fn force_kill(child: &mut Child) {
    let _ = child.start_kill();
}

/// Human-readable uptime, largest units first.
pub fn format_uptime(d: Duration) -> String {
    let total = d.as_secs();
    let days = total / 86_400;
    let hours = (total % 86_400) / 3_600;
    let minutes = (total % 3_600) / 60;
    let seconds = total % 60;

    if days > 0 {
        format!("{days}d {hours}h {minutes}m {seconds}s")
    } else if hours > 0 {
        format!("{hours}h {minutes}m {seconds}s")
    } else if minutes > 0 {
        format!("{minutes}m {seconds}s")
    } else {
        format!("{seconds}s")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_signal_names() {
        assert_eq!(parse_signal("SIGTERM"), Some(15));
        assert_eq!(parse_signal("TERM"), Some(15));
        assert_eq!(parse_signal("sigkill"), Some(9));
        assert_eq!(parse_signal("INT"), Some(2));
        assert_eq!(parse_signal("9"), Some(9));
        assert_eq!(parse_signal("bogus"), None);
        assert_eq!(parse_signal(""), None);
    }

    #[test]
    fn uptime_formatting() {
        assert_eq!(format_uptime(Duration::from_secs(5)), "5s");
        assert_eq!(format_uptime(Duration::from_secs(65)), "1m 5s");
        assert_eq!(format_uptime(Duration::from_secs(3_725)), "1h 2m 5s");
        assert_eq!(format_uptime(Duration::from_secs(90_061)), "1d 1h 1m 1s");
    }

    #[test]
    fn fresh_process_is_stopped_with_zero_pid() {
        let collector = Arc::new(LogCollector::new(
            "t",
            std::env::temp_dir().join("goser-test-fresh.log"),
            None,
        ));
        let proc = Process::new(
            ServiceConfig {
                name: "t".into(),
                command: "true".into(),
                ..Default::default()
            },
            collector,
        );
        let info = proc.info();
        assert_eq!(info.state, ServiceState::Stopped);
        assert_eq!(info.pid, 0);
        assert_eq!(info.restart_count, 0);
        assert!(info.started_at.is_none());
    }
}
