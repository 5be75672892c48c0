//! Builder for service configs used across the suites.

use goser_daemon::config::ServiceConfig;
use std::time::Duration;

pub struct TestServiceBuilder {
    cfg: ServiceConfig,
}

impl TestServiceBuilder {
    pub fn new(name: &str, command: &str) -> Self {
        Self {
            cfg: ServiceConfig {
                name: name.to_string(),
                command: command.to_string(),
                ..Default::default()
            },
        }
    }

    /// A service whose command is `sh -c <script>`.
    pub fn shell(name: &str, script: &str) -> Self {
        Self::new(name, "sh").args(&["-c", script])
    }

    pub fn args(mut self, args: &[&str]) -> Self {
        self.cfg.args = args.iter().map(|a| a.to_string()).collect();
        self
    }

    pub fn auto_start(mut self, value: bool) -> Self {
        self.cfg.auto_start = value;
        self
    }

    pub fn auto_restart(mut self, value: bool) -> Self {
        self.cfg.auto_restart = value;
        self
    }

    pub fn max_restarts(mut self, value: u32) -> Self {
        self.cfg.max_restarts = value;
        self
    }

    pub fn restart_delay(mut self, value: Duration) -> Self {
        self.cfg.restart_delay = value;
        self
    }

    pub fn stop_timeout(mut self, value: Duration) -> Self {
        self.cfg.stop_timeout = value;
        self
    }

    pub fn stop_signal(mut self, value: &str) -> Self {
        self.cfg.stop_signal = value.to_string();
        self
    }

    pub fn depends_on(mut self, deps: &[&str]) -> Self {
        self.cfg.depends_on = deps.iter().map(|d| d.to_string()).collect();
        self
    }

    pub fn env(mut self, key: &str, value: &str) -> Self {
        self.cfg.env.insert(key.to_string(), value.to_string());
        self
    }

    pub fn build(self) -> ServiceConfig {
        self.cfg
    }
}
