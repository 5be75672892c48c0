//! Orchestration across all managed services.
//!
//! The [`Supervisor`] owns the registry of `Process` + `LogCollector`
//! pairs, drives CRUD against the config store, boots services in
//! dependency order, and fans events out to subscribers. One restart
//! monitor task is bound to each running process lifetime; a
//! supervisor-wide cancellation token tears the monitors down on
//! shutdown.

mod events;
mod monitor;

pub use events::{Event, EventType};

use parking_lot::RwLock;
use serde::Serialize;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::config::{ConfigStore, ServiceConfig};
use crate::deps;
use crate::errors::{DaemonError, Result};
use crate::logs::{LogCallback, LogCollector, LogEntry};
use crate::process::{Process, ServiceInfo, ServiceState};

/// Pause between stop and start during an explicit restart, giving the OS
/// time to release ports and file handles.
const RESTART_PAUSE: Duration = Duration::from_millis(500);

/// Subscriber callback for supervisor events. Each delivery happens on its
/// own task, so implementations may block without stalling the supervisor.
pub type EventHandler = Arc<dyn Fn(Event) + Send + Sync>;

/// Registry counts for the daemon status endpoint. Anything neither
/// running nor failed reports as stopped.
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct Stats {
    pub total: usize,
    pub running: usize,
    pub stopped: usize,
    pub failed: usize,
}

struct ManagedService {
    process: Arc<Process>,
    collector: Arc<LogCollector>,
}

pub struct Supervisor {
    services: RwLock<HashMap<String, ManagedService>>,
    handlers: RwLock<Vec<EventHandler>>,
    store: Arc<ConfigStore>,
    log_dir: PathBuf,
    shutdown: CancellationToken,
}

impl Supervisor {
    pub fn new(store: Arc<ConfigStore>) -> Arc<Self> {
        let log_dir = store.global().daemon.log_dir.clone();
        Arc::new(Self {
            services: RwLock::new(HashMap::new()),
            handlers: RwLock::new(Vec::new()),
            store,
            log_dir,
            shutdown: CancellationToken::new(),
        })
    }

    /// Register a subscriber for all future events.
    pub fn on_event(&self, handler: EventHandler) {
        self.handlers.write().push(handler);
    }

    /// Deliver an event to every subscriber, each on its own task so a
    /// slow subscriber cannot stall another or the caller. No ordering is
    /// promised across events.
    pub(crate) fn emit(&self, event: Event) {
        let handlers: Vec<EventHandler> = self.handlers.read().clone();
        for handler in handlers {
            let event = event.clone();
            tokio::spawn(async move {
                handler(event);
            });
        }
    }

    pub(crate) fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    fn register(self: &Arc<Self>, cfg: ServiceConfig) {
        let name = cfg.name.clone();
        let log_file = cfg.resolve_log_file(&self.log_dir);

        let weak = Arc::downgrade(self);
        let callback: LogCallback = Arc::new(move |entry: LogEntry| {
            let Some(supervisor) = weak.upgrade() else {
                return;
            };
            let data = serde_json::to_value(&entry).ok();
            let mut event = Event::service(EventType::ServiceLog, &entry.service, &entry.line);
            event.data = data;
            supervisor.emit(event);
        });

        let collector = Arc::new(LogCollector::new(&name, log_file, Some(callback)));
        let process = Arc::new(Process::new(cfg, collector.clone()));

        self.services
            .write()
            .insert(name, ManagedService { process, collector });
    }

    fn process(&self, name: &str) -> Result<Arc<Process>> {
        self.services
            .read()
            .get(name)
            .map(|svc| svc.process.clone())
            .ok_or_else(|| DaemonError::ServiceNotFound(name.to_string()))
    }

    /// Register every stored service, then start the `auto_start` ones in
    /// dependency order. Per-service failures are logged, never fatal.
    pub async fn load_and_start(self: &Arc<Self>) {
        let configs = self.store.services();
        for cfg in configs.values() {
            self.register(cfg.clone());
        }

        let resolved = deps::start_order(&configs);
        for (service, dependency) in &resolved.unknown {
            warn!(
                "service {} depends on unknown service {}, ignoring the edge",
                service, dependency
            );
        }
        for name in &resolved.skipped {
            warn!("service {} is part of a dependency cycle, skipping auto-start", name);
        }

        for name in &resolved.order {
            let auto_start = configs.get(name).map(|c| c.auto_start).unwrap_or(false);
            if !auto_start {
                continue;
            }
            if let Err(e) = self.start_service(name).await {
                error!("failed to auto-start {}: {}", name, e);
            }
        }
    }

    /// Start a service and bind a restart monitor to this run. The restart
    /// counter resets on every explicit start; internal monitor restarts
    /// keep counting.
    pub async fn start_service(self: &Arc<Self>, name: &str) -> Result<()> {
        let process = self.process(name)?;
        process.start()?;
        process.reset_restart_count();

        self.emit(Event::service(
            EventType::ServiceStarted,
            name,
            "service started",
        ));

        let supervisor = self.clone();
        tokio::spawn(monitor::run(supervisor, process));
        Ok(())
    }

    /// Gracefully stop a running service. The waiter transitions it to
    /// Stopped, which terminates its monitor.
    pub async fn stop_service(&self, name: &str) -> Result<()> {
        let process = self.process(name)?;
        process.stop().await?;

        self.emit(Event::service(
            EventType::ServiceStopped,
            name,
            "service stopped",
        ));
        Ok(())
    }

    /// Convenience for control callers: stop if running, pause briefly,
    /// start again.
    pub async fn restart_service(self: &Arc<Self>, name: &str) -> Result<()> {
        let process = self.process(name)?;
        if process.state() == ServiceState::Running {
            process.stop().await?;
            tokio::time::sleep(RESTART_PAUSE).await;
        }
        self.start_service(name).await
    }

    /// Persist and register a new service. An existing name is treated as
    /// an update and does not disturb a running child.
    pub async fn add_service(self: &Arc<Self>, cfg: ServiceConfig) -> Result<()> {
        cfg.validate()?;

        if self.services.read().contains_key(&cfg.name) {
            return self.update_service(cfg).await;
        }

        self.store.save_service(&cfg)?;
        let name = cfg.name.clone();
        self.register(cfg);

        self.emit(Event::service(EventType::ServiceAdded, &name, "service added"));
        Ok(())
    }

    /// Stop (if running), remove from disk, drop from the registry and
    /// close the collector.
    pub async fn remove_service(&self, name: &str) -> Result<()> {
        let process = self.process(name)?;
        if process.state() == ServiceState::Running {
            process.stop().await?;
        }

        self.store.remove_service(name)?;

        if let Some(svc) = self.services.write().remove(name) {
            svc.collector.close();
        }

        self.emit(Event::service(
            EventType::ServiceRemoved,
            name,
            "service removed",
        ));
        Ok(())
    }

    /// Replace a service's configuration. Takes effect per the process
    /// contract: restart policy on next exit, command line on next start.
    pub async fn update_service(&self, cfg: ServiceConfig) -> Result<()> {
        cfg.validate()?;

        let process = self.process(&cfg.name)?;
        process.update_config(cfg.clone());
        self.store.save_service(&cfg)?;

        self.emit(Event::service(
            EventType::ServiceUpdated,
            &cfg.name,
            "service configuration updated",
        ));
        Ok(())
    }

    pub fn service_info(&self, name: &str) -> Result<ServiceInfo> {
        Ok(self.process(name)?.info())
    }

    pub fn list_services(&self) -> Vec<ServiceInfo> {
        let mut infos: Vec<ServiceInfo> = self
            .services
            .read()
            .values()
            .map(|svc| svc.process.info())
            .collect();
        infos.sort_by(|a, b| a.name.cmp(&b.name));
        infos
    }

    pub fn service_logs(&self, name: &str, n: usize) -> Result<Vec<LogEntry>> {
        let collector = self
            .services
            .read()
            .get(name)
            .map(|svc| svc.collector.clone())
            .ok_or_else(|| DaemonError::ServiceNotFound(name.to_string()))?;
        Ok(collector.get_lines(n))
    }

    pub fn stats(&self) -> Stats {
        let services = self.services.read();
        let mut stats = Stats {
            total: services.len(),
            ..Stats::default()
        };
        for svc in services.values() {
            match svc.process.state() {
                ServiceState::Running => stats.running += 1,
                ServiceState::Failed => stats.failed += 1,
                _ => stats.stopped += 1,
            }
        }
        stats
    }

    /// Shut everything down: wake sleeping monitors, stop every running
    /// process concurrently, then close the collectors.
    pub async fn stop_all(&self) {
        info!("stopping all services");
        self.emit(Event::daemon(EventType::DaemonStopping));
        self.shutdown.cancel();

        let processes: Vec<Arc<Process>> = self
            .services
            .read()
            .values()
            .map(|svc| svc.process.clone())
            .collect();

        let mut joins = Vec::new();
        for process in processes {
            if process.state() == ServiceState::Running {
                joins.push(tokio::spawn(async move {
                    if let Err(e) = process.stop().await {
                        warn!("stop during shutdown failed: {}", e);
                    }
                }));
            }
        }
        for join in joins {
            let _ = join.await;
        }

        for svc in self.services.read().values() {
            svc.collector.close();
        }
    }
}
