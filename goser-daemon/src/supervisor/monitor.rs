//! Restart monitor: one task per running process lifetime.
//!
//! The monitor waits for the process to finish, consults the current
//! config and either restarts the child (bounded by `max_restarts`, after
//! `restart_delay`) or terminates. Only an external start spawns a
//! monitor; internal restarts keep the same monitor looping on the fresh
//! done signal. The monitor never stops a process.

use std::sync::Arc;
use tracing::{debug, error, info, warn};

use super::{Event, EventType, Supervisor};
use crate::process::{Process, ServiceState};

pub(crate) async fn run(supervisor: Arc<Supervisor>, process: Arc<Process>) {
    let shutdown = supervisor.shutdown_token();

    loop {
        process.done().await;

        let name = process.name();
        if process.state() == ServiceState::Stopped {
            if process.stop_requested() {
                // stop_service emitted the event; nothing left to do.
                debug!("monitor: {} stopped intentionally, not restarting", name);
            } else {
                info!("monitor: {} exited cleanly, not restarting", name);
                supervisor.emit(Event::service(
                    EventType::ServiceStopped,
                    &name,
                    "service exited",
                ));
            }
            return;
        }

        // Re-read the config so updates apply from this exit onward.
        let cfg = process.config();

        if !cfg.auto_restart {
            info!("monitor: {} exited and auto_restart is disabled", name);
            supervisor.emit(Event::service(
                EventType::ServiceFailed,
                &name,
                "service exited and auto_restart is disabled",
            ));
            return;
        }

        if process.restart_count() >= cfg.max_restarts {
            warn!(
                "monitor: {} exceeded max_restarts ({}), giving up",
                name, cfg.max_restarts
            );
            supervisor.emit(Event::service(
                EventType::ServiceFailed,
                &name,
                "exceeded max restarts",
            ));
            return;
        }

        process.increment_restart_count();
        info!(
            "monitor: restarting {} in {:?} (attempt {}/{})",
            name,
            cfg.restart_delay,
            process.restart_count(),
            cfg.max_restarts
        );

        tokio::select! {
            _ = tokio::time::sleep(cfg.restart_delay) => {}
            _ = shutdown.cancelled() => {
                debug!("monitor: {} shutdown during restart delay", name);
                return;
            }
        }

        if let Err(e) = process.start() {
            error!("monitor: failed to restart {}: {}", name, e);
            supervisor.emit(Event::service(
                EventType::ServiceFailed,
                &name,
                format!("restart failed: {e}"),
            ));
            return;
        }

        supervisor.emit(Event::service(
            EventType::ServiceRestarted,
            &name,
            "service restarted",
        ));
    }
}
