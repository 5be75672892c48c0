//! HTTP control plane.
//!
//! Binds the REST + WebSocket surface to loopback, owns the pid file and
//! runs the graceful-shutdown sequence: OS interrupt → stop all services →
//! close push connections → exit.

mod handlers;
mod ws;

use axum::Router;
use chrono::{DateTime, Utc};
use std::fs;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use tower_http::cors::{Any, CorsLayer};
use tracing::info;

use crate::config::GlobalConfig;
use crate::errors::Result;
use crate::supervisor::{Event, EventType, Supervisor};

/// Capacity of the per-subscriber push queue; slow subscribers lose the
/// oldest events rather than stalling delivery.
const EVENT_QUEUE_CAPACITY: usize = 256;

pub(crate) struct ServerState {
    pub supervisor: Arc<Supervisor>,
    pub events: broadcast::Sender<Event>,
    pub started_at: DateTime<Utc>,
    pub shutdown: CancellationToken,
}

pub struct ControlServer {
    state: Arc<ServerState>,
    listen: String,
    pid_file: PathBuf,
}

impl ControlServer {
    pub fn new(supervisor: Arc<Supervisor>, global: &GlobalConfig) -> Self {
        let (events, _) = broadcast::channel(EVENT_QUEUE_CAPACITY);

        // Every event goes onto the push queue...
        let push = events.clone();
        supervisor.on_event(Arc::new(move |event| {
            let _ = push.send(event);
        }));

        // ...and everything except log lines into the daemon log.
        supervisor.on_event(Arc::new(|event: Event| {
            if event.kind != EventType::ServiceLog {
                info!(
                    "event: {} {} - {}",
                    event.kind,
                    event.service.as_deref().unwrap_or("-"),
                    event.message.as_deref().unwrap_or("")
                );
            }
        }));

        let state = Arc::new(ServerState {
            shutdown: supervisor.shutdown_token(),
            supervisor,
            events,
            started_at: Utc::now(),
        });

        Self {
            state,
            listen: global.daemon.listen.clone(),
            pid_file: global.daemon.pid_file.clone(),
        }
    }

    /// The full route table. Permissive CORS: the listener is loopback
    /// only.
    pub fn router(&self) -> Router {
        let cors = CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any);

        Router::new()
            .merge(handlers::router())
            .merge(ws::router())
            .layer(cors)
            .with_state(self.state.clone())
    }

    /// Write the pid file, boot the managed set and serve until an OS
    /// interrupt arrives. Binding and pid-file failures are fatal.
    pub async fn run(self) -> Result<()> {
        fs::write(&self.pid_file, std::process::id().to_string())?;

        let supervisor = self.state.supervisor.clone();
        supervisor.load_and_start().await;
        supervisor.emit(Event::daemon(EventType::DaemonStarted));

        let listener = TcpListener::bind(&self.listen).await?;
        info!("daemon listening on {}", self.listen);

        let shutdown_supervisor = supervisor.clone();
        let serve = axum::serve(listener, self.router()).with_graceful_shutdown(async move {
            interrupt_signal().await;
            info!("shutting down daemon");
            shutdown_supervisor.stop_all().await;
        });
        let result = serve.await;

        let _ = fs::remove_file(&self.pid_file);
        info!("daemon stopped");
        result.map_err(Into::into)
    }
}

/// Resolve on SIGINT or, on Unix, SIGTERM.
async fn interrupt_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        let mut term = match signal(SignalKind::terminate()) {
            Ok(term) => term,
            Err(e) => {
                tracing::error!("failed to install SIGTERM handler: {}", e);
                let _ = tokio::signal::ctrl_c().await;
                return;
            }
        };
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {}
            _ = term.recv() => {}
        }
    }
    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}
