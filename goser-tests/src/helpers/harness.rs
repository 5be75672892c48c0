//! Supervisor harness with an isolated temporary home directory.

use goser_daemon::config::{ConfigStore, ServiceConfig};
use goser_daemon::supervisor::{Event, EventType, Supervisor};
use std::path::Path;
use std::sync::{Arc, Mutex};
use tempfile::TempDir;

pub struct TestHarness {
    home: TempDir,
    pub store: Arc<ConfigStore>,
    pub supervisor: Arc<Supervisor>,
    events: Arc<Mutex<Vec<Event>>>,
}

impl TestHarness {
    /// Fresh store + supervisor under a throwaway home, with an event
    /// recorder already subscribed.
    pub fn new() -> Self {
        let home = TempDir::new().expect("create temp home");
        let store = Arc::new(ConfigStore::new(home.path().to_path_buf()));
        store.ensure_dirs().expect("create home layout");
        store.load_global().expect("load global defaults");

        let supervisor = Supervisor::new(store.clone());

        let events = Arc::new(Mutex::new(Vec::new()));
        let sink = events.clone();
        supervisor.on_event(Arc::new(move |event| {
            sink.lock().unwrap().push(event);
        }));

        Self {
            home,
            store,
            supervisor,
            events,
        }
    }

    pub fn home(&self) -> &Path {
        self.home.path()
    }

    /// Register a service through the public surface and return its name.
    pub async fn add(&self, cfg: ServiceConfig) -> String {
        let name = cfg.name.clone();
        self.supervisor
            .add_service(cfg)
            .await
            .expect("add service");
        name
    }

    pub fn recorded_events(&self) -> Vec<Event> {
        self.events.lock().unwrap().clone()
    }

    pub fn count_events(&self, kind: EventType, service: &str) -> usize {
        self.events
            .lock()
            .unwrap()
            .iter()
            .filter(|e| e.kind == kind && e.service.as_deref() == Some(service))
            .count()
    }

    pub fn has_event(&self, kind: EventType, service: &str) -> bool {
        self.count_events(kind, service) > 0
    }
}

impl Default for TestHarness {
    fn default() -> Self {
        Self::new()
    }
}
