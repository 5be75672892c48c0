//! Config store persistence tests.

use goser_daemon::config::{ConfigStore, ServiceConfig};
use goser_daemon::errors::DaemonError;
use goser_tests::helpers::config_builder::TestServiceBuilder;
use std::fs;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

fn fresh_store() -> (TempDir, Arc<ConfigStore>) {
    let home = TempDir::new().unwrap();
    let store = Arc::new(ConfigStore::new(home.path().to_path_buf()));
    store.ensure_dirs().unwrap();
    store.load_global().unwrap();
    (home, store)
}

#[test]
fn save_then_get_round_trips() {
    let (_home, store) = fresh_store();

    let cfg = TestServiceBuilder::new("web", "nginx")
        .args(&["-g", "daemon off;"])
        .auto_restart(true)
        .max_restarts(3)
        .restart_delay(Duration::from_millis(250))
        .env("PORT", "8080")
        .build();

    store.save_service(&cfg).unwrap();
    assert_eq!(store.service("web"), Some(cfg.clone()));

    // The YAML on disk parses back to the same config.
    let path = store.services_dir().join("web.yaml");
    let on_disk: ServiceConfig =
        serde_yaml::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
    assert_eq!(on_disk, cfg);
}

#[test]
fn save_survives_a_reload() {
    let (home, store) = fresh_store();

    let cfg = TestServiceBuilder::new("api", "api-server").build();
    store.save_service(&cfg).unwrap();

    let reopened = ConfigStore::new(home.path().to_path_buf());
    reopened.load_global().unwrap();
    reopened.load_services().unwrap();
    assert_eq!(reopened.service("api"), Some(cfg));
}

#[test]
fn remove_leaves_no_trace() {
    let (_home, store) = fresh_store();

    let cfg = TestServiceBuilder::new("gone", "true").build();
    store.save_service(&cfg).unwrap();
    let path = store.services_dir().join("gone.yaml");
    assert!(path.exists());

    store.remove_service("gone").unwrap();
    assert!(!path.exists());
    assert!(store.service("gone").is_none());

    // Removing again is not an error.
    store.remove_service("gone").unwrap();
}

#[test]
fn invalid_service_rejected_before_disk() {
    let (_home, store) = fresh_store();

    let cfg = ServiceConfig {
        name: "broken".into(),
        command: "".into(),
        ..Default::default()
    };
    assert!(matches!(
        store.save_service(&cfg),
        Err(DaemonError::Validation(_))
    ));
    assert!(!store.services_dir().join("broken.yaml").exists());
}

#[test]
fn bulk_load_aborts_naming_the_bad_file() {
    let (_home, store) = fresh_store();

    store
        .save_service(&TestServiceBuilder::new("good", "true").build())
        .unwrap();
    fs::write(
        store.services_dir().join("bad.yaml"),
        "name: [this is not\n  a service",
    )
    .unwrap();

    let err = store.load_services().unwrap_err();
    let message = err.to_string();
    assert!(message.contains("bad.yaml"), "error should name the file: {message}");
}

#[test]
fn bulk_load_aborts_on_validation_failure() {
    let (_home, store) = fresh_store();

    fs::write(
        store.services_dir().join("nocmd.yaml"),
        "name: nocmd\n",
    )
    .unwrap();

    let err = store.load_services().unwrap_err();
    assert!(err.to_string().contains("nocmd"));
}

#[test]
fn missing_services_dir_is_empty_not_an_error() {
    let home = TempDir::new().unwrap();
    let store = ConfigStore::new(home.path().join("never-created"));
    store.load_services().unwrap();
    assert!(store.services().is_empty());
}

#[test]
fn missing_global_config_materializes_defaults() {
    let home = TempDir::new().unwrap();
    let store = ConfigStore::new(home.path().to_path_buf());
    store.ensure_dirs().unwrap();

    assert!(!home.path().join("config.yaml").exists());
    store.load_global().unwrap();
    assert!(home.path().join("config.yaml").exists());

    let global = store.global();
    assert_eq!(global.daemon.listen, "127.0.0.1:9876");
    assert_eq!(global.daemon.log_dir, home.path().join("logs"));
}

#[test]
fn non_yaml_files_are_ignored() {
    let (_home, store) = fresh_store();
    fs::write(store.services_dir().join("README.txt"), "not a service").unwrap();
    fs::write(store.services_dir().join("notes.json"), "{}").unwrap();

    store.load_services().unwrap();
    assert!(store.services().is_empty());
}
