use anyhow::{Context, Result};
use std::fs;
use std::path::Path;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

use goser_daemon::config::ConfigStore;
use goser_daemon::logs::{RotatingFileWriter, SharedRotatingWriter};
use goser_daemon::server::ControlServer;
use goser_daemon::supervisor::Supervisor;

#[tokio::main]
async fn main() -> Result<()> {
    let home = goser_daemon::goser_home();
    let store = Arc::new(ConfigStore::new(home));

    store.ensure_dirs().context("create goser directories")?;
    store.load_global().context("load global config")?;
    let global = store.global();

    init_tracing(&global.daemon.log_dir).context("initialize logging")?;
    info!("goser daemon starting (home: {:?})", store.home());

    store.load_services().context("load service configs")?;

    let supervisor = Supervisor::new(store);
    let server = ControlServer::new(supervisor, &global);
    server.run().await.context("run daemon")?;

    Ok(())
}

/// Log to stdout and to a rotating `goserd.log` in the daemon log dir.
fn init_tracing(log_dir: &Path) -> Result<()> {
    fs::create_dir_all(log_dir)?;
    let file = SharedRotatingWriter::new(RotatingFileWriter::new(log_dir.join("goserd.log")));

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .with(
            tracing_subscriber::fmt::layer()
                .with_ansi(false)
                .with_writer(move || file.clone()),
        )
        .init();
    Ok(())
}
