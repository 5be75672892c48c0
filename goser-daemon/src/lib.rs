//! goser: a single-host supervisor daemon for user-defined services.
//!
//! Each managed service is a command line with environment and working
//! directory; the daemon starts it, captures its output, reacts to its
//! exit and restarts it within the configured bound. A loopback HTTP +
//! WebSocket control plane serves inspection and mutation.

use std::path::PathBuf;

pub mod config;
pub mod deps;
pub mod errors;
pub mod logs;
pub mod process;
pub mod server;
pub mod supervisor;

const GOSER_DIR: &str = ".goser";

/// Environment override for the state directory, mainly for tests and
/// packaging.
pub const GOSER_HOME_ENV: &str = "GOSER_HOME";

/// Per-user state directory, `~/.goser` by convention.
pub fn goser_home() -> PathBuf {
    if let Ok(path) = std::env::var(GOSER_HOME_ENV) {
        return PathBuf::from(path);
    }
    dirs::home_dir()
        .map(|home| home.join(GOSER_DIR))
        .unwrap_or_else(|| PathBuf::from(GOSER_DIR))
}
