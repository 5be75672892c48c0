//! Durable store for the global config and per-service definitions.
//!
//! One readers-writer lock guards the in-memory index; file I/O happens
//! under the write lock (the store is not on a hot path). All reads hand
//! out clones so callers never observe a torn update.

use parking_lot::RwLock;
use serde::de::DeserializeOwned;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use super::{GlobalConfig, ServiceConfig};
use crate::errors::{DaemonError, Result};

pub struct ConfigStore {
    home: PathBuf,
    inner: RwLock<Inner>,
}

struct Inner {
    global: GlobalConfig,
    services: HashMap<String, ServiceConfig>,
}

impl ConfigStore {
    pub fn new(home: PathBuf) -> Self {
        let global = GlobalConfig::with_home(&home);
        Self {
            home,
            inner: RwLock::new(Inner {
                global,
                services: HashMap::new(),
            }),
        }
    }

    pub fn home(&self) -> &Path {
        &self.home
    }

    pub fn services_dir(&self) -> PathBuf {
        self.home.join("services")
    }

    fn global_config_path(&self) -> PathBuf {
        self.home.join("config.yaml")
    }

    fn service_path(&self, name: &str) -> PathBuf {
        self.services_dir().join(format!("{}.yaml", name))
    }

    /// Create the home directory layout if missing.
    pub fn ensure_dirs(&self) -> Result<()> {
        let log_dir = self.inner.read().global.daemon.log_dir.clone();
        for dir in [self.home.clone(), self.services_dir(), log_dir] {
            fs::create_dir_all(&dir)?;
        }
        Ok(())
    }

    /// Load `config.yaml`. A missing file materializes the defaults on disk.
    pub fn load_global(&self) -> Result<()> {
        let path = self.global_config_path();
        let mut inner = self.inner.write();

        let data = match fs::read_to_string(&path) {
            Ok(data) => data,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                info!("no global config at {:?}, writing defaults", path);
                let yaml = serde_yaml::to_string(&inner.global)
                    .map_err(|e| DaemonError::Internal(format!("serialize defaults: {e}")))?;
                fs::write(&path, yaml)?;
                return Ok(());
            }
            Err(e) => return Err(e.into()),
        };

        let mut global: GlobalConfig = parse_yaml(&path, &data)?;
        global.fill_defaults(&self.home);
        inner.global = global;
        Ok(())
    }

    /// Scan the services directory and (re)build the index. Any file that
    /// fails to parse or validate aborts the whole load, naming the file.
    /// A missing directory is an empty set, not an error.
    pub fn load_services(&self) -> Result<()> {
        let dir = self.services_dir();
        let mut inner = self.inner.write();

        let entries = match fs::read_dir(&dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                inner.services.clear();
                return Ok(());
            }
            Err(e) => return Err(e.into()),
        };

        let mut services = HashMap::new();
        for entry in entries {
            let path = entry?.path();
            if !path.is_file() {
                continue;
            }
            match path.extension().and_then(|e| e.to_str()) {
                Some("yaml") | Some("yml") => {}
                _ => continue,
            }

            let data = fs::read_to_string(&path)?;
            let cfg: ServiceConfig = parse_yaml(&path, &data)?;
            cfg.validate().map_err(|e| {
                DaemonError::Validation(format!("{}: {e}", path.display()))
            })?;
            debug!("loaded service config {:?} from {:?}", cfg.name, path);
            services.insert(cfg.name.clone(), cfg);
        }

        inner.services = services;
        Ok(())
    }

    pub fn global(&self) -> GlobalConfig {
        self.inner.read().global.clone()
    }

    pub fn service(&self, name: &str) -> Option<ServiceConfig> {
        self.inner.read().services.get(name).cloned()
    }

    pub fn services(&self) -> HashMap<String, ServiceConfig> {
        self.inner.read().services.clone()
    }

    /// Validate, persist as `<name>.yaml` (write-then-rename) and update
    /// the index.
    pub fn save_service(&self, cfg: &ServiceConfig) -> Result<()> {
        cfg.validate()?;

        let yaml = serde_yaml::to_string(cfg)
            .map_err(|e| DaemonError::Internal(format!("serialize service config: {e}")))?;

        let mut inner = self.inner.write();
        let path = self.service_path(&cfg.name);
        let tmp = path.with_extension("yaml.tmp");
        fs::write(&tmp, yaml)?;
        fs::rename(&tmp, &path)?;
        inner.services.insert(cfg.name.clone(), cfg.clone());
        Ok(())
    }

    /// Drop a service from disk and from the index. Removing a service
    /// that has no file is not an error.
    pub fn remove_service(&self, name: &str) -> Result<()> {
        let mut inner = self.inner.write();
        let path = self.service_path(name);
        match fs::remove_file(&path) {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }
        inner.services.remove(name);
        Ok(())
    }
}

fn parse_yaml<T: DeserializeOwned>(path: &Path, data: &str) -> Result<T> {
    let de = serde_yaml::Deserializer::from_str(data);
    serde_path_to_error::deserialize(de).map_err(|err| DaemonError::config_parse(path, err))
}
