use std::path::PathBuf;
use thiserror::Error;

use crate::process::ServiceState;

#[derive(Error, Debug)]
pub enum DaemonError {
    #[error("invalid configuration: {0}")]
    Validation(String),

    #[error("config file {path} is invalid: {detail}")]
    ConfigParse { path: PathBuf, detail: String },

    #[error("service not found: {0}")]
    ServiceNotFound(String),

    #[error("cannot {op} service {service}: state is {state}")]
    IllegalState {
        service: String,
        op: &'static str,
        state: ServiceState,
    },

    #[error("failed to spawn process for service {service}: {source}")]
    ProcessSpawn {
        service: String,
        #[source]
        source: std::io::Error,
    },

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("internal error: {0}")]
    Internal(String),
}

impl DaemonError {
    /// Wrap a YAML deserialization failure, pointing at the offending
    /// field and source position when the parser knows them.
    pub fn config_parse(
        path: &std::path::Path,
        err: serde_path_to_error::Error<serde_yaml::Error>,
    ) -> Self {
        let mut detail = err.inner().to_string();
        if let Some(at) = err.inner().location() {
            detail.push_str(&format!(" (line {}, column {})", at.line(), at.column()));
        }
        let field = err.path().to_string();
        if !field.is_empty() {
            detail = format!("field {field}: {detail}");
        }
        DaemonError::ConfigParse {
            path: path.to_path_buf(),
            detail,
        }
    }
}

pub type Result<T> = std::result::Result<T, DaemonError>;

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Deserialize)]
    #[allow(dead_code)]
    struct Probe {
        count: u32,
    }

    #[test]
    fn config_parse_names_file_and_field() {
        let de = serde_yaml::Deserializer::from_str("count: not-a-number\n");
        let err = serde_path_to_error::deserialize::<_, Probe>(de).unwrap_err();
        let wrapped = DaemonError::config_parse(std::path::Path::new("/etc/x/web.yaml"), err);

        let message = wrapped.to_string();
        assert!(message.contains("web.yaml"), "{message}");
        assert!(message.contains("count"), "{message}");
    }
}
