use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Malformed settings file: {0}")]
    Parse(#[from] serde_yaml::Error),

    #[error("Missing setting: {key}")]
    Missing { key: String },

    #[error("Invalid setting {key}: {details}")]
    Invalid { key: String, details: String },
}

impl ConfigError {
    pub fn missing(key: impl Into<String>) -> Self {
        ConfigError::Missing { key: key.into() }
    }

    pub fn invalid(key: impl Into<String>, details: impl Into<String>) -> Self {
        ConfigError::Invalid {
            key: key.into(),
            details: details.into(),
        }
    }
}
