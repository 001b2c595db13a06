use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Application-level constants
pub const APP_NAME: &str = "labdrop";
pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Entries kept in the audit run log.
pub const DEFAULT_LOG_CAPACITY: usize = 50;

/// Default tracing filter when `RUST_LOG` is unset.
pub fn default_log_filter() -> &'static str {
    "labdrop=info"
}

/// Default root: ~/labdrop/ (falls back to the working directory without a home).
pub fn default_root_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("labdrop")
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Cannot read config file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid config file: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Unknown CSV encoding label: {0}")]
    UnknownEncoding(String),

    #[error("Invalid config value: {0}")]
    InvalidValue(String),
}

/// Ingestion settings. Relative paths resolve against `root_dir`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct IngestConfig {
    pub root_dir: PathBuf,
    /// Where lab files and loose PDFs arrive.
    pub watch_dir: PathBuf,
    /// Holds the `processed/` and `error/` terminal locations.
    pub archive_dir: PathBuf,
    pub pdf_dest_dir: PathBuf,
    /// Public URL prefix of `pdf_dest_dir`.
    pub pdf_url_base: String,
    pub database_path: PathBuf,
    /// WHATWG label of the food-sensitivity export encoding.
    pub csv_encoding: String,
    pub schedule_interval_secs: u64,
    pub run_lock_ttl_secs: u64,
    pub log_capacity: usize,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            root_dir: default_root_dir(),
            watch_dir: PathBuf::from("lab-uploads"),
            archive_dir: PathBuf::from("json-lab"),
            pdf_dest_dir: PathBuf::from("resultadospdf"),
            pdf_url_base: "http://localhost/resultadospdf".into(),
            database_path: PathBuf::from("labdrop.db"),
            csv_encoding: "windows-1252".into(),
            schedule_interval_secs: 3600,
            run_lock_ttl_secs: 900,
            log_capacity: DEFAULT_LOG_CAPACITY,
        }
    }
}

impl IngestConfig {
    /// Defaults rooted at `root`, with every path resolved.
    pub fn with_root(root: impl Into<PathBuf>) -> Self {
        Self {
            root_dir: root.into(),
            ..Self::default()
        }
        .resolved()
    }

    /// Load from a TOML file. Missing keys take their defaults.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: IngestConfig = toml::from_str(content)?;
        let config = config.resolved();
        config.validate()?;
        Ok(config)
    }

    /// Make every relative path absolute against `root_dir`.
    pub fn resolved(mut self) -> Self {
        let root = self.root_dir.clone();
        for path in [
            &mut self.watch_dir,
            &mut self.archive_dir,
            &mut self.pdf_dest_dir,
            &mut self.database_path,
        ] {
            if path.is_relative() {
                *path = root.join(&*path);
            }
        }
        self
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if encoding_rs::Encoding::for_label(self.csv_encoding.as_bytes()).is_none() {
            return Err(ConfigError::UnknownEncoding(self.csv_encoding.clone()));
        }
        if self.log_capacity == 0 {
            return Err(ConfigError::InvalidValue("log_capacity must be at least 1".into()));
        }
        if self.schedule_interval_secs == 0 {
            return Err(ConfigError::InvalidValue(
                "schedule_interval_secs must be at least 1".into(),
            ));
        }
        Ok(())
    }

    pub fn processed_dir(&self) -> PathBuf {
        self.archive_dir.join("processed")
    }

    pub fn error_dir(&self) -> PathBuf {
        self.archive_dir.join("error")
    }

    /// Public URL of a file placed in `pdf_dest_dir`.
    pub fn pdf_url(&self, file_name: &str) -> String {
        format!("{}/{}", self.pdf_url_base.trim_end_matches('/'), file_name)
    }
}
