use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::error::ConfigError;
use crate::steps::{ONBOARDING_FUNNEL_STEPS, ONBOARDING_STEP_PREFIX};

/// Environment variable that overrides `bigquery.access_token`
pub const ACCESS_TOKEN_ENV: &str = "LISSEN_BIGQUERY_ACCESS_TOKEN";
pub const DEFAULT_VIEW_QUERY_FILE: &str = "user_journey_v2.sql";
pub const DEFAULT_SERVER_ADDRESS: &str = "127.0.0.1:8501";

/// Dashboard settings, loaded once at startup and passed to whoever needs them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DashboardConfig {
    pub bigquery: BigQuerySettings,

    #[serde(default)]
    pub source: SourceSettings,

    #[serde(default)]
    pub funnel: FunnelSettings,

    #[serde(default)]
    pub server: ServerSettings,
}

/// Warehouse coordinates
#[derive(Clone, Serialize, Deserialize)]
pub struct BigQuerySettings {
    pub project_id: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dataset_id: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub table_id: Option<String>,

    /// Job location, e.g. `US` or `europe-west1`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,

    /// OAuth bearer token used for the REST API
    #[serde(default, skip_serializing)]
    pub access_token: Option<String>,

    /// REST endpoint override, for emulators and proxies
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_base: Option<String>,
}

impl fmt::Debug for BigQuerySettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BigQuerySettings")
            .field("project_id", &self.project_id)
            .field("dataset_id", &self.dataset_id)
            .field("table_id", &self.table_id)
            .field("location", &self.location)
            .field("access_token", &self.access_token.as_ref().map(|_| "<redacted>"))
            .field("api_base", &self.api_base)
            .finish()
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceBackend {
    #[default]
    BigQuery,
    Csv,
}

impl SourceBackend {
    /// Backend name used to look up a data source factory
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceBackend::BigQuery => "bigquery",
            SourceBackend::Csv => "csv",
        }
    }
}

impl fmt::Display for SourceBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceSettings {
    #[serde(default)]
    pub backend: SourceBackend,

    /// Directory of `<table>.csv` exports, used by the csv backend
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub csv_dir: Option<PathBuf>,

    /// Predefined onboarding journey query
    #[serde(default = "default_view_query_path")]
    pub view_query_path: PathBuf,
}

impl Default for SourceSettings {
    fn default() -> Self {
        Self {
            backend: SourceBackend::default(),
            csv_dir: None,
            view_query_path: default_view_query_path(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FunnelSettings {
    #[serde(default = "default_step_prefix")]
    pub step_prefix: String,

    /// Canonical step order
    #[serde(default = "default_steps")]
    pub steps: Vec<String>,
}

impl Default for FunnelSettings {
    fn default() -> Self {
        Self {
            step_prefix: default_step_prefix(),
            steps: default_steps(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerSettings {
    #[serde(default = "default_server_address")]
    pub address: String,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            address: default_server_address(),
        }
    }
}

fn default_view_query_path() -> PathBuf {
    PathBuf::from(DEFAULT_VIEW_QUERY_FILE)
}

fn default_step_prefix() -> String {
    ONBOARDING_STEP_PREFIX.to_string()
}

fn default_steps() -> Vec<String> {
    ONBOARDING_FUNNEL_STEPS.iter().map(|s| s.to_string()).collect()
}

fn default_server_address() -> String {
    DEFAULT_SERVER_ADDRESS.to_string()
}

/// Which query feeds the funnel
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryMode {
    /// Run the predefined journey query from `source.view_query_path`
    ViewQuery,
    /// `SELECT *` from the configured table
    TableScan,
}

impl QueryMode {
    pub fn from_table_scan_flag(table_scan: bool) -> Self {
        if table_scan {
            QueryMode::TableScan
        } else {
            QueryMode::ViewQuery
        }
    }
}

impl fmt::Display for QueryMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            QueryMode::ViewQuery => write!(f, "view-query"),
            QueryMode::TableScan => write!(f, "table-scan"),
        }
    }
}

impl DashboardConfig {
    /// Parse settings from YAML without touching the filesystem
    pub fn from_yaml(yaml: &str) -> Result<Self, ConfigError> {
        Ok(serde_yaml::from_str(yaml)?)
    }

    /// Load, resolve and validate a settings file.
    ///
    /// Relative paths inside the file are resolved against the file's own
    /// directory, and `LISSEN_BIGQUERY_ACCESS_TOKEN` overrides the token.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let yaml = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;

        let mut config = Self::from_yaml(&yaml)?;
        if let Some(base_dir) = path.parent() {
            config.resolve_paths(base_dir);
        }
        config.apply_overrides(|key| std::env::var(key).ok());
        config.validate()?;

        info!(
            "Loaded settings from {} (project: {}, backend: {})",
            path.display(),
            config.bigquery.project_id,
            config.source.backend
        );
        Ok(config)
    }

    /// Make relative paths absolute with respect to `base_dir`
    pub fn resolve_paths(&mut self, base_dir: &Path) {
        if self.source.view_query_path.is_relative() {
            self.source.view_query_path = base_dir.join(&self.source.view_query_path);
        }
        if let Some(dir) = self.source.csv_dir.as_mut() {
            if dir.is_relative() {
                *dir = base_dir.join(&*dir);
            }
        }
    }

    /// Apply environment overrides through `lookup`
    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(token) = lookup(ACCESS_TOKEN_ENV).filter(|t| !t.trim().is_empty()) {
            debug!("Using BigQuery access token from {}", ACCESS_TOKEN_ENV);
            self.bigquery.access_token = Some(token.trim().to_string());
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.bigquery.project_id.trim().is_empty() {
            return Err(ConfigError::missing("bigquery.project_id"));
        }

        if self.funnel.steps.is_empty() {
            return Err(ConfigError::invalid(
                "funnel.steps",
                "at least one step is required",
            ));
        }

        let mut seen = HashSet::new();
        for step in &self.funnel.steps {
            if !seen.insert(step.as_str()) {
                return Err(ConfigError::invalid(
                    "funnel.steps",
                    format!("duplicate step '{}'", step),
                ));
            }
        }

        if self.source.backend == SourceBackend::Csv && self.source.csv_dir.is_none() {
            return Err(ConfigError::missing("source.csv_dir"));
        }

        Ok(())
    }

    /// SQL text for the requested mode
    pub fn query_text(&self, mode: QueryMode) -> Result<String, ConfigError> {
        match mode {
            QueryMode::ViewQuery => self.read_view_query(),
            QueryMode::TableScan => Ok(format!(
                "SELECT *\nFROM {}",
                self.bigquery.table_reference()?
            )),
        }
    }

    fn read_view_query(&self) -> Result<String, ConfigError> {
        let path = &self.source.view_query_path;
        let sql = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.clone(),
            source,
        })?;

        if sql.trim().is_empty() {
            return Err(ConfigError::invalid(
                "source.view_query_path",
                format!("{} is empty", path.display()),
            ));
        }
        Ok(sql)
    }
}

impl BigQuerySettings {
    /// Fully qualified, backtick-quoted table name
    pub fn table_reference(&self) -> Result<String, ConfigError> {
        let project = checked_identifier("bigquery.project_id", Some(&self.project_id), ".:")?;
        let dataset = checked_identifier("bigquery.dataset_id", self.dataset_id.as_deref(), "")?;
        let table = checked_identifier("bigquery.table_id", self.table_id.as_deref(), "")?;
        Ok(format!("`{}.{}.{}`", project, dataset, table))
    }
}

fn checked_identifier<'a>(
    key: &str,
    value: Option<&'a str>,
    extra: &str,
) -> Result<&'a str, ConfigError> {
    let value = value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .ok_or_else(|| ConfigError::missing(key))?;

    let valid = value
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-' || extra.contains(c));
    if !valid {
        return Err(ConfigError::invalid(
            key,
            format!("'{}' contains characters not allowed in an identifier", value),
        ));
    }
    Ok(value)
}
