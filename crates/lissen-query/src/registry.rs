use crate::error::{DataError, Result};
use crate::traits::SqlFeature;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, warn};

/// Connection configuration for creating data sources
#[derive(Clone)]
pub struct ConnectionConfig {
    /// Backend type identifier (bigquery, csv)
    pub backend: String,
    /// Endpoint override (API base URL)
    pub host: Option<String>,
    /// Project, database or directory the source reads from
    pub database: Option<String>,
    /// Access token or password
    pub password: Option<String>,
    /// Additional options as key-value pairs
    pub options: HashMap<String, String>,
}

impl ConnectionConfig {
    pub fn new(backend: impl Into<String>) -> Self {
        Self {
            backend: backend.into(),
            host: None,
            database: None,
            password: None,
            options: HashMap::new(),
        }
    }

    pub fn with_host(mut self, host: impl Into<String>) -> Self {
        self.host = Some(host.into());
        self
    }

    pub fn with_database(mut self, database: impl Into<String>) -> Self {
        self.database = Some(database.into());
        self
    }

    pub fn with_password(mut self, password: impl Into<String>) -> Self {
        self.password = Some(password.into());
        self
    }

    pub fn with_option(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.options.insert(key.into(), value.into());
        self
    }

    pub fn option(&self, key: &str) -> Option<&str> {
        self.options.get(key).map(String::as_str)
    }

    /// Get connection string for display purposes (without password)
    pub fn connection_string(&self) -> String {
        let mut parts = vec![format!("{}://", self.backend)];

        if let Some(host) = &self.host {
            parts.push(host.clone());
        }

        if let Some(database) = &self.database {
            parts.push(format!("/{}", database));
        }

        parts.join("")
    }
}

impl fmt::Debug for ConnectionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionConfig")
            .field("backend", &self.backend)
            .field("host", &self.host)
            .field("database", &self.database)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .field("options", &self.options)
            .finish()
    }
}

/// Factory trait for creating data sources from configurations
pub trait DataSourceFactory: Send + Sync {
    /// Get the backend type this factory handles
    fn backend_type(&self) -> &'static str;

    /// Create a data source from configuration
    fn create_source(&self, config: ConnectionConfig) -> Result<Arc<dyn SqlFeature>>;
}

/// Registry of backend factories.
///
/// Only factories are kept. Every `create_source` call builds a fresh source,
/// so no query data outlives the caller that asked for it.
pub struct QueryRegistry {
    factories: Arc<RwLock<HashMap<String, Arc<dyn DataSourceFactory>>>>,
}

impl QueryRegistry {
    pub fn new() -> Self {
        Self {
            factories: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Register a factory for a backend type
    pub async fn register_factory(&self, factory: Arc<dyn DataSourceFactory>) -> Result<()> {
        let backend = factory.backend_type();
        let mut factories = self.factories.write().await;

        if factories.contains_key(backend) {
            warn!("Overwriting existing factory for backend: {}", backend);
        }

        factories.insert(backend.to_string(), factory);
        debug!("Registered factory for backend: {}", backend);
        Ok(())
    }

    /// Create a new data source for `config.backend`
    pub async fn create_source(&self, config: ConnectionConfig) -> Result<Arc<dyn SqlFeature>> {
        let factory = self
            .factories
            .read()
            .await
            .get(&config.backend)
            .cloned()
            .ok_or_else(|| {
                DataError::InvalidConfiguration(format!(
                    "No factory registered for backend: {}",
                    config.backend
                ))
            })?;

        debug!("Creating source {}", config.connection_string());
        factory.create_source(config)
    }

    /// List registered backend types
    pub async fn list_backends(&self) -> Vec<String> {
        let factories = self.factories.read().await;
        let mut backends: Vec<String> = factories.keys().cloned().collect();
        backends.sort();
        backends
    }

    /// Check if a backend is registered
    pub async fn has_backend(&self, backend: &str) -> bool {
        self.factories.read().await.contains_key(backend)
    }
}

impl Default for QueryRegistry {
    fn default() -> Self {
        Self::new()
    }
}
