use crate::error::Result;
use crate::types::*;
use async_trait::async_trait;

/// Core trait that all data sources must implement
#[async_trait]
pub trait DataSource: Send + Sync {
    /// Get the type name of this data source
    fn source_type(&self) -> &'static str;

    /// Get all capabilities supported by this source
    fn capabilities(&self) -> Vec<Capability>;

    /// Check if a specific capability is supported
    fn supports(&self, capability: Capability) -> bool {
        self.capabilities().contains(&capability)
    }

    /// Release any held resources
    async fn close(&self) -> Result<()>;
}

/// Sources that can run a SQL statement and hand back a table
#[async_trait]
pub trait SqlFeature: DataSource {
    /// Execute a raw SQL query
    async fn execute_sql(
        &self,
        sql: &str,
        params: Option<Vec<serde_json::Value>>,
    ) -> Result<QueryResult>;

    /// Reject statements this source will not run
    fn validate_sql(&self, sql: &str) -> Result<()>;
}
