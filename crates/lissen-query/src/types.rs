use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// Capabilities supported by a data source
#[derive(Debug, Clone, Copy, Eq, PartialEq, Serialize, Deserialize)]
pub enum Capability {
    /// SQL-based queries
    Sql,
    /// Flat files scanned in full (CSV exports, etc.)
    FileScan,
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Capability::Sql => write!(f, "sql"),
            Capability::FileScan => write!(f, "file-scan"),
        }
    }
}

/// Field data types supported by query results
#[derive(Debug, Clone, Copy, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldType {
    Boolean,
    Int64,
    Float64,
    String,
    Bytes,
    Date,
    Timestamp,
    /// Nested records and repeated fields
    Json,
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldType::Boolean => write!(f, "boolean"),
            FieldType::Int64 => write!(f, "int64"),
            FieldType::Float64 => write!(f, "float64"),
            FieldType::String => write!(f, "string"),
            FieldType::Bytes => write!(f, "bytes"),
            FieldType::Date => write!(f, "date"),
            FieldType::Timestamp => write!(f, "timestamp"),
            FieldType::Json => write!(f, "json"),
        }
    }
}

/// Definition of a single column in a result set
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FieldDef {
    pub name: String,
    pub field_type: FieldType,
    pub nullable: bool,
    pub description: Option<String>,
}

impl FieldDef {
    pub fn new(name: impl Into<String>, field_type: FieldType) -> Self {
        Self {
            name: name.into(),
            field_type,
            nullable: true,
            description: None,
        }
    }
}

/// Schema of a result set
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DatasetSchema {
    pub fields: Vec<FieldDef>,
}

impl DatasetSchema {
    pub fn new(fields: Vec<FieldDef>) -> Self {
        Self { fields }
    }

    pub fn has_field(&self, name: &str) -> bool {
        self.fields.iter().any(|f| f.name == name)
    }

    pub fn field_names(&self) -> Vec<&str> {
        self.fields.iter().map(|f| f.name.as_str()).collect()
    }
}

/// A row of data as column name → value
pub type DataRow = HashMap<String, serde_json::Value>;

/// Statistics about query execution
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryStats {
    /// Number of rows returned
    pub row_count: usize,
    /// Total rows reported by the backend, if known
    pub total_rows: Option<usize>,
    /// Wall-clock execution time in milliseconds
    pub execution_ms: u64,
    /// Bytes scanned by the backend, if reported
    pub bytes_processed: Option<u64>,
}

/// Result of executing a query
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryResult {
    pub schema: DatasetSchema,
    pub rows: Vec<DataRow>,
    pub stats: QueryStats,
}

impl QueryResult {
    pub fn new(schema: DatasetSchema, rows: Vec<DataRow>, execution_ms: u64) -> Self {
        let row_count = rows.len();

        Self {
            schema,
            rows,
            stats: QueryStats {
                row_count,
                total_rows: Some(row_count),
                execution_ms,
                bytes_processed: None,
            },
        }
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_capability_display() {
        assert_eq!(Capability::Sql.to_string(), "sql");
        assert_eq!(Capability::FileScan.to_string(), "file-scan");
    }

    #[test]
    fn test_schema_lookup() {
        let schema = DatasetSchema::new(vec![
            FieldDef::new("user_id", FieldType::String),
            FieldDef::new("event_category_ordered", FieldType::String),
        ]);

        assert!(schema.has_field("user_id"));
        assert!(!schema.has_field("session_id"));
        assert_eq!(schema.field_names(), vec!["user_id", "event_category_ordered"]);
    }

    #[test]
    fn test_query_result_counts_rows() {
        let mut row = DataRow::new();
        row.insert("user_id".to_string(), serde_json::json!("u1"));

        let result = QueryResult::new(DatasetSchema::default(), vec![row], 7);

        assert_eq!(result.stats.row_count, 1);
        assert_eq!(result.stats.total_rows, Some(1));
        assert_eq!(result.stats.execution_ms, 7);
        assert!(!result.is_empty());
    }
}
