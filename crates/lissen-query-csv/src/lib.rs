//! CSV export implementation of the lissen-query SqlFeature trait
//!
//! Serves local CSV exports of the event table, mostly for working on the
//! dashboard offline. Each table is a file `<dir>/<table>.csv`; the only
//! statement understood is a full scan:
//!
//! ```sql
//! SELECT * FROM user_journey
//! SELECT * FROM `lissen-prod.analytics.user_journey`
//! ```
//!
//! For qualified names only the last segment picks the file. All columns are
//! read as strings and empty cells become null.

use async_trait::async_trait;
use lissen_query::{
    Capability, ConnectionConfig, DataError, DataRow, DataSource, DataSourceFactory,
    DatasetSchema, FieldDef, FieldType, QueryResult, Result, SqlFeature,
};
use serde_json::Value;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use tracing::debug;

/// Directory of CSV files exposed as tables
pub struct CsvSource {
    dir: PathBuf,
}

impl CsvSource {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Extract the table name from `SELECT * FROM <table>`
    fn parse_table_scan(sql: &str) -> Result<String> {
        let tokens: Vec<&str> = sql.split_whitespace().collect();

        let is_scan = tokens.len() == 4
            && tokens[0].eq_ignore_ascii_case("select")
            && tokens[1] == "*"
            && tokens[2].eq_ignore_ascii_case("from");
        if !is_scan {
            return Err(DataError::operation_not_supported(
                "the CSV source only runs `SELECT * FROM <table>`",
            ));
        }

        let reference = tokens[3].trim_end_matches(';').trim_matches('`');
        let table = reference.rsplit('.').next().unwrap_or(reference);

        if table.is_empty()
            || !table
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
        {
            return Err(DataError::InvalidQuery(format!(
                "Invalid table name: {}",
                tokens[3]
            )));
        }

        Ok(table.to_string())
    }

    fn table_path(&self, table: &str) -> PathBuf {
        self.dir.join(format!("{}.csv", table))
    }

    fn parse_csv(bytes: &[u8], table: &str) -> Result<(DatasetSchema, Vec<DataRow>)> {
        let mut reader = csv::Reader::from_reader(bytes);

        let headers: Vec<String> = reader
            .headers()
            .map_err(|e| {
                DataError::SerializationError(format!("Failed to read header of {}: {}", table, e))
            })?
            .iter()
            .map(|h| h.trim().to_string())
            .collect();

        let mut rows = Vec::new();
        for record in reader.records() {
            let record = record.map_err(|e| {
                DataError::SerializationError(format!("Malformed row in {}: {}", table, e))
            })?;

            let row: DataRow = headers
                .iter()
                .zip(record.iter())
                .map(|(name, cell)| {
                    let value = if cell.is_empty() {
                        Value::Null
                    } else {
                        Value::String(cell.to_string())
                    };
                    (name.clone(), value)
                })
                .collect();
            rows.push(row);
        }

        let schema = DatasetSchema::new(
            headers
                .iter()
                .map(|name| FieldDef::new(name.clone(), FieldType::String))
                .collect(),
        );

        Ok((schema, rows))
    }
}

#[async_trait]
impl DataSource for CsvSource {
    fn source_type(&self) -> &'static str {
        "csv"
    }

    fn capabilities(&self) -> Vec<Capability> {
        vec![Capability::Sql, Capability::FileScan]
    }

    async fn close(&self) -> Result<()> {
        Ok(())
    }
}

#[async_trait]
impl SqlFeature for CsvSource {
    async fn execute_sql(&self, sql: &str, params: Option<Vec<Value>>) -> Result<QueryResult> {
        if params.as_ref().is_some_and(|p| !p.is_empty()) {
            return Err(DataError::operation_not_supported(
                "query parameters are not supported by the CSV source",
            ));
        }

        let table = Self::parse_table_scan(sql)?;
        let path = self.table_path(&table);
        let started = Instant::now();

        debug!("Scanning CSV table {} from {}", table, path.display());

        let bytes = tokio::fs::read(&path).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                DataError::not_found(format!("No CSV export for table {} at {}", table, path.display()))
            } else {
                DataError::BackendError(format!("Failed to read {}: {}", path.display(), e))
            }
        })?;

        let (schema, rows) = Self::parse_csv(&bytes, &table)?;
        let execution_ms = started.elapsed().as_millis() as u64;

        debug!("Read {} rows from {}", rows.len(), path.display());
        Ok(QueryResult::new(schema, rows, execution_ms))
    }

    fn validate_sql(&self, sql: &str) -> Result<()> {
        Self::parse_table_scan(sql).map(|_| ())
    }
}

/// Creates `CsvSource`s; `database` is the directory holding the files.
pub struct CsvFactory;

impl DataSourceFactory for CsvFactory {
    fn backend_type(&self) -> &'static str {
        "csv"
    }

    fn create_source(&self, config: ConnectionConfig) -> Result<Arc<dyn SqlFeature>> {
        let dir = config
            .database
            .filter(|d| !d.is_empty())
            .ok_or_else(|| DataError::invalid_configuration("CSV source needs a directory"))?;

        Ok(Arc::new(CsvSource::new(dir)))
    }
}
