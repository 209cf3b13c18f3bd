use std::sync::Arc;

use lissen_config::{ConfigError, DashboardConfig, QueryMode};
use lissen_query::{QueryResult, SqlFeature};
use serde_json::Value;
use tracing::{debug, info};

use crate::types::{EventRow, FunnelError, STEP_COLUMN, USER_COLUMN};

/// Reads the raw onboarding events from the configured data source.
///
/// The query text is fixed when the loader is built; every `load` runs it
/// again and returns fresh rows.
pub struct OnboardingLoader {
    source: Arc<dyn SqlFeature>,
    sql: String,
    mode: QueryMode,
}

impl OnboardingLoader {
    pub fn new(
        source: Arc<dyn SqlFeature>,
        config: &DashboardConfig,
        mode: QueryMode,
    ) -> Result<Self, ConfigError> {
        let sql = config.query_text(mode)?;

        match mode {
            QueryMode::ViewQuery => info!(
                "Using predefined journey query from {}",
                config.source.view_query_path.display()
            ),
            QueryMode::TableScan => info!(
                "Using full table scan of {}",
                config.bigquery.table_reference()?
            ),
        }

        Ok(Self::with_sql(source, sql, mode))
    }

    /// Build a loader around an explicit statement
    pub fn with_sql(source: Arc<dyn SqlFeature>, sql: impl Into<String>, mode: QueryMode) -> Self {
        Self {
            source,
            sql: sql.into(),
            mode,
        }
    }

    pub fn mode(&self) -> QueryMode {
        self.mode
    }

    pub fn sql(&self) -> &str {
        &self.sql
    }

    pub async fn load(&self) -> Result<Vec<EventRow>, FunnelError> {
        debug!(
            "Loading onboarding events from {} source ({})",
            self.source.source_type(),
            self.mode
        );

        let result = self.source.execute_sql(&self.sql, None).await?;
        info!(
            "Loaded {} rows in {}ms",
            result.stats.row_count, result.stats.execution_ms
        );

        event_rows_from_result(&result)
    }
}

/// Convert a query result into event rows.
///
/// Both required columns must be present in the schema, or in every row when
/// the backend reported no schema. Rows with a null step or user are skipped.
/// Whole-number floats are written without a fraction, so a user id typed
/// `FLOAT` (`42.0`) matches the same id typed `INTEGER` (`42`).
pub fn event_rows_from_result(result: &QueryResult) -> Result<Vec<EventRow>, FunnelError> {
    let required = [STEP_COLUMN, USER_COLUMN];

    let missing: Vec<String> = required
        .iter()
        .filter(|column| {
            if result.schema.fields.is_empty() {
                result.rows.iter().any(|row| !row.contains_key(**column))
            } else {
                !result.schema.has_field(column)
            }
        })
        .map(|column| column.to_string())
        .collect();

    if !missing.is_empty() {
        return Err(FunnelError::MissingColumns { columns: missing });
    }

    let rows = result
        .rows
        .iter()
        .filter_map(|row| {
            let step = row.get(STEP_COLUMN).and_then(cell_text)?;
            let user_id = row.get(USER_COLUMN).and_then(cell_text)?;
            Some(EventRow::new(step, user_id))
        })
        .collect::<Vec<_>>();

    let skipped = result.rows.len() - rows.len();
    if skipped > 0 {
        debug!("Skipped {} rows with a null step or user", skipped);
    }

    Ok(rows)
}

/// Largest float that still holds every integer exactly
const MAX_EXACT_FLOAT: f64 = 9_007_199_254_740_992.0;

/// Text form of a cell, `None` for null
fn cell_text(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        Value::Number(n) if n.is_f64() => match n.as_f64() {
            Some(f) if f.fract() == 0.0 && f.abs() <= MAX_EXACT_FLOAT => {
                Some((f as i64).to_string())
            }
            _ => Some(n.to_string()),
        },
        other => Some(other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{journey_schema, StaticSource};
    use lissen_query::{DataError, DataRow, DatasetSchema, FieldDef, FieldType};
    use serde_json::json;
    use std::io::Write;

    fn row(step: Value, user: Value) -> DataRow {
        let mut row = DataRow::new();
        row.insert(STEP_COLUMN.to_string(), step);
        row.insert(USER_COLUMN.to_string(), user);
        row
    }

    #[test]
    fn test_rows_are_converted_and_ids_normalized() {
        let result = QueryResult::new(
            journey_schema(),
            vec![
                row(json!("1.onboarding_main"), json!(42)),
                row(json!("1.onboarding_main"), json!("42")),
                row(json!(null), json!(7)),
                row(json!("1.onboarding_close"), json!(null)),
            ],
            3,
        );

        let rows = event_rows_from_result(&result).unwrap();

        assert_eq!(
            rows,
            vec![
                EventRow::new("1.onboarding_main", "42"),
                EventRow::new("1.onboarding_main", "42"),
            ]
        );
    }

    #[test]
    fn test_float_user_ids_match_integer_ids() {
        let result = QueryResult::new(
            journey_schema(),
            vec![
                row(json!("1.onboarding_main"), json!(42.0)),
                row(json!("1.onboarding_main"), json!(42)),
                row(json!("1.onboarding_main"), json!(-3.0)),
                row(json!("1.onboarding_main"), json!(42.5)),
            ],
            4,
        );

        let rows = event_rows_from_result(&result).unwrap();
        let users: Vec<&str> = rows.iter().map(|r| r.user_id.as_str()).collect();

        assert_eq!(users, vec!["42", "42", "-3", "42.5"]);
    }

    #[test]
    fn test_missing_columns_are_all_named() {
        let result = QueryResult::new(
            DatasetSchema::new(vec![FieldDef::new("session_id", FieldType::String)]),
            Vec::new(),
            0,
        );

        match event_rows_from_result(&result) {
            Err(FunnelError::MissingColumns { columns }) => {
                assert_eq!(columns, vec![STEP_COLUMN, USER_COLUMN]);
            }
            other => panic!("expected missing columns, got {other:?}"),
        }
    }

    #[test]
    fn test_schemaless_result_checks_rows() {
        let mut partial = DataRow::new();
        partial.insert(USER_COLUMN.to_string(), json!("u1"));

        let result = QueryResult::new(DatasetSchema::default(), vec![partial], 0);

        match event_rows_from_result(&result) {
            Err(FunnelError::MissingColumns { columns }) => {
                assert_eq!(columns, vec![STEP_COLUMN]);
            }
            other => panic!("expected missing columns, got {other:?}"),
        }

        let empty = QueryResult::new(DatasetSchema::default(), Vec::new(), 0);
        assert!(event_rows_from_result(&empty).unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_loader_runs_query_and_converts() {
        let source = Arc::new(StaticSource::new(QueryResult::new(
            journey_schema(),
            vec![row(json!("1.onboarding_main"), json!(1))],
            1,
        )));

        let loader = OnboardingLoader::with_sql(source, "SELECT 1", QueryMode::ViewQuery);
        let rows = loader.load().await.unwrap();

        assert_eq!(rows, vec![EventRow::new("1.onboarding_main", "1")]);
    }

    #[tokio::test]
    async fn test_loader_surfaces_query_errors() {
        let source = Arc::new(StaticSource::failing(DataError::not_found("user_journey")));

        let loader = OnboardingLoader::with_sql(source, "SELECT * FROM t", QueryMode::TableScan);
        let err = loader.load().await.unwrap_err();

        assert!(matches!(err, FunnelError::Query(DataError::NotFound(_))));
    }

    #[test]
    fn test_loader_reads_view_query_once() {
        let dir = tempfile::tempdir().unwrap();
        let sql_path = dir.path().join("journey.sql");
        let mut file = std::fs::File::create(&sql_path).unwrap();
        writeln!(file, "SELECT user_id, event_category_ordered FROM journey").unwrap();

        let mut config = DashboardConfig::from_yaml("bigquery:\n  project_id: lissen-prod\n").unwrap();
        config.source.view_query_path = sql_path.clone();

        let source = Arc::new(StaticSource::with_events(&[]));
        let loader = OnboardingLoader::new(source, &config, QueryMode::ViewQuery).unwrap();

        std::fs::remove_file(&sql_path).unwrap();
        assert!(loader.sql().starts_with("SELECT user_id"));
        assert_eq!(loader.mode(), QueryMode::ViewQuery);
    }

    #[test]
    fn test_loader_table_scan_needs_table() {
        let config = DashboardConfig::from_yaml("bigquery:\n  project_id: lissen-prod\n").unwrap();
        let source = Arc::new(StaticSource::with_events(&[]));

        let err = OnboardingLoader::new(source, &config, QueryMode::TableScan)
            .err()
            .unwrap();
        assert!(matches!(err, ConfigError::Missing { .. } | ConfigError::Invalid { .. }));
    }
}
