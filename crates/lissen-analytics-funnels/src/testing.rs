//! In-memory data source for service and handler tests

use async_trait::async_trait;
use lissen_query::{
    Capability, DataError, DataRow, DataSource, DatasetSchema, FieldDef, FieldType, QueryResult,
    SqlFeature,
};
use serde_json::Value;
use std::sync::Mutex;

use crate::types::{EventRow, STEP_COLUMN, USER_COLUMN};

/// Answers every query with the same result, or with an error once
pub struct StaticSource {
    result: QueryResult,
    failure: Mutex<Option<DataError>>,
}

impl StaticSource {
    pub fn new(result: QueryResult) -> Self {
        Self {
            result,
            failure: Mutex::new(None),
        }
    }

    pub fn with_events(events: &[EventRow]) -> Self {
        let rows = events
            .iter()
            .map(|event| {
                let mut row = DataRow::new();
                row.insert(
                    STEP_COLUMN.to_string(),
                    Value::from(event.event_category_ordered.clone()),
                );
                row.insert(USER_COLUMN.to_string(), Value::from(event.user_id.clone()));
                row
            })
            .collect();

        Self::new(QueryResult::new(journey_schema(), rows, 1))
    }

    pub fn failing(error: DataError) -> Self {
        Self {
            result: QueryResult::new(journey_schema(), Vec::new(), 0),
            failure: Mutex::new(Some(error)),
        }
    }
}

pub fn journey_schema() -> DatasetSchema {
    DatasetSchema::new(vec![
        FieldDef::new(USER_COLUMN, FieldType::Int64),
        FieldDef::new(STEP_COLUMN, FieldType::String),
    ])
}

#[async_trait]
impl DataSource for StaticSource {
    fn source_type(&self) -> &'static str {
        "static"
    }

    fn capabilities(&self) -> Vec<Capability> {
        vec![Capability::Sql]
    }

    async fn close(&self) -> lissen_query::Result<()> {
        Ok(())
    }
}

#[async_trait]
impl SqlFeature for StaticSource {
    async fn execute_sql(
        &self,
        _sql: &str,
        _params: Option<Vec<Value>>,
    ) -> lissen_query::Result<QueryResult> {
        if let Some(error) = self.failure.lock().unwrap().take() {
            return Err(error);
        }
        Ok(self.result.clone())
    }

    fn validate_sql(&self, _sql: &str) -> lissen_query::Result<()> {
        Ok(())
    }
}
