//! BigQuery driver for lissen-query
//!
//! Runs statements through the BigQuery REST API (`jobs.query` followed by
//! `jobs.getQueryResults` for polling and pagination) and implements
//! `DataSource` and `SqlFeature` on top of it.
//!
//! Authentication is a plain OAuth bearer token, for example the output of
//! `gcloud auth print-access-token`.

use async_trait::async_trait;
use lissen_query::{
    Capability, ConnectionConfig, DataError, DataRow, DataSource, DataSourceFactory,
    DatasetSchema, FieldDef, FieldType, QueryResult, QueryStats, Result, SqlFeature,
};
use reqwest::{Client, RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, warn};

const BIGQUERY_API_BASE: &str = "https://bigquery.googleapis.com/bigquery/v2";
const REQUEST_TIMEOUT_SECS: u64 = 120;
const QUERY_TIMEOUT_MS: u64 = 30_000;
const PAGE_SIZE: u32 = 10_000;
const POLL_INTERVAL: Duration = Duration::from_millis(500);
const MAX_POLLS: u32 = 240;

/// Leading keywords of statements that modify data or schema
const FORBIDDEN_STATEMENTS: [&str; 8] = [
    "alter", "create", "delete", "drop", "insert", "merge", "truncate", "update",
];

/// BigQuery data source implementation
pub struct BigQuerySource {
    client: Client,
    project_id: String,
    location: Option<String>,
    access_token: String,
    base_url: String,
    poll_interval: Duration,
    max_polls: u32,
}

/// jobs.query request body
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct QueryRequest<'a> {
    query: &'a str,
    use_legacy_sql: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    location: Option<&'a str>,
    timeout_ms: u64,
    max_results: u32,
}

/// Shared shape of jobs.query and jobs.getQueryResults responses
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct QueryResponse {
    #[serde(default)]
    schema: Option<TableSchema>,
    #[serde(default)]
    job_reference: Option<JobReference>,
    #[serde(default)]
    rows: Vec<TableRow>,
    #[serde(default)]
    page_token: Option<String>,
    #[serde(default)]
    job_complete: bool,
    #[serde(default)]
    total_rows: Option<String>,
    #[serde(default)]
    total_bytes_processed: Option<String>,
    #[serde(default)]
    errors: Vec<ErrorProto>,
}

#[derive(Debug, Default, Deserialize)]
struct TableSchema {
    #[serde(default)]
    fields: Vec<TableFieldSchema>,
}

#[derive(Debug, Deserialize)]
struct TableFieldSchema {
    name: String,
    #[serde(rename = "type")]
    field_type: String,
    #[serde(default)]
    mode: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TableRow {
    #[serde(default)]
    f: Vec<TableCell>,
}

#[derive(Debug, Deserialize)]
struct TableCell {
    #[serde(default)]
    v: Value,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct JobReference {
    job_id: String,
    #[serde(default)]
    location: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ErrorProto {
    #[serde(default)]
    reason: Option<String>,
    message: String,
}

#[derive(Debug, Deserialize)]
struct ApiErrorResponse {
    error: ApiError,
}

#[derive(Debug, Deserialize)]
struct ApiError {
    message: String,
}

impl BigQuerySource {
    /// Create a new BigQuery data source
    pub fn new(
        project_id: impl Into<String>,
        access_token: impl Into<String>,
        location: Option<String>,
    ) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()
            .map_err(|e| {
                DataError::ConnectionFailed(format!("Failed to create HTTP client: {}", e))
            })?;

        Ok(Self {
            client,
            project_id: project_id.into(),
            location,
            access_token: access_token.into(),
            base_url: BIGQUERY_API_BASE.to_string(),
            poll_interval: POLL_INTERVAL,
            max_polls: MAX_POLLS,
        })
    }

    /// Point the source at a different API endpoint (emulators, tests)
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    /// Tune how an unfinished job is polled
    pub fn with_polling(mut self, interval: Duration, max_polls: u32) -> Self {
        self.poll_interval = interval;
        self.max_polls = max_polls;
        self
    }

    fn queries_url(&self) -> String {
        format!("{}/projects/{}/queries", self.base_url, self.project_id)
    }

    /// Send an authenticated request and decode the JSON body
    async fn send<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<T> {
        let response = request
            .bearer_auth(&self.access_token)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    DataError::QueryTimeout(REQUEST_TIMEOUT_SECS * 1000)
                } else {
                    DataError::ConnectionFailed(format!("BigQuery request failed: {}", e))
                }
            })?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| DataError::BackendError(format!("Failed to read response: {}", e)))?;

        if !status.is_success() {
            return Err(Self::map_api_error(status, &body));
        }

        serde_json::from_str(&body).map_err(|e| {
            DataError::SerializationError(format!("Failed to parse BigQuery response: {}", e))
        })
    }

    fn map_api_error(status: StatusCode, body: &str) -> DataError {
        let message = serde_json::from_str::<ApiErrorResponse>(body)
            .map(|e| e.error.message)
            .unwrap_or_else(|_| body.to_string());

        error!("BigQuery API error ({}): {}", status, message);

        match status {
            StatusCode::BAD_REQUEST => DataError::InvalidQuery(message),
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                DataError::permission_denied(message)
            }
            StatusCode::NOT_FOUND => DataError::not_found(message),
            _ => DataError::QueryFailed(format!("BigQuery API returned {}: {}", status, message)),
        }
    }

    async fn start_query(&self, sql: &str) -> Result<QueryResponse> {
        let body = QueryRequest {
            query: sql,
            use_legacy_sql: false,
            location: self.location.as_deref(),
            timeout_ms: QUERY_TIMEOUT_MS,
            max_results: PAGE_SIZE,
        };

        self.send(self.client.post(self.queries_url()).json(&body))
            .await
    }

    async fn get_query_results(
        &self,
        job: &JobReference,
        page_token: Option<&str>,
    ) -> Result<QueryResponse> {
        let url = format!("{}/{}", self.queries_url(), job.job_id);

        let mut params = vec![
            ("timeoutMs", QUERY_TIMEOUT_MS.to_string()),
            ("maxResults", PAGE_SIZE.to_string()),
        ];
        if let Some(location) = job.location.as_ref().or(self.location.as_ref()) {
            params.push(("location", location.clone()));
        }
        if let Some(token) = page_token {
            params.push(("pageToken", token.to_string()));
        }

        self.send(self.client.get(url).query(&params)).await
    }

    /// Map a BigQuery column type to FieldType
    fn map_bq_type(bq_type: &str) -> FieldType {
        match bq_type.to_ascii_uppercase().as_str() {
            "INTEGER" | "INT64" => FieldType::Int64,
            "FLOAT" | "FLOAT64" | "NUMERIC" | "BIGNUMERIC" => FieldType::Float64,
            "BOOLEAN" | "BOOL" => FieldType::Boolean,
            "BYTES" => FieldType::Bytes,
            "DATE" => FieldType::Date,
            "TIMESTAMP" | "DATETIME" => FieldType::Timestamp,
            "RECORD" | "STRUCT" | "JSON" => FieldType::Json,
            _ => FieldType::String,
        }
    }

    fn to_dataset_schema(schema: &TableSchema) -> DatasetSchema {
        DatasetSchema::new(
            schema
                .fields
                .iter()
                .map(|field| FieldDef {
                    name: field.name.clone(),
                    field_type: Self::map_bq_type(&field.field_type),
                    nullable: field.mode.as_deref() != Some("REQUIRED"),
                    description: None,
                })
                .collect(),
        )
    }

    /// Decode a cell. The API sends every scalar as a string.
    fn decode_value(field: &TableFieldSchema, value: Value) -> Value {
        if field.mode.as_deref() == Some("REPEATED") {
            return value;
        }

        let text = match value {
            Value::String(text) => text,
            other => return other,
        };

        match Self::map_bq_type(&field.field_type) {
            FieldType::Int64 => text
                .parse::<i64>()
                .map(Value::from)
                .unwrap_or(Value::String(text)),
            FieldType::Float64 => text
                .parse::<f64>()
                .ok()
                .and_then(serde_json::Number::from_f64)
                .map(Value::Number)
                .unwrap_or(Value::String(text)),
            FieldType::Boolean => match text.as_str() {
                "true" => Value::Bool(true),
                "false" => Value::Bool(false),
                _ => Value::String(text),
            },
            _ => Value::String(text),
        }
    }

    fn decode_rows(schema: &TableSchema, rows: Vec<TableRow>) -> Vec<DataRow> {
        rows.into_iter()
            .map(|row| {
                schema
                    .fields
                    .iter()
                    .zip(row.f)
                    .map(|(field, cell)| (field.name.clone(), Self::decode_value(field, cell.v)))
                    .collect()
            })
            .collect()
    }

    /// Wait for the job to finish, re-polling with getQueryResults
    async fn wait_for_completion(
        &self,
        mut response: QueryResponse,
        started: Instant,
    ) -> Result<QueryResponse> {
        let mut polls = 0;
        while !response.job_complete {
            if polls >= self.max_polls {
                return Err(DataError::QueryTimeout(started.elapsed().as_millis() as u64));
            }

            let job = response.job_reference.clone().ok_or_else(|| {
                DataError::BackendError(
                    "Unfinished query response did not include a job reference".to_string(),
                )
            })?;

            debug!("BigQuery job {} still running, polling", job.job_id);
            tokio::time::sleep(self.poll_interval).await;
            response = self.get_query_results(&job, None).await?;
            polls += 1;
        }
        Ok(response)
    }
}

#[async_trait]
impl DataSource for BigQuerySource {
    fn source_type(&self) -> &'static str {
        "bigquery"
    }

    fn capabilities(&self) -> Vec<Capability> {
        vec![Capability::Sql]
    }

    async fn close(&self) -> Result<()> {
        // Stateless HTTP client, nothing to release
        Ok(())
    }
}

#[async_trait]
impl SqlFeature for BigQuerySource {
    async fn execute_sql(
        &self,
        sql: &str,
        params: Option<Vec<serde_json::Value>>,
    ) -> Result<QueryResult> {
        if params.as_ref().is_some_and(|p| !p.is_empty()) {
            return Err(DataError::operation_not_supported(
                "positional query parameters are not supported by the BigQuery source",
            ));
        }
        self.validate_sql(sql)?;

        let started = Instant::now();
        debug!("Executing BigQuery SQL in project {}: {}", self.project_id, sql);

        let response = self.start_query(sql).await?;
        let mut response = self.wait_for_completion(response, started).await?;

        for err in &response.errors {
            warn!(
                "BigQuery reported {}: {}",
                err.reason.as_deref().unwrap_or("an issue"),
                err.message
            );
        }

        let table_schema = response.schema.take().unwrap_or_default();
        let job = response.job_reference.clone();
        let mut rows = Self::decode_rows(&table_schema, std::mem::take(&mut response.rows));
        let mut page_token = response.page_token.take();

        while let Some(token) = page_token {
            let job = job.as_ref().ok_or_else(|| {
                DataError::BackendError("Paged response did not include a job reference".to_string())
            })?;
            debug!("Fetching next BigQuery page for job {}", job.job_id);

            let page = self.get_query_results(job, Some(&token)).await?;
            rows.extend(Self::decode_rows(&table_schema, page.rows));
            page_token = page.page_token;
        }

        let execution_ms = started.elapsed().as_millis() as u64;
        let row_count = rows.len();
        debug!("BigQuery returned {} rows in {}ms", row_count, execution_ms);

        Ok(QueryResult {
            schema: Self::to_dataset_schema(&table_schema),
            rows,
            stats: QueryStats {
                row_count,
                total_rows: response.total_rows.and_then(|n| n.parse().ok()),
                execution_ms,
                bytes_processed: response.total_bytes_processed.and_then(|n| n.parse().ok()),
            },
        })
    }

    fn validate_sql(&self, sql: &str) -> Result<()> {
        let statements = split_statements(sql);

        if statements.is_empty() {
            return Err(DataError::InvalidQuery("Query is empty".to_string()));
        }

        for statement in statements {
            let keyword = statement
                .split(|c: char| !c.is_ascii_alphabetic())
                .next()
                .unwrap_or_default()
                .to_ascii_lowercase();

            if FORBIDDEN_STATEMENTS.contains(&keyword.as_str()) {
                return Err(DataError::InvalidQuery(format!(
                    "{} statements are not allowed, the source is read-only",
                    keyword.to_uppercase()
                )));
            }
        }

        Ok(())
    }
}

/// Split a script on `;` outside of quoted spans, dropping comments.
///
/// Quoted strings and identifiers are kept verbatim so only real statement
/// boundaries end a statement. Comments (`--`, `#`, `/* */`) become a space.
fn split_statements(sql: &str) -> Vec<String> {
    let mut statements = Vec::new();
    let mut current = String::new();
    let mut chars = sql.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '\'' | '"' | '`' => {
                current.push(c);
                while let Some(inner) = chars.next() {
                    current.push(inner);
                    if inner == '\\' {
                        if let Some(escaped) = chars.next() {
                            current.push(escaped);
                        }
                    } else if inner == c {
                        break;
                    }
                }
            }
            '-' if chars.peek() == Some(&'-') => {
                chars.by_ref().find(|&inner| inner == '\n');
                current.push(' ');
            }
            '#' => {
                chars.by_ref().find(|&inner| inner == '\n');
                current.push(' ');
            }
            '/' if chars.peek() == Some(&'*') => {
                chars.next();
                let mut prev = '\0';
                for inner in chars.by_ref() {
                    if prev == '*' && inner == '/' {
                        break;
                    }
                    prev = inner;
                }
                current.push(' ');
            }
            ';' => statements.push(std::mem::take(&mut current)),
            _ => current.push(c),
        }
    }
    statements.push(current);

    statements
        .into_iter()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

/// Creates `BigQuerySource`s from a `ConnectionConfig`.
///
/// `database` is the project id, `password` the access token, `host`
/// optionally overrides the API endpoint and the `location` option sets the
/// job location.
pub struct BigQueryFactory;

impl DataSourceFactory for BigQueryFactory {
    fn backend_type(&self) -> &'static str {
        "bigquery"
    }

    fn create_source(&self, config: ConnectionConfig) -> Result<Arc<dyn SqlFeature>> {
        let project_id = config
            .database
            .clone()
            .filter(|p| !p.is_empty())
            .ok_or_else(|| DataError::invalid_configuration("BigQuery project id is required"))?;

        let access_token = config
            .password
            .clone()
            .filter(|t| !t.is_empty())
            .ok_or_else(|| {
                DataError::invalid_configuration(
                    "BigQuery access token is required (bigquery.access_token or LISSEN_BIGQUERY_ACCESS_TOKEN)",
                )
            })?;

        let location = config.option("location").map(str::to_string);
        let mut source = BigQuerySource::new(project_id, access_token, location)?;
        if let Some(host) = &config.host {
            source = source.with_base_url(host.clone());
        }

        Ok(Arc::new(source))
    }
}
