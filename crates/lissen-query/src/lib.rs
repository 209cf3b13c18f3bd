//! # lissen-query
//!
//! Core abstractions for reading tabular data out of the warehouses the
//! Lissen dashboards are built on.
//!
//! - **DataSource**: core trait every backend implements
//! - **SqlFeature**: raw SQL execution, for backends that speak SQL
//! - **QueryRegistry**: backend name → factory lookup
//!
//! ## Example
//!
//! ```rust
//! use lissen_query::{ConnectionConfig, QueryRegistry};
//!
//! # async fn example() -> lissen_query::Result<()> {
//! let registry = QueryRegistry::new();
//!
//! let config = ConnectionConfig::new("bigquery")
//!     .with_database("my-project")
//!     .with_option("location", "EU");
//!
//! // Requires a registered factory for "bigquery"
//! // let source = registry.create_source(config).await?;
//! // let result = source.execute_sql("SELECT 1", None).await?;
//! # Ok(())
//! # }
//! ```
//!
//! Backend crates:
//! - `lissen-query-bigquery` - BigQuery REST API
//! - `lissen-query-csv` - local CSV exports

pub mod error;
pub mod registry;
pub mod traits;
pub mod types;

pub use error::{DataError, Result};
pub use registry::{ConnectionConfig, DataSourceFactory, QueryRegistry};
pub use traits::{DataSource, SqlFeature};
pub use types::{Capability, DataRow, DatasetSchema, FieldDef, FieldType, QueryResult, QueryStats};
