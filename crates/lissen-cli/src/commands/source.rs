//! Wiring from settings to a ready funnel service

use lissen_analytics_funnels::{FunnelService, OnboardingLoader};
use lissen_config::{DashboardConfig, QueryMode, SourceBackend};
use lissen_query::{ConnectionConfig, QueryRegistry};
use lissen_query_bigquery::BigQueryFactory;
use lissen_query_csv::CsvFactory;
use std::sync::Arc;
use tracing::{debug, info};

/// Connection settings for the configured backend
pub fn connection_config(config: &DashboardConfig) -> anyhow::Result<ConnectionConfig> {
    let connection = match config.source.backend {
        SourceBackend::BigQuery => {
            let bigquery = &config.bigquery;
            let mut connection =
                ConnectionConfig::new(SourceBackend::BigQuery.as_str()).with_database(&bigquery.project_id);
            if let Some(token) = &bigquery.access_token {
                connection = connection.with_password(token);
            }
            if let Some(location) = &bigquery.location {
                connection = connection.with_option("location", location);
            }
            if let Some(api_base) = &bigquery.api_base {
                connection = connection.with_host(api_base);
            }
            connection
        }
        SourceBackend::Csv => {
            let dir = config
                .source
                .csv_dir
                .as_ref()
                .ok_or_else(|| anyhow::anyhow!("source.csv_dir is required for the csv backend"))?;
            ConnectionConfig::new(SourceBackend::Csv.as_str()).with_database(dir.display().to_string())
        }
    };

    Ok(connection)
}

/// Registry with every backend this binary ships
pub async fn default_registry() -> anyhow::Result<QueryRegistry> {
    let registry = QueryRegistry::new();
    registry.register_factory(Arc::new(BigQueryFactory)).await?;
    registry.register_factory(Arc::new(CsvFactory)).await?;
    debug!("Registered backends: {:?}", registry.list_backends().await);
    Ok(registry)
}

pub async fn build_funnel_service(
    config: &DashboardConfig,
    mode: QueryMode,
) -> anyhow::Result<FunnelService> {
    let registry = default_registry().await?;
    let connection = connection_config(config)?;
    info!("Using {} data source ({})", config.source.backend, mode);

    let source = registry.create_source(connection).await?;
    let loader = OnboardingLoader::new(source, config, mode)?;

    Ok(FunnelService::new(loader, &config.funnel))
}
