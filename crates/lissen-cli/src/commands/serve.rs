use axum::{http::Uri, Router};
use clap::Args;
use lissen_analytics_funnels::handlers::{
    configure_dashboard_routes, configure_routes, AppState, FunnelApiDoc,
};
use lissen_analytics_funnels::DASHBOARD_TITLE;
use lissen_config::{DashboardConfig, QueryMode};
use lissen_core::error_builder::not_found;
use lissen_core::problemdetails::Problem;
use std::path::Path;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use tracing::{error, info};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use super::source::build_funnel_service;

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Lissen Dashboards API",
        description = "Onboarding funnel computed from the user journey table"
    ),
    nest((path = "/api", api = FunnelApiDoc))
)]
struct ApiDoc;

#[derive(Args)]
pub struct ServeCommand {
    /// Address to bind the server to (defaults to server.address from the settings file)
    #[arg(long, env = "LISSEN_ADDRESS")]
    pub address: Option<String>,

    /// Read the whole configured table instead of the predefined journey query
    #[arg(long)]
    pub table_scan: bool,
}

impl ServeCommand {
    pub fn execute(self, config_path: &Path) -> anyhow::Result<()> {
        let config = DashboardConfig::load(config_path)?;
        let address = self
            .address
            .clone()
            .unwrap_or_else(|| config.server.address.clone());
        let mode = QueryMode::from_table_scan_flag(self.table_scan);

        let rt = tokio::runtime::Runtime::new()?;
        rt.block_on(async move {
            let funnel_service = build_funnel_service(&config, mode).await?;
            let state = Arc::new(AppState {
                funnel_service: Arc::new(funnel_service),
                title: DASHBOARD_TITLE.to_string(),
            });

            let app = build_router(state);

            let listener = TcpListener::bind(&address).await?;
            info!("Lissen dashboard listening on http://{}", address);

            axum::serve(listener, app)
                .with_graceful_shutdown(shutdown_signal())
                .await?;
            info!("Lissen dashboard exited");
            Ok::<(), anyhow::Error>(())
        })
    }
}

fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .nest("/api", configure_routes())
        .merge(configure_dashboard_routes())
        .with_state(state)
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .fallback(route_not_found)
        .layer(TraceLayer::new_for_http())
}

async fn route_not_found(uri: Uri) -> Problem {
    not_found()
        .detail(format!("No route for {}", uri.path()))
        .build()
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for ctrl-c signal: {}", e);
        return;
    }
    info!("Received Ctrl+C, shutting down");
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use lissen_analytics_funnels::{FunnelService, OnboardingLoader};
    use lissen_config::FunnelSettings;
    use lissen_query_csv::CsvSource;
    use tower::ServiceExt;

    fn csv_state(dir: &Path) -> Arc<AppState> {
        let source = Arc::new(CsvSource::new(dir));
        let loader = OnboardingLoader::with_sql(source, "SELECT * FROM journey", QueryMode::TableScan);
        Arc::new(AppState {
            funnel_service: Arc::new(FunnelService::new(loader, &FunnelSettings::default())),
            title: DASHBOARD_TITLE.to_string(),
        })
    }

    fn get(uri: &str) -> Request<Body> {
        Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    #[tokio::test]
    async fn test_router_serves_api_dashboard_and_docs() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempfile::tempdir()?;
        std::fs::write(
            dir.path().join("journey.csv"),
            "user_id,event_category_ordered\n1,1.onboarding_main\n",
        )?;
        let app = build_router(csv_state(dir.path()));

        let response = app.clone().oneshot(get("/api/funnels/onboarding")).await?;
        assert_eq!(response.status(), StatusCode::OK);

        let response = app.clone().oneshot(get("/")).await?;
        assert_eq!(response.status(), StatusCode::OK);

        let response = app.clone().oneshot(get("/api-docs/openapi.json")).await?;
        assert_eq!(response.status(), StatusCode::OK);
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await?;
        let doc: serde_json::Value = serde_json::from_slice(&bytes)?;
        assert!(doc["paths"].get("/api/funnels/onboarding").is_some());

        Ok(())
    }

    #[tokio::test]
    async fn test_unknown_route_is_problem_not_found() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempfile::tempdir()?;
        let app = build_router(csv_state(dir.path()));

        let response = app.oneshot(get("/nope")).await?;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);

        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await?;
        let body: serde_json::Value = serde_json::from_slice(&bytes)?;
        assert_eq!(body["detail"], "No route for /nope");
        Ok(())
    }

    #[tokio::test]
    async fn test_missing_export_is_bad_gateway() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempfile::tempdir()?;
        let app = build_router(csv_state(dir.path()));

        let response = app.oneshot(get("/api/funnels/onboarding")).await?;
        assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
        Ok(())
    }
}
