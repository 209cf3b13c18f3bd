use axum::{
    extract::State,
    response::{Html, Json},
};
use lissen_core::error_builder::{bad_gateway, internal_server_error};
use lissen_core::problemdetails::{Problem, ProblemDetails};
use std::sync::Arc;
use tracing::error;

use super::types::{AppState, FunnelResponse, FunnelStepResponse};
use crate::templates::render_html_dashboard;
use crate::types::FunnelError;

fn funnel_problem(e: FunnelError) -> Problem {
    error!("Failed to build onboarding funnel: {}", e);

    match e {
        FunnelError::Query(source) => bad_gateway()
            .title("Failed to load onboarding events")
            .detail(source.to_string())
            .build(),
        FunnelError::MissingColumns { columns } => internal_server_error()
            .title("Onboarding events are missing required columns")
            .detail(format!("Missing columns: {}", columns.join(", ")))
            .value("missing_columns", columns)
            .build(),
    }
}

/// Get the onboarding funnel
#[utoipa::path(
    get,
    path = "/funnels/onboarding",
    responses(
        (status = 200, description = "Onboarding funnel computed from fresh events", body = FunnelResponse),
        (status = 500, description = "Query result did not have the expected columns", body = ProblemDetails),
        (status = 502, description = "The data source failed to run the query", body = ProblemDetails)
    ),
    tag = "Funnels"
)]
pub async fn get_onboarding_funnel(
    State(state): State<Arc<AppState>>,
) -> Result<Json<FunnelResponse>, Problem> {
    let report = state
        .funnel_service
        .onboarding_funnel()
        .await
        .map_err(funnel_problem)?;

    Ok(Json(report.into()))
}

/// Render the onboarding dashboard page
pub async fn onboarding_dashboard(
    State(state): State<Arc<AppState>>,
) -> Result<Html<String>, Problem> {
    let report = state
        .funnel_service
        .onboarding_funnel()
        .await
        .map_err(funnel_problem)?;

    Ok(Html(render_html_dashboard(&report, &state.title)))
}

#[derive(utoipa::OpenApi)]
#[openapi(
    paths(get_onboarding_funnel),
    components(schemas(FunnelResponse, FunnelStepResponse, ProblemDetails)),
    tags(
        (name = "Funnels", description = "Onboarding funnel endpoints")
    )
)]
pub struct FunnelApiDoc;

/// JSON API routes, meant to be nested under `/api`
pub fn configure_routes() -> axum::Router<Arc<AppState>> {
    use axum::routing::get;

    axum::Router::new().route("/funnels/onboarding", get(get_onboarding_funnel))
}

/// HTML dashboard routes
pub fn configure_dashboard_routes() -> axum::Router<Arc<AppState>> {
    use axum::routing::get;

    axum::Router::new().route("/", get(onboarding_dashboard))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::{FunnelService, OnboardingLoader};
    use crate::testing::StaticSource;
    use crate::types::EventRow;
    use axum::body::Body;
    use axum::http::{header, Request, StatusCode};
    use lissen_config::{FunnelSettings, QueryMode};
    use lissen_query::{DataError, DataRow, DatasetSchema, QueryResult};
    use tower::ServiceExt;

    fn app_state(source: StaticSource) -> Arc<AppState> {
        let loader = OnboardingLoader::with_sql(Arc::new(source), "SELECT 1", QueryMode::ViewQuery);
        Arc::new(AppState {
            funnel_service: Arc::new(FunnelService::new(loader, &FunnelSettings::default())),
            title: "Lissen - Onboarding".to_string(),
        })
    }

    fn sample_events() -> Vec<EventRow> {
        vec![
            EventRow::new("1.onboarding_main", "u1"),
            EventRow::new("1.onboarding_main", "u2"),
            EventRow::new("1.onboarding_main", "u3"),
            EventRow::new("1.onboarding_main", "u4"),
            EventRow::new("1.onboarding_pick_genres", "u1"),
            EventRow::new("1.onboarding_pick_genres", "u2"),
            EventRow::new("1.onboarding_pick_genres", "u3"),
            EventRow::new("1.onboarding_close", "u1"),
            EventRow::new("0.legacy_splash", "u9"),
        ]
    }

    async fn body_json(response: axum::response::Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    fn get(uri: &str) -> Request<Body> {
        Request::builder()
            .method("GET")
            .uri(uri)
            .body(Body::empty())
            .unwrap()
    }

    #[tokio::test]
    async fn test_get_onboarding_funnel() -> Result<(), Box<dyn std::error::Error>> {
        let app = configure_routes().with_state(app_state(StaticSource::with_events(&sample_events())));

        let response = app.oneshot(get("/funnels/onboarding")).await?;
        assert_eq!(response.status(), StatusCode::OK);

        let body = body_json(response).await;
        assert_eq!(body["has_data"], true);
        assert_eq!(body["total_events"], 9);
        assert_eq!(body["unrecognized_steps"], serde_json::json!(["0.legacy_splash"]));

        let steps = body["steps"].as_array().unwrap();
        assert_eq!(steps.len(), 3);
        assert_eq!(steps[1]["step_label"], "Pick Genres");
        assert_eq!(steps[1]["users"], 3);
        assert_eq!(steps[1]["conversion_rate"], 75.0);
        assert_eq!(steps[2]["drop_off"], 2);
        assert_eq!(steps[2]["drop_off_pct"], 66.7);
        Ok(())
    }

    #[tokio::test]
    async fn test_get_onboarding_funnel_no_data() -> Result<(), Box<dyn std::error::Error>> {
        let app = configure_routes().with_state(app_state(StaticSource::with_events(&[])));

        let response = app.oneshot(get("/funnels/onboarding")).await?;
        assert_eq!(response.status(), StatusCode::OK);

        let body = body_json(response).await;
        assert_eq!(body["has_data"], false);
        assert_eq!(body["steps"], serde_json::json!([]));
        Ok(())
    }

    #[tokio::test]
    async fn test_query_failure_is_bad_gateway() -> Result<(), Box<dyn std::error::Error>> {
        let source = StaticSource::failing(DataError::permission_denied("token expired"));
        let app = configure_routes().with_state(app_state(source));

        let response = app.oneshot(get("/funnels/onboarding")).await?;
        assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
        assert_eq!(
            response.headers()[header::CONTENT_TYPE],
            "application/problem+json"
        );

        let body = body_json(response).await;
        assert_eq!(body["error_code"], "BAD_GATEWAY");
        assert!(body["detail"].as_str().unwrap().contains("token expired"));
        Ok(())
    }

    #[tokio::test]
    async fn test_missing_columns_is_internal_error() -> Result<(), Box<dyn std::error::Error>> {
        let mut row = DataRow::new();
        row.insert("session_id".to_string(), serde_json::json!("s1"));
        let source = StaticSource::new(QueryResult::new(DatasetSchema::default(), vec![row], 0));
        let app = configure_routes().with_state(app_state(source));

        let response = app.oneshot(get("/funnels/onboarding")).await?;
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);

        let body = body_json(response).await;
        assert_eq!(
            body["missing_columns"],
            serde_json::json!(["event_category_ordered", "user_id"])
        );
        Ok(())
    }

    #[tokio::test]
    async fn test_dashboard_page() -> Result<(), Box<dyn std::error::Error>> {
        let app = configure_dashboard_routes()
            .with_state(app_state(StaticSource::with_events(&sample_events())));

        let response = app.oneshot(get("/")).await?;
        assert_eq!(response.status(), StatusCode::OK);
        assert!(response.headers()[header::CONTENT_TYPE]
            .to_str()?
            .starts_with("text/html"));

        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await?;
        let html = String::from_utf8(bytes.to_vec())?;
        assert!(html.contains("<title>Lissen - Onboarding</title>"));
        assert!(html.contains("Pick Genres"));
        assert!(html.contains("0.legacy_splash"));
        Ok(())
    }

    #[test]
    fn test_openapi_documents_problem_responses() -> Result<(), Box<dyn std::error::Error>> {
        use utoipa::OpenApi;

        let doc = serde_json::to_value(FunnelApiDoc::openapi())?;
        assert!(doc["components"]["schemas"].get("ProblemDetails").is_some());

        let responses = &doc["paths"]["/funnels/onboarding"]["get"]["responses"];
        for status in ["500", "502"] {
            assert!(responses[status].to_string().contains("#/components/schemas/ProblemDetails"));
        }
        Ok(())
    }
}
