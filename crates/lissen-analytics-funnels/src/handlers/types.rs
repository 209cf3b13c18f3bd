use serde::{Deserialize, Serialize};
use std::sync::Arc;
use utoipa::ToSchema;

use crate::services::FunnelService;
use crate::types::{FunnelReport, FunnelStep};

pub struct AppState {
    pub funnel_service: Arc<FunnelService>,
    /// Heading of the HTML page
    pub title: String,
}

// HTTP response types - separate from service layer types

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct FunnelResponse {
    /// False when none of the funnel steps appeared in the data
    pub has_data: bool,
    pub steps: Vec<FunnelStepResponse>,
    /// Observed steps that are not part of the funnel
    pub unrecognized_steps: Vec<String>,
    pub total_events: usize,
    /// RFC 3339 timestamp
    pub generated_at: String,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct FunnelStepResponse {
    pub step_label: String,
    pub event_category_ordered: String,
    pub users: u64,
    pub conversion_rate: f64,
    pub drop_off: i64,
    pub drop_off_pct: f64,
}

impl From<&FunnelStep> for FunnelStepResponse {
    fn from(step: &FunnelStep) -> Self {
        Self {
            step_label: step.step_label.clone(),
            event_category_ordered: step.event_category_ordered.clone(),
            users: step.users,
            conversion_rate: step.conversion_rate,
            drop_off: step.drop_off,
            drop_off_pct: step.drop_off_pct,
        }
    }
}

impl From<FunnelReport> for FunnelResponse {
    fn from(report: FunnelReport) -> Self {
        Self {
            has_data: report.funnel.has_data(),
            steps: report.funnel.steps().iter().map(Into::into).collect(),
            unrecognized_steps: report.unrecognized_steps,
            total_events: report.total_events,
            generated_at: report.generated_at.to_rfc3339(),
        }
    }
}
