use chrono::{DateTime, Utc};
use lissen_query::DataError;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Column holding the step identifier
pub const STEP_COLUMN: &str = "event_category_ordered";
/// Column holding the user identifier
pub const USER_COLUMN: &str = "user_id";

/// One onboarding event as read from the journey table
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventRow {
    pub event_category_ordered: String,
    pub user_id: String,
}

impl EventRow {
    pub fn new(step: impl Into<String>, user_id: impl Into<String>) -> Self {
        Self {
            event_category_ordered: step.into(),
            user_id: user_id.into(),
        }
    }
}

/// Distinct users seen on a step
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepCount {
    pub event_category_ordered: String,
    pub users: u64,
}

/// A step of the funnel in canonical order with its derived metrics
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunnelStep {
    pub step_label: String,
    pub event_category_ordered: String,
    pub users: u64,
    /// Percent of the first step's users, one decimal
    pub conversion_rate: f64,
    /// Users lost since the previous step; negative when a step gained users
    pub drop_off: i64,
    pub drop_off_pct: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Funnel {
    /// None of the canonical steps appeared in the data
    NoData,
    Steps(Vec<FunnelStep>),
}

impl Funnel {
    pub fn steps(&self) -> &[FunnelStep] {
        match self {
            Funnel::NoData => &[],
            Funnel::Steps(steps) => steps,
        }
    }

    pub fn has_data(&self) -> bool {
        matches!(self, Funnel::Steps(_))
    }
}

/// Everything the dashboard shows for one load
#[derive(Debug, Clone)]
pub struct FunnelReport {
    pub funnel: Funnel,
    pub step_counts: Vec<StepCount>,
    /// Observed step identifiers missing from the canonical order
    pub unrecognized_steps: Vec<String>,
    /// Rows that went into the aggregation
    pub total_events: usize,
    pub generated_at: DateTime<Utc>,
}

#[derive(Error, Debug)]
pub enum FunnelError {
    #[error("Failed to load onboarding events: {0}")]
    Query(#[from] DataError),

    #[error("Query result is missing required columns: {}", .columns.join(", "))]
    MissingColumns { columns: Vec<String> },
}
