mod error;
mod service;
pub mod steps;

pub use error::ConfigError;
pub use service::{
    BigQuerySettings, DashboardConfig, FunnelSettings, QueryMode, ServerSettings, SourceBackend,
    SourceSettings, ACCESS_TOKEN_ENV, DEFAULT_SERVER_ADDRESS, DEFAULT_VIEW_QUERY_FILE,
};
pub use steps::{ONBOARDING_FUNNEL_STEPS, ONBOARDING_STEP_PREFIX};
