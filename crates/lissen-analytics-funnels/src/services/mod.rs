mod funnel;
mod loader;
mod service;

pub use funnel::{aggregate_step_counts, build_funnel, step_label, unrecognized_steps};
pub use loader::{event_rows_from_result, OnboardingLoader};
pub use service::FunnelService;
