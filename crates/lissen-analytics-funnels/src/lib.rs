//! Onboarding funnel analytics
//!
//! Loads onboarding events from a [`lissen_query::SqlFeature`] source, counts
//! distinct users per step and arranges them in the canonical funnel order
//! with conversion and drop-off metrics. The HTTP handlers and templates
//! present the result as JSON, an HTML dashboard or a terminal table.

pub mod handlers;
pub mod services;
pub mod templates;
pub mod types;

#[cfg(test)]
pub mod testing;

pub use services::{FunnelService, OnboardingLoader};
pub use templates::{render_html_dashboard, render_text_report, DASHBOARD_TITLE};
pub use types::*;
