use chrono::Utc;
use lissen_config::FunnelSettings;
use tracing::{info, warn};

use super::funnel::{aggregate_step_counts, build_funnel, unrecognized_steps};
use super::loader::OnboardingLoader;
use crate::types::{FunnelError, FunnelReport};

/// Computes the onboarding funnel from freshly loaded events on every call.
pub struct FunnelService {
    loader: OnboardingLoader,
    steps: Vec<String>,
    step_prefix: String,
}

impl FunnelService {
    pub fn new(loader: OnboardingLoader, settings: &FunnelSettings) -> Self {
        Self {
            loader,
            steps: settings.steps.clone(),
            step_prefix: settings.step_prefix.clone(),
        }
    }

    pub async fn onboarding_funnel(&self) -> Result<FunnelReport, FunnelError> {
        let rows = self.loader.load().await?;
        let step_counts = aggregate_step_counts(&rows);

        let unrecognized = unrecognized_steps(&step_counts, &self.steps);
        if !unrecognized.is_empty() {
            warn!(
                "Ignoring {} step(s) outside the funnel: {}",
                unrecognized.len(),
                unrecognized.join(", ")
            );
        }

        let funnel = build_funnel(&step_counts, &self.steps, &self.step_prefix);
        info!(
            "Built onboarding funnel with {} step(s) from {} events",
            funnel.steps().len(),
            rows.len()
        );

        Ok(FunnelReport {
            funnel,
            step_counts,
            unrecognized_steps: unrecognized,
            total_events: rows.len(),
            generated_at: Utc::now(),
        })
    }
}
