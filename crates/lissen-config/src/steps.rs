//! Canonical onboarding step sequence.
//!
//! The funnel is displayed in this order. Observed steps that are not listed
//! here are left out of the funnel.

/// Prefix shared by every onboarding step identifier.
pub const ONBOARDING_STEP_PREFIX: &str = "1.onboarding_";

/// Onboarding flow order, first screen to last.
pub const ONBOARDING_FUNNEL_STEPS: [&str; 8] = [
    "1.onboarding_main",
    "1.onboarding_loading",
    "1.onboarding_pick_genres",
    "1.onboarding_link_streaming",
    "1.onboarding_callback",
    "1.onboarding_intro",
    "1.onboarding_pick_artists",
    "1.onboarding_close",
];
