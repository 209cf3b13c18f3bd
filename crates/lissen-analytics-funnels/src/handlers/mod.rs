mod handler;
mod types;

pub use handler::{configure_dashboard_routes, configure_routes, FunnelApiDoc};
pub use types::{AppState, FunnelResponse, FunnelStepResponse};
