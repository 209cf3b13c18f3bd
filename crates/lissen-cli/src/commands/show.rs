use clap::Args;
use colored::Colorize;
use lissen_analytics_funnels::handlers::FunnelResponse;
use lissen_analytics_funnels::render_text_report;
use lissen_config::{DashboardConfig, QueryMode};
use std::path::Path;
use tracing::debug;

use super::source::build_funnel_service;

#[derive(Args)]
pub struct ShowCommand {
    /// Read the whole configured table instead of the predefined journey query
    #[arg(long)]
    pub table_scan: bool,

    /// Print the funnel as JSON instead of a table
    #[arg(long)]
    pub json: bool,
}

impl ShowCommand {
    pub fn execute(self, config_path: &Path) -> anyhow::Result<()> {
        let config = DashboardConfig::load(config_path)?;
        let mode = QueryMode::from_table_scan_flag(self.table_scan);

        let rt = tokio::runtime::Runtime::new()?;
        let report = rt.block_on(async {
            let service = build_funnel_service(&config, mode).await?;
            Ok::<_, anyhow::Error>(service.onboarding_funnel().await?)
        })?;
        debug!("Funnel computed at {}", report.generated_at);

        if self.json {
            let response = FunnelResponse::from(report);
            println!("{}", serde_json::to_string_pretty(&response)?);
            return Ok(());
        }

        let has_data = report.funnel.has_data();
        let unrecognized = report.unrecognized_steps.len();

        println!("{}", render_text_report(&report));
        if !has_data {
            println!(
                "{}",
                "⚠️  None of the funnel steps appear in the data".bright_yellow()
            );
        } else if unrecognized > 0 {
            println!(
                "{}",
                format!("⚠️  {} step(s) were left out of the funnel", unrecognized).bright_yellow()
            );
        } else {
            println!("{}", "✅ All observed steps are part of the funnel".bright_green());
        }

        Ok(())
    }
}
