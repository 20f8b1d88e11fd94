use chrono::Local;
use clap::Subcommand;
use nook_core::AnalyticsReport;

use super::context::AppContext;
use super::CliResult;

#[derive(Subcommand)]
pub enum StatsAction {
    /// Raw statistics aggregate
    Show,
    /// Derived analytics (flow score, golden hour, streaks, ...)
    Analytics,
    /// Recently completed intervals, newest first
    History {
        /// Maximum number of entries
        #[arg(long, default_value = "10")]
        limit: usize,
    },
}

pub fn run(action: StatsAction) -> CliResult {
    let mut ctx = AppContext::open()?;

    match action {
        StatsAction::Show => {
            let stats = ctx.orch.stats().snapshot();
            println!("{}", serde_json::to_string_pretty(&stats)?);
        }
        StatsAction::Analytics => {
            let stats = ctx.orch.stats().snapshot();
            let today = Local::now().date_naive();
            let report = AnalyticsReport::build(&stats, ctx.orch.tasks().tasks(), today);
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        StatsAction::History { limit } => {
            let sessions = ctx.db.recent_sessions(limit)?;
            println!("{}", serde_json::to_string_pretty(&sessions)?);
        }
    }

    ctx.save()
}
