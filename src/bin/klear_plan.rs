//! Offline plan builder.
//!
//! Reads raw vision-model output on stdin and prints the budgeted cleaning
//! plan as JSON on stdout. Useful for replaying logged model responses.
//!
//! ```text
//! klear-plan [15min|1hr|weekend] < output.txt
//! ```
//!
//! Unknown tiers are rejected so the printed plan always names the ceiling
//! that was applied. Falls back to the default task list when no plan can
//! be recovered.
//! Logs go to stderr.

use std::io::Read;

use serde_json::Value;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use klear::plan::{build_plan, fallback_plan, CleaningPlan, TimeBudget};

fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "klear=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let tier = std::env::args()
        .nth(1)
        .unwrap_or_else(|| TimeBudget::default().as_str().to_string());
    let budget: TimeBudget = tier.parse()?;

    let mut input = String::new();
    std::io::stdin().read_to_string(&mut input)?;

    let tasks = match build_plan(&Value::String(input), budget.as_str()) {
        Some(tasks) => tasks,
        None => {
            warn!("No plan recovered from input, using default tasks");
            fallback_plan(budget)
        }
    };

    let plan = CleaningPlan::new(budget, tasks);
    info!(
        "Built plan with {} tasks ({} min)",
        plan.tasks.len(),
        plan.total_estimated_minutes
    );

    println!("{}", serde_json::to_string_pretty(&plan)?);
    Ok(())
}
