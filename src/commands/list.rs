use crate::core::journal::StepJournal;
use crate::core::storage::AppCtx;
use crate::InvocationState;
use console::style;

use super::status::recorded_state;

/// List every recorded invocation.
pub async fn run(ctx: &AppCtx) -> Result<(), String> {
    let invocations = ctx.journal.list().await.map_err(|e| e.to_string())?;

    if invocations.is_empty() {
        println!("{}", style("No recorded invocations").green().bold());
        return Ok(());
    }

    println!(
        "{} ({})",
        style("Invocations:").green().bold(),
        style(ctx.journal_dir.display()).dim()
    );
    for inv in invocations {
        let state = recorded_state(&inv);
        let marker = match state {
            InvocationState::Completed => style("•").green(),
            InvocationState::Failed(_) => style("•").red(),
            _ => style("•").yellow(),
        };
        println!(
            "  {} {} - {} ({} steps, updated {})",
            marker,
            style(&inv.key).yellow(),
            state,
            inv.steps.len(),
            inv.updated_at.format("%Y-%m-%d %H:%M")
        );
    }
    Ok(())
}
