use crate::core::journal::StepJournal;
use crate::core::record::{StepStatus, WorkflowInvocation};
use crate::core::storage::AppCtx;
use crate::InvocationState;
use console::style;

use super::parse_key;

/// State of an invocation over the chain it was started with.
pub(crate) fn recorded_state(inv: &WorkflowInvocation) -> InvocationState {
    let names: Vec<&str> = inv.chain.iter().map(|s| s.name.as_str()).collect();
    inv.state(names.as_slice())
}

/// Show an invocation and its step records.
pub async fn run(ctx: &AppCtx, key: &str) -> Result<(), String> {
    let key = parse_key(key)?;
    let inv = ctx
        .journal
        .invocation(&key)
        .await
        .map_err(|e| e.to_string())?
        .ok_or_else(|| format!("No invocation with key '{}'", key))?;

    println!("{} {}", style("Invocation").bold(), style(&inv.key).yellow());
    println!("  {}: {}", style("State").cyan(), recorded_state(&inv));
    println!(
        "  {}: {}",
        style("Started").cyan(),
        inv.created_at.format("%Y-%m-%d %H:%M:%S UTC")
    );
    println!(
        "  {}: {}",
        style("Updated").cyan(),
        inv.updated_at.format("%Y-%m-%d %H:%M:%S UTC")
    );

    if inv.steps.is_empty() {
        println!("  {}", style("No steps recorded").dim());
    }
    for (i, step) in inv.steps.iter().enumerate() {
        let status = match step.status {
            StepStatus::Completed => style(step.status.to_string()).green(),
            StepStatus::Pending => style(step.status.to_string()).yellow(),
            StepStatus::Failed => style(step.status.to_string()).red(),
        };
        println!(
            "  {}. {} [{}] attempts: {}",
            i + 1,
            style(&step.name).bold(),
            status,
            step.attempts
        );
        if let Some(err) = &step.error {
            println!("     {} {}", style("error:").red(), err);
        }
    }

    if let Some(output) = &inv.output {
        println!("\n{}\n{}", style("Output:").green().bold(), output);
    }
    Ok(())
}
