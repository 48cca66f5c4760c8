use crate::core::journal::StepJournal;
use crate::core::storage::AppCtx;
use console::style;
use dialoguer::Confirm;

use super::parse_key;

/// Delete an invocation's records.
pub async fn run(ctx: &AppCtx, key: &str, force: bool, yes: bool) -> Result<(), String> {
    let key = parse_key(key)?;
    let inv = ctx
        .journal
        .invocation(&key)
        .await
        .map_err(|e| e.to_string())?
        .ok_or_else(|| format!("No invocation with key '{}'", key))?;

    if !inv.is_finished() && !force {
        return Err(format!(
            "Invocation '{}' has not completed; use --force to delete it anyway",
            key
        ));
    }

    if !yes {
        let confirmed = Confirm::new()
            .with_prompt(format!("Delete all records of '{}'?", key))
            .default(false)
            .interact()
            .map_err(|e| format!("Prompt error: {}", e))?;
        if !confirmed {
            println!("{}", style("Aborted").yellow());
            return Ok(());
        }
    }

    ctx.journal.remove(&key).await.map_err(|e| e.to_string())?;
    println!("{} invocation {} deleted", style("•").green().bold(), key);
    Ok(())
}
