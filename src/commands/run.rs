use crate::api::report::{is_sorted_descending, parse_table};
use crate::api::ChainRequest;
use crate::core::storage::AppCtx;
use console::style;
use spinners::{Spinner, Spinners};
use std::fs;
use std::path::Path;

use super::{parse_key, read_text};

/// Run the metrics chain and print the resulting table.
pub async fn run(
    ctx: &AppCtx,
    key: &str,
    text: Option<String>,
    request: Option<&Path>,
) -> Result<(), String> {
    let key = parse_key(key)?;
    let request = match request {
        Some(path) => {
            let raw = fs::read_to_string(path)
                .map_err(|e| format!("Failed to read {}: {}", path.display(), e))?;
            serde_json::from_str::<ChainRequest>(&raw)
                .map_err(|e| format!("Invalid request file: {}", e))?
        }
        None => ChainRequest {
            text: read_text(text)?,
        },
    };

    let runner = ctx.runner()?;
    let mut sp = console::user_attended()
        .then(|| Spinner::new(Spinners::Dots9, "Running metrics chain...".into()));

    let result = runner.handle(&key, request).await;
    if let Some(sp) = sp.as_mut() {
        sp.stop_with_newline();
    }

    let table = result.map_err(|e| match e.failed_step() {
        Some(step) => format!(
            "{} (re-run with --key {} to resume from '{}')",
            e, key, step
        ),
        None => e.to_string(),
    })?;

    match parse_table(&table) {
        Ok(rows) if rows.is_empty() => {
            println!("{}", style("No metrics found.").yellow());
        }
        Ok(rows) => {
            if !is_sorted_descending(&rows) {
                tracing::warn!(invocation = %key, "table rows are not in descending order");
            }
        }
        Err(e) => tracing::warn!(invocation = %key, error = %e, "output is not a metrics table"),
    }

    println!("{}", table);
    Ok(())
}
