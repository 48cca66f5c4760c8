use crate::api::Chain;
use crate::core::storage::AppCtx;
use console::style;
use serde::Deserialize;
use std::fs;
use std::path::Path;

use super::parse_key;

#[derive(Deserialize, Debug)]
struct BatchEntry {
    key: String,
    text: String,
}

/// Run the metrics chain for every entry of a batch file concurrently.
pub async fn run(ctx: &AppCtx, file: &Path) -> Result<(), String> {
    let yaml = fs::read_to_string(file)
        .map_err(|e| format!("Failed to read {}: {}", file.display(), e))?;
    let entries: Vec<BatchEntry> =
        serde_yaml::from_str(&yaml).map_err(|e| format!("Failed to parse batch file: {}", e))?;

    let requests = entries
        .into_iter()
        .map(|entry| -> Result<_, String> { Ok((parse_key(&entry.key)?, entry.text)) })
        .collect::<Result<Vec<_>, String>>()?;

    let runner = ctx.runner()?;
    let results = runner.run_all(&Chain::metrics_report(), &requests).await;

    let mut failures = 0;
    for ((key, _), result) in requests.iter().zip(results) {
        match result {
            Ok(table) => {
                println!("{} {}", style("✔").green(), style(key).yellow());
                println!("{}\n", table);
            }
            Err(e) => {
                failures += 1;
                println!("{} {}: {}", style("✘").red(), style(key).yellow(), e);
            }
        }
    }

    if failures > 0 {
        return Err(format!(
            "{} of {} invocations failed; re-run to resume them",
            failures,
            requests.len()
        ));
    }
    Ok(())
}
