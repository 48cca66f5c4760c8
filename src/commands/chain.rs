use crate::api::Chain;
use crate::core::storage::AppCtx;
use console::style;
use std::fs;
use std::path::Path;

use super::{parse_key, read_text};

/// Run a chain defined in a YAML file.
pub async fn run(ctx: &AppCtx, key: &str, file: &Path, text: Option<String>) -> Result<(), String> {
    let key = parse_key(key)?;
    let yaml = fs::read_to_string(file)
        .map_err(|e| format!("Failed to read {}: {}", file.display(), e))?;
    let chain = Chain::from_yaml(&yaml).map_err(|e| e.to_string())?;
    let text = read_text(text)?;

    let runner = ctx.runner()?;
    eprintln!(
        "Executing chain {} ({} steps) for '{}'...",
        style(file.display()).yellow(),
        chain.steps().len(),
        style(&key).yellow()
    );

    match runner.run_chain(&chain, &key, &text).await {
        Ok(output) => {
            eprintln!("{}", style("✔ Chain execution complete.").green());
            println!("{}", output);
            Ok(())
        }
        Err(e) => Err(format!("Chain execution failed: {}", e)),
    }
}
