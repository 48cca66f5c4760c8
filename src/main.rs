use clap::Parser;
use durable_chain::cli::Cli;
use durable_chain::commands;
use durable_chain::core::config::Config;
use durable_chain::core::logging::init_logging;
use durable_chain::core::storage::AppCtx;

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        eprintln!("• {}", e);
        std::process::exit(1);
    }
}

async fn run() -> Result<(), String> {
    let cli = Cli::parse();

    let mut config = Config::load(cli.global.config.as_deref())?;
    if let Some(dir) = cli.global.journal_dir {
        config.journal.dir = Some(dir);
    }
    if let Some(level) = cli.global.log_level {
        config.logging.level = level;
    }
    if let Some(format) = cli.global.log_format {
        config.logging.format = format;
    }
    init_logging(&config.logging);

    let ctx = AppCtx::init(config)?;

    // Dropping the command future abandons any in-flight provider call; the step
    // stays uncompleted and the invocation can be resumed with the same key.
    tokio::select! {
        result = commands::dispatch(cli.command, &ctx) => result,
        _ = tokio::signal::ctrl_c() => {
            tracing::warn!("interrupted, invocation left resumable");
            Err("Interrupted".to_string())
        }
    }
}
