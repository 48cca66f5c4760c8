//! Defines the command-line interface structure using clap.

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

use crate::core::config::LogFormat;

#[derive(Parser)]
#[command(name = "durable-chain", version, about = "Durable, resumable LLM call chains")]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalOpts,
    #[command(subcommand)]
    pub command: Cmd,
}

#[derive(Args)]
pub struct GlobalOpts {
    /// Path to the configuration file (defaults to ~/.durable-chain/config.toml)
    #[arg(long, global = true, env = "DURABLE_CHAIN_CONFIG")]
    pub config: Option<PathBuf>,
    /// Directory holding step records (overrides the config file)
    #[arg(long, global = true, env = "DURABLE_CHAIN_JOURNAL")]
    pub journal_dir: Option<PathBuf>,
    /// Log filter, e.g. `info` or `durable_chain=debug`
    #[arg(long, global = true, env = "DURABLE_CHAIN_LOG")]
    pub log_level: Option<String>,
    /// Log output format
    #[arg(long, global = true, value_enum)]
    pub log_format: Option<LogFormat>,
}

#[derive(Subcommand)]
pub enum Cmd {
    /// Extract metrics from text, sort them and format them as a markdown table
    Run {
        /// Invocation key; re-running the same key resumes instead of restarting
        #[arg(long)]
        key: String,
        /// Input text (read from stdin when neither TEXT nor --request is given)
        text: Option<String>,
        /// JSON request file of the form {"text": "..."}
        #[arg(long, conflicts_with = "text")]
        request: Option<PathBuf>,
    },
    /// Run a custom chain defined in a YAML file
    Chain {
        #[arg(long)]
        key: String,
        /// YAML file with `steps: [{ name, instruction }]`
        #[arg(long)]
        file: PathBuf,
        /// Input text (read from stdin when omitted)
        text: Option<String>,
    },
    /// Run several metrics invocations concurrently from a YAML file of `[{ key, text }]`
    Batch {
        #[arg(long)]
        file: PathBuf,
    },
    /// Show the state and step records of an invocation
    Status { key: String },
    /// List all recorded invocations
    List,
    /// Delete the records of an invocation
    Forget {
        key: String,
        /// Also delete invocations that have not completed
        #[arg(long)]
        force: bool,
        /// Do not ask for confirmation
        #[arg(long, short = 'y')]
        yes: bool,
    },
}
