use crate::cli::Cmd;
use crate::core::record::InvocationKey;
use crate::core::storage::AppCtx;
use std::io::Read;

pub mod batch;
pub mod chain;
pub mod forget;
pub mod list;
pub mod run;
pub mod status;

/// Dispatches the parsed command to the appropriate handler.
pub async fn dispatch(command: Cmd, ctx: &AppCtx) -> Result<(), String> {
    match command {
        Cmd::Run { key, text, request } => run::run(ctx, &key, text, request.as_deref()).await,
        Cmd::Chain { key, file, text } => chain::run(ctx, &key, &file, text).await,
        Cmd::Batch { file } => batch::run(ctx, &file).await,
        Cmd::Status { key } => status::run(ctx, &key).await,
        Cmd::List => list::run(ctx).await,
        Cmd::Forget { key, force, yes } => forget::run(ctx, &key, force, yes).await,
    }
}

pub(crate) fn parse_key(key: &str) -> Result<InvocationKey, String> {
    InvocationKey::new(key).map_err(|e| e.to_string())
}

/// Uses `text` when given, otherwise reads all of stdin.
pub(crate) fn read_text(text: Option<String>) -> Result<String, String> {
    match text {
        Some(text) => Ok(text),
        None => {
            let mut buf = String::new();
            std::io::stdin()
                .read_to_string(&mut buf)
                .map_err(|e| format!("Failed to read stdin: {}", e))?;
            Ok(buf)
        }
    }
}
