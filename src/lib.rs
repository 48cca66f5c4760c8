pub mod api;
pub mod cli;
pub mod commands;
pub mod core;

pub use api::{Chain, ChainRequest, ChainRunner, CompletionBackend, RunError};
pub use core::file_journal::FileJournal;
pub use core::journal::{MemoryJournal, StepJournal};
pub use core::record::{InvocationKey, InvocationState, StepRecord, StepStatus, WorkflowInvocation};
