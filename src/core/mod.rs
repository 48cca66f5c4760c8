pub mod config;
pub mod file_journal;
pub mod journal;
pub mod logging;
pub mod record;
pub mod storage;
pub mod utils;
