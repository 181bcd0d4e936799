//! Write-ahead logging and crash recovery.
//!
//! The log is a single append-only text file, one record per line, fsynced
//! on every append; it is the durability boundary of the whole engine.
//! Checkpoints flush every table and shadow-copy the database directory;
//! startup restores from the shadow and replays the log.

mod log;
mod recovery;

pub use log::{EditAction, LogRecord};
pub use recovery::{log_path, RecoveryManager, LOG_FILE_NAME};
