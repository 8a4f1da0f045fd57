//! Utility modules for jx

pub mod download;
pub mod dryrun;
pub mod errors;
pub mod git;
pub mod labels;
pub mod logger;
pub mod names;
pub mod prereqs;
pub mod process;
pub mod progress;
pub mod prompt;
pub mod wait;

// Re-export commonly used items
pub use errors::JxError;
pub use logger::{log_error, log_info, log_warn};
pub use prereqs::{CommonPrereqs, Prerequisite};
pub use prompt::{confirm, is_batch_mode};
pub use wait::{WaitError, poll_until};

/// Serializes tests that flip the process-wide batch and dry-run env vars
#[cfg(test)]
pub(crate) fn env_lock() -> std::sync::MutexGuard<'static, ()> {
    static ENV_LOCK: std::sync::Mutex<()> = std::sync::Mutex::new(());
    ENV_LOCK.lock().unwrap_or_else(|e| e.into_inner())
}
