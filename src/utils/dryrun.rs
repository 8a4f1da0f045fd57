//! Dry-run mode utilities

use colored::Colorize;
use std::env;

pub const DRY_RUN_ENV: &str = "JX_DRY_RUN";

/// Check if dry-run mode is enabled
pub fn is_dry_run() -> bool {
    env::var(DRY_RUN_ENV).is_ok()
}

/// Enable dry-run mode for this process
pub fn enable() {
    // SAFETY: called once from main before any threads are spawned
    unsafe { env::set_var(DRY_RUN_ENV, "1") };
}

/// Log a dry-run action
pub fn log_action(action: &str) {
    if is_dry_run() {
        println!("  {} {}", "[DRY RUN]".cyan().bold(), action);
    }
}

/// Execute function only if not in dry-run mode
/// Returns Ok(()) in dry-run mode without executing
pub fn exec_unless_dry_run<F>(action_desc: &str, f: F) -> anyhow::Result<()>
where
    F: FnOnce() -> anyhow::Result<()>,
{
    if is_dry_run() {
        log_action(action_desc);
        Ok(())
    } else {
        f()
    }
}
