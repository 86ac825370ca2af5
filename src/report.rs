//! # Result Reporting
//!
//! Turns the engine's structured outcomes into user-facing text and a
//! process exit code. The reporter sees nothing but the outcome list;
//! platform diff internals never reach it.

use crate::store::StoreError;
use crate::sync::{all_succeeded, SyncOutcome};

/// Process exit codes for the CLI surface.
pub mod exit_code {
    /// Every platform synced.
    pub const SUCCESS: i32 = 0;
    /// Unexpected failure outside the known classes.
    pub const GENERAL: i32 = 1;
    /// Configuration missing or invalid.
    pub const CONFIG: i32 = 2;
    /// The central store rejected credentials or was unreachable.
    pub const AUTH: i32 = 3;
    /// At least one platform failed to sync.
    pub const PLATFORM: i32 = 4;
}

/// Render the outcome list.
///
/// Quiet mode prints failures only; the normal mode prints one summary
/// line per platform plus a trailing run summary.
pub fn render(outcomes: &[SyncOutcome], dry_run: bool, quiet: bool) -> String {
    let mut lines = Vec::new();

    for outcome in outcomes {
        if outcome.success {
            if !quiet {
                lines.push(format!(
                    "{:<12} ok    +{} ~{} -{}{}",
                    outcome.platform,
                    outcome.added,
                    outcome.updated,
                    outcome.removed,
                    if dry_run { "  (dry-run)" } else { "" },
                ));
            }
        } else {
            lines.push(format!(
                "{:<12} FAIL  {}",
                outcome.platform,
                outcome.error.as_deref().unwrap_or("unknown error"),
            ));
        }
    }

    if !quiet {
        let failed = outcomes.iter().filter(|o| !o.success).count();
        lines.push(format!(
            "{} platform(s) processed, {} failed{}",
            outcomes.len(),
            failed,
            if dry_run { ", no changes applied" } else { "" },
        ));
    }

    let mut rendered = lines.join("\n");
    if !rendered.is_empty() {
        rendered.push('\n');
    }
    rendered
}

/// Exit code for a completed run.
pub fn exit_code_for(outcomes: &[SyncOutcome]) -> i32 {
    if all_succeeded(outcomes) {
        exit_code::SUCCESS
    } else {
        exit_code::PLATFORM
    }
}

/// Exit code for a run aborted by the central store.
pub fn exit_code_for_store_error(err: &StoreError) -> i32 {
    match err {
        StoreError::Config(_) => exit_code::CONFIG,
        StoreError::Unavailable(_) => exit_code::AUTH,
    }
}
