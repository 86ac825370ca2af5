//! # Sync Engine
//!
//! Core reconciliation logic.
//!
//! ## Sync Flow
//!
//! 1. Fetch the canonical secret mapping once from the central store;
//!    a store failure aborts the run before any platform is touched
//! 2. Resolve the platform set (all configured clients, or the single
//!    platform named by the filter)
//! 3. For each platform, independently: compute the diff, apply unless
//!    dry-run, and record the outcome
//! 4. Return one outcome per platform in configuration order
//!
//! One platform's failure is recorded in its own outcome and never
//! blocks the remaining platforms. Platforms are processed sequentially:
//! most apply paths drive vendor CLIs, and running several concurrently
//! multiplies rate-limit and temp-state contention for no correctness
//! gain.

use crate::metrics;
use crate::platform::{PlatformClient, SecretDiff};
use crate::store::{SecretMap, SecretProvider, StoreError};
use serde::Serialize;
use tracing::{error, info, warn};

/// Options for one sync run, validated at the CLI boundary.
#[derive(Debug, Clone)]
pub struct SyncOptions {
    /// Store environment to fetch the canonical mapping from.
    pub environment: String,
    /// Compute and report diffs without mutating any platform.
    pub dry_run: bool,
    /// Restrict the run to a single platform by name.
    pub platform_filter: Option<String>,
}

/// Outcome of one platform within one sync run. Never persisted.
#[derive(Debug, Clone, Serialize)]
pub struct SyncOutcome {
    pub platform: String,
    pub success: bool,
    pub added: usize,
    pub updated: usize,
    pub removed: usize,
    /// Failure detail; never contains secret values.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl SyncOutcome {
    fn succeeded(platform: &str, diff: &SecretDiff) -> Self {
        Self {
            platform: platform.to_string(),
            success: true,
            added: diff.to_add.len(),
            updated: diff.overlap.update_count(),
            removed: diff.to_remove.len(),
            error: None,
        }
    }

    fn failed(platform: &str, diff: Option<&SecretDiff>, error: String) -> Self {
        Self {
            platform: platform.to_string(),
            success: false,
            added: diff.map_or(0, |d| d.to_add.len()),
            updated: diff.map_or(0, |d| d.overlap.update_count()),
            removed: diff.map_or(0, |d| d.to_remove.len()),
            error: Some(error),
        }
    }
}

/// True iff every platform outcome in the run succeeded.
pub fn all_succeeded(outcomes: &[SyncOutcome]) -> bool {
    outcomes.iter().all(|outcome| outcome.success)
}

/// Run one reconciliation pass.
///
/// Returns one [`SyncOutcome`] per processed platform, in configuration
/// order. Store errors abort the whole run; platform errors are caught
/// at the per-platform boundary and recorded in that platform's outcome.
pub async fn run_sync(
    provider: &dyn SecretProvider,
    platforms: &[Box<dyn PlatformClient>],
    options: &SyncOptions,
) -> Result<Vec<SyncOutcome>, StoreError> {
    metrics::increment_sync_runs();

    let canonical = provider.fetch(&options.environment).await?;
    info!(
        "Fetched {} canonical secrets for environment {}",
        canonical.len(),
        options.environment
    );

    let selected: Vec<&dyn PlatformClient> = match &options.platform_filter {
        Some(name) => match platforms.iter().find(|p| p.name() == name.as_str()) {
            Some(platform) => vec![platform.as_ref()],
            None => {
                warn!("Platform '{}' is not configured", name);
                return Ok(vec![SyncOutcome::failed(
                    name,
                    None,
                    format!("platform '{name}' is not configured"),
                )]);
            }
        },
        None => platforms.iter().map(AsRef::as_ref).collect(),
    };

    let mut outcomes = Vec::with_capacity(selected.len());
    for platform in selected {
        outcomes.push(sync_platform(platform, &canonical, options.dry_run).await);
    }

    Ok(outcomes)
}

/// Sync a single platform, converting any error into a failed outcome.
async fn sync_platform(
    platform: &dyn PlatformClient,
    canonical: &SecretMap,
    dry_run: bool,
) -> SyncOutcome {
    let name = platform.name();

    let diff = match platform.diff(canonical).await {
        Ok(diff) => diff,
        Err(err) => {
            error!("Failed to diff platform {}: {}", name, err);
            metrics::increment_sync_failures(name);
            return SyncOutcome::failed(name, None, err.to_string());
        }
    };

    if dry_run {
        info!(
            "Dry-run: platform {} would add {}, rewrite {}, remove {}",
            name,
            diff.to_add.len(),
            diff.overlap.update_count(),
            diff.to_remove.len()
        );
        return SyncOutcome::succeeded(name, &diff);
    }

    if let Err(err) = platform.apply(canonical).await {
        error!("Failed to apply to platform {}: {}", name, err);
        metrics::increment_sync_failures(name);
        return SyncOutcome::failed(name, Some(&diff), err.to_string());
    }

    info!(
        "Platform {} synced: {} added, {} rewritten, {} removed",
        name,
        diff.to_add.len(),
        diff.overlap.update_count(),
        diff.to_remove.len()
    );
    metrics::record_platform_counts(
        name,
        diff.to_add.len(),
        diff.overlap.update_count(),
        diff.to_remove.len(),
    );

    SyncOutcome::succeeded(name, &diff)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::{Overlap, SecretDiff};

    fn diff() -> SecretDiff {
        SecretDiff {
            to_add: vec!["A".to_string(), "B".to_string()],
            to_remove: vec!["OLD".to_string()],
            overlap: Overlap::Unverified(vec!["X".to_string()]),
        }
    }

    #[test]
    fn test_outcome_counts_are_diff_cardinalities() {
        let outcome = SyncOutcome::succeeded("cloudflare", &diff());
        assert_eq!(outcome.added, 2);
        assert_eq!(outcome.updated, 1);
        assert_eq!(outcome.removed, 1);
        assert!(outcome.success);
        assert!(outcome.error.is_none());
    }

    #[test]
    fn test_failed_outcome_keeps_diff_counts_when_known() {
        let d = diff();
        let outcome = SyncOutcome::failed("cloudflare", Some(&d), "boom".to_string());
        assert!(!outcome.success);
        assert_eq!(outcome.added, 2);
        assert_eq!(outcome.error.as_deref(), Some("boom"));
    }

    #[test]
    fn test_all_succeeded() {
        let good = SyncOutcome::succeeded("vercel", &diff());
        let bad = SyncOutcome::failed("supabase", None, "down".to_string());
        assert!(all_succeeded(&[good.clone()]));
        assert!(!all_succeeded(&[good, bad]));
        assert!(all_succeeded(&[]));
    }
}
