//! # Platform Clients
//!
//! Target platform clients for secret propagation.
//!
//! Every platform, regardless of vendor, exposes the same three
//! operations: list the platform's current secrets, compute a diff
//! against the canonical mapping, and apply the minimal set of mutations
//! to converge. Whether a client shells out to a vendor CLI or calls a
//! REST API is hidden behind [`PlatformClient`].
//!
//! Platforms differ in what they reveal: some return current values to
//! the project owner, others expose names only. Diff precision degrades
//! accordingly; see [`Overlap`].

use crate::store::SecretMap;
use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::time::Duration;
use thiserror::Error;
use tokio::process::Command;
use tracing::debug;

pub mod cloudflare;
pub mod supabase;
pub mod vercel;

/// Timeout for a single vendor CLI invocation.
pub(crate) const VENDOR_CLI_TIMEOUT: Duration = Duration::from_secs(120);

/// Errors raised by a single platform client.
///
/// Always scoped to one platform's outcome; a failure here never aborts
/// the remaining platforms in a run.
#[derive(Debug, Error)]
pub enum PlatformError {
    /// Reading platform state failed (network or vendor tooling failure).
    #[error("platform unreachable: {0}")]
    Unreachable(String),

    /// A mutation failed partway; `operation` names what was in flight.
    #[error("{operation} failed: {message}")]
    OperationFailed {
        operation: &'static str,
        message: String,
    },
}

impl PlatformError {
    pub(crate) fn unreachable(err: impl std::fmt::Display) -> Self {
        PlatformError::Unreachable(err.to_string())
    }

    pub(crate) fn operation(operation: &'static str, err: impl std::fmt::Display) -> Self {
        PlatformError::OperationFailed {
            operation,
            message: err.to_string(),
        }
    }
}

/// Current secret state observed on a platform.
#[derive(Clone)]
pub enum CurrentSecrets {
    /// The platform reveals current values to the caller.
    Values(HashMap<String, String>),
    /// The platform reveals secret names only.
    Names(HashSet<String>),
}

impl std::fmt::Debug for CurrentSecrets {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Never render values, even in debug output
        match self {
            CurrentSecrets::Values(map) => f
                .debug_struct("CurrentSecrets::Values")
                .field("count", &map.len())
                .finish_non_exhaustive(),
            CurrentSecrets::Names(names) => f
                .debug_struct("CurrentSecrets::Names")
                .field("count", &names.len())
                .finish(),
        }
    }
}

/// Keys present on both the canonical and platform sides.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Overlap {
    /// Value-visible platform: keys whose value differs vs. matches.
    Compared {
        to_update: Vec<String>,
        unchanged: Vec<String>,
    },
    /// Names-only platform: these keys exist on both sides, but the
    /// platform gives no evidence about their values.
    Unverified(Vec<String>),
}

impl Overlap {
    /// Keys that an apply will (or may) rewrite.
    pub fn update_count(&self) -> usize {
        match self {
            Overlap::Compared { to_update, .. } => to_update.len(),
            Overlap::Unverified(keys) => keys.len(),
        }
    }
}

/// Computed difference between the canonical mapping and one platform's
/// observed state.
///
/// `to_add`, `to_remove`, and the overlap partition the union of the
/// canonical and platform key sets. All vectors are sorted so reports
/// are deterministic.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SecretDiff {
    /// Keys present in canonical, absent on the platform.
    pub to_add: Vec<String>,
    /// Keys present on the platform, absent in canonical.
    pub to_remove: Vec<String>,
    /// Keys present on both sides.
    pub overlap: Overlap,
}

impl SecretDiff {
    /// True when the platform holds exactly the canonical key set.
    pub fn is_converged(&self) -> bool {
        self.to_add.is_empty() && self.to_remove.is_empty()
    }

    /// True when an apply would perform no mutation at all.
    pub fn is_noop(&self) -> bool {
        self.is_converged() && self.overlap.update_count() == 0
    }
}

/// Compute the diff between the canonical mapping and observed platform
/// state. Pure function of its two inputs.
pub fn compute_diff(canonical: &SecretMap, current: &CurrentSecrets) -> SecretDiff {
    match current {
        CurrentSecrets::Names(names) => {
            let mut to_add: Vec<String> = canonical
                .keys()
                .filter(|key| !names.contains(*key))
                .cloned()
                .collect();
            let mut to_remove: Vec<String> = names
                .iter()
                .filter(|name| !canonical.contains_key(*name))
                .cloned()
                .collect();
            let mut unverified: Vec<String> = canonical
                .keys()
                .filter(|key| names.contains(*key))
                .cloned()
                .collect();
            to_add.sort();
            to_remove.sort();
            unverified.sort();
            SecretDiff {
                to_add,
                to_remove,
                overlap: Overlap::Unverified(unverified),
            }
        }
        CurrentSecrets::Values(values) => {
            let mut to_add = Vec::new();
            let mut to_update = Vec::new();
            let mut unchanged = Vec::new();
            for (key, value) in canonical {
                match values.get(key) {
                    None => to_add.push(key.clone()),
                    Some(current_value) if current_value == value => unchanged.push(key.clone()),
                    Some(_) => to_update.push(key.clone()),
                }
            }
            let mut to_remove: Vec<String> = values
                .keys()
                .filter(|key| !canonical.contains_key(*key))
                .cloned()
                .collect();
            to_add.sort();
            to_update.sort();
            unchanged.sort();
            to_remove.sort();
            SecretDiff {
                to_add,
                to_remove,
                overlap: Overlap::Compared {
                    to_update,
                    unchanged,
                },
            }
        }
    }
}

/// A target platform that should mirror the canonical secret set.
#[async_trait]
pub trait PlatformClient: Send + Sync {
    /// Stable identifier used in configuration, CLI filters, and reports.
    fn name(&self) -> &'static str;

    /// Read the platform's current secret state.
    ///
    /// An empty secret store is not an error.
    async fn list_current(&self) -> Result<CurrentSecrets, PlatformError>;

    /// Compute the diff against `canonical`. Read-only, safe in dry-run.
    async fn diff(&self, canonical: &SecretMap) -> Result<SecretDiff, PlatformError> {
        let current = self.list_current().await?;
        let diff = compute_diff(canonical, &current);
        debug!(
            "Platform {}: {} to add, {} to rewrite, {} to remove",
            self.name(),
            diff.to_add.len(),
            diff.overlap.update_count(),
            diff.to_remove.len()
        );
        Ok(diff)
    }

    /// Converge platform state to `canonical` with the minimal set of
    /// mutations, preferring the platform's bulk-write facility.
    async fn apply(&self, canonical: &SecretMap) -> Result<(), PlatformError>;
}

/// Failure modes of a vendor CLI invocation, before platform-level
/// classification.
#[derive(Debug, Error)]
pub(crate) enum CliError {
    #[error("failed to execute {program}: {message}")]
    Spawn { program: String, message: String },
    #[error("{program} timed out after {seconds}s")]
    TimedOut { program: String, seconds: u64 },
    #[error("{program} exited with {status}: {stderr}")]
    Exited {
        program: String,
        status: String,
        stderr: String,
    },
}

/// Run a vendor CLI command, capturing stdout.
///
/// Vendor tools print secret values only when asked to; stderr is safe to
/// surface in errors. Every invocation is bounded by
/// [`VENDOR_CLI_TIMEOUT`] so a stuck tool cannot hang the whole run.
pub(crate) async fn run_vendor_cli(
    program: &str,
    args: &[&str],
    envs: &[(&str, &str)],
) -> Result<String, CliError> {
    let mut command = Command::new(program);
    command.args(args).kill_on_drop(true);
    for (key, value) in envs {
        command.env(key, value);
    }

    debug!("Running vendor command: {} {}", program, args.join(" "));

    let output = tokio::time::timeout(VENDOR_CLI_TIMEOUT, command.output())
        .await
        .map_err(|_| CliError::TimedOut {
            program: program.to_string(),
            seconds: VENDOR_CLI_TIMEOUT.as_secs(),
        })?
        .map_err(|e| CliError::Spawn {
            program: program.to_string(),
            message: e.to_string(),
        })?;

    if !output.status.success() {
        return Err(CliError::Exited {
            program: program.to_string(),
            status: output.status.to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        });
    }

    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
}
