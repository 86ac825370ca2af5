//! # Supabase Platform Client
//!
//! Syncs secrets into a Supabase project's secret store (consumed by
//! edge functions and database branches) by shelling out to the
//! `supabase` vendor CLI.
//!
//! `supabase secrets list` reveals names and value digests, never
//! values, so this client is value-opaque. Writes go through
//! `supabase secrets set --env-file`, staging a dotenv payload in a
//! temporary file that is deleted on every exit path; removals use a
//! single `secrets unset` invocation for all keys.

use crate::platform::{
    compute_diff, run_vendor_cli, CurrentSecrets, PlatformClient, PlatformError,
};
use crate::store::SecretMap;
use async_trait::async_trait;
use serde::Deserialize;
use std::collections::HashSet;
use std::io::Write;
use tracing::{debug, info};

/// Names with this prefix are managed by the platform itself and are
/// never candidates for sync or removal.
const RESERVED_PREFIX: &str = "SUPABASE_";

/// Client for one Supabase project (branch selection rides on the
/// project ref).
#[derive(Debug)]
pub struct SupabasePlatform {
    project_ref: String,
}

#[derive(Deserialize)]
struct SupabaseSecret {
    name: String,
}

impl SupabasePlatform {
    pub fn new(project_ref: &str) -> Self {
        Self {
            project_ref: project_ref.to_string(),
        }
    }

    async fn bulk_set(&self, canonical: &SecretMap) -> Result<(), PlatformError> {
        // Staged dotenv payload: 0600, unlinked on drop regardless of
        // which exit path is taken.
        let mut staged = tempfile::NamedTempFile::new()
            .map_err(|e| PlatformError::operation("secrets set", e))?;
        staged
            .write_all(render_env_file(canonical).as_bytes())
            .map_err(|e| PlatformError::operation("secrets set", e))?;
        staged
            .flush()
            .map_err(|e| PlatformError::operation("secrets set", e))?;

        let path = staged.path().to_string_lossy().into_owned();
        run_vendor_cli(
            "supabase",
            &[
                "secrets",
                "set",
                "--env-file",
                &path,
                "--project-ref",
                &self.project_ref,
            ],
            &[],
        )
        .await
        .map_err(|e| PlatformError::operation("secrets set", e))?;

        info!(
            "Uploaded {} secrets to Supabase project {} in one bulk write",
            canonical.len(),
            self.project_ref
        );
        Ok(())
    }

    async fn bulk_unset(&self, names: &[String]) -> Result<(), PlatformError> {
        let mut args: Vec<&str> = vec!["secrets", "unset"];
        args.extend(names.iter().map(String::as_str));
        args.extend(["--project-ref", self.project_ref.as_str()]);

        run_vendor_cli("supabase", &args, &[])
            .await
            .map_err(|e| PlatformError::operation("secrets unset", e))?;

        info!(
            "Removed {} secrets from Supabase project {}",
            names.len(),
            self.project_ref
        );
        Ok(())
    }
}

#[async_trait]
impl PlatformClient for SupabasePlatform {
    fn name(&self) -> &'static str {
        "supabase"
    }

    async fn list_current(&self) -> Result<CurrentSecrets, PlatformError> {
        let stdout = run_vendor_cli(
            "supabase",
            &[
                "secrets",
                "list",
                "--project-ref",
                &self.project_ref,
                "-o",
                "json",
            ],
            &[],
        )
        .await
        .map_err(PlatformError::unreachable)?;

        let names = parse_secret_list(&stdout).map_err(PlatformError::unreachable)?;
        Ok(CurrentSecrets::Names(names))
    }

    async fn apply(&self, canonical: &SecretMap) -> Result<(), PlatformError> {
        let current = self.list_current().await?;
        let diff = compute_diff(canonical, &current);

        if canonical.is_empty() && diff.to_remove.is_empty() {
            debug!(
                "Supabase project {} has nothing to sync",
                self.project_ref
            );
            return Ok(());
        }

        // Values are opaque here, so every canonical key is rewritten in
        // the single bulk call.
        if !canonical.is_empty() {
            self.bulk_set(canonical).await?;
        }

        if !diff.to_remove.is_empty() {
            self.bulk_unset(&diff.to_remove).await?;
        }

        Ok(())
    }
}

/// Parse `supabase secrets list -o json` output, dropping entries the
/// platform manages itself.
fn parse_secret_list(stdout: &str) -> Result<HashSet<String>, serde_json::Error> {
    let records: Vec<SupabaseSecret> = serde_json::from_str(stdout.trim())?;
    Ok(records
        .into_iter()
        .map(|record| record.name)
        .filter(|name| !name.starts_with(RESERVED_PREFIX))
        .collect())
}

/// Render the canonical map as a dotenv payload, quoting values the way
/// a shell-style parser expects. Keys are sorted so the staged file is
/// deterministic.
fn render_env_file(canonical: &SecretMap) -> String {
    let mut keys: Vec<&String> = canonical.keys().collect();
    keys.sort();

    let mut content = String::new();
    for key in keys {
        if let Some(value) = canonical.get(key) {
            let escaped = shell_words::quote(value);
            content.push_str(&format!("{key}={escaped}\n"));
        }
    }
    content
}
