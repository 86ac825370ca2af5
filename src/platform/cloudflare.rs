//! # Cloudflare Workers Platform Client
//!
//! Syncs secrets into a Worker's secret store by shelling out to the
//! `wrangler` vendor CLI.
//!
//! `wrangler secret list` reveals names only, so this client is
//! value-opaque: co-present keys land in the unverified overlap bucket.
//! Writes use `wrangler secret bulk`, which only accepts file input, so
//! the payload is staged in a temporary file that is deleted on every
//! exit path.

use crate::platform::{
    compute_diff, run_vendor_cli, CurrentSecrets, PlatformClient, PlatformError,
};
use crate::store::SecretMap;
use async_trait::async_trait;
use serde::Deserialize;
use std::collections::HashSet;
use tracing::{debug, info};

/// Client for one Worker script in one Cloudflare account.
///
/// API credentials come from the ambient `CLOUDFLARE_API_TOKEN`
/// environment that wrangler itself reads.
#[derive(Debug)]
pub struct CloudflarePlatform {
    account_id: String,
    script: String,
}

#[derive(Deserialize)]
struct WranglerSecret {
    name: String,
}

impl CloudflarePlatform {
    pub fn new(account_id: &str, script: &str) -> Self {
        Self {
            account_id: account_id.to_string(),
            script: script.to_string(),
        }
    }

    fn envs(&self) -> Vec<(&str, &str)> {
        vec![("CLOUDFLARE_ACCOUNT_ID", self.account_id.as_str())]
    }

    async fn bulk_upload(&self, canonical: &SecretMap) -> Result<(), PlatformError> {
        // NamedTempFile is created 0600 and unlinked when dropped, so the
        // staged plaintext payload is gone on success and failure alike.
        let staged = tempfile::NamedTempFile::new()
            .map_err(|e| PlatformError::operation("secret bulk upload", e))?;
        let payload = serde_json::to_string(canonical)
            .map_err(|e| PlatformError::operation("secret bulk upload", e))?;
        std::fs::write(staged.path(), payload)
            .map_err(|e| PlatformError::operation("secret bulk upload", e))?;

        let path = staged.path().to_string_lossy().into_owned();
        run_vendor_cli(
            "wrangler",
            &["secret", "bulk", &path, "--name", &self.script],
            &self.envs(),
        )
        .await
        .map_err(|e| PlatformError::operation("secret bulk upload", e))?;

        info!(
            "Uploaded {} secrets to Worker {} in one bulk write",
            canonical.len(),
            self.script
        );
        Ok(())
    }

    async fn delete_secret(&self, name: &str) -> Result<(), PlatformError> {
        run_vendor_cli(
            "wrangler",
            &[
                "secret", "delete", name, "--name", &self.script, "--force",
            ],
            &self.envs(),
        )
        .await
        .map_err(|e| PlatformError::operation("secret delete", e))?;

        info!("Removed secret {} from Worker {}", name, self.script);
        Ok(())
    }
}

#[async_trait]
impl PlatformClient for CloudflarePlatform {
    fn name(&self) -> &'static str {
        "cloudflare"
    }

    async fn list_current(&self) -> Result<CurrentSecrets, PlatformError> {
        let stdout = run_vendor_cli(
            "wrangler",
            &["secret", "list", "--name", &self.script],
            &self.envs(),
        )
        .await
        .map_err(PlatformError::unreachable)?;

        let names = parse_secret_list(&stdout).map_err(PlatformError::unreachable)?;
        Ok(CurrentSecrets::Names(names))
    }

    async fn apply(&self, canonical: &SecretMap) -> Result<(), PlatformError> {
        let current = self.list_current().await?;
        let diff = compute_diff(canonical, &current);

        // Values on this platform are opaque, so every canonical key is
        // rewritten; the single bulk call keeps that to one round trip.
        if canonical.is_empty() && diff.to_remove.is_empty() {
            debug!("Worker {} has nothing to sync", self.script);
            return Ok(());
        }

        if !canonical.is_empty() {
            self.bulk_upload(canonical).await?;
        }

        for name in &diff.to_remove {
            self.delete_secret(name).await?;
        }

        Ok(())
    }
}

/// Parse `wrangler secret list` JSON output into a name set.
fn parse_secret_list(stdout: &str) -> Result<HashSet<String>, serde_json::Error> {
    let records: Vec<WranglerSecret> = serde_json::from_str(stdout.trim())?;
    Ok(records.into_iter().map(|record| record.name).collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_secret_list() {
        let stdout = r#"[
            {"name": "API_KEY", "type": "secret_text"},
            {"name": "DB_URL", "type": "secret_text"}
        ]"#;

        let names = parse_secret_list(stdout).unwrap();

        assert_eq!(names.len(), 2);
        assert!(names.contains("API_KEY"));
        assert!(names.contains("DB_URL"));
    }

    #[test]
    fn test_parse_secret_list_empty_store() {
        // A Worker with zero secrets lists an empty array, not an error
        let names = parse_secret_list("[]").unwrap();
        assert!(names.is_empty());
    }

    #[test]
    fn test_parse_secret_list_rejects_garbage() {
        assert!(parse_secret_list("not json").is_err());
    }
}
