//! # Vercel Platform Client
//!
//! Syncs secrets into a Vercel project's environment variables through
//! the Vercel REST API.
//!
//! Vercel returns decrypted values to the project owner, so this client
//! is value-visible: the diff distinguishes changed from unchanged keys.
//! Creates go through the bulk endpoint; updates and removals are per
//! variable since the API offers no bulk form for them.

use crate::platform::{compute_diff, CurrentSecrets, Overlap, PlatformClient, PlatformError};
use crate::store::{mask_secret_value, SecretMap};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;
use tracing::{debug, info};

const API_BASE: &str = "https://api.vercel.com";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Environment variable type used for every write. Encrypted variables
/// are the only kind appropriate for secrets.
const ENV_TYPE: &str = "encrypted";

/// Client for one Vercel project and deployment target.
pub struct VercelPlatform {
    client: reqwest::Client,
    project_id: String,
    team_id: Option<String>,
    /// Deployment target the synced variables apply to
    /// (`production`, `preview`, or `development`).
    target: String,
    token: String,
}

impl std::fmt::Debug for VercelPlatform {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VercelPlatform")
            .field("project_id", &self.project_id)
            .field("team_id", &self.team_id)
            .field("target", &self.target)
            .finish_non_exhaustive()
    }
}

#[derive(Deserialize)]
struct EnvRecord {
    id: String,
    key: String,
    #[serde(default)]
    value: String,
    #[serde(default)]
    target: Vec<String>,
}

#[derive(Deserialize)]
struct EnvListResponse {
    envs: Vec<EnvRecord>,
}

#[derive(Serialize)]
struct NewEnv<'a> {
    key: &'a str,
    value: &'a str,
    r#type: &'static str,
    target: [&'a str; 1],
}

#[derive(Serialize)]
struct EnvUpdate<'a> {
    value: &'a str,
    r#type: &'static str,
    target: [&'a str; 1],
}

impl VercelPlatform {
    pub fn new(
        project_id: &str,
        team_id: Option<&str>,
        target: &str,
        token: &str,
    ) -> Result<Self, PlatformError> {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(PlatformError::unreachable)?;

        Ok(Self {
            client,
            project_id: project_id.to_string(),
            team_id: team_id.map(ToString::to_string),
            target: target.to_string(),
            token: token.to_string(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{API_BASE}{path}")
    }

    fn team_query(&self) -> Vec<(&'static str, String)> {
        match &self.team_id {
            Some(team) => vec![("teamId", team.clone())],
            None => Vec::new(),
        }
    }

    /// Fetch current environment variable records for the configured
    /// target, keeping the record ids needed for updates and removals.
    async fn fetch_env_records(&self) -> Result<Vec<EnvRecord>, PlatformError> {
        let url = self.url(&format!("/v9/projects/{}/env", self.project_id));
        let response = self
            .client
            .get(&url)
            .query(&self.team_query())
            .query(&[("decrypt", "true")])
            .bearer_auth(&self.token)
            .send()
            .await
            .map_err(PlatformError::unreachable)?;

        if !response.status().is_success() {
            return Err(PlatformError::Unreachable(format!(
                "Vercel API returned status {} listing project {}",
                response.status(),
                self.project_id
            )));
        }

        let payload: EnvListResponse = response
            .json()
            .await
            .map_err(PlatformError::unreachable)?;

        Ok(records_for_target(payload.envs, &self.target))
    }

    async fn create_bulk(
        &self,
        canonical: &SecretMap,
        keys: &[String],
    ) -> Result<(), PlatformError> {
        let payload: Vec<NewEnv<'_>> = keys
            .iter()
            .filter_map(|key| {
                canonical.get(key).map(|value| NewEnv {
                    key,
                    value,
                    r#type: ENV_TYPE,
                    target: [self.target.as_str()],
                })
            })
            .collect();

        let url = self.url(&format!("/v10/projects/{}/env", self.project_id));
        let response = self
            .client
            .post(&url)
            .query(&self.team_query())
            .bearer_auth(&self.token)
            .json(&payload)
            .send()
            .await
            .map_err(|e| PlatformError::operation("environment variable create", e))?;

        if !response.status().is_success() {
            return Err(PlatformError::OperationFailed {
                operation: "environment variable create",
                message: format!("Vercel API returned status {}", response.status()),
            });
        }

        info!(
            "Created {} environment variables in Vercel project {}",
            payload.len(),
            self.project_id
        );
        Ok(())
    }

    async fn update_one(
        &self,
        record: &EnvRecord,
        new_value: &str,
    ) -> Result<(), PlatformError> {
        debug!(
            "Updating Vercel variable {} ('{}' -> '{}')",
            record.key,
            mask_secret_value(&record.value),
            mask_secret_value(new_value)
        );

        let url = self.url(&format!(
            "/v9/projects/{}/env/{}",
            self.project_id, record.id
        ));
        let body = EnvUpdate {
            value: new_value,
            r#type: ENV_TYPE,
            target: [self.target.as_str()],
        };
        let response = self
            .client
            .patch(&url)
            .query(&self.team_query())
            .bearer_auth(&self.token)
            .json(&body)
            .send()
            .await
            .map_err(|e| PlatformError::operation("environment variable update", e))?;

        if !response.status().is_success() {
            return Err(PlatformError::OperationFailed {
                operation: "environment variable update",
                message: format!(
                    "Vercel API returned status {} updating {}",
                    response.status(),
                    record.key
                ),
            });
        }
        Ok(())
    }

    async fn delete_one(&self, record: &EnvRecord) -> Result<(), PlatformError> {
        let url = self.url(&format!(
            "/v9/projects/{}/env/{}",
            self.project_id, record.id
        ));
        let response = self
            .client
            .delete(&url)
            .query(&self.team_query())
            .bearer_auth(&self.token)
            .send()
            .await
            .map_err(|e| PlatformError::operation("environment variable delete", e))?;

        if !response.status().is_success() {
            return Err(PlatformError::OperationFailed {
                operation: "environment variable delete",
                message: format!(
                    "Vercel API returned status {} deleting {}",
                    response.status(),
                    record.key
                ),
            });
        }

        info!(
            "Removed environment variable {} from Vercel project {}",
            record.key, self.project_id
        );
        Ok(())
    }
}

/// Keep only records scoped to the given deployment target.
fn records_for_target(records: Vec<EnvRecord>, target: &str) -> Vec<EnvRecord> {
    records
        .into_iter()
        .filter(|record| record.target.iter().any(|t| t == target))
        .collect()
}

#[async_trait]
impl PlatformClient for VercelPlatform {
    fn name(&self) -> &'static str {
        "vercel"
    }

    async fn list_current(&self) -> Result<CurrentSecrets, PlatformError> {
        let records = self.fetch_env_records().await?;
        let values: HashMap<String, String> = records
            .into_iter()
            .map(|record| (record.key, record.value))
            .collect();
        Ok(CurrentSecrets::Values(values))
    }

    async fn apply(&self, canonical: &SecretMap) -> Result<(), PlatformError> {
        let records = self.fetch_env_records().await?;
        let by_key: HashMap<&str, &EnvRecord> = records
            .iter()
            .map(|record| (record.key.as_str(), record))
            .collect();
        let current = CurrentSecrets::Values(
            records
                .iter()
                .map(|record| (record.key.clone(), record.value.clone()))
                .collect(),
        );

        let diff = compute_diff(canonical, &current);
        if diff.is_noop() {
            debug!(
                "Vercel project {} already matches canonical state",
                self.project_id
            );
            return Ok(());
        }

        if !diff.to_add.is_empty() {
            self.create_bulk(canonical, &diff.to_add).await?;
        }

        if let Overlap::Compared { to_update, .. } = &diff.overlap {
            for key in to_update {
                let record = by_key.get(key.as_str()).ok_or_else(|| {
                    PlatformError::operation(
                        "environment variable update",
                        format!("no record id for key {key}"),
                    )
                })?;
                let value = canonical.get(key).ok_or_else(|| {
                    PlatformError::operation(
                        "environment variable update",
                        format!("key {key} missing from canonical map"),
                    )
                })?;
                self.update_one(record, value).await?;
            }
        }

        for key in &diff.to_remove {
            if let Some(record) = by_key.get(key.as_str()) {
                self.delete_one(record).await?;
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(id: &str, key: &str, value: &str, targets: &[&str]) -> EnvRecord {
        EnvRecord {
            id: id.to_string(),
            key: key.to_string(),
            value: value.to_string(),
            target: targets.iter().map(|t| (*t).to_string()).collect(),
        }
    }

    #[test]
    fn test_records_for_target_filters_other_targets() {
        let records = vec![
            record("1", "API_KEY", "a", &["production"]),
            record("2", "PREVIEW_ONLY", "b", &["preview"]),
            record("3", "SHARED", "c", &["production", "preview"]),
        ];

        let filtered = records_for_target(records, "production");
        let keys: Vec<&str> = filtered.iter().map(|r| r.key.as_str()).collect();

        assert_eq!(keys, vec!["API_KEY", "SHARED"]);
    }

    #[test]
    fn test_new_env_payload_shape() {
        let entry = NewEnv {
            key: "API_KEY",
            value: "a",
            r#type: ENV_TYPE,
            target: ["production"],
        };
        let json = serde_json::to_value(&entry).unwrap();

        assert_eq!(json["key"], "API_KEY");
        assert_eq!(json["type"], "encrypted");
        assert_eq!(json["target"][0], "production");
    }

    #[test]
    fn test_env_list_deserializes_without_values() {
        // Variables of type "sensitive" come back without a value field
        let payload = r#"{"envs":[{"id":"x1","key":"API_KEY","target":["production"]}]}"#;
        let parsed: EnvListResponse = serde_json::from_str(payload).unwrap();

        assert_eq!(parsed.envs[0].key, "API_KEY");
        assert_eq!(parsed.envs[0].value, "");
    }
}
