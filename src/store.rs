//! # Canonical Secret Store
//!
//! Client for the central secret store that holds the authoritative
//! name -> value mapping for each logical environment. Every sync run
//! fetches the full mapping exactly once; there are no partial results.
//!
//! Secret values are never logged and never embedded in error messages.

use async_trait::async_trait;
use regex::Regex;
use reqwest::StatusCode;
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::LazyLock;
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

/// Authoritative name -> value secret mapping for one environment.
///
/// Keys are unique by construction; values are opaque and must never be
/// logged. Produced fresh on every fetch and never mutated in place.
pub type SecretMap = HashMap<String, String>;

/// Request timeout against the central store.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Secret names accepted from the store: upper-snake-case identifiers.
static SECRET_NAME_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[A-Z][A-Z0-9_]*$").expect("secret name regex is valid")
});

/// Errors raised while resolving or fetching the canonical secret set.
///
/// Either kind aborts the whole sync run: no diff is meaningful without
/// the canonical mapping.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The caller did not supply enough information to resolve which
    /// environment's secrets to fetch.
    #[error("secret store configuration error: {0}")]
    Config(String),

    /// Authentication was rejected or the network call failed.
    #[error("secret store unavailable: {0}")]
    Unavailable(String),
}

/// Source of the canonical secret mapping.
#[async_trait]
pub trait SecretProvider: Send + Sync {
    /// Fetch the full secret mapping for `environment`.
    ///
    /// Returns the complete mapping or an error, never a truncated map.
    async fn fetch(&self, environment: &str) -> Result<SecretMap, StoreError>;
}

/// REST client for the central secret store.
pub struct HttpSecretProvider {
    client: reqwest::Client,
    base_url: String,
    project: String,
    token: String,
}

impl std::fmt::Debug for HttpSecretProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpSecretProvider")
            .field("base_url", &self.base_url)
            .field("project", &self.project)
            .finish_non_exhaustive()
    }
}

#[derive(Deserialize)]
struct StoreSecret {
    name: String,
    value: String,
}

#[derive(Deserialize)]
struct StoreSecretsResponse {
    secrets: Vec<StoreSecret>,
}

impl HttpSecretProvider {
    /// Create a store client for one project.
    ///
    /// Fails with [`StoreError::Config`] when the project, endpoint, or
    /// token is missing.
    pub fn new(base_url: &str, project: &str, token: &str) -> Result<Self, StoreError> {
        if base_url.is_empty() {
            return Err(StoreError::Config("store endpoint is not set".to_string()));
        }
        if project.is_empty() {
            return Err(StoreError::Config("project is not set".to_string()));
        }
        if token.is_empty() {
            return Err(StoreError::Config(
                "store access token is not set".to_string(),
            ));
        }

        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| StoreError::Unavailable(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            project: project.to_string(),
            token: token.to_string(),
        })
    }
}

#[async_trait]
impl SecretProvider for HttpSecretProvider {
    async fn fetch(&self, environment: &str) -> Result<SecretMap, StoreError> {
        if environment.is_empty() {
            return Err(StoreError::Config("environment is not set".to_string()));
        }

        let url = format!(
            "{}/v1/projects/{}/environments/{}/secrets",
            self.base_url, self.project, environment
        );

        let response = self
            .client
            .get(&url)
            .bearer_auth(&self.token)
            .send()
            .await
            .map_err(|e| StoreError::Unavailable(format!("request to secret store failed: {e}")))?;

        let status = response.status();
        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            return Err(StoreError::Unavailable(format!(
                "secret store rejected credentials (status {status})"
            )));
        }
        if status == StatusCode::NOT_FOUND {
            return Err(StoreError::Config(format!(
                "environment '{environment}' not found in project '{}'",
                self.project
            )));
        }
        if !status.is_success() {
            return Err(StoreError::Unavailable(format!(
                "secret store returned status {status}"
            )));
        }

        let payload: StoreSecretsResponse = response
            .json()
            .await
            .map_err(|e| StoreError::Unavailable(format!("malformed store response: {e}")))?;

        let mut secrets = SecretMap::with_capacity(payload.secrets.len());
        for entry in payload.secrets {
            if !SECRET_NAME_RE.is_match(&entry.name) {
                return Err(StoreError::Unavailable(format!(
                    "store returned invalid secret name '{}'",
                    entry.name
                )));
            }
            secrets.insert(entry.name, entry.value);
        }

        debug!(
            "Fetched {} secrets for environment {} in project {}",
            secrets.len(),
            environment,
            self.project
        );

        Ok(secrets)
    }
}

/// Mask a secret value for debug output (show first and last few characters)
pub(crate) fn mask_secret_value(value: &str) -> String {
    if value.len() <= 8 {
        "*".repeat(value.len().min(4))
    } else {
        let first = &value[..4.min(value.len())];
        let last_start = value.len().saturating_sub(4);
        let last = &value[last_start..];
        format!("{first}...{last}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_rejects_missing_project() {
        let result = HttpSecretProvider::new("https://store.example.com", "", "token");
        assert!(matches!(result, Err(StoreError::Config(_))));
    }

    #[test]
    fn test_new_rejects_missing_token() {
        let result = HttpSecretProvider::new("https://store.example.com", "my-app", "");
        assert!(matches!(result, Err(StoreError::Config(_))));
    }

    #[test]
    fn test_new_trims_trailing_slash() {
        let provider =
            HttpSecretProvider::new("https://store.example.com/", "my-app", "token").unwrap();
        assert_eq!(provider.base_url, "https://store.example.com");
    }

    #[test]
    fn test_secret_name_pattern() {
        assert!(SECRET_NAME_RE.is_match("API_KEY"));
        assert!(SECRET_NAME_RE.is_match("DB_URL_2"));
        assert!(!SECRET_NAME_RE.is_match("api_key"));
        assert!(!SECRET_NAME_RE.is_match("2FA_TOKEN"));
        assert!(!SECRET_NAME_RE.is_match(""));
    }

    #[test]
    fn test_mask_secret_value_short() {
        assert_eq!(mask_secret_value("abc"), "***");
        assert_eq!(mask_secret_value("short"), "****");
        assert_eq!(mask_secret_value("12345678"), "****");
    }

    #[test]
    fn test_mask_secret_value_long() {
        let masked = mask_secret_value("this-is-a-very-long-secret-value");
        assert!(masked.starts_with("this"));
        assert!(masked.ends_with("alue"));
        assert!(masked.contains("..."));
    }
}
