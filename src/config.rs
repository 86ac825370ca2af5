//! # Configuration
//!
//! YAML settings for the CLI (`secret-sync.yaml` in the working
//! directory by default). Every recognized option is enumerated here and
//! validated once at load time; the sync engine receives fully resolved
//! values and never parses configuration itself.
//!
//! ```yaml
//! project: my-app
//! environment: production
//! environments:
//!   prod: production
//!   stage: staging
//! store:
//!   baseUrl: https://secrets.internal.example.com
//!   tokenEnv: SECRET_STORE_TOKEN
//! platforms:
//!   vercel:
//!     projectId: prj_abc123
//!     target: production
//!   cloudflare:
//!     accountId: cf-account
//!     script: my-worker
//!   supabase:
//!     projectRef: abcdefghijklmnop
//! cache:
//!   ttlSecs: 300
//! ```

use crate::cache::SecretCache;
use crate::platform::cloudflare::CloudflarePlatform;
use crate::platform::supabase::SupabasePlatform;
use crate::platform::vercel::VercelPlatform;
use crate::platform::PlatformClient;
use crate::store::{HttpSecretProvider, StoreError};
use regex::Regex;
use serde::Deserialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, LazyLock};
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

/// Default settings file name, resolved against the working directory.
pub const DEFAULT_CONFIG_FILE: &str = "secret-sync.yaml";

static PROJECT_NAME_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[a-z0-9][a-z0-9_-]*$").expect("project name regex is valid")
});

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read configuration file {}: {message}", path.display())]
    Io { path: PathBuf, message: String },

    #[error("failed to parse configuration: {0}")]
    Parse(#[from] serde_yaml::Error),

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Fully resolved settings for one invocation.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct Settings {
    pub project: String,

    /// Default environment when the CLI does not name one.
    #[serde(default = "default_environment")]
    pub environment: String,

    /// Optional alias -> store environment name mapping.
    #[serde(default)]
    pub environments: HashMap<String, String>,

    pub store: StoreSettings,

    #[serde(default)]
    pub platforms: PlatformSettings,

    #[serde(default)]
    pub cache: CacheSettings,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct StoreSettings {
    pub base_url: String,

    /// Name of the environment variable holding the store access token.
    /// The token itself never lives in the settings file.
    #[serde(default = "default_token_env")]
    pub token_env: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct PlatformSettings {
    #[serde(default)]
    pub vercel: Option<VercelSettings>,
    #[serde(default)]
    pub cloudflare: Option<CloudflareSettings>,
    #[serde(default)]
    pub supabase: Option<SupabaseSettings>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct VercelSettings {
    pub project_id: String,
    #[serde(default)]
    pub team_id: Option<String>,
    #[serde(default = "default_vercel_target")]
    pub target: String,
    #[serde(default = "default_vercel_token_env")]
    pub token_env: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct CloudflareSettings {
    pub account_id: String,
    pub script: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct SupabaseSettings {
    pub project_ref: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct CacheSettings {
    #[serde(default = "default_ttl_secs")]
    pub ttl_secs: u64,

    /// Read requested keys from the process environment when the store
    /// is unreachable and nothing is cached.
    #[serde(default)]
    pub env_fallback: bool,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            ttl_secs: default_ttl_secs(),
            env_fallback: false,
        }
    }
}

fn default_environment() -> String {
    "development".to_string()
}

fn default_token_env() -> String {
    "SECRET_STORE_TOKEN".to_string()
}

fn default_vercel_target() -> String {
    "production".to_string()
}

fn default_vercel_token_env() -> String {
    "VERCEL_TOKEN".to_string()
}

fn default_ttl_secs() -> u64 {
    300
}

impl Settings {
    /// Load and validate settings from `path`, or from
    /// [`DEFAULT_CONFIG_FILE`] when no path is given.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let path = path.map_or_else(|| PathBuf::from(DEFAULT_CONFIG_FILE), Path::to_path_buf);
        let content = std::fs::read_to_string(&path).map_err(|e| ConfigError::Io {
            path: path.clone(),
            message: e.to_string(),
        })?;

        let settings = Self::parse(&content)?;
        debug!("Loaded configuration from {}", path.display());
        Ok(settings)
    }

    /// Parse and validate settings from a YAML string.
    pub fn parse(content: &str) -> Result<Self, ConfigError> {
        let settings: Settings = serde_yaml::from_str(content)?;
        settings.validate()?;
        Ok(settings)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if !PROJECT_NAME_RE.is_match(&self.project) {
            return Err(ConfigError::Invalid(format!(
                "project '{}' must be lower-case alphanumeric with dashes or underscores",
                self.project
            )));
        }
        if self.environment.is_empty() {
            return Err(ConfigError::Invalid(
                "default environment must not be empty".to_string(),
            ));
        }
        if !self.store.base_url.starts_with("http://") && !self.store.base_url.starts_with("https://")
        {
            return Err(ConfigError::Invalid(format!(
                "store baseUrl '{}' must be an http(s) URL",
                self.store.base_url
            )));
        }
        for (alias, name) in &self.environments {
            if alias.is_empty() || name.is_empty() {
                return Err(ConfigError::Invalid(
                    "environment aliases and names must not be empty".to_string(),
                ));
            }
        }
        if let Some(vercel) = &self.platforms.vercel {
            if vercel.project_id.is_empty() {
                return Err(ConfigError::Invalid(
                    "vercel.projectId must not be empty".to_string(),
                ));
            }
        }
        if let Some(cloudflare) = &self.platforms.cloudflare {
            if cloudflare.account_id.is_empty() || cloudflare.script.is_empty() {
                return Err(ConfigError::Invalid(
                    "cloudflare.accountId and cloudflare.script must not be empty".to_string(),
                ));
            }
        }
        if let Some(supabase) = &self.platforms.supabase {
            if supabase.project_ref.is_empty() {
                return Err(ConfigError::Invalid(
                    "supabase.projectRef must not be empty".to_string(),
                ));
            }
        }
        Ok(())
    }

    /// Resolve a requested environment name through the alias table,
    /// falling back to the configured default.
    pub fn resolve_environment(&self, requested: Option<&str>) -> String {
        let name = requested.unwrap_or(&self.environment);
        self.environments
            .get(name)
            .cloned()
            .unwrap_or_else(|| name.to_string())
    }

    /// Build the canonical store client, reading the access token from
    /// the configured environment variable.
    pub fn build_provider(&self) -> Result<HttpSecretProvider, StoreError> {
        let token = std::env::var(&self.store.token_env).map_err(|_| {
            StoreError::Config(format!(
                "environment variable {} is not set",
                self.store.token_env
            ))
        })?;
        HttpSecretProvider::new(&self.store.base_url, &self.project, &token)
    }

    /// Build one client per configured platform, in configuration order.
    pub fn build_platforms(&self) -> Result<Vec<Box<dyn PlatformClient>>, ConfigError> {
        let mut platforms: Vec<Box<dyn PlatformClient>> = Vec::new();

        if let Some(vercel) = &self.platforms.vercel {
            let token = std::env::var(&vercel.token_env).map_err(|_| {
                ConfigError::Invalid(format!(
                    "environment variable {} is not set",
                    vercel.token_env
                ))
            })?;
            let client = VercelPlatform::new(
                &vercel.project_id,
                vercel.team_id.as_deref(),
                &vercel.target,
                &token,
            )
            .map_err(|e| ConfigError::Invalid(e.to_string()))?;
            platforms.push(Box::new(client));
        }

        if let Some(cloudflare) = &self.platforms.cloudflare {
            platforms.push(Box::new(CloudflarePlatform::new(
                &cloudflare.account_id,
                &cloudflare.script,
            )));
        }

        if let Some(supabase) = &self.platforms.supabase {
            platforms.push(Box::new(SupabasePlatform::new(&supabase.project_ref)));
        }

        Ok(platforms)
    }

    /// Build the runtime secret cache used by embedded consumers that
    /// serve many requests per process.
    pub fn build_cache(&self) -> Result<SecretCache, StoreError> {
        let provider = self.build_provider()?;
        Ok(SecretCache::new(
            Arc::new(provider),
            Duration::from_secs(self.cache.ttl_secs),
        )
        .with_env_fallback(self.cache.env_fallback))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const FULL_CONFIG: &str = r"
project: my-app
environment: production
environments:
  prod: production
store:
  baseUrl: https://secrets.internal.example.com
platforms:
  vercel:
    projectId: prj_abc123
  cloudflare:
    accountId: cf-account
    script: my-worker
  supabase:
    projectRef: abcdefghijklmnop
cache:
  ttlSecs: 120
";

    #[test]
    fn test_parse_full_config() {
        let settings = Settings::parse(FULL_CONFIG).unwrap();

        assert_eq!(settings.project, "my-app");
        assert_eq!(settings.environment, "production");
        assert_eq!(settings.store.token_env, "SECRET_STORE_TOKEN");
        assert_eq!(settings.cache.ttl_secs, 120);
        assert!(settings.platforms.vercel.is_some());
        assert!(settings.platforms.cloudflare.is_some());
        assert!(settings.platforms.supabase.is_some());
    }

    #[test]
    fn test_minimal_config_uses_defaults() {
        let settings = Settings::parse(
            "project: my-app\nstore:\n  baseUrl: https://secrets.example.com\n",
        )
        .unwrap();

        assert_eq!(settings.environment, "development");
        assert_eq!(settings.cache.ttl_secs, 300);
        assert!(!settings.cache.env_fallback);
        assert!(settings.platforms.vercel.is_none());
    }

    #[test]
    fn test_invalid_project_name_rejected() {
        let result =
            Settings::parse("project: My App\nstore:\n  baseUrl: https://s.example.com\n");
        assert!(matches!(result, Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_non_http_store_url_rejected() {
        let result = Settings::parse("project: my-app\nstore:\n  baseUrl: secrets.example.com\n");
        assert!(matches!(result, Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_unknown_field_rejected() {
        let result = Settings::parse(
            "project: my-app\nstore:\n  baseUrl: https://s.example.com\nunknown: true\n",
        );
        assert!(matches!(result, Err(ConfigError::Parse(_))));
    }

    #[test]
    fn test_resolve_environment_through_alias() {
        let settings = Settings::parse(FULL_CONFIG).unwrap();

        assert_eq!(settings.resolve_environment(Some("prod")), "production");
        assert_eq!(settings.resolve_environment(Some("staging")), "staging");
        assert_eq!(settings.resolve_environment(None), "production");
    }

    #[test]
    fn test_build_cache_uses_configured_ttl_and_token() {
        std::env::set_var("SECRET_STORE_TOKEN", "test-token");
        let settings = Settings::parse(FULL_CONFIG).unwrap();

        let cache = settings.build_cache().unwrap();

        // ttlSecs: 120 from the fixture is carried into the cache.
        assert!(format!("{cache:?}").contains("120"));
    }

    #[test]
    fn test_empty_cloudflare_script_rejected() {
        let result = Settings::parse(
            "project: my-app\nstore:\n  baseUrl: https://s.example.com\nplatforms:\n  cloudflare:\n    accountId: acc\n    script: ''\n",
        );
        assert!(matches!(result, Err(ConfigError::Invalid(_))));
    }
}
