//! # secret-sync Library
//!
//! Core functionality for the secret-sync CLI: the canonical secret
//! store client, platform clients, the reconciliation engine, and the
//! runtime secret cache. Behavioral tests live in `tests/`; pure logic
//! is tested inside the module files.

pub mod cache;
pub mod cli;
pub mod config;
pub mod hooks;
pub mod metrics;
pub mod platform;
pub mod report;
pub mod server;
pub mod store;
pub mod sync;

pub use cache::{Clock, SecretCache, SystemClock, DEFAULT_TTL};
pub use config::{ConfigError, Settings};
pub use platform::{
    compute_diff, CurrentSecrets, Overlap, PlatformClient, PlatformError, SecretDiff,
};
pub use store::{HttpSecretProvider, SecretMap, SecretProvider, StoreError};
pub use sync::{all_succeeded, run_sync, SyncOptions, SyncOutcome};
