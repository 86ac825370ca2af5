//! # secret-sync
//!
//! A CLI that treats a central secret store as source of truth and
//! propagates key/value secrets to serverless and edge platforms.
//!
//! ## Overview
//!
//! 1. **Fetch canonical secrets** - Reads the authoritative name/value
//!    mapping for one environment from the central store
//! 2. **Diff per platform** - Computes the additions, rewrites, and
//!    removals needed to bring each platform into agreement
//! 3. **Apply** - Converges each platform through its native API or
//!    vendor CLI, unless running with `--dry-run`
//! 4. **Report** - One outcome per platform; a failing platform never
//!    blocks the others, but any failure is reflected in the exit code
//!
//! ## Features
//!
//! - **Vercel**: project environment variables via the REST API
//! - **Cloudflare Workers**: secrets via `wrangler`, bulk uploads
//! - **Supabase**: project secrets via the `supabase` CLI
//! - **Webhook listener**: `secret-sync listen` exposes the same sync
//!   entry point over HTTP, with Prometheus metrics
//! - **Git hooks**: `secret-sync hooks install` re-syncs after merges
//!   and checkouts

use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    // Local development convenience; real deployments export the token
    // environment variables directly.
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("secret_sync=info")),
        )
        .init();

    let code = secret_sync::cli::run().await;
    std::process::exit(code);
}
