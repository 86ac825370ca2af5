//! # secret-sync CLI
//!
//! Command-line surface for the sync engine.
//!
//! ## Usage
//!
//! ```bash
//! # Sync every configured platform for the default environment
//! secret-sync sync
//!
//! # Preview what a sync would change, without mutating anything
//! secret-sync sync --dry-run
//!
//! # Sync a single platform against a named environment
//! secret-sync sync cloudflare --environment staging
//!
//! # Run the webhook listener
//! secret-sync listen --port 8787
//!
//! # Install git hooks that re-sync after merges and checkouts
//! secret-sync hooks install
//! ```

use crate::config::{ConfigError, Settings};
use crate::report::{self, exit_code};
use crate::store::StoreError;
use crate::sync::{run_sync, SyncOptions};
use crate::{hooks, server};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::error;

const VERSION: &str = concat!(
    env!("CARGO_PKG_VERSION"),
    " (",
    env!("BUILD_GIT_HASH"),
    ", built ",
    env!("BUILD_DATETIME"),
    ")"
);

/// Sync secrets from the central store to serverless and edge platforms
#[derive(Parser)]
#[command(name = "secret-sync")]
#[command(
    about = "Sync secrets from the central store to serverless and edge platforms",
    version = VERSION,
    after_help = "\
Configured platforms:
  vercel     - Vercel project environment variables
  cloudflare - Cloudflare Worker secrets (via wrangler)
  supabase   - Supabase project secrets (via supabase CLI)

Examples:
  secret-sync sync
  secret-sync sync vercel --environment staging --dry-run
  secret-sync listen --port 8787
"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Path to the configuration file (defaults to ./secret-sync.yaml)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Sync secrets to configured platforms
    Sync {
        /// Restrict the run to a single platform
        #[arg(value_name = "PLATFORM")]
        platform: Option<String>,

        /// Environment to sync (defaults to the configured default)
        #[arg(short, long)]
        environment: Option<String>,

        /// Compute and report diffs without mutating any platform
        #[arg(long)]
        dry_run: bool,

        /// Print failures only
        #[arg(short, long)]
        quiet: bool,
    },
    /// Run the webhook listener that triggers syncs remotely
    Listen {
        /// Port to listen on
        #[arg(short, long, default_value_t = 8787)]
        port: u16,
    },
    /// Manage git hooks that re-run sync after working-tree changes
    Hooks {
        #[command(subcommand)]
        command: HooksCommand,
    },
}

#[derive(Subcommand)]
enum HooksCommand {
    /// Install post-merge and post-checkout hooks in the current repository
    Install,
}

/// Parse arguments, dispatch, and return the process exit code.
pub async fn run() -> i32 {
    let cli = Cli::parse();

    let settings = match Settings::load(cli.config.as_deref()) {
        Ok(settings) => settings,
        Err(err) => {
            error!("{}", err);
            return exit_code::CONFIG;
        }
    };

    match cli.command {
        Commands::Sync {
            platform,
            environment,
            dry_run,
            quiet,
        } => run_sync_command(&settings, platform, environment.as_deref(), dry_run, quiet).await,
        Commands::Listen { port } => match server::serve(settings, port).await {
            Ok(()) => exit_code::SUCCESS,
            Err(err) => {
                error!("Listener failed: {}", err);
                exit_code::GENERAL
            }
        },
        Commands::Hooks {
            command: HooksCommand::Install,
        } => install_hooks(),
    }
}

async fn run_sync_command(
    settings: &Settings,
    platform: Option<String>,
    environment: Option<&str>,
    dry_run: bool,
    quiet: bool,
) -> i32 {
    let provider = match settings.build_provider() {
        Ok(provider) => provider,
        Err(err) => {
            error!("{}", err);
            return match err {
                StoreError::Config(_) => exit_code::CONFIG,
                StoreError::Unavailable(_) => exit_code::AUTH,
            };
        }
    };

    let platforms = match settings.build_platforms() {
        Ok(platforms) => platforms,
        Err(err @ ConfigError::Invalid(_)) => {
            error!("{}", err);
            return exit_code::CONFIG;
        }
        Err(err) => {
            error!("{}", err);
            return exit_code::GENERAL;
        }
    };

    if platforms.is_empty() {
        error!("No platforms configured; add a platforms section to the configuration file");
        return exit_code::CONFIG;
    }

    let options = SyncOptions {
        environment: settings.resolve_environment(environment),
        dry_run,
        platform_filter: platform,
    };

    match run_sync(&provider, &platforms, &options).await {
        Ok(outcomes) => {
            print!("{}", report::render(&outcomes, dry_run, quiet));
            report::exit_code_for(&outcomes)
        }
        Err(err) => {
            error!("Sync aborted: {}", err);
            report::exit_code_for_store_error(&err)
        }
    }
}

fn install_hooks() -> i32 {
    let cwd = match std::env::current_dir() {
        Ok(cwd) => cwd,
        Err(err) => {
            error!("Cannot resolve working directory: {}", err);
            return exit_code::GENERAL;
        }
    };

    match hooks::install(&cwd) {
        Ok(written) => {
            for path in written {
                println!("installed {}", path.display());
            }
            exit_code::SUCCESS
        }
        Err(err) => {
            error!("{:#}", err);
            exit_code::GENERAL
        }
    }
}
