//! # Git Hooks
//!
//! Installs git hooks that re-run `secret-sync sync` after the working
//! tree changes, so checked-in secret definitions and platform state
//! stay in step without manual syncs.

use anyhow::{bail, Context, Result};
use std::path::{Path, PathBuf};
use tracing::info;

/// Hooks that trigger a re-sync.
const HOOK_NAMES: [&str; 2] = ["post-merge", "post-checkout"];

const HOOK_SCRIPT: &str = "#!/bin/sh
# Installed by secret-sync. Re-syncs platform secrets after the working
# tree changes.
secret-sync sync --quiet || echo 'secret-sync: sync failed' >&2
";

/// Install the hook scripts into `.git/hooks` under `repo_root`.
///
/// Returns the paths written. Fails when `repo_root` is not a git
/// worktree; existing hooks with the same names are overwritten.
pub fn install(repo_root: &Path) -> Result<Vec<PathBuf>> {
    let hooks_dir = repo_root.join(".git").join("hooks");
    if !hooks_dir.is_dir() {
        bail!(
            "not a git repository (no .git/hooks directory under {})",
            repo_root.display()
        );
    }

    let mut written = Vec::with_capacity(HOOK_NAMES.len());
    for name in HOOK_NAMES {
        let path = hooks_dir.join(name);
        std::fs::write(&path, HOOK_SCRIPT)
            .with_context(|| format!("failed to write hook {}", path.display()))?;
        make_executable(&path)
            .with_context(|| format!("failed to mark hook {} executable", path.display()))?;
        info!("Installed git hook {}", path.display());
        written.push(path);
    }

    Ok(written)
}

#[cfg(unix)]
fn make_executable(path: &Path) -> std::io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o755))
}

#[cfg(not(unix))]
fn make_executable(_path: &Path) -> std::io::Result<()> {
    Ok(())
}
