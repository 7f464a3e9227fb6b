//! Forced removal of per-job working state

use harvest_core::{ErrorContext, HarvestError, HarvestResult};
use std::fs;
use std::path::Path;
use tracing::{debug, warn};
use walkdir::WalkDir;

/// Remove `path` and everything under it.
///
/// Version-control metadata is write-protected on some platforms, which makes
/// a plain removal fail. In that case write protection is cleared over the
/// whole tree and the removal retried exactly once. A second failure becomes
/// a `Cleanup` error for the caller to report; the directory is left behind.
/// A missing path counts as already clean.
pub fn force_remove_dir_all(path: &Path) -> HarvestResult<()> {
    if !path.exists() {
        return Ok(());
    }

    match fs::remove_dir_all(path) {
        Ok(()) => Ok(()),
        Err(first) => {
            debug!(
                path = %path.display(),
                error = %first,
                "Removal failed; clearing write protection and retrying"
            );
            clear_write_protection(path);
            fs::remove_dir_all(path).map_err(|second| HarvestError::Cleanup {
                path: path.display().to_string(),
                message: format!(
                    "Removal failed again after clearing write protection: {} (first attempt: {})",
                    second, first
                ),
                context: ErrorContext::new("cleanup")
                    .with_operation("force_remove_dir_all")
                    .with_suggestion("Remove the directory manually before the next run"),
            })
        }
    }
}

/// Make every entry under `path` writable. Per-entry failures are logged and
/// skipped so one bad entry cannot mask the rest of the tree.
fn clear_write_protection(path: &Path) {
    for entry in WalkDir::new(path)
        .follow_links(false)
        .into_iter()
        .filter_map(|e| e.ok())
    {
        if let Err(e) = make_writable(entry.path()) {
            warn!(
                path = %entry.path().display(),
                error = %e,
                "Could not clear write protection"
            );
        }
    }
}

#[cfg(unix)]
fn make_writable(path: &Path) -> std::io::Result<()> {
    use std::os::unix::fs::PermissionsExt;

    let metadata = fs::symlink_metadata(path)?;
    // Changing permissions through a symlink would hit its target
    if metadata.file_type().is_symlink() {
        return Ok(());
    }
    let mut permissions = metadata.permissions();
    permissions.set_mode(permissions.mode() | 0o700);
    fs::set_permissions(path, permissions)
}

#[cfg(not(unix))]
fn make_writable(path: &Path) -> std::io::Result<()> {
    let metadata = fs::metadata(path)?;
    let mut permissions = metadata.permissions();
    permissions.set_readonly(false);
    fs::set_permissions(path, permissions)
}
