//! Filesystem staging: directory creation, best-effort removal, and the
//! no-overwrite rename that places a package into its destination.

use anyhow::{Context, Result};
use log::{debug, warn};
use std::path::Path;

use crate::error::InstallError;
use crate::runtime::Runtime;

/// Creates `path` and its parents if absent. Existing directories are fine.
#[tracing::instrument(skip(runtime))]
pub fn ensure_directory<R: Runtime + ?Sized>(runtime: &R, path: &Path) -> Result<()> {
    if runtime.is_dir(path) {
        return Ok(());
    }
    debug!("Creating directory {:?}", path);
    runtime
        .create_dir_all(path)
        .with_context(|| format!("Failed to create directory at {:?}", path))
}

/// Recursively removes `path`. Failures are logged and reported as `false`;
/// cleanup never fails the caller.
#[tracing::instrument(skip(runtime))]
pub fn remove_directory<R: Runtime + ?Sized>(runtime: &R, path: &Path) -> bool {
    if !runtime.exists(path) {
        return true;
    }
    match runtime.remove_dir_all(path) {
        Ok(()) => {
            debug!("Removed {:?}", path);
            true
        }
        Err(e) => {
            warn!("Failed to clean up {:?}: {:#}", path, e);
            false
        }
    }
}

/// Moves `from` to `to`. Refuses to overwrite an existing `to`.
#[tracing::instrument(skip(runtime))]
pub fn rename<R: Runtime + ?Sized>(runtime: &R, from: &Path, to: &Path) -> Result<()> {
    if !runtime.exists(from) {
        return Err(InstallError::placement(format!("{:?} does not exist", from)).into());
    }
    match to.parent() {
        Some(parent) if !parent.as_os_str().is_empty() && !runtime.is_dir(parent) => {
            return Err(InstallError::placement(format!(
                "Parent directory of {:?} does not exist",
                to
            ))
            .into());
        }
        _ => {}
    }
    if runtime.exists(to) {
        return Err(InstallError::placement(format!("{:?} already exists", to)).into());
    }

    debug!("Moving {:?} to {:?}", from, to);
    runtime.rename(from, to).map_err(|e| {
        InstallError::placement(format!("Failed to move {:?} to {:?}: {:#}", from, to, e)).into()
    })
}
