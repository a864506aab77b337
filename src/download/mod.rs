use crate::http::HttpClient;
use crate::runtime::Runtime;
use anyhow::{Context, Result};
use log::{debug, info};
use std::path::{Path, PathBuf};

/// Result of an idempotent fetch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchStatus {
    /// The file was downloaded; carries the number of bytes written.
    Downloaded(u64),
    /// The target already existed, nothing was requested.
    AlreadyPresent,
}

/// Downloads `url` to `target`, unless `target` already exists.
///
/// The body is streamed into `<target>.part` and renamed into place once the
/// stream completes, so an interrupted download never counts as present.
#[tracing::instrument(skip(runtime, http_client))]
pub async fn fetch<R: Runtime + ?Sized>(
    runtime: &R,
    http_client: &HttpClient,
    url: &str,
    target: &Path,
) -> Result<FetchStatus> {
    if runtime.exists(target) {
        info!("{:?} already downloaded, skipping.", target);
        return Ok(FetchStatus::AlreadyPresent);
    }

    if let Some(parent) = target.parent() {
        runtime
            .create_dir_all(parent)
            .with_context(|| format!("Failed to create download directory {:?}", parent))?;
    }

    info!("Downloading file from {}...", url);
    let partial = partial_path(target);
    let bytes = http_client
        .download_file(url, || {
            runtime
                .create_file(&partial)
                .with_context(|| format!("Failed to create temporary file at {:?}", partial))
        })
        .await?;

    runtime
        .rename(&partial, target)
        .with_context(|| format!("Failed to move finished download to {:?}", target))?;

    debug!("Saved {} bytes to {:?}", bytes, target);
    info!("Download complete.");
    Ok(FetchStatus::Downloaded(bytes))
}

fn partial_path(target: &Path) -> PathBuf {
    let mut name = target.file_name().unwrap_or_default().to_os_string();
    name.push(".part");
    target.with_file_name(name)
}
