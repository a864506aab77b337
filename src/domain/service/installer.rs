use anyhow::Result;
use log::{debug, info, warn};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use super::probe;
use crate::{
    archive::{ArchiveExtractor, ArchiveExtractorImpl},
    domain::model::{InstallPaths, PackageDescriptor},
    download::{self, FetchStatus},
    error::{BuildToolError, InstallError},
    http::HttpClient,
    process::{self, ProcessRunner},
    progress::{ProgressEvent, Reporter},
    runtime::Runtime,
    source::{ResolvedSource, SourceKind, SourceResolver},
    staging,
};

const DOWNLOAD_DIR: &str = "download";
const EXTRACT_DIR: &str = "extract";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct InstallOptions {
    /// Run build steps for registry packages too, not only for packages
    /// installed from an explicit source.
    pub build_registry_packages: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstallStatus {
    /// The package was acquired and placed by this run.
    Installed,
    /// The destination already existed and was left untouched.
    AlreadyInstalled,
}

/// Something worth telling the user that did not stop the install.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InstallWarning {
    BuildTool(BuildToolError),
    VersionMismatch { requested: String, installed: String },
}

impl fmt::Display for InstallWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InstallWarning::BuildTool(e) => write!(f, "Build step failed: {}", e),
            InstallWarning::VersionMismatch {
                requested,
                installed,
            } => write!(
                f,
                "Version {} is installed but {} was requested; leaving it in place",
                installed, requested
            ),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstallReport {
    pub package: String,
    pub destination: PathBuf,
    pub status: InstallStatus,
    pub warnings: Vec<InstallWarning>,
}

/// Drives one package through resolve, destination check, acquisition,
/// placement and post-install build steps.
pub struct PackageInstaller<R, P>
where
    R: Runtime + 'static,
    P: ProcessRunner + 'static,
{
    runtime: Arc<R>,
    http_client: HttpClient,
    extractor: ArchiveExtractorImpl,
    runner: Arc<P>,
    resolver: SourceResolver,
    options: InstallOptions,
}

impl<R, P> PackageInstaller<R, P>
where
    R: Runtime + 'static,
    P: ProcessRunner + 'static,
{
    pub fn new(
        runtime: Arc<R>,
        http_client: HttpClient,
        runner: Arc<P>,
        resolver: SourceResolver,
        options: InstallOptions,
    ) -> Self {
        Self {
            runtime,
            http_client,
            extractor: ArchiveExtractorImpl::new(),
            runner,
            resolver,
            options,
        }
    }

    pub fn runtime(&self) -> &R {
        self.runtime.as_ref()
    }

    /// Installs every descriptor in order. A failed package does not stop the
    /// ones after it; each gets its own outcome.
    pub async fn install_all(
        &self,
        descriptors: &[PackageDescriptor],
        paths: &InstallPaths,
        reporter: &dyn Reporter,
    ) -> Vec<Result<InstallReport>> {
        let mut outcomes = Vec::with_capacity(descriptors.len());
        for descriptor in descriptors {
            let outcome = self.install(descriptor, paths, reporter).await;
            if let Err(e) = &outcome {
                warn!("Failed to install {}: {:#}", descriptor.name(), e);
            }
            outcomes.push(outcome);
        }
        outcomes
    }

    /// Installs a single package.
    ///
    /// An existing destination is never touched: the package is reported as
    /// already installed, with a warning if its version is known and differs
    /// from an exact requested version. Build-step failures become warnings
    /// on an otherwise successful report.
    #[tracing::instrument(skip(self, paths, reporter), fields(package = %descriptor))]
    pub async fn install(
        &self,
        descriptor: &PackageDescriptor,
        paths: &InstallPaths,
        reporter: &dyn Reporter,
    ) -> Result<InstallReport> {
        let runtime = self.runtime.as_ref();
        let name = descriptor.name();

        let resolved = self.resolver.resolve(descriptor);
        debug!("Resolved {} to {} ({})", name, resolved.url, resolved.kind);
        reporter.report(ProgressEvent::Resolved {
            package: name.to_string(),
            url: resolved.url.clone(),
            kind: resolved.kind,
        });

        let destination = paths.package_destination(descriptor.kind(), name);
        if runtime.exists(&destination) {
            info!(
                "{:?} already exists. Skipping download and extraction.",
                destination
            );
            let warnings = self.check_installed_version(descriptor, &destination, reporter);
            reporter.report(ProgressEvent::AlreadyInstalled {
                package: name.to_string(),
                destination: destination.clone(),
            });
            return Ok(InstallReport {
                package: name.to_string(),
                destination,
                status: InstallStatus::AlreadyInstalled,
                warnings,
            });
        }

        staging::ensure_directory(runtime, paths.destination_folder(descriptor.kind()))?;

        match resolved.kind {
            SourceKind::VersionControl => {
                reporter.report(ProgressEvent::Cloning {
                    package: name.to_string(),
                    url: resolved.url.clone(),
                });
                process::clone_repository(
                    runtime,
                    self.runner.as_ref(),
                    &resolved.url,
                    &destination,
                )
                .await?;
            }
            SourceKind::Archive => {
                self.acquire_archive(descriptor, &resolved, paths, &destination, reporter)
                    .await?;
            }
        }
        info!("Installed {} to {:?}", name, destination);
        reporter.report(ProgressEvent::Placed {
            package: name.to_string(),
            destination: destination.clone(),
        });

        let mut warnings = Vec::new();
        if descriptor.source().is_some() || self.options.build_registry_packages {
            let failures = process::run_build_steps(
                runtime,
                self.runner.as_ref(),
                name,
                &destination,
                reporter,
            )
            .await;
            for failure in failures {
                let warning = InstallWarning::BuildTool(failure);
                reporter.report(ProgressEvent::Warning {
                    package: name.to_string(),
                    message: warning.to_string(),
                });
                warnings.push(warning);
            }
        } else {
            debug!("Skipping build steps for registry package {}", name);
        }

        Ok(InstallReport {
            package: name.to_string(),
            destination,
            status: InstallStatus::Installed,
            warnings,
        })
    }

    fn check_installed_version(
        &self,
        descriptor: &PackageDescriptor,
        destination: &Path,
        reporter: &dyn Reporter,
    ) -> Vec<InstallWarning> {
        let Some(requested) = descriptor.version().exact() else {
            return Vec::new();
        };
        let installed = probe::installed_version(
            self.runtime.as_ref(),
            destination,
            descriptor.kind(),
            descriptor.name(),
        );
        match installed {
            Some(installed) if installed != requested => {
                let warning = InstallWarning::VersionMismatch {
                    requested: requested.to_string(),
                    installed,
                };
                warn!("{}: {}", descriptor.name(), warning);
                reporter.report(ProgressEvent::Warning {
                    package: descriptor.name().to_string(),
                    message: warning.to_string(),
                });
                vec![warning]
            }
            _ => Vec::new(),
        }
    }

    /// Fetch, extract and place an archive source. The package's scratch
    /// namespace is removed afterwards whatever the outcome, so a later run
    /// never picks up files left by this one.
    async fn acquire_archive(
        &self,
        descriptor: &PackageDescriptor,
        resolved: &ResolvedSource,
        paths: &InstallPaths,
        destination: &Path,
        reporter: &dyn Reporter,
    ) -> Result<()> {
        let package_temp = paths.package_temp_dir(descriptor.kind(), descriptor.name());
        let outcome = self
            .stage_archive(descriptor, resolved, &package_temp, destination, reporter)
            .await;
        staging::remove_directory(self.runtime.as_ref(), &package_temp);
        outcome
    }

    async fn stage_archive(
        &self,
        descriptor: &PackageDescriptor,
        resolved: &ResolvedSource,
        package_temp: &Path,
        destination: &Path,
        reporter: &dyn Reporter,
    ) -> Result<()> {
        let runtime = self.runtime.as_ref();
        let name = descriptor.name();
        let archive_path = package_temp
            .join(DOWNLOAD_DIR)
            .join(resolved.archive_file_name(name));
        let extract_dir = package_temp.join(EXTRACT_DIR);

        reporter.report(ProgressEvent::DownloadStarted {
            package: name.to_string(),
            url: resolved.url.clone(),
        });
        let status = download::fetch(runtime, &self.http_client, &resolved.url, &archive_path).await?;
        reporter.report(ProgressEvent::DownloadFinished {
            package: name.to_string(),
            path: archive_path.clone(),
            bytes: match status {
                FetchStatus::Downloaded(bytes) => Some(bytes),
                FetchStatus::AlreadyPresent => None,
            },
        });

        // Leftovers from an interrupted run would pollute the common root
        staging::remove_directory(runtime, &extract_dir);
        staging::ensure_directory(runtime, &extract_dir)?;

        let extraction = self
            .extractor
            .extract(runtime, &archive_path, &extract_dir)
            .map_err(|source| InstallError::Extraction {
                archive: archive_path.clone(),
                source,
            })?;
        reporter.report(ProgressEvent::Extracted {
            package: name.to_string(),
            root: extraction.common_root.clone(),
        });

        let root = extraction.root_in(&extract_dir).ok_or_else(|| {
            InstallError::placement(format!(
                "{:?} has no single top-level directory",
                archive_path
            ))
        })?;
        if !runtime.is_dir(&root) {
            return Err(InstallError::placement(format!(
                "Top-level entry {:?} of {:?} is not a directory",
                extraction.common_root, archive_path
            ))
            .into());
        }

        staging::rename(runtime, &root, destination)
    }
}
