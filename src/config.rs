use anyhow::{Context, Result};
use log::debug;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use crate::{
    domain::model::{InstallPaths, PackageDescriptor},
    domain::service::{InstallOptions, PackageInstaller},
    error::InstallError,
    http::{HttpClient, client_builder},
    process::SystemProcessRunner,
    runtime::Runtime,
    source::{Registry, SourceResolver, SuffixClassifier},
};

/// Default network timeout, in seconds.
pub const DEFAULT_TIMEOUT_SECS: u64 = 300;

const MAX_CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

/// Everything an installation run is wired with.
pub struct Config<R: Runtime + 'static> {
    pub runtime: R,
    pub http_client: HttpClient,
    pub registry: Registry,
    pub runner: SystemProcessRunner,
    pub options: InstallOptions,
}

impl<R: Runtime + 'static> Config<R> {
    pub fn new(
        runtime: R,
        registry_url: Option<String>,
        core_url: Option<String>,
        timeout: Duration,
        options: InstallOptions,
    ) -> Result<Self> {
        let client = client_builder()
            .timeout(timeout)
            .connect_timeout(timeout.min(MAX_CONNECT_TIMEOUT))
            .build()
            .context("Failed to build HTTP client")?;
        let registry = Registry::new(registry_url, core_url);
        debug!(
            "Using registry {} (core: {}), timeout {:?}",
            registry.downloads_url, registry.core_url, timeout
        );

        Ok(Self {
            runtime,
            http_client: HttpClient::new(client),
            registry,
            runner: SystemProcessRunner::default(),
            options,
        })
    }

    pub fn into_installer(self) -> PackageInstaller<R, SystemProcessRunner> {
        PackageInstaller::new(
            Arc::new(self.runtime),
            self.http_client,
            Arc::new(self.runner),
            SourceResolver::new(self.registry, Box::new(SuffixClassifier::default())),
            self.options,
        )
    }
}

/// Folder overrides from the command line. Unset folders follow the
/// conventional layout under the base folder; relative ones are taken
/// relative to `cwd`.
#[derive(Debug, Clone, Default)]
pub struct PathOverrides {
    pub base: Option<PathBuf>,
    pub plugins: Option<PathBuf>,
    pub themes: Option<PathBuf>,
    pub temp: Option<PathBuf>,
}

impl PathOverrides {
    pub fn resolve(self, cwd: &Path) -> Result<InstallPaths, InstallError> {
        let absolute = |p: PathBuf| if p.is_absolute() { p } else { cwd.join(p) };

        let base = self.base.map(absolute).unwrap_or_else(|| cwd.to_path_buf());
        let mut paths = InstallPaths::from_base(base);
        if let Some(plugins) = self.plugins {
            paths.plugins_folder = absolute(plugins);
        }
        if let Some(themes) = self.themes {
            paths.theme_folder = absolute(themes);
        }
        if let Some(temp) = self.temp {
            paths.temp_dir = absolute(temp);
        }
        paths.validate()?;
        Ok(paths)
    }
}

/// A JSON list of packages to install.
///
/// ```json
/// { "packages": [ { "name": "akismet", "version": "5.3" } ] }
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Manifest {
    pub packages: Vec<PackageDescriptor>,
}

impl Manifest {
    #[tracing::instrument(skip(runtime))]
    pub fn load<R: Runtime + ?Sized>(runtime: &R, path: &Path) -> Result<Self, InstallError> {
        let content = runtime.read_to_string(path).map_err(|e| {
            InstallError::configuration(format!("Cannot read manifest {:?}: {:#}", path, e))
        })?;
        serde_json::from_str(&content).map_err(|e| {
            InstallError::configuration(format!("Invalid manifest {:?}: {}", path, e))
        })
    }
}
