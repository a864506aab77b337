//! Source resolution: turns a package descriptor into a URL to fetch and the
//! kind of source behind it.

mod classify;

use std::fmt;

pub use classify::{SourceClassifier, SuffixClassifier};

use crate::domain::model::{PackageDescriptor, PackageKind, PackageVersion};

pub const DEFAULT_DOWNLOADS_URL: &str = "https://downloads.wordpress.org";
pub const DEFAULT_CORE_URL: &str = "https://wordpress.org";

/// How a package's source is acquired.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SourceKind {
    /// A downloadable archive, extracted into the destination.
    Archive,
    /// A repository, cloned into the destination.
    VersionControl,
}

impl fmt::Display for SourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SourceKind::Archive => write!(f, "archive"),
            SourceKind::VersionControl => write!(f, "version control"),
        }
    }
}

/// A resolved package source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedSource {
    pub url: String,
    pub kind: SourceKind,
}

impl ResolvedSource {
    /// File name for the downloaded archive of `package`, keeping the format
    /// suffix the extractor dispatches on. The name carries a digest of the
    /// URL, so a different version or source never matches an old download.
    pub fn archive_file_name(&self, package: &str) -> String {
        let path = self.url.split(['?', '#']).next().unwrap_or(&self.url);
        let lower = path.to_ascii_lowercase();
        let extension = if lower.ends_with(".tar.gz") || lower.ends_with(".tgz") {
            "tar.gz"
        } else {
            "zip"
        };
        format!("{}-{:016x}.{}", package, url_digest(&self.url), extension)
    }
}

/// 64-bit FNV-1a. Stable across runs and toolchains, unlike `DefaultHasher`.
fn url_digest(url: &str) -> u64 {
    const OFFSET: u64 = 0xcbf2_9ce4_8422_2325;
    const PRIME: u64 = 0x0000_0100_0000_01b3;
    url.bytes()
        .fold(OFFSET, |hash, byte| (hash ^ u64::from(byte)).wrapping_mul(PRIME))
}

/// Base URLs of the public package repository.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Registry {
    /// Serves plugin and theme archives.
    pub downloads_url: String,
    /// Serves core release archives.
    pub core_url: String,
}

impl Default for Registry {
    fn default() -> Self {
        Self {
            downloads_url: DEFAULT_DOWNLOADS_URL.to_string(),
            core_url: DEFAULT_CORE_URL.to_string(),
        }
    }
}

impl Registry {
    pub fn new(downloads_url: Option<String>, core_url: Option<String>) -> Self {
        let defaults = Registry::default();
        Self {
            downloads_url: downloads_url
                .map(|u| u.trim_end_matches('/').to_string())
                .unwrap_or(defaults.downloads_url),
            core_url: core_url
                .map(|u| u.trim_end_matches('/').to_string())
                .unwrap_or(defaults.core_url),
        }
    }

    /// Canonical download URL for a package. Pure and total.
    pub fn download_url(&self, name: &str, version: &PackageVersion, kind: PackageKind) -> String {
        match (kind, version) {
            (PackageKind::Plugin, PackageVersion::Latest) => {
                format!("{}/plugin/{}.zip", self.downloads_url, name)
            }
            (PackageKind::Plugin, PackageVersion::Exact(v)) => {
                format!("{}/plugin/{}.{}.zip", self.downloads_url, name, v)
            }
            (PackageKind::Theme, PackageVersion::Latest) => {
                format!("{}/theme/{}.zip", self.downloads_url, name)
            }
            (PackageKind::Theme, PackageVersion::Exact(v)) => {
                format!("{}/theme/{}.{}.zip", self.downloads_url, name, v)
            }
            (PackageKind::Core, PackageVersion::Latest) => format!("{}/latest.zip", self.core_url),
            (PackageKind::Core, PackageVersion::Exact(v)) => {
                format!("{}/wordpress-{}.zip", self.core_url, v)
            }
        }
    }
}

/// Resolves descriptors to sources using a registry and a classifier.
pub struct SourceResolver {
    registry: Registry,
    classifier: Box<dyn SourceClassifier>,
}

impl SourceResolver {
    pub fn new(registry: Registry, classifier: Box<dyn SourceClassifier>) -> Self {
        Self {
            registry,
            classifier,
        }
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn resolve(&self, descriptor: &PackageDescriptor) -> ResolvedSource {
        let url = match descriptor.source() {
            Some(source) => source.to_string(),
            None => self.registry.download_url(
                descriptor.name(),
                descriptor.version(),
                descriptor.kind(),
            ),
        };
        let kind = self.classifier.classify(&url);
        ResolvedSource { url, kind }
    }
}

impl Default for SourceResolver {
    fn default() -> Self {
        Self::new(Registry::default(), Box::new(SuffixClassifier::default()))
    }
}
