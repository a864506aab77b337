use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::InstallError;

/// What a package is, which decides where it gets installed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum PackageKind {
    #[default]
    Plugin,
    Theme,
    Core,
}

impl fmt::Display for PackageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PackageKind::Plugin => write!(f, "plugin"),
            PackageKind::Theme => write!(f, "theme"),
            PackageKind::Core => write!(f, "core"),
        }
    }
}

impl FromStr for PackageKind {
    type Err = InstallError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "plugin" => Ok(PackageKind::Plugin),
            "theme" => Ok(PackageKind::Theme),
            "core" => Ok(PackageKind::Core),
            _ => Err(InstallError::configuration(format!(
                "Unknown package kind: {}. Expected plugin, theme, or core.",
                s
            ))),
        }
    }
}

/// Requested version of a package.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum PackageVersion {
    #[default]
    Latest,
    Exact(String),
}

impl PackageVersion {
    pub fn exact(&self) -> Option<&str> {
        match self {
            PackageVersion::Latest => None,
            PackageVersion::Exact(v) => Some(v),
        }
    }
}

impl fmt::Display for PackageVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PackageVersion::Latest => write!(f, "latest"),
            PackageVersion::Exact(v) => write!(f, "{}", v),
        }
    }
}

impl FromStr for PackageVersion {
    type Err = InstallError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.is_empty() {
            return Err(InstallError::configuration("Package version must not be empty"));
        }
        if s.eq_ignore_ascii_case("latest") {
            return Ok(PackageVersion::Latest);
        }
        if s.chars().any(|c| c.is_whitespace() || c == '/' || c == '\\') {
            return Err(InstallError::configuration(format!(
                "Invalid package version: {:?}",
                s
            )));
        }
        Ok(PackageVersion::Exact(s.to_string()))
    }
}

impl TryFrom<String> for PackageVersion {
    type Error = InstallError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<PackageVersion> for String {
    fn from(value: PackageVersion) -> Self {
        value.to_string()
    }
}

/// A validated record identifying what package to install and from where.
///
/// Construction goes through [`PackageDescriptor::new`] (or deserialization,
/// which calls it), so every descriptor the pipeline sees has a filesystem-safe
/// name and, if present, a plausible source URL.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawDescriptor")]
pub struct PackageDescriptor {
    name: String,
    version: PackageVersion,
    source: Option<String>,
    kind: PackageKind,
}

#[derive(Deserialize)]
struct RawDescriptor {
    name: String,
    #[serde(default)]
    version: PackageVersion,
    #[serde(default)]
    source: Option<String>,
    #[serde(default)]
    kind: PackageKind,
}

impl TryFrom<RawDescriptor> for PackageDescriptor {
    type Error = InstallError;

    fn try_from(raw: RawDescriptor) -> Result<Self, Self::Error> {
        PackageDescriptor::new(raw.name, raw.version, raw.source, raw.kind)
    }
}

impl PackageDescriptor {
    pub fn new(
        name: impl Into<String>,
        version: PackageVersion,
        source: Option<String>,
        kind: PackageKind,
    ) -> Result<Self, InstallError> {
        let name = name.into();
        validate_name(&name)?;

        let source = match source.map(|s| s.trim().to_string()) {
            Some(s) if s.is_empty() => None,
            Some(s) => {
                validate_source(&s)?;
                Some(s)
            }
            None => None,
        };

        Ok(Self {
            name,
            version,
            source,
            kind,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn version(&self) -> &PackageVersion {
        &self.version
    }

    pub fn source(&self) -> Option<&str> {
        self.source.as_deref()
    }

    pub fn kind(&self) -> PackageKind {
        self.kind
    }
}

impl fmt::Display for PackageDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} ({})", self.name, self.version, self.kind)
    }
}

fn validate_name(name: &str) -> Result<(), InstallError> {
    if name.trim().is_empty() {
        return Err(InstallError::configuration("Package name must not be empty"));
    }
    let unsafe_name = name == "."
        || name == ".."
        || name.starts_with('-')
        || name.trim() != name
        || name
            .chars()
            .any(|c| matches!(c, '/' | '\\' | '\0' | ':') || c.is_control());
    if unsafe_name {
        return Err(InstallError::configuration(format!(
            "Package name {:?} is not a valid directory name",
            name
        )));
    }
    Ok(())
}

fn validate_source(source: &str) -> Result<(), InstallError> {
    // scp-like git address: git@github.com:owner/repo.git
    if let Some((user_host, path)) = source.split_once(':')
        && user_host.contains('@')
        && !user_host.contains('/')
        && !path.starts_with("//")
        && !path.is_empty()
    {
        return Ok(());
    }

    let url = reqwest::Url::parse(source).map_err(|e| {
        InstallError::configuration(format!("Invalid package source {:?}: {}", source, e))
    })?;
    match url.scheme() {
        "http" | "https" | "git" | "ssh" | "file" => Ok(()),
        other => Err(InstallError::configuration(format!(
            "Unsupported source scheme {:?} in {:?}",
            other, source
        ))),
    }
}
