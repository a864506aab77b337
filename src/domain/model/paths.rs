use std::path::{Path, PathBuf};

use super::PackageKind;
use crate::error::InstallError;

/// Directories an installation run reads from and writes into.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstallPaths {
    pub temp_dir: PathBuf,
    pub plugins_folder: PathBuf,
    pub theme_folder: PathBuf,
    pub base_folder: PathBuf,
}

impl InstallPaths {
    /// Builds the conventional layout under a project base folder:
    /// `wp-content/plugins`, `wp-content/themes` and a `.cmsi-tmp` scratch folder.
    pub fn from_base(base_folder: impl Into<PathBuf>) -> Self {
        let base_folder = base_folder.into();
        let content = base_folder.join("wp-content");
        Self {
            temp_dir: base_folder.join(".cmsi-tmp"),
            plugins_folder: content.join("plugins"),
            theme_folder: content.join("themes"),
            base_folder,
        }
    }

    /// All paths must be absolute.
    pub fn validate(&self) -> Result<(), InstallError> {
        for (label, path) in [
            ("temp", &self.temp_dir),
            ("plugins", &self.plugins_folder),
            ("themes", &self.theme_folder),
            ("base", &self.base_folder),
        ] {
            if !path.is_absolute() {
                return Err(InstallError::configuration(format!(
                    "The {} folder must be an absolute path, got {:?}",
                    label, path
                )));
            }
        }
        Ok(())
    }

    pub fn destination_folder(&self, kind: PackageKind) -> &Path {
        match kind {
            PackageKind::Plugin => &self.plugins_folder,
            PackageKind::Theme => &self.theme_folder,
            PackageKind::Core => &self.base_folder,
        }
    }

    /// Final location of a package: `<destination folder>/<name>`.
    pub fn package_destination(&self, kind: PackageKind, name: &str) -> PathBuf {
        self.destination_folder(kind).join(name)
    }

    /// Scratch folder shared by every package of `kind`.
    pub fn kind_temp_dir(&self, kind: PackageKind) -> PathBuf {
        self.temp_dir.join(kind.to_string())
    }

    /// Scratch namespace private to one package: `<temp>/<kind>/<name>`.
    /// A plugin and a theme with the same name never share files.
    pub fn package_temp_dir(&self, kind: PackageKind, name: &str) -> PathBuf {
        self.kind_temp_dir(kind).join(name)
    }
}
