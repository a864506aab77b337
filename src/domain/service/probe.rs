use log::debug;
use serde::Deserialize;
use std::path::Path;

use crate::domain::model::PackageKind;
use crate::process::{COMPOSER_MANIFEST, NPM_MANIFEST};
use crate::runtime::Runtime;

const THEME_STYLESHEET: &str = "style.css";
const CORE_VERSION_FILE: &str = "wp-includes/version.php";
const CORE_VERSION_VARIABLE: &str = "$wp_version";

#[derive(Deserialize)]
struct ManifestVersion {
    version: Option<String>,
}

/// Best-effort lookup of the version of a package already installed at
/// `destination`. Returns `None` when no known metadata file declares one.
///
/// Sources, first match wins: `composer.json` and `package.json` `version`
/// fields, then the kind's own metadata (theme stylesheet header, main plugin
/// file header, or the core version file).
#[tracing::instrument(skip(runtime))]
pub fn installed_version<R: Runtime + ?Sized>(
    runtime: &R,
    destination: &Path,
    kind: PackageKind,
    name: &str,
) -> Option<String> {
    for manifest in [COMPOSER_MANIFEST, NPM_MANIFEST] {
        if let Some(version) = manifest_version(runtime, &destination.join(manifest)) {
            return Some(version);
        }
    }

    let version = match kind {
        PackageKind::Theme => read(runtime, &destination.join(THEME_STYLESHEET))
            .and_then(|content| header_version(&content)),
        PackageKind::Plugin => read(runtime, &destination.join(format!("{}.php", name)))
            .and_then(|content| header_version(&content)),
        PackageKind::Core => read(runtime, &destination.join(CORE_VERSION_FILE))
            .and_then(|content| core_version(&content)),
    };
    debug!("Probed version of {:?}: {:?}", destination, version);
    version
}

fn read<R: Runtime + ?Sized>(runtime: &R, path: &Path) -> Option<String> {
    if !runtime.exists(path) {
        return None;
    }
    match runtime.read_to_string(path) {
        Ok(content) => Some(content),
        Err(e) => {
            debug!("Could not read {:?}: {:#}", path, e);
            None
        }
    }
}

fn manifest_version<R: Runtime + ?Sized>(runtime: &R, path: &Path) -> Option<String> {
    let content = read(runtime, path)?;
    match serde_json::from_str::<ManifestVersion>(&content) {
        Ok(manifest) => manifest.version.filter(|v| !v.trim().is_empty()),
        Err(e) => {
            debug!("Ignoring unparsable {:?}: {}", path, e);
            None
        }
    }
}

/// `Version:` line of a file header comment, e.g. ` * Version: 1.2.0`.
fn header_version(content: &str) -> Option<String> {
    content.lines().find_map(|line| {
        let line = line.trim_start_matches(|c: char| c.is_whitespace() || matches!(c, '*' | '/' | '#'));
        let (key, value) = line.split_once(':')?;
        if !key.trim().eq_ignore_ascii_case("version") {
            return None;
        }
        let value = value.trim().trim_end_matches("*/").trim();
        (!value.is_empty()).then(|| value.to_string())
    })
}

/// Value of `$wp_version = '6.4.2';`.
fn core_version(content: &str) -> Option<String> {
    content.lines().find_map(|line| {
        let rest = line.trim().strip_prefix(CORE_VERSION_VARIABLE)?;
        let value = rest.trim_start().strip_prefix('=')?;
        let value = value.trim().trim_end_matches(';').trim();
        let value = value.trim_matches(|c| c == '\'' || c == '"');
        (!value.is_empty()).then(|| value.to_string())
    })
}
