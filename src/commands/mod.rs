use anyhow::{Result, bail};
use log::{debug, info};
use std::path::Path;

use crate::{
    config::{Config, Manifest},
    domain::model::{InstallPaths, PackageDescriptor, PackageKind},
    domain::service::{InstallReport, InstallStatus},
    error::InstallError,
    progress::ConsoleReporter,
    runtime::Runtime,
    staging,
};

/// Installs a single package.
#[tracing::instrument(skip(config, paths))]
pub async fn install<R: Runtime + 'static>(
    config: Config<R>,
    paths: InstallPaths,
    descriptor: PackageDescriptor,
) -> Result<()> {
    run(config, paths, vec![descriptor]).await
}

/// Installs every package listed in a JSON manifest.
#[tracing::instrument(skip(config, paths))]
pub async fn apply<R: Runtime + 'static>(
    config: Config<R>,
    paths: InstallPaths,
    manifest_path: &Path,
) -> Result<()> {
    let manifest = Manifest::load(&config.runtime, manifest_path)?;
    if manifest.packages.is_empty() {
        println!("No packages to install.");
        return Ok(());
    }
    debug!(
        "Loaded {} package(s) from {:?}",
        manifest.packages.len(),
        manifest_path
    );
    run(config, paths, manifest.packages).await
}

async fn run<R: Runtime + 'static>(
    config: Config<R>,
    paths: InstallPaths,
    descriptors: Vec<PackageDescriptor>,
) -> Result<()> {
    paths.validate()?;
    for folder in [
        &paths.base_folder,
        &paths.plugins_folder,
        &paths.theme_folder,
        &paths.temp_dir,
    ] {
        staging::ensure_directory(&config.runtime, folder)?;
    }

    let installer = config.into_installer();
    let outcomes = installer
        .install_all(&descriptors, &paths, &ConsoleReporter)
        .await;

    let summary = Summary::from_outcomes(&descriptors, &outcomes);
    summary.print();

    if summary.failed > 0 {
        bail!(
            "{} of {} package(s) failed to install",
            summary.failed,
            descriptors.len()
        );
    }
    for kind in [PackageKind::Plugin, PackageKind::Theme, PackageKind::Core] {
        remove_if_empty(installer.runtime(), &paths.kind_temp_dir(kind));
    }
    remove_if_empty(installer.runtime(), &paths.temp_dir);
    Ok(())
}

fn remove_if_empty<R: Runtime + ?Sized>(runtime: &R, dir: &Path) {
    match runtime.read_dir(dir) {
        Ok(entries) if entries.is_empty() => {
            staging::remove_directory(runtime, dir);
        }
        Ok(_) => debug!("Keeping non-empty scratch folder {:?}", dir),
        Err(e) => debug!("Cannot inspect scratch folder {:?}: {:#}", dir, e),
    }
}

/// Short name of what went wrong, for the run summary.
fn failure_kind(error: &anyhow::Error) -> &'static str {
    error
        .downcast_ref::<InstallError>()
        .map_or("error", InstallError::kind)
}

#[derive(Debug, Default, PartialEq, Eq)]
struct Summary {
    lines: Vec<String>,
    installed: usize,
    skipped: usize,
    failed: usize,
    warnings: usize,
}

impl Summary {
    fn from_outcomes(
        descriptors: &[PackageDescriptor],
        outcomes: &[Result<InstallReport>],
    ) -> Self {
        let mut summary = Summary::default();
        for (descriptor, outcome) in descriptors.iter().zip(outcomes) {
            match outcome {
                Ok(report) => {
                    let line = match report.status {
                        InstallStatus::Installed => {
                            summary.installed += 1;
                            format!("  [OK]   {} -> {}", report.package, report.destination.display())
                        }
                        InstallStatus::AlreadyInstalled => {
                            summary.skipped += 1;
                            format!("  [SKIP] {} (already installed)", report.package)
                        }
                    };
                    summary.lines.push(line);
                    for warning in &report.warnings {
                        summary.warnings += 1;
                        summary.lines.push(format!("         warning: {}", warning));
                    }
                }
                Err(e) => {
                    summary.failed += 1;
                    summary.lines.push(format!(
                        "  [FAIL] {} ({}): {:#}",
                        descriptor.name(),
                        failure_kind(e),
                        e
                    ));
                }
            }
        }
        summary
    }

    fn print(&self) {
        println!();
        println!("=== Summary ===");
        for line in &self.lines {
            println!("{}", line);
        }
        println!();
        println!(
            "{} installed, {} skipped, {} failed, {} warning(s)",
            self.installed, self.skipped, self.failed, self.warnings
        );
        info!(
            "Run finished: {} installed, {} skipped, {} failed",
            self.installed, self.skipped, self.failed
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::model::{PackageKind, PackageVersion};
    use crate::domain::service::InstallWarning;
    use crate::error::BuildToolError;
    use crate::runtime::MockRuntime;
    use mockall::predicate::eq;
    use std::path::PathBuf;

    fn descriptor(name: &str) -> PackageDescriptor {
        PackageDescriptor::new(name, PackageVersion::Latest, None, PackageKind::Plugin).unwrap()
    }

    #[test]
    fn test_summary_counts() {
        let descriptors = vec![descriptor("a"), descriptor("b"), descriptor("c")];
        let outcomes: Vec<Result<InstallReport>> = vec![
            Ok(InstallReport {
                package: "a".into(),
                destination: PathBuf::from("/srv/plugins/a"),
                status: InstallStatus::Installed,
                warnings: vec![InstallWarning::BuildTool(BuildToolError {
                    command: "npm ci".into(),
                    exit_code: Some(1),
                    stderr: String::new(),
                })],
            }),
            Ok(InstallReport {
                package: "b".into(),
                destination: PathBuf::from("/srv/plugins/b"),
                status: InstallStatus::AlreadyInstalled,
                warnings: vec![],
            }),
            Err(InstallError::Transport {
                url: "https://example.test/c.zip".into(),
                status: Some(404),
                message: "Not Found".into(),
            }
            .into()),
        ];

        let summary = Summary::from_outcomes(&descriptors, &outcomes);

        assert_eq!(summary.installed, 1);
        assert_eq!(summary.skipped, 1);
        assert_eq!(summary.failed, 1);
        assert_eq!(summary.warnings, 1);
        assert!(summary.lines[1].contains("npm ci"));
        assert!(summary.lines[3].starts_with("  [FAIL] c (transport)"));
    }

    #[test]
    fn test_failure_kind_of_plain_error() {
        assert_eq!(failure_kind(&anyhow::anyhow!("disk full")), "error");
        assert_eq!(
            failure_kind(&InstallError::placement("exists").into()),
            "placement"
        );
    }

    #[test]
    fn test_remove_if_empty_keeps_populated_folder() {
        let mut runtime = MockRuntime::new();
        runtime
            .expect_read_dir()
            .with(eq(PathBuf::from("/srv/.cmsi-tmp")))
            .returning(|_| Ok(vec![PathBuf::from("/srv/.cmsi-tmp/broken")]));

        // No remove_dir_all expectation: removing would panic
        remove_if_empty(&runtime, Path::new("/srv/.cmsi-tmp"));
    }

    #[test]
    fn test_remove_if_empty_removes_empty_folder() {
        let mut runtime = MockRuntime::new();
        runtime.expect_read_dir().returning(|_| Ok(vec![]));
        runtime.expect_exists().returning(|_| true);
        runtime
            .expect_remove_dir_all()
            .with(eq(PathBuf::from("/srv/.cmsi-tmp")))
            .times(1)
            .returning(|_| Ok(()));

        remove_if_empty(&runtime, Path::new("/srv/.cmsi-tmp"));
    }
}
