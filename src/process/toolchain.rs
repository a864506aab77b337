use log::{debug, warn};
use std::path::Path;

use super::{CommandSpec, ProcessRunner, shim};
use crate::error::BuildToolError;
use crate::progress::{ProgressEvent, Reporter};
use crate::runtime::Runtime;

pub const NPM_MANIFEST: &str = "package.json";
pub const NPM_LOCKFILE: &str = "package-lock.json";
pub const COMPOSER_MANIFEST: &str = "composer.json";

/// Runs the post-install build steps a package asks for, in `package_dir`.
///
/// - `package.json`: `npm ci` (with a lockfile) or `npm install`, then
///   `npm run build` if the install worked.
/// - `composer.json`: `composer install`, then `composer dump-autoload`.
///
/// Packages without either manifest need nothing. Every failure comes back as
/// a [`BuildToolError`]; none of them stops the remaining steps.
#[tracing::instrument(skip(runtime, runner, reporter))]
pub async fn run_build_steps<R, P>(
    runtime: &R,
    runner: &P,
    package: &str,
    package_dir: &Path,
    reporter: &dyn Reporter,
) -> Vec<BuildToolError>
where
    R: Runtime + ?Sized,
    P: ProcessRunner + ?Sized,
{
    let mut failures = Vec::new();

    if runtime.exists(&package_dir.join(NPM_MANIFEST)) {
        let install = if runtime.exists(&package_dir.join(NPM_LOCKFILE)) {
            CommandSpec::new(shim("npm"), ["ci"])
        } else {
            CommandSpec::new(shim("npm"), ["install"])
        };
        let build = CommandSpec::new(shim("npm"), ["run", "build"]);

        match run_step(runner, package, &install, package_dir, reporter).await {
            Ok(()) => {
                if let Err(e) = run_step(runner, package, &build, package_dir, reporter).await {
                    failures.push(e);
                }
            }
            Err(e) => {
                debug!("Skipping `{}` because the install step failed", build);
                failures.push(e);
            }
        }
    } else {
        debug!("No {} in {:?}, skipping npm", NPM_MANIFEST, package_dir);
    }

    if runtime.exists(&package_dir.join(COMPOSER_MANIFEST)) {
        let steps = [
            CommandSpec::new(shim("composer"), ["install", "--no-interaction"]),
            CommandSpec::new(shim("composer"), ["dump-autoload"]),
        ];
        for step in &steps {
            if let Err(e) = run_step(runner, package, step, package_dir, reporter).await {
                failures.push(e);
            }
        }
    } else {
        debug!("No {} in {:?}, skipping composer", COMPOSER_MANIFEST, package_dir);
    }

    failures
}

async fn run_step<P: ProcessRunner + ?Sized>(
    runner: &P,
    package: &str,
    command: &CommandSpec,
    dir: &Path,
    reporter: &dyn Reporter,
) -> Result<(), BuildToolError> {
    reporter.report(ProgressEvent::BuildStarted {
        package: package.to_string(),
        command: command.to_string(),
    });

    let result = match runner.run(command, dir).await {
        Ok(output) if output.success() => Ok(()),
        Ok(output) => Err(BuildToolError {
            command: command.to_string(),
            exit_code: output.exit_code,
            stderr: if output.timed_out {
                "timed out".to_string()
            } else {
                output.stderr
            },
        }),
        Err(e) => Err(BuildToolError {
            command: command.to_string(),
            exit_code: None,
            stderr: format!("{:#}", e),
        }),
    };

    if let Err(e) = &result {
        warn!("Build step failed for {}: {}", package, e);
    }
    reporter.report(ProgressEvent::BuildFinished {
        package: package.to_string(),
        command: command.to_string(),
        success: result.is_ok(),
    });
    result
}
