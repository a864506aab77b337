use anyhow::Result;
use log::{debug, info};
use std::path::Path;

use super::{CommandSpec, ProcessRunner};
use crate::error::InstallError;
use crate::runtime::Runtime;
use crate::staging;

/// Shallow-clones `url` into `destination`.
///
/// The clone runs from the destination's parent, which must exist. A failed
/// clone is fatal for the package and is reported as a transport error; any
/// partial checkout it left behind is removed.
#[tracing::instrument(skip(runtime, runner))]
pub async fn clone_repository<R, P>(
    runtime: &R,
    runner: &P,
    url: &str,
    destination: &Path,
) -> Result<()>
where
    R: Runtime + ?Sized,
    P: ProcessRunner + ?Sized,
{
    let parent = destination
        .parent()
        .ok_or_else(|| InstallError::placement(format!("{:?} has no parent", destination)))?;

    let command = CommandSpec::new(
        "git",
        [
            "clone".to_string(),
            "--depth".to_string(),
            "1".to_string(),
            url.to_string(),
            destination.to_string_lossy().into_owned(),
        ],
    );
    info!("Cloning {} into {:?}...", url, destination);

    let failure = match runner.run(&command, parent).await {
        Ok(output) if output.success() => None,
        Ok(output) if output.timed_out => Some("git clone timed out".to_string()),
        Ok(output) => Some(format!(
            "git clone exited with status {}: {}",
            output
                .exit_code
                .map_or_else(|| "unknown".to_string(), |c| c.to_string()),
            output.stderr.trim()
        )),
        Err(e) => Some(format!("{:#}", e)),
    };

    match failure {
        None => {
            debug!("Clone of {} complete", url);
            Ok(())
        }
        Some(message) => {
            staging::remove_directory(runtime, destination);
            Err(InstallError::Transport {
                url: url.to_string(),
                status: None,
                message,
            }
            .into())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::process::{CommandOutput, MockProcessRunner};
    use crate::runtime::RealRuntime;
    use std::fs;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_clone_runs_git_in_parent() {
        let dir = tempdir().unwrap();
        let destination = dir.path().join("my-theme");
        let parent = dir.path().to_path_buf();
        let expected_dest = destination.to_string_lossy().into_owned();

        let mut runner = MockProcessRunner::new();
        runner
            .expect_run()
            .withf(move |cmd, cwd| {
                cmd.program == "git"
                    && cmd.args
                        == [
                            "clone",
                            "--depth",
                            "1",
                            "https://example.test/my-theme.git",
                            expected_dest.as_str(),
                        ]
                    && cwd == parent.as_path()
            })
            .times(1)
            .returning(|_, _| {
                Ok(CommandOutput {
                    exit_code: Some(0),
                    ..Default::default()
                })
            });

        clone_repository(
            &RealRuntime,
            &runner,
            "https://example.test/my-theme.git",
            &destination,
        )
        .await
        .unwrap();
    }

    #[tokio::test]
    async fn test_failed_clone_is_transport_error_and_cleans_up() {
        let dir = tempdir().unwrap();
        let destination = dir.path().join("my-theme");
        let partial = destination.clone();

        let mut runner = MockProcessRunner::new();
        runner.expect_run().returning(move |_, _| {
            fs::create_dir_all(partial.join(".git")).unwrap();
            Ok(CommandOutput {
                exit_code: Some(128),
                stderr: "fatal: repository not found\n".into(),
                ..Default::default()
            })
        });

        let err = clone_repository(
            &RealRuntime,
            &runner,
            "https://example.test/my-theme.git",
            &destination,
        )
        .await
        .unwrap_err();

        match err.downcast_ref::<InstallError>() {
            Some(InstallError::Transport { message, .. }) => {
                assert!(message.contains("128"));
                assert!(message.contains("repository not found"));
            }
            other => panic!("unexpected error: {:?}", other),
        }
        assert!(!destination.exists());
    }
}
