//! Error taxonomy for package installation.
//!
//! Functions throughout the crate return `anyhow::Result`; the variants here are
//! carried inside `anyhow::Error` and recovered with `downcast_ref` where the
//! kind of failure matters (retry decisions, per-package reporting, exit status).

use std::fmt;
use std::path::PathBuf;

/// Errors that abort the installation of a package (or the whole run, for
/// configuration errors).
#[derive(Debug)]
pub enum InstallError {
    /// Invalid descriptor, paths or manifest. Fatal before any I/O happens.
    Configuration(String),
    /// Network or HTTP failure while acquiring a package.
    Transport {
        url: String,
        /// HTTP status, when the server answered at all.
        status: Option<u16>,
        message: String,
    },
    /// The redirect chain was longer than the transport allows.
    TooManyRedirects { url: String, limit: usize },
    /// The downloaded archive could not be unpacked.
    Extraction {
        archive: PathBuf,
        source: anyhow::Error,
    },
    /// Extracted or cloned content could not be moved into its destination.
    Placement(String),
}

impl InstallError {
    pub fn configuration(message: impl Into<String>) -> Self {
        InstallError::Configuration(message.into())
    }

    pub fn placement(message: impl Into<String>) -> Self {
        InstallError::Placement(message.into())
    }

    /// Short, stable name of the error kind, used in run summaries.
    pub fn kind(&self) -> &'static str {
        match self {
            InstallError::Configuration(_) => "configuration",
            InstallError::Transport { .. } => "transport",
            InstallError::TooManyRedirects { .. } => "transport",
            InstallError::Extraction { .. } => "extraction",
            InstallError::Placement(_) => "placement",
        }
    }
}

impl fmt::Display for InstallError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InstallError::Configuration(msg) => write!(f, "Invalid configuration: {}", msg),
            InstallError::Transport {
                url,
                status: Some(status),
                message,
            } => write!(f, "Failed to fetch {}: HTTP {} {}", url, status, message),
            InstallError::Transport {
                url,
                status: None,
                message,
            } => write!(f, "Failed to fetch {}: {}", url, message),
            InstallError::TooManyRedirects { url, limit } => {
                write!(f, "Too many redirects (more than {}) fetching {}", limit, url)
            }
            InstallError::Extraction { archive, source } => {
                write!(f, "Failed to extract {}: {:#}", archive.display(), source)
            }
            InstallError::Placement(msg) => write!(f, "Failed to place package: {}", msg),
        }
    }
}

impl std::error::Error for InstallError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            InstallError::Extraction { source, .. } => Some(&**source),
            _ => None,
        }
    }
}

/// A build step that did not succeed. Never aborts an installation; it is
/// attached to the install report as a warning.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildToolError {
    /// The command line that was run, e.g. `npm ci`.
    pub command: String,
    /// Exit code, if the process ran to completion.
    pub exit_code: Option<i32>,
    /// Captured standard error, or the spawn/timeout failure message.
    pub stderr: String,
}

impl fmt::Display for BuildToolError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.exit_code {
            Some(code) => write!(f, "`{}` exited with status {}", self.command, code)?,
            None => write!(f, "`{}` did not complete", self.command)?,
        }
        let stderr = self.stderr.trim();
        if !stderr.is_empty() {
            write!(f, ": {}", stderr)?;
        }
        Ok(())
    }
}

impl std::error::Error for BuildToolError {}
