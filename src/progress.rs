//! Progress events emitted while packages are installed.
//!
//! The installer reports what it is doing through a [`Reporter`]; the CLI
//! prints the events, tests record them.

use log::debug;
use std::fmt;
use std::path::PathBuf;
use std::sync::Mutex;

use crate::source::SourceKind;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProgressEvent {
    Resolved {
        package: String,
        url: String,
        kind: SourceKind,
    },
    AlreadyInstalled {
        package: String,
        destination: PathBuf,
    },
    DownloadStarted {
        package: String,
        url: String,
    },
    /// `bytes` is `None` when a previous download was reused.
    DownloadFinished {
        package: String,
        path: PathBuf,
        bytes: Option<u64>,
    },
    Extracted {
        package: String,
        root: String,
    },
    Cloning {
        package: String,
        url: String,
    },
    Placed {
        package: String,
        destination: PathBuf,
    },
    BuildStarted {
        package: String,
        command: String,
    },
    BuildFinished {
        package: String,
        command: String,
        success: bool,
    },
    Warning {
        package: String,
        message: String,
    },
}

impl fmt::Display for ProgressEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProgressEvent::Resolved { package, url, kind } => {
                write!(f, "[{}] Resolved {} source {}", package, kind, url)
            }
            ProgressEvent::AlreadyInstalled {
                package,
                destination,
            } => write!(
                f,
                "[{}] Already installed at {}, skipping",
                package,
                destination.display()
            ),
            ProgressEvent::DownloadStarted { package, url } => {
                write!(f, "[{}] Downloading {}", package, url)
            }
            ProgressEvent::DownloadFinished {
                package,
                path,
                bytes: Some(bytes),
            } => write!(
                f,
                "[{}] Downloaded {} bytes to {}",
                package,
                bytes,
                path.display()
            ),
            ProgressEvent::DownloadFinished {
                package,
                path,
                bytes: None,
            } => write!(f, "[{}] Reusing {}", package, path.display()),
            ProgressEvent::Extracted { package, root } => {
                write!(f, "[{}] Extracted archive (root: {})", package, root)
            }
            ProgressEvent::Cloning { package, url } => write!(f, "[{}] Cloning {}", package, url),
            ProgressEvent::Placed {
                package,
                destination,
            } => write!(f, "[{}] Installed to {}", package, destination.display()),
            ProgressEvent::BuildStarted { package, command } => {
                write!(f, "[{}] Running `{}`", package, command)
            }
            ProgressEvent::BuildFinished {
                package,
                command,
                success: true,
            } => write!(f, "[{}] `{}` finished", package, command),
            ProgressEvent::BuildFinished {
                package,
                command,
                success: false,
            } => write!(f, "[{}] `{}` failed", package, command),
            ProgressEvent::Warning { package, message } => {
                write!(f, "[{}] Warning: {}", package, message)
            }
        }
    }
}

/// Receives progress events. Implementations must tolerate events from any
/// package in any order.
pub trait Reporter: Send + Sync {
    fn report(&self, event: ProgressEvent);
}

/// Prints events to stdout.
#[derive(Debug, Default)]
pub struct ConsoleReporter;

impl Reporter for ConsoleReporter {
    fn report(&self, event: ProgressEvent) {
        debug!("{:?}", event);
        println!("{}", event);
    }
}

/// Keeps every event in memory, in arrival order.
#[derive(Debug, Default)]
pub struct RecordingReporter {
    events: Mutex<Vec<ProgressEvent>>,
}

impl RecordingReporter {
    pub fn events(&self) -> Vec<ProgressEvent> {
        match self.events.lock() {
            Ok(events) => events.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }
}

impl Reporter for RecordingReporter {
    fn report(&self, event: ProgressEvent) {
        match self.events.lock() {
            Ok(mut events) => events.push(event),
            Err(poisoned) => poisoned.into_inner().push(event),
        }
    }
}
