//! Error taxonomy
//!
//! None of these ever reach a logging call site: every failure is reported on
//! the original console's error channel and the pipeline keeps running.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Errors produced by the logging facility
#[derive(Debug, Error)]
pub enum LogError {
    /// Options were malformed (not an object, wrong field types)
    #[error("invalid logger options: {0}")]
    Config(String),

    /// The target path did not pass validation
    #[error("invalid log file path: {}", .0.display())]
    InvalidPath(PathBuf),

    /// `init` was called a second time
    #[error("logger already initialized")]
    AlreadyInitialized,

    /// Opening, writing or closing the log file failed
    #[error("{op} {} failed: {}", .path.display(), DiskErrorKind::of(.source).describe(.source))]
    Persistence {
        op: &'static str,
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// A subscriber callback panicked
    #[error("log subscriber failed: {0}")]
    Subscriber(String),

    /// The display sink cannot hold text
    #[error("display sink rejected: {0}")]
    Display(String),
}

/// Categories of disk errors for readable persistence messages
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiskErrorKind {
    /// Disk is full or quota exceeded
    DiskFull,
    PermissionDenied,
    NotFound,
    Other,
}

impl DiskErrorKind {
    /// Categorize an IO error
    pub fn of(e: &io::Error) -> Self {
        use io::ErrorKind;

        match e.kind() {
            ErrorKind::WriteZero => DiskErrorKind::DiskFull,
            ErrorKind::PermissionDenied => DiskErrorKind::PermissionDenied,
            ErrorKind::NotFound => DiskErrorKind::NotFound,
            _ => {
                #[cfg(unix)]
                {
                    if let Some(os_error) = e.raw_os_error() {
                        // ENOSPC = 28, EDQUOT = 122 (Linux) / 69 (macOS)
                        if os_error == 28 || os_error == 122 || os_error == 69 {
                            return DiskErrorKind::DiskFull;
                        }
                        // EACCES
                        if os_error == 13 {
                            return DiskErrorKind::PermissionDenied;
                        }
                    }
                }
                DiskErrorKind::Other
            }
        }
    }

    fn describe(&self, e: &io::Error) -> String {
        match self {
            DiskErrorKind::DiskFull => format!("disk full ({})", e),
            DiskErrorKind::PermissionDenied => format!("permission denied ({})", e),
            DiskErrorKind::NotFound => "file or directory not found".to_string(),
            DiskErrorKind::Other => e.to_string(),
        }
    }
}
