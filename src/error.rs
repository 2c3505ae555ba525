// Copyright 2025 Lablup Inc. and Jeongkyu Shin
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Error types for session, shell and transfer operations.
//!
//! Every fallible operation in this crate returns [`Error`]. The variants map
//! onto the failure classes callers are expected to handle:
//!
//! - [`Error::NotConnected`]: no live connection behind the session
//! - [`Error::InvalidArgument`]: rejected before any I/O happened
//! - [`Error::LocalNotFound`]: a local file or directory is missing
//! - [`Error::RemoteMissingAncestor`]: the remote side reported "no such file";
//!   recoverable by creating the parent directory
//! - [`Error::RemoteNotADirectory`]: a remote path exists with the wrong type
//! - [`Error::ChannelFailure`]: opaque transport failure, never retried
//! - [`Error::CommandFailure`]: a command wrote to stderr in simple-output mode

use std::io;
use std::path::PathBuf;
use std::sync::Arc;

use russh_sftp::protocol::StatusCode;

/// A local/remote path pair handled by a multi-file transfer.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FilePair {
    pub local: PathBuf,
    pub remote: String,
}

impl FilePair {
    pub fn new(local: impl Into<PathBuf>, remote: impl Into<String>) -> Self {
        Self {
            local: local.into(),
            remote: remote.into(),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Not connected to server")]
    NotConnected,

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Local path does not exist: {}", .0.display())]
    LocalNotFound(PathBuf),

    #[error("No such file or directory: {path}: {message}")]
    RemoteMissingAncestor { path: String, message: String },

    #[error("Remote path exists but is not a directory: {0}")]
    RemoteNotADirectory(String),

    #[error("Channel failure: {0}")]
    ChannelFailure(String),

    #[error("{0}")]
    CommandFailure(String),

    #[error("Transfer failed after {} file(s) were transferred: {source}", .transferred.len())]
    PutFilesFailed {
        #[source]
        source: Box<Error>,
        transferred: Vec<FilePair>,
    },

    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    #[error("Server host key check failed")]
    ServerCheckFailed,

    #[error("SSH error: {0}")]
    Ssh(#[from] russh::Error),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

/// Message fragment that marks a "not found"-class failure regardless of
/// which layer produced it.
const NO_SUCH_FILE_MESSAGE: &str = "no such file";

/// errno name some servers put in their status text.
const ENOENT_CODE: &str = "ENOENT";

impl Error {
    /// Build an error for a failed remote operation on `path`.
    ///
    /// Failures carrying an `ENOENT` code or a "no such file" message are
    /// classified as [`Error::RemoteMissingAncestor`]; everything else is a
    /// [`Error::ChannelFailure`].
    pub fn remote(path: &str, code: Option<&str>, message: impl Into<String>) -> Self {
        let message = message.into();
        let enoent = code.is_some_and(|c| c.eq_ignore_ascii_case(ENOENT_CODE));
        if enoent || message.to_lowercase().contains(NO_SUCH_FILE_MESSAGE) {
            Error::RemoteMissingAncestor {
                path: path.to_string(),
                message,
            }
        } else {
            Error::ChannelFailure(format!("{path}: {message}"))
        }
    }

    /// Translate an SFTP protocol error for an operation on `path`.
    pub fn from_sftp(path: &str, err: russh_sftp::client::error::Error) -> Self {
        match err {
            russh_sftp::client::error::Error::Status(status) => {
                let code = match status.status_code {
                    StatusCode::NoSuchFile => Some(ENOENT_CODE),
                    _ => None,
                };
                Error::remote(path, code, status.error_message)
            }
            other => Error::remote(path, None, other.to_string()),
        }
    }

    /// Whether this failure means a remote ancestor directory is missing.
    ///
    /// Both signals are honoured: the classified variant, and a "no such
    /// file" message that surfaced unclassified from a transport stream.
    /// Local I/O errors never qualify.
    pub fn is_missing_ancestor(&self) -> bool {
        match self {
            Error::RemoteMissingAncestor { .. } => true,
            Error::ChannelFailure(message) => {
                message.to_lowercase().contains(NO_SUCH_FILE_MESSAGE)
            }
            _ => false,
        }
    }

    /// Take back an error shared between several waiters.
    ///
    /// The last holder gets the original; other holders get a copy that keeps
    /// the classification but flattens wrapped transport errors to text.
    pub fn from_shared(err: Arc<Error>) -> Self {
        match Arc::try_unwrap(err) {
            Ok(err) => err,
            Err(shared) => match shared.as_ref() {
                Error::NotConnected => Error::NotConnected,
                Error::InvalidArgument(m) => Error::InvalidArgument(m.clone()),
                Error::LocalNotFound(p) => Error::LocalNotFound(p.clone()),
                Error::RemoteMissingAncestor { path, message } => Error::RemoteMissingAncestor {
                    path: path.clone(),
                    message: message.clone(),
                },
                Error::RemoteNotADirectory(p) => Error::RemoteNotADirectory(p.clone()),
                Error::CommandFailure(m) => Error::CommandFailure(m.clone()),
                Error::AuthenticationFailed(m) => Error::AuthenticationFailed(m.clone()),
                Error::ServerCheckFailed => Error::ServerCheckFailed,
                other => Error::ChannelFailure(other.to_string()),
            },
        }
    }

    /// Pairs transferred before a `put_files` failure, if this is one.
    pub fn transferred(&self) -> Option<&[FilePair]> {
        match self {
            Error::PutFilesFailed { transferred, .. } => Some(transferred),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_remote_classifies_enoent_code() {
        let err = Error::remote("/srv/a/b", Some("ENOENT"), "failure");
        assert!(matches!(err, Error::RemoteMissingAncestor { .. }));
        assert!(err.is_missing_ancestor());
    }

    #[test]
    fn test_remote_classifies_message() {
        let err = Error::remote("/srv/a/b", None, "No such file");
        assert!(err.is_missing_ancestor());

        let err = Error::remote("/srv/a/b", None, "Permission denied");
        assert!(matches!(err, Error::ChannelFailure(_)));
        assert!(!err.is_missing_ancestor());
    }

    #[test]
    fn test_local_io_not_found_is_not_missing_ancestor() {
        let err = Error::from(io::Error::new(io::ErrorKind::NotFound, "gone"));
        assert!(!err.is_missing_ancestor());

        let raw = Error::ChannelFailure("sftp: No such file".to_string());
        assert!(raw.is_missing_ancestor());
    }

    #[test]
    fn test_put_files_failed_display_and_transferred() {
        let err = Error::PutFilesFailed {
            source: Box::new(Error::ChannelFailure("boom".to_string())),
            transferred: vec![FilePair::new("/tmp/a", "/srv/a")],
        };
        assert_eq!(
            err.to_string(),
            "Transfer failed after 1 file(s) were transferred: Channel failure: boom"
        );
        assert_eq!(err.transferred().map(|t| t.len()), Some(1));
        assert!(Error::NotConnected.transferred().is_none());
    }

    #[test]
    fn test_from_shared_keeps_classification() {
        let shared = Arc::new(Error::RemoteNotADirectory("/srv/app".to_string()));
        let copy = Error::from_shared(Arc::clone(&shared));
        assert!(matches!(copy, Error::RemoteNotADirectory(path) if path == "/srv/app"));

        let last = Error::from_shared(shared);
        assert!(matches!(last, Error::RemoteNotADirectory(_)));

        let io = Arc::new(Error::from(io::Error::other("disk full")));
        let _holder = Arc::clone(&io);
        assert!(matches!(
            Error::from_shared(io),
            Error::ChannelFailure(message) if message.contains("disk full")
        ));
    }
}
