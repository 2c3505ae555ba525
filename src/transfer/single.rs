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

//! Resilient single-path operations.
//!
//! `mkdir` and `put_file` recover from a missing remote ancestor by creating
//! the parent directory and retrying exactly once. Parent creation itself goes
//! through `mkdir`, so a chain of missing ancestors several levels deep is
//! created top-down while each level still retries only once.

use futures::future::{BoxFuture, FutureExt};
use std::path::Path;

use super::remote_parent;
use crate::error::{Error, Result};
use crate::ssh::SftpChannel;

/// Create `path` as a directory unless it already is one.
///
/// Fails with [`Error::RemoteNotADirectory`] when `path` exists with another
/// type. Succeeds without side effects when the directory already exists.
pub async fn mkdir(sftp: &dyn SftpChannel, path: &str) -> Result<()> {
    ensure_dir(sftp, path).await
}

fn ensure_dir<'a>(sftp: &'a dyn SftpChannel, path: &'a str) -> BoxFuture<'a, Result<()>> {
    async move {
        match sftp.stat(path).await {
            Ok(metadata) if metadata.is_dir() => {
                tracing::trace!(path, "remote directory already exists");
                return Ok(());
            }
            Ok(_) => return Err(Error::RemoteNotADirectory(path.to_string())),
            Err(e) if e.is_missing_ancestor() => {}
            Err(e) => return Err(e),
        }

        tracing::debug!(path, "creating remote directory");
        let err = match create_dir(sftp, path).await {
            Ok(()) => return Ok(()),
            Err(e) if e.is_missing_ancestor() => e,
            Err(e) => return Err(e),
        };

        let Some(parent) = remote_parent(path) else {
            return Err(err);
        };
        tracing::debug!(path, parent, "parent directory missing, creating it first");
        ensure_dir(sftp, parent).await?;
        create_dir(sftp, path).await
    }
    .boxed()
}

/// `mkdir` that accepts losing a race: a failure after which `path` is a
/// directory counts as success.
async fn create_dir(sftp: &dyn SftpChannel, path: &str) -> Result<()> {
    let err = match sftp.mkdir(path).await {
        Ok(()) => return Ok(()),
        Err(e) if e.is_missing_ancestor() => return Err(e),
        Err(e) => e,
    };

    match sftp.stat(path).await {
        Ok(metadata) if metadata.is_dir() => {
            tracing::trace!(path, "remote directory created concurrently");
            Ok(())
        }
        _ => Err(err),
    }
}

/// Upload one local file, creating a missing remote parent once.
pub async fn put_file(sftp: &dyn SftpChannel, local_path: &Path, remote_path: &str) -> Result<()> {
    if !tokio::fs::try_exists(local_path).await.unwrap_or(false) {
        return Err(Error::LocalNotFound(local_path.to_path_buf()));
    }

    let err = match sftp.fast_put(local_path, remote_path).await {
        Ok(()) => return Ok(()),
        Err(e) if e.is_missing_ancestor() => e,
        Err(e) => return Err(e),
    };

    let Some(parent) = remote_parent(remote_path) else {
        return Err(err);
    };
    tracing::debug!(
        remote = remote_path,
        parent,
        "remote parent missing, creating it and retrying upload"
    );
    mkdir(sftp, parent).await?;
    sftp.fast_put(local_path, remote_path).await
}

/// Download one remote file. No recovery is attempted.
pub async fn get_file(sftp: &dyn SftpChannel, remote_path: &str, local_path: &Path) -> Result<()> {
    sftp.fast_get(remote_path, local_path).await
}
