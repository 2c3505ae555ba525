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

//! Batched multi-file upload.

use futures::future::join_all;
use std::fmt;
use std::sync::Arc;

use super::directory::DirectoryQueue;
use super::single::put_file;
use super::{remote_parent, DEFAULT_CONCURRENCY};
use crate::error::{Error, FilePair, Result};
use crate::security::validate_remote_path;
use crate::ssh::{SftpChannel, Transport};

/// Options for [`put_files`].
#[derive(Clone)]
pub struct PutFilesOptions {
    /// Files uploaded at once.
    pub concurrency: usize,
    /// Channel to reuse. It is left open when the upload finishes.
    pub sftp: Option<Arc<dyn SftpChannel>>,
}

impl Default for PutFilesOptions {
    fn default() -> Self {
        Self {
            concurrency: DEFAULT_CONCURRENCY,
            sftp: None,
        }
    }
}

impl fmt::Debug for PutFilesOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PutFilesOptions")
            .field("concurrency", &self.concurrency)
            .field("sftp", &self.sftp.is_some())
            .finish()
    }
}

/// Upload `files` in batches of `concurrency`.
///
/// Missing remote parents are created once each, before the files below them
/// start. The first failing batch is allowed to finish, then the call fails
/// with [`Error::PutFilesFailed`] carrying the first error and every pair
/// transferred so far, so the caller can resume with the rest.
pub async fn put_files(
    transport: &dyn Transport,
    files: &[FilePair],
    options: PutFilesOptions,
) -> Result<()> {
    if options.concurrency == 0 {
        return Err(Error::InvalidArgument(
            "concurrency must be at least 1".to_string(),
        ));
    }
    for pair in files {
        validate_remote_path(&pair.remote)?;
    }

    let (sftp, owned) = match options.sftp {
        Some(sftp) => (sftp, false),
        None => (transport.open_sftp().await?, true),
    };

    let result = upload_batches(Arc::clone(&sftp), files, options.concurrency).await;

    if owned {
        if let Err(e) = sftp.end().await {
            tracing::debug!("failed to close sftp channel: {e}");
        }
    }
    result
}

async fn upload_batches(
    sftp: Arc<dyn SftpChannel>,
    files: &[FilePair],
    concurrency: usize,
) -> Result<()> {
    let mut directories = DirectoryQueue::new(Arc::clone(&sftp));
    let mut transferred = Vec::with_capacity(files.len());

    for batch in files.chunks(concurrency) {
        let uploads: Vec<_> = batch
            .iter()
            .map(|pair| {
                let parent = remote_parent(&pair.remote).map(|dir| directories.schedule(dir));
                let sftp = Arc::clone(&sftp);
                async move {
                    if let Some(parent) = parent {
                        parent.await.map_err(Error::from_shared)?;
                    }
                    put_file(sftp.as_ref(), &pair.local, &pair.remote).await
                }
            })
            .collect();
        let outcomes = join_all(uploads).await;

        let mut first_error = None;
        for (pair, outcome) in batch.iter().zip(outcomes) {
            match outcome {
                Ok(()) => transferred.push(pair.clone()),
                Err(e) => {
                    tracing::debug!(
                        local = %pair.local.display(),
                        remote = %pair.remote,
                        "upload failed: {e}"
                    );
                    first_error.get_or_insert(e);
                }
            }
        }

        if let Some(source) = first_error {
            return Err(Error::PutFilesFailed {
                source: Box::new(source),
                transferred,
            });
        }
    }

    Ok(())
}
