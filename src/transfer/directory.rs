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

//! Directory transfer engine.
//!
//! `put_directory` mirrors a local tree under a remote root:
//!
//! 1. both roots are validated and the local tree is scanned
//! 2. every file gets a `/`-separated remote path under the remote root
//! 3. the first file needing a given remote parent schedules one creation of
//!    that directory on a serialized chain; later files with the same parent
//!    await the same creation
//! 4. files are transferred in windows of `concurrency`, windows one after
//!    another, each outcome reported through `tick`
//!
//! Individual file failures never abort the transfer; they make the overall
//! result `false`. Only failing to scan the tree or to open the channel is an
//! error.

use futures::future::{join_all, ready, BoxFuture, FutureExt, Shared};
use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use super::scan::{default_filter, relative_remote_path, scan_local, scan_remote, PathFilter};
use super::single::{get_file, mkdir, put_file};
use super::{join_remote, remote_parent, DEFAULT_CONCURRENCY};
use crate::error::{Error, Result};
use crate::security::validate_remote_path;
use crate::ssh::{SftpChannel, Transport};

/// Per-file progress callback: `(local path, remote path, error)`.
pub type TickFn = Arc<dyn Fn(&Path, &str, Option<&Error>) + Send + Sync>;

fn no_tick() -> TickFn {
    Arc::new(|_, _, _| {})
}

/// Options for [`put_directory`].
#[derive(Clone)]
pub struct PutDirectoryOptions {
    /// Descend into subdirectories.
    pub recursive: bool,
    /// Files transferred at once within a window.
    pub concurrency: usize,
    /// Inclusion predicate applied to every scanned path.
    pub validate: PathFilter,
    pub tick: TickFn,
    /// Channel to reuse. It is left open when the transfer finishes.
    pub sftp: Option<Arc<dyn SftpChannel>>,
}

impl Default for PutDirectoryOptions {
    fn default() -> Self {
        Self {
            recursive: true,
            concurrency: DEFAULT_CONCURRENCY,
            validate: default_filter(),
            tick: no_tick(),
            sftp: None,
        }
    }
}

impl PutDirectoryOptions {
    pub fn recursive(mut self, recursive: bool) -> Self {
        self.recursive = recursive;
        self
    }

    pub fn concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency;
        self
    }

    pub fn validate(mut self, validate: impl Fn(&Path) -> bool + Send + Sync + 'static) -> Self {
        self.validate = Arc::new(validate);
        self
    }

    pub fn tick(
        mut self,
        tick: impl Fn(&Path, &str, Option<&Error>) + Send + Sync + 'static,
    ) -> Self {
        self.tick = Arc::new(tick);
        self
    }

    pub fn sftp(mut self, sftp: Arc<dyn SftpChannel>) -> Self {
        self.sftp = Some(sftp);
        self
    }
}

impl fmt::Debug for PutDirectoryOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PutDirectoryOptions")
            .field("recursive", &self.recursive)
            .field("concurrency", &self.concurrency)
            .field("sftp", &self.sftp.is_some())
            .finish_non_exhaustive()
    }
}

/// Options for [`get_directory`].
#[derive(Clone)]
pub struct GetDirectoryOptions {
    pub recursive: bool,
    pub concurrency: usize,
    pub validate: PathFilter,
    pub tick: TickFn,
    pub sftp: Option<Arc<dyn SftpChannel>>,
}

impl Default for GetDirectoryOptions {
    fn default() -> Self {
        Self {
            recursive: true,
            concurrency: DEFAULT_CONCURRENCY,
            validate: default_filter(),
            tick: no_tick(),
            sftp: None,
        }
    }
}

impl GetDirectoryOptions {
    pub fn recursive(mut self, recursive: bool) -> Self {
        self.recursive = recursive;
        self
    }

    pub fn concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency;
        self
    }

    pub fn validate(mut self, validate: impl Fn(&Path) -> bool + Send + Sync + 'static) -> Self {
        self.validate = Arc::new(validate);
        self
    }

    pub fn tick(
        mut self,
        tick: impl Fn(&Path, &str, Option<&Error>) + Send + Sync + 'static,
    ) -> Self {
        self.tick = Arc::new(tick);
        self
    }

    pub fn sftp(mut self, sftp: Arc<dyn SftpChannel>) -> Self {
        self.sftp = Some(sftp);
        self
    }
}

impl fmt::Debug for GetDirectoryOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GetDirectoryOptions")
            .field("recursive", &self.recursive)
            .field("concurrency", &self.concurrency)
            .field("sftp", &self.sftp.is_some())
            .finish_non_exhaustive()
    }
}

fn check_concurrency(concurrency: usize) -> Result<()> {
    if concurrency == 0 {
        return Err(Error::InvalidArgument(
            "concurrency must be at least 1".to_string(),
        ));
    }
    Ok(())
}

/// Use the caller's channel or open one; the flag says whether we own it.
async fn acquire_sftp(
    transport: &dyn Transport,
    supplied: Option<Arc<dyn SftpChannel>>,
) -> Result<(Arc<dyn SftpChannel>, bool)> {
    match supplied {
        Some(sftp) => Ok((sftp, false)),
        None => Ok((transport.open_sftp().await?, true)),
    }
}

async fn release_sftp(sftp: &dyn SftpChannel, owned: bool) {
    if owned {
        if let Err(e) = sftp.end().await {
            tracing::debug!("failed to close sftp channel: {e}");
        }
    }
}

pub(super) type TransferOutcome = std::result::Result<(), Arc<Error>>;

/// Completion of one remote directory creation, awaited by every file below it.
pub(super) type DirCreation = Shared<BoxFuture<'static, TransferOutcome>>;

/// Serialized, deduplicated creation of remote parent directories.
pub(super) struct DirectoryQueue {
    sftp: Arc<dyn SftpChannel>,
    tail: DirCreation,
    scheduled: HashMap<String, DirCreation>,
}

impl DirectoryQueue {
    pub(super) fn new(sftp: Arc<dyn SftpChannel>) -> Self {
        Self {
            sftp,
            tail: ready(Ok(())).boxed().shared(),
            scheduled: HashMap::new(),
        }
    }

    /// Creation of `dir`, scheduling it behind all earlier ones on first use.
    pub(super) fn schedule(&mut self, dir: &str) -> DirCreation {
        if let Some(creation) = self.scheduled.get(dir) {
            return creation.clone();
        }

        let previous = self.tail.clone();
        let sftp = Arc::clone(&self.sftp);
        let path = dir.to_string();
        let creation = async move {
            // An earlier failure only affects the files under that directory.
            let _ = previous.await;
            mkdir(sftp.as_ref(), &path).await.map_err(Arc::new)
        }
        .boxed()
        .shared();

        self.tail = creation.clone();
        self.scheduled.insert(dir.to_string(), creation.clone());
        creation
    }
}

struct PlannedUpload {
    local: PathBuf,
    remote: String,
    parent: Option<DirCreation>,
}

/// Upload the tree at `local_root` to `remote_root`.
///
/// Returns `true` when every file was transferred.
pub async fn put_directory(
    transport: &dyn Transport,
    local_root: &Path,
    remote_root: &str,
    options: PutDirectoryOptions,
) -> Result<bool> {
    validate_remote_path(remote_root)?;
    check_concurrency(options.concurrency)?;
    if !local_root.exists() {
        return Err(Error::LocalNotFound(local_root.to_path_buf()));
    }
    if !local_root.is_dir() {
        return Err(Error::InvalidArgument(format!(
            "{} is not a directory",
            local_root.display()
        )));
    }

    let files = scan_local(local_root, options.recursive, &options.validate)?;
    tracing::debug!(
        local = %local_root.display(),
        remote = remote_root,
        files = files.len(),
        "scanned local tree"
    );

    let (sftp, owned) = acquire_sftp(transport, options.sftp.clone()).await?;
    let result = upload_tree(Arc::clone(&sftp), local_root, remote_root, files, &options).await;
    release_sftp(sftp.as_ref(), owned).await;
    result
}

async fn upload_tree(
    sftp: Arc<dyn SftpChannel>,
    local_root: &Path,
    remote_root: &str,
    files: Vec<PathBuf>,
    options: &PutDirectoryOptions,
) -> Result<bool> {
    let mut directories = DirectoryQueue::new(Arc::clone(&sftp));
    let mut plan = Vec::with_capacity(files.len());
    for local in files {
        let remote = join_remote(remote_root, &relative_remote_path(local_root, &local)?);
        let parent = remote_parent(&remote).map(|dir| directories.schedule(dir));
        plan.push(PlannedUpload {
            local,
            remote,
            parent,
        });
    }

    let mut failed = 0usize;
    for (index, window) in plan.chunks(options.concurrency).enumerate() {
        tracing::trace!(window = index, size = window.len(), "starting upload window");

        let outcomes = join_all(window.iter().map(|file| {
            let sftp = Arc::clone(&sftp);
            async move {
                if let Some(parent) = file.parent.clone() {
                    parent.await?;
                }
                put_file(sftp.as_ref(), &file.local, &file.remote)
                    .await
                    .map_err(Arc::new)
            }
        }))
        .await;

        for (file, outcome) in window.iter().zip(outcomes) {
            report(&options.tick, &file.local, &file.remote, &outcome);
            if outcome.is_err() {
                failed += 1;
            }
        }
    }

    if failed > 0 {
        tracing::warn!(failed, total = plan.len(), "directory upload finished with failures");
    }
    Ok(failed == 0)
}

fn report(tick: &TickFn, local: &Path, remote: &str, outcome: &TransferOutcome) {
    match outcome {
        Ok(()) => {
            tracing::trace!(local = %local.display(), remote, "transferred");
            tick(local, remote, None);
        }
        Err(e) => {
            tracing::debug!(local = %local.display(), remote, "transfer failed: {e}");
            tick(local, remote, Some(e.as_ref()));
        }
    }
}

/// Download the remote tree at `remote_root` into `local_root`.
///
/// Local directories are created as needed. Returns `true` when every file
/// was transferred.
pub async fn get_directory(
    transport: &dyn Transport,
    remote_root: &str,
    local_root: &Path,
    options: GetDirectoryOptions,
) -> Result<bool> {
    validate_remote_path(remote_root)?;
    check_concurrency(options.concurrency)?;

    let (sftp, owned) = acquire_sftp(transport, options.sftp.clone()).await?;
    let result = download_tree(sftp.as_ref(), remote_root, local_root, &options).await;
    release_sftp(sftp.as_ref(), owned).await;
    result
}

async fn download_tree(
    sftp: &dyn SftpChannel,
    remote_root: &str,
    local_root: &Path,
    options: &GetDirectoryOptions,
) -> Result<bool> {
    if !sftp.stat(remote_root).await?.is_dir() {
        return Err(Error::RemoteNotADirectory(remote_root.to_string()));
    }

    let files = scan_remote(sftp, remote_root, options.recursive, &options.validate).await?;
    tracing::debug!(
        remote = remote_root,
        local = %local_root.display(),
        files = files.len(),
        "scanned remote tree"
    );
    tokio::fs::create_dir_all(local_root).await?;

    let plan: Vec<(PathBuf, String)> = files
        .into_iter()
        .map(|file| {
            let local = file
                .relative
                .split('/')
                .fold(local_root.to_path_buf(), |path, part| path.join(part));
            (local, file.path)
        })
        .collect();

    let mut failed = 0usize;
    for window in plan.chunks(options.concurrency) {
        let outcomes = join_all(window.iter().map(|(local, remote)| async move {
            if let Some(parent) = local.parent() {
                tokio::fs::create_dir_all(parent).await?;
            }
            get_file(sftp, remote, local).await
        }))
        .await;

        for ((local, remote), outcome) in window.iter().zip(outcomes) {
            let outcome = outcome.map_err(Arc::new);
            report(&options.tick, local, remote, &outcome);
            if outcome.is_err() {
                failed += 1;
            }
        }
    }

    Ok(failed == 0)
}
