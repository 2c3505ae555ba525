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

//! Tree enumeration for directory transfers.
//!
//! Entries are visited in name order so a transfer plan is the same from one
//! run to the next. The inclusion filter is applied to every entry, so a
//! rejected directory is not descended into. Local symlinks are skipped.

use std::collections::VecDeque;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

use super::join_remote;
use crate::error::{Error, Result};
use crate::ssh::{RemoteFileType, SftpChannel};

/// Per-path inclusion predicate.
pub type PathFilter = Arc<dyn Fn(&Path) -> bool + Send + Sync>;

/// Whether the base name of `path` does not start with `.`.
pub fn is_visible(path: &Path) -> bool {
    path.file_name()
        .map(|name| !name.to_string_lossy().starts_with('.'))
        .unwrap_or(true)
}

/// Filter that excludes dot-prefixed base names.
pub fn default_filter() -> PathFilter {
    Arc::new(is_visible)
}

/// Collect the files under `root`.
pub fn scan_local(root: &Path, recursive: bool, filter: &PathFilter) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    walk_local(root, recursive, filter, &mut files)?;
    Ok(files)
}

fn walk_local(
    dir: &Path,
    recursive: bool,
    filter: &PathFilter,
    files: &mut Vec<PathBuf>,
) -> Result<()> {
    let mut entries = std::fs::read_dir(dir)?.collect::<std::io::Result<Vec<_>>>()?;
    entries.sort_by_key(|entry| entry.file_name());

    for entry in entries {
        let path = entry.path();
        if !filter(&path) {
            continue;
        }

        let file_type = entry.file_type()?;
        if file_type.is_file() {
            files.push(path);
        } else if file_type.is_dir() && recursive {
            walk_local(&path, recursive, filter, files)?;
        }
    }
    Ok(())
}

/// `file` relative to `root`, joined with `/`.
pub fn relative_remote_path(root: &Path, file: &Path) -> Result<String> {
    let relative = file.strip_prefix(root).map_err(|_| {
        Error::InvalidArgument(format!(
            "{} is not under {}",
            file.display(),
            root.display()
        ))
    })?;

    let parts: Vec<String> = relative
        .components()
        .filter_map(|component| match component {
            Component::Normal(part) => Some(part.to_string_lossy().into_owned()),
            _ => None,
        })
        .collect();
    Ok(parts.join("/"))
}

/// A file found while listing a remote tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteFile {
    /// Full remote path.
    pub path: String,
    /// Path relative to the listed root, `/`-separated.
    pub relative: String,
}

/// Collect the regular files under the remote directory `root`.
pub async fn scan_remote(
    sftp: &dyn SftpChannel,
    root: &str,
    recursive: bool,
    filter: &PathFilter,
) -> Result<Vec<RemoteFile>> {
    let mut files = Vec::new();
    let mut pending = VecDeque::from([String::new()]);

    while let Some(relative_dir) = pending.pop_front() {
        let dir = if relative_dir.is_empty() {
            root.to_string()
        } else {
            join_remote(root, &relative_dir)
        };

        let mut entries = sftp.read_dir(&dir).await?;
        entries.sort_by(|a, b| a.name.cmp(&b.name));

        for entry in entries {
            let relative = if relative_dir.is_empty() {
                entry.name.clone()
            } else {
                format!("{relative_dir}/{}", entry.name)
            };
            let path = join_remote(root, &relative);
            if !filter(Path::new(&path)) {
                continue;
            }

            match entry.metadata.file_type {
                RemoteFileType::File => files.push(RemoteFile { path, relative }),
                RemoteFileType::Directory if recursive => pending.push_back(relative),
                _ => {}
            }
        }
    }

    Ok(files)
}
