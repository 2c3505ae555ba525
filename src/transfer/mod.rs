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

//! Remote file and directory transfer over an SFTP-like channel.
//!
//! - [`single`]: idempotent `mkdir`, `put_file` and `get_file` with
//!   missing-ancestor recovery
//! - [`files`]: batched multi-file upload with an aggregate error
//! - [`scan`]: local and remote tree enumeration
//! - [`directory`]: whole-tree upload and download

pub mod directory;
pub mod files;
pub mod scan;
pub mod single;

pub use directory::{get_directory, put_directory, GetDirectoryOptions, PutDirectoryOptions, TickFn};
pub use files::{put_files, PutFilesOptions};
pub use scan::{default_filter, is_visible, PathFilter};
pub use single::{get_file, mkdir, put_file};

/// Default number of transfers in flight at once.
pub const DEFAULT_CONCURRENCY: usize = 5;

/// Parent of a remote path, or `None` for a root or a bare name.
///
/// Remote paths always use `/`, whatever the local platform.
pub fn remote_parent(path: &str) -> Option<&str> {
    let trimmed = path.trim_end_matches('/');
    let idx = trimmed.rfind('/')?;
    if idx == 0 {
        return if trimmed.len() > 1 { Some("/") } else { None };
    }
    Some(&trimmed[..idx])
}

/// Append a `/`-separated relative path to a remote directory.
pub fn join_remote(root: &str, relative: &str) -> String {
    let root = if root == "/" {
        root
    } else {
        root.trim_end_matches('/')
    };
    let relative = relative.trim_start_matches('/');
    if root.is_empty() {
        relative.to_string()
    } else if root.ends_with('/') {
        format!("{root}{relative}")
    } else {
        format!("{root}/{relative}")
    }
}
