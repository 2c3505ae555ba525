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

//! Remote channel abstraction consumed by the session layer.
//!
//! The shell driver, command execution and the transfer engine only talk to
//! the remote side through these traits. [`super::tokio_client`] implements
//! them on top of russh; tests implement them in memory.

use async_trait::async_trait;
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

use crate::error::Result;

/// One event read from a remote duplex stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamEvent {
    /// Bytes written by the remote process to stdout.
    Stdout(Vec<u8>),
    /// Bytes written by the remote process to stderr.
    Stderr(Vec<u8>),
    /// The remote process exited with this status.
    ExitStatus(u32),
    /// The remote process was terminated by a signal.
    ExitSignal(String),
    /// The remote side will send no more data.
    Eof,
}

/// Pseudo-terminal parameters for shell and exec channels.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PtyOptions {
    pub term: String,
    pub width: u32,
    pub height: u32,
}

impl Default for PtyOptions {
    fn default() -> Self {
        Self {
            term: "vt100".to_string(),
            width: 80,
            height: 24,
        }
    }
}

/// Channel options for a single command execution.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChannelOptions {
    /// Request a pseudo-terminal before running the command.
    pub pty: Option<PtyOptions>,
    /// Environment variables set on the channel before the command runs.
    pub env: BTreeMap<String, String>,
}

/// A duplex byte stream with a separate error stream.
///
/// `recv` returns `None` once the channel is closed; everything after that is
/// a no-op on the remote side.
#[async_trait]
pub trait RemoteStream: Send {
    async fn recv(&mut self) -> Option<StreamEvent>;

    async fn write(&mut self, data: &[u8]) -> Result<()>;

    /// Signal end of input to the remote process.
    async fn send_eof(&mut self) -> Result<()>;

    async fn close(&mut self) -> Result<()>;
}

/// Remote file type as reported by `stat`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemoteFileType {
    Directory,
    File,
    Other,
}

/// Metadata of a remote path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteMetadata {
    pub file_type: RemoteFileType,
    pub size: Option<u64>,
}

impl RemoteMetadata {
    pub fn is_dir(&self) -> bool {
        self.file_type == RemoteFileType::Directory
    }
}

/// One entry of a remote directory listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteDirEntry {
    pub name: String,
    pub metadata: RemoteMetadata,
}

/// SFTP-like single-object operations.
///
/// Errors follow the crate taxonomy: a missing path or missing parent must be
/// reported as [`crate::Error::RemoteMissingAncestor`] (or carry a
/// "no such file" message) so callers can recover from it.
#[async_trait]
pub trait SftpChannel: Send + Sync {
    async fn stat(&self, path: &str) -> Result<RemoteMetadata>;

    async fn mkdir(&self, path: &str) -> Result<()>;

    async fn read_dir(&self, path: &str) -> Result<Vec<RemoteDirEntry>>;

    async fn fast_get(&self, remote_path: &str, local_path: &Path) -> Result<()>;

    async fn fast_put(&self, local_path: &Path, remote_path: &str) -> Result<()>;

    /// Release the handle. Further calls on it may fail.
    async fn end(&self) -> Result<()>;
}

/// An established, authenticated connection.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Open a channel running `command`.
    async fn open_exec(
        &self,
        command: &str,
        options: &ChannelOptions,
    ) -> Result<Box<dyn RemoteStream>>;

    /// Open an interactive shell channel with a pseudo-terminal.
    async fn open_shell(&self, pty: &PtyOptions) -> Result<Box<dyn RemoteStream>>;

    async fn open_sftp(&self) -> Result<Arc<dyn SftpChannel>>;

    async fn disconnect(&self) -> Result<()>;

    fn is_closed(&self) -> bool;
}
