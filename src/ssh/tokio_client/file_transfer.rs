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

//! SFTP handle backed by russh-sftp.
//!
//! Some sshd_config does not enable sftp by default. A line like
//! `Subsystem sftp internal-sftp` or `Subsystem sftp /usr/lib/openssh/sftp-server`
//! is needed on the remote machine.

use async_trait::async_trait;
use russh_sftp::client::SftpSession;
use russh_sftp::protocol::FileType;
use std::path::Path;
use tokio::io::{AsyncReadExt, AsyncWriteExt};

use super::connection::Client;
use crate::error::{Error, Result};
use crate::ssh::transport::{RemoteDirEntry, RemoteFileType, RemoteMetadata, SftpChannel};

/// Buffer size for SFTP file transfers.
/// 64KB keeps round-trips low on large files without holding whole files in memory.
const SFTP_BUFFER_SIZE: usize = 65536;

/// An open SFTP subsystem channel.
pub struct SftpHandle {
    sftp: SftpSession,
}

impl Client {
    /// Start the sftp subsystem on a new channel.
    pub(super) async fn sftp_handle(&self) -> Result<SftpHandle> {
        let channel = self.get_channel().await?;
        channel.request_subsystem(true, "sftp").await?;
        let sftp = SftpSession::new(channel.into_stream())
            .await
            .map_err(|e| Error::ChannelFailure(format!("sftp subsystem: {e}")))?;
        Ok(SftpHandle { sftp })
    }
}

fn to_metadata(attrs: &russh_sftp::protocol::FileAttributes) -> RemoteMetadata {
    let file_type = match attrs.file_type() {
        FileType::Dir => RemoteFileType::Directory,
        FileType::File => RemoteFileType::File,
        _ => RemoteFileType::Other,
    };
    RemoteMetadata {
        file_type,
        size: attrs.size,
    }
}

#[async_trait]
impl SftpChannel for SftpHandle {
    async fn stat(&self, path: &str) -> Result<RemoteMetadata> {
        let attrs = self
            .sftp
            .metadata(path)
            .await
            .map_err(|e| Error::from_sftp(path, e))?;
        Ok(to_metadata(&attrs))
    }

    async fn mkdir(&self, path: &str) -> Result<()> {
        self.sftp
            .create_dir(path)
            .await
            .map_err(|e| Error::from_sftp(path, e))
    }

    async fn read_dir(&self, path: &str) -> Result<Vec<RemoteDirEntry>> {
        let entries = self
            .sftp
            .read_dir(path)
            .await
            .map_err(|e| Error::from_sftp(path, e))?;

        Ok(entries
            .filter(|entry| {
                let name = entry.file_name();
                name != "." && name != ".."
            })
            .map(|entry| RemoteDirEntry {
                name: entry.file_name(),
                metadata: to_metadata(&entry.metadata()),
            })
            .collect())
    }

    async fn fast_get(&self, remote_path: &str, local_path: &Path) -> Result<()> {
        let mut remote_file = self
            .sftp
            .open(remote_path)
            .await
            .map_err(|e| Error::from_sftp(remote_path, e))?;
        let mut local_file = tokio::fs::File::create(local_path).await?;

        let mut buffer = vec![0u8; SFTP_BUFFER_SIZE];
        loop {
            let read = remote_file
                .read(&mut buffer)
                .await
                .map_err(|e| Error::remote(remote_path, None, e.to_string()))?;
            if read == 0 {
                break;
            }
            local_file.write_all(&buffer[..read]).await?;
        }
        local_file.flush().await?;
        Ok(())
    }

    async fn fast_put(&self, local_path: &Path, remote_path: &str) -> Result<()> {
        let mut local_file = tokio::fs::File::open(local_path).await?;
        let mut remote_file = self
            .sftp
            .create(remote_path)
            .await
            .map_err(|e| Error::from_sftp(remote_path, e))?;

        let remote_err = |e: std::io::Error| Error::remote(remote_path, None, e.to_string());
        let mut buffer = vec![0u8; SFTP_BUFFER_SIZE];
        loop {
            let read = local_file.read(&mut buffer).await?;
            if read == 0 {
                break;
            }
            remote_file
                .write_all(&buffer[..read])
                .await
                .map_err(remote_err)?;
        }
        remote_file.flush().await.map_err(remote_err)?;
        remote_file.shutdown().await.map_err(remote_err)?;
        Ok(())
    }

    async fn end(&self) -> Result<()> {
        self.sftp
            .close()
            .await
            .map_err(|e| Error::ChannelFailure(format!("closing sftp session: {e}")))
    }
}
