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

//! russh-backed implementation of the remote channel abstraction.
//!
//! The heart of this module is [`Client`]: connect and authenticate with it,
//! then hand it to a [`crate::Session`] as its [`Transport`].

pub mod authentication;
pub mod channel_manager;
pub mod connection;
pub mod file_transfer;

pub use authentication::{AuthMethod, ServerCheckMethod};
pub use channel_manager::ChannelStream;
pub use connection::{Client, ClientHandler};
pub use file_transfer::SftpHandle;

// Re-export russh types commonly used with this module
pub use russh::client::Config;

use async_trait::async_trait;
use std::sync::Arc;

use crate::error::Result;
use crate::ssh::transport::{ChannelOptions, PtyOptions, RemoteStream, SftpChannel, Transport};

#[async_trait]
impl Transport for Client {
    async fn open_exec(
        &self,
        command: &str,
        options: &ChannelOptions,
    ) -> Result<Box<dyn RemoteStream>> {
        Ok(Box::new(self.exec_channel(command, options).await?))
    }

    async fn open_shell(&self, pty: &PtyOptions) -> Result<Box<dyn RemoteStream>> {
        Ok(Box::new(self.shell_channel(pty).await?))
    }

    async fn open_sftp(&self) -> Result<Arc<dyn SftpChannel>> {
        Ok(Arc::new(self.sftp_handle().await?))
    }

    async fn disconnect(&self) -> Result<()> {
        self.connection_handle
            .disconnect(russh::Disconnect::ByApplication, "", "")
            .await?;
        Ok(())
    }

    fn is_closed(&self) -> bool {
        self.connection_handle.is_closed()
    }
}
