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

//! SSH channel operations: exec channels and PTY-backed shell channels.

use async_trait::async_trait;
use russh::client::Msg;
use russh::{Channel, ChannelMsg};

use super::connection::Client;
use crate::error::Result;
use crate::ssh::transport::{ChannelOptions, PtyOptions, RemoteStream, StreamEvent};

/// Extended data type code of stderr (RFC 4254 section 5.2).
const SSH_EXTENDED_DATA_STDERR: u32 = 1;

/// A russh session channel exposed as a [`RemoteStream`].
pub struct ChannelStream {
    channel: Channel<Msg>,
    closed: bool,
}

impl ChannelStream {
    fn new(channel: Channel<Msg>) -> Self {
        Self {
            channel,
            closed: false,
        }
    }
}

#[async_trait]
impl RemoteStream for ChannelStream {
    async fn recv(&mut self) -> Option<StreamEvent> {
        if self.closed {
            return None;
        }
        while let Some(msg) = self.channel.wait().await {
            let event = match msg {
                ChannelMsg::Data { ref data } => StreamEvent::Stdout(data.to_vec()),
                ChannelMsg::ExtendedData { ref data, ext } => {
                    if ext != SSH_EXTENDED_DATA_STDERR {
                        continue;
                    }
                    StreamEvent::Stderr(data.to_vec())
                }
                // The exit status may arrive before the last data packets, so
                // it is reported as an event rather than ending the stream.
                ChannelMsg::ExitStatus { exit_status } => StreamEvent::ExitStatus(exit_status),
                ChannelMsg::ExitSignal { signal_name, .. } => {
                    StreamEvent::ExitSignal(format!("{signal_name:?}"))
                }
                ChannelMsg::Eof => StreamEvent::Eof,
                ChannelMsg::Close => break,
                _ => continue,
            };
            return Some(event);
        }
        self.closed = true;
        None
    }

    async fn write(&mut self, data: &[u8]) -> Result<()> {
        self.channel.data(data).await?;
        Ok(())
    }

    async fn send_eof(&mut self) -> Result<()> {
        self.channel.eof().await?;
        Ok(())
    }

    async fn close(&mut self) -> Result<()> {
        if !self.closed {
            self.channel.close().await?;
        }
        Ok(())
    }
}

impl Client {
    /// Open a new session channel.
    pub async fn get_channel(&self) -> Result<Channel<Msg>> {
        Ok(self.connection_handle.channel_open_session().await?)
    }

    /// Open a channel running `command` with the given channel options.
    pub(super) async fn exec_channel(
        &self,
        command: &str,
        options: &ChannelOptions,
    ) -> Result<ChannelStream> {
        let channel = self.get_channel().await?;

        for (name, value) in &options.env {
            channel.set_env(true, name.as_str(), value.as_str()).await?;
        }
        if let Some(pty) = &options.pty {
            channel
                .request_pty(true, &pty.term, pty.width, pty.height, 0, 0, &[])
                .await?;
        }
        channel.exec(true, command).await?;
        tracing::trace!(command, "exec channel opened");

        Ok(ChannelStream::new(channel))
    }

    /// Open an interactive shell channel with a pseudo-terminal.
    pub(super) async fn shell_channel(&self, pty: &PtyOptions) -> Result<ChannelStream> {
        let channel = self.get_channel().await?;

        channel
            .request_pty(
                false,
                &pty.term,
                pty.width,
                pty.height,
                0,   // pixel width (0 means undefined)
                0,   // pixel height (0 means undefined)
                &[], // terminal modes (empty means use defaults)
            )
            .await?;
        channel.request_shell(false).await?;
        tracing::trace!(term = %pty.term, "shell channel opened");

        Ok(ChannelStream::new(channel))
    }
}
