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

//! Interactive shell driver.
//!
//! Runs a queue of commands against one shell channel, one command per
//! observed prompt. Only output of commands marked for capture is kept.
//!
//! ```text
//! AwaitingPrompt --Prompt--> Dispatching --(queue non-empty)--> AwaitingPrompt
//!                                        --(queue empty)------> Closing
//! any state --Closed | Errored--> Closed
//! ```

use std::collections::VecDeque;
use zeroize::Zeroizing;

use super::prompt::{OutputStream, PromptStream, ShellEvent};
use crate::error::{Error, Result};
use crate::security::SudoPassword;

/// One queued shell command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShellCommand {
    pub cmd: String,
    /// Keep the output this command produces until the next prompt.
    pub output: bool,
}

impl ShellCommand {
    /// A command whose output is observed but discarded.
    pub fn new(cmd: impl Into<String>) -> Self {
        Self {
            cmd: cmd.into(),
            output: false,
        }
    }

    /// A command whose output is captured into the result.
    pub fn captured(cmd: impl Into<String>) -> Self {
        Self {
            cmd: cmd.into(),
            output: true,
        }
    }
}

impl From<&str> for ShellCommand {
    fn from(cmd: &str) -> Self {
        Self::new(cmd)
    }
}

impl From<String> for ShellCommand {
    fn from(cmd: String) -> Self {
        Self::new(cmd)
    }
}

impl From<(&str, bool)> for ShellCommand {
    fn from((cmd, output): (&str, bool)) -> Self {
        Self {
            cmd: cmd.to_string(),
            output,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DriverState {
    AwaitingPrompt,
    Dispatching,
    Closing,
    Closed,
}

/// What the driver loop must do on the channel after an event.
#[derive(Debug, PartialEq, Eq)]
pub enum DriverAction {
    /// Write this command followed by a newline.
    Send(String),
    /// Write the configured credential followed by a newline.
    SendCredential,
    /// The queue is drained: close the channel.
    Close,
}

/// State machine over one shell channel.
///
/// Events come from a [`PromptStream`]; the machine itself does no I/O so the
/// same transitions can be exercised without a channel.
#[derive(Debug)]
pub struct ShellDriver {
    state: DriverState,
    queue: VecDeque<ShellCommand>,
    capturing: bool,
    has_credential: bool,
    stdout: Vec<String>,
    stderr: Vec<String>,
    failure: Option<String>,
}

impl ShellDriver {
    pub fn new(commands: impl IntoIterator<Item = ShellCommand>, has_credential: bool) -> Self {
        Self {
            state: DriverState::AwaitingPrompt,
            queue: commands.into_iter().collect(),
            capturing: false,
            has_credential,
            stdout: Vec::new(),
            stderr: Vec::new(),
            failure: None,
        }
    }

    pub fn state(&self) -> DriverState {
        self.state
    }

    pub fn on_event(&mut self, event: ShellEvent) -> Option<DriverAction> {
        match event {
            ShellEvent::PasswordRequested => {
                if self.has_credential {
                    Some(DriverAction::SendCredential)
                } else {
                    tracing::warn!("credential prompt detected but no sudo password is configured");
                    None
                }
            }
            ShellEvent::Prompt => match self.state {
                DriverState::AwaitingPrompt => {
                    self.state = DriverState::Dispatching;
                    Some(self.dispatch())
                }
                _ => None,
            },
            ShellEvent::Data { stream, text } => {
                if self.capturing {
                    match stream {
                        OutputStream::Stdout => self.stdout.push(text),
                        OutputStream::Stderr => self.stderr.push(text),
                    }
                }
                None
            }
            ShellEvent::Closed => {
                self.state = DriverState::Closed;
                None
            }
            ShellEvent::Errored(message) => {
                self.state = DriverState::Closed;
                self.failure = Some(message);
                None
            }
        }
    }

    fn dispatch(&mut self) -> DriverAction {
        self.capturing = false;
        match self.queue.pop_front() {
            Some(command) => {
                self.capturing = command.output;
                self.state = DriverState::AwaitingPrompt;
                DriverAction::Send(command.cmd)
            }
            None => {
                self.state = DriverState::Closing;
                DriverAction::Close
            }
        }
    }

    /// Final result: captured stderr as an error if any, else captured stdout.
    pub fn into_result(self) -> Result<String> {
        if let Some(message) = self.failure {
            return Err(Error::ChannelFailure(message));
        }
        let stderr = self.stderr.concat();
        let stderr = stderr.trim();
        if !stderr.is_empty() {
            return Err(Error::CommandFailure(stderr.to_string()));
        }
        Ok(self.stdout.concat().trim().to_string())
    }
}

/// Drive `commands` over `stream` until the channel closes.
///
/// `credential` is written whenever a credential prompt appears; without one
/// such prompts are only logged.
pub async fn run_commands(
    mut stream: PromptStream,
    commands: Vec<ShellCommand>,
    credential: Option<&SudoPassword>,
) -> Result<String> {
    let mut driver = ShellDriver::new(commands, credential.is_some());

    while driver.state() != DriverState::Closed {
        let event = stream.next_event().await;
        let Some(action) = driver.on_event(event) else {
            continue;
        };

        let outcome = match action {
            DriverAction::Send(cmd) => {
                tracing::debug!(command = %cmd, "dispatching shell command");
                let mut line = cmd.into_bytes();
                line.push(b'\n');
                stream.write(&line).await
            }
            DriverAction::SendCredential => match credential {
                Some(credential) => {
                    let line: Zeroizing<Vec<u8>> = credential.with_newline();
                    stream.write(&line).await
                }
                None => Ok(()),
            },
            DriverAction::Close => {
                tracing::debug!("shell command queue drained, closing channel");
                stream.close().await
            }
        };

        if let Err(e) = outcome {
            tracing::warn!("shell channel write failed: {e}");
            driver.on_event(ShellEvent::Errored(e.to_string()));
        }
    }

    driver.into_result()
}
