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

//! One-shot remote command execution.

use std::borrow::Cow;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;

use crate::error::{Error, Result};
use crate::security::SudoPassword;
use crate::ssh::{ChannelOptions, RemoteStream, StreamEvent, Transport};

/// Callback invoked with every raw output chunk as it arrives.
pub type OutputCallback = Arc<dyn Fn(&[u8]) + Send + Sync>;

/// Options for [`exec_command`].
#[derive(Clone, Default)]
pub struct ExecCommandOptions {
    /// Remote working directory; the command runs after `cd` into it.
    pub cwd: Option<String>,
    /// Bytes written to the command's stdin, followed by end-of-file.
    pub stdin: Option<Vec<u8>>,
    /// Run through `sudo -S` and answer with the session's credential.
    pub use_sudo: bool,
    pub exec_options: ChannelOptions,
    pub on_stdout: Option<OutputCallback>,
    pub on_stderr: Option<OutputCallback>,
}

impl fmt::Debug for ExecCommandOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExecCommandOptions")
            .field("cwd", &self.cwd)
            .field("stdin", &self.stdin.as_ref().map(Vec::len))
            .field("use_sudo", &self.use_sudo)
            .field("exec_options", &self.exec_options)
            .finish_non_exhaustive()
    }
}

/// Outcome of [`exec_command`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecResult {
    /// All stdout chunks, concatenated and trimmed.
    pub stdout: String,
    /// All stderr chunks, concatenated and trimmed.
    pub stderr: String,
    /// Exit status, when the remote side reported one.
    pub code: Option<u32>,
    /// Terminating signal, when the remote side reported one.
    pub signal: Option<String>,
}

/// Which output [`exec`] returns.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ExecStream {
    /// Return stdout; any stderr output fails the call.
    #[default]
    Stdout,
    /// Return stderr.
    Stderr,
    /// Return both streams.
    Both,
}

/// Options for [`exec`].
#[derive(Debug, Clone, Default)]
pub struct ExecOptions {
    pub cwd: Option<String>,
    pub stdin: Option<Vec<u8>>,
    pub stream: ExecStream,
    pub use_sudo: bool,
    pub exec_options: ChannelOptions,
}

/// Output of [`exec`], shaped by [`ExecStream`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExecOutput {
    Text(String),
    Both { stdout: String, stderr: String },
}

impl ExecOutput {
    /// The single selected stream, or stdout for [`ExecOutput::Both`].
    pub fn into_text(self) -> String {
        match self {
            ExecOutput::Text(text) => text,
            ExecOutput::Both { stdout, .. } => stdout,
        }
    }
}

/// Quote `value` for a POSIX shell.
pub fn escape(value: &str) -> Cow<'_, str> {
    shell_escape::unix::escape(Cow::Borrowed(value))
}

/// Prompt sudo prints on stderr when it wants the credential.
pub const SUDO_PROMPT: &str = "[sudo-credential]";

/// Longest wait for the sudo prompt before input is handed to the command.
const SUDO_PROMPT_WAIT: Duration = Duration::from_secs(3);

/// The command line actually sent to the remote side.
pub fn build_command(command: &str, cwd: Option<&str>, sudo: bool) -> String {
    let command = if sudo {
        format!("sudo -S -p {} {command}", escape(SUDO_PROMPT))
    } else {
        command.to_string()
    };
    match cwd {
        Some(cwd) => format!("cd {} ; {command}", escape(cwd)),
        None => command,
    }
}

/// Remove every occurrence of the sudo prompt from `data`.
///
/// Returns `None` when the prompt does not occur.
fn strip_sudo_prompt(data: &[u8]) -> Option<Vec<u8>> {
    let marker = SUDO_PROMPT.as_bytes();
    let first = data.windows(marker.len()).position(|w| w == marker)?;

    let mut rest = Vec::with_capacity(data.len());
    rest.extend_from_slice(&data[..first]);
    let mut tail = &data[first + marker.len()..];
    while let Some(pos) = tail.windows(marker.len()).position(|w| w == marker) {
        rest.extend_from_slice(&tail[..pos]);
        tail = &tail[pos + marker.len()..];
    }
    rest.extend_from_slice(tail);
    Some(rest)
}

/// Caller input held back until sudo has either asked for the credential or
/// started the command.
struct PendingInput<'a> {
    credential: Option<&'a SudoPassword>,
    stdin: Option<&'a [u8]>,
}

impl PendingInput<'_> {
    fn waiting_for_prompt(&self) -> bool {
        self.credential.is_some()
    }

    async fn send_stdin(&mut self, stream: &mut dyn RemoteStream) -> Result<()> {
        if let Some(stdin) = self.stdin.take() {
            stream.write(stdin).await?;
            stream.send_eof().await?;
        }
        Ok(())
    }

    /// sudo asked for the credential.
    async fn on_prompt(&mut self, stream: &mut dyn RemoteStream) -> Result<()> {
        match self.credential.take() {
            Some(credential) => {
                tracing::debug!("sudo prompt received, sending credential");
                stream.write(&credential.with_newline()).await?;
                self.send_stdin(stream).await
            }
            None => {
                tracing::warn!("sudo rejected the credential");
                stream.send_eof().await
            }
        }
    }

    /// The command produced output or finished without sudo prompting.
    async fn on_started(&mut self, stream: &mut dyn RemoteStream) -> Result<()> {
        if self.credential.take().is_some() {
            tracing::debug!("sudo did not ask for a credential");
        }
        self.send_stdin(stream).await
    }
}

/// Run `command` on its own channel and collect its output.
///
/// With `use_sudo` the credential is written only once sudo prints its
/// prompt; without a configured credential the command runs unprivileged.
/// A channel that closes without exit status or signal yields a result with
/// neither set.
pub async fn exec_command(
    transport: &dyn Transport,
    command: &str,
    options: &ExecCommandOptions,
    credential: Option<&SudoPassword>,
) -> Result<ExecResult> {
    let credential = if options.use_sudo {
        if credential.is_none() {
            tracing::warn!(
                "sudo requested but no sudo password is configured, running unprivileged"
            );
        }
        credential
    } else {
        None
    };

    let full_command = build_command(command, options.cwd.as_deref(), credential.is_some());
    tracing::debug!(command = %full_command, "executing remote command");

    let mut stream = transport
        .open_exec(&full_command, &options.exec_options)
        .await?;

    let mut input = PendingInput {
        credential,
        stdin: options.stdin.as_deref(),
    };
    if !input.waiting_for_prompt() {
        input.send_stdin(stream.as_mut()).await?;
    }

    let mut stdout = Vec::new();
    let mut stderr = Vec::new();
    let mut code = None;
    let mut signal = None;

    loop {
        let event = if input.waiting_for_prompt() && input.stdin.is_some() {
            match timeout(SUDO_PROMPT_WAIT, stream.recv()).await {
                Ok(event) => event,
                Err(_) => {
                    input.on_started(stream.as_mut()).await?;
                    continue;
                }
            }
        } else {
            stream.recv().await
        };
        let Some(event) = event else {
            break;
        };

        match event {
            StreamEvent::Stdout(data) => {
                input.on_started(stream.as_mut()).await?;
                if let Some(callback) = &options.on_stdout {
                    callback(&data);
                }
                stdout.extend_from_slice(&data);
            }
            StreamEvent::Stderr(data) => {
                let data = if credential.is_some() {
                    match strip_sudo_prompt(&data) {
                        Some(rest) => {
                            input.on_prompt(stream.as_mut()).await?;
                            rest
                        }
                        None => data,
                    }
                } else {
                    data
                };
                if data.is_empty() {
                    continue;
                }
                if let Some(callback) = &options.on_stderr {
                    callback(&data);
                }
                stderr.extend_from_slice(&data);
            }
            // The exit status may arrive before the last data; keep reading.
            StreamEvent::ExitStatus(status) => {
                input.credential = None;
                code = Some(status);
            }
            StreamEvent::ExitSignal(name) => {
                input.credential = None;
                signal = Some(name);
            }
            StreamEvent::Eof => {}
        }
    }

    if code.is_none() && signal.is_none() {
        tracing::debug!(command = %full_command, "channel closed without exit status");
    } else {
        tracing::debug!(?code, ?signal, "remote command finished");
    }

    Ok(ExecResult {
        stdout: String::from_utf8_lossy(&stdout).trim().to_string(),
        stderr: String::from_utf8_lossy(&stderr).trim().to_string(),
        code,
        signal,
    })
}

/// Run `command` with shell-escaped `args` and return the selected output.
///
/// With [`ExecStream::Stdout`], non-empty stderr fails the call with
/// [`Error::CommandFailure`].
pub async fn exec<I>(
    transport: &dyn Transport,
    command: &str,
    args: I,
    options: &ExecOptions,
    credential: Option<&SudoPassword>,
) -> Result<ExecOutput>
where
    I: IntoIterator,
    I::Item: AsRef<str>,
{
    let mut command_line = command.to_string();
    for arg in args {
        command_line.push(' ');
        command_line.push_str(&escape(arg.as_ref()));
    }

    let command_options = ExecCommandOptions {
        cwd: options.cwd.clone(),
        stdin: options.stdin.clone(),
        use_sudo: options.use_sudo,
        exec_options: options.exec_options.clone(),
        on_stdout: None,
        on_stderr: None,
    };
    let result = exec_command(transport, &command_line, &command_options, credential).await?;

    match options.stream {
        ExecStream::Stdout => {
            if !result.stderr.is_empty() {
                return Err(Error::CommandFailure(result.stderr));
            }
            Ok(ExecOutput::Text(result.stdout))
        }
        ExecStream::Stderr => Ok(ExecOutput::Text(result.stderr)),
        ExecStream::Both => Ok(ExecOutput::Both {
            stdout: result.stdout,
            stderr: result.stderr,
        }),
    }
}
