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

//! Reference-counted remote session.
//!
//! A [`Session`] owns at most one live [`Transport`]. Logical clients share it
//! through [`Session::acquire`] and [`Session::release`]; the connection is
//! torn down when the count returns to zero, after which every operation
//! fails with [`Error::NotConnected`] until [`Session::reconnect`] succeeds.

use std::collections::HashMap;
use std::future::Future;
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::config::ConnectConfig;
use crate::error::{Error, FilePair, Result};
use crate::exec::{self, ExecCommandOptions, ExecOptions, ExecOutput, ExecResult};
use crate::security::{validate_remote_path, SudoPassword};
use crate::shell::{self, PromptStream, ShellCommand};
use crate::ssh::tokio_client::Client;
use crate::ssh::{PtyOptions, RemoteStream, SftpChannel, Transport};
use crate::transfer::{self, GetDirectoryOptions, PutDirectoryOptions, PutFilesOptions};

/// How [`Session::mkdir`] creates a directory.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum MkdirMode {
    /// `mkdir -p` on an exec channel.
    Exec,
    /// Stat-then-create over SFTP, creating missing parents.
    #[default]
    Sftp,
}

struct SessionState {
    transport: Option<Arc<dyn Transport>>,
    refs: usize,
    credential: Option<Arc<SudoPassword>>,
}

struct SessionInner {
    label: String,
    state: Mutex<SessionState>,
}

/// Shared handle to one remote connection.
///
/// Cloning the handle does not change the reference count; use
/// [`Session::acquire`] for that.
#[derive(Clone)]
pub struct Session {
    inner: Arc<SessionInner>,
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state();
        f.debug_struct("Session")
            .field("label", &self.inner.label)
            .field("connected", &state.transport.is_some())
            .field("refs", &state.refs)
            .finish()
    }
}

impl Session {
    /// Validate `config`, connect and authenticate. The new session holds one
    /// reference.
    pub async fn connect(config: &ConnectConfig) -> Result<Self> {
        let (transport, credential) = open_transport(config).await?;
        Ok(Self::build(
            label_for(config),
            Arc::new(transport),
            credential,
        ))
    }

    /// Wrap an established transport. The new session holds one reference.
    pub fn with_transport(
        transport: Arc<dyn Transport>,
        credential: Option<SudoPassword>,
    ) -> Self {
        Self::build("custom transport".to_string(), transport, credential)
    }

    fn build(
        label: String,
        transport: Arc<dyn Transport>,
        credential: Option<SudoPassword>,
    ) -> Self {
        Self {
            inner: Arc::new(SessionInner {
                label,
                state: Mutex::new(SessionState {
                    transport: Some(transport),
                    refs: 1,
                    credential: credential.map(Arc::new),
                }),
            }),
        }
    }

    fn state(&self) -> MutexGuard<'_, SessionState> {
        self.inner
            .state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Take another reference on the live connection.
    pub fn acquire(&self) -> Result<Session> {
        let mut state = self.state();
        if state.transport.is_none() {
            return Err(Error::NotConnected);
        }
        state.refs += 1;
        tracing::debug!(session = %self.inner.label, refs = state.refs, "session acquired");
        Ok(self.clone())
    }

    /// Drop one reference; the last one disconnects.
    pub async fn release(&self) -> Result<()> {
        let transport = {
            let mut state = self.state();
            if state.refs == 0 {
                tracing::debug!(session = %self.inner.label, "release on a closed session ignored");
                return Ok(());
            }
            state.refs -= 1;
            tracing::debug!(session = %self.inner.label, refs = state.refs, "session released");
            if state.refs > 0 {
                return Ok(());
            }
            state.transport.take()
        };

        match transport {
            Some(transport) => {
                tracing::debug!(
                    session = %self.inner.label,
                    "last reference released, disconnecting"
                );
                transport.disconnect().await
            }
            None => Ok(()),
        }
    }

    pub fn ref_count(&self) -> usize {
        self.state().refs
    }

    /// Whether a live connection backs this session.
    pub fn is_connected(&self) -> bool {
        self.state()
            .transport
            .as_ref()
            .is_some_and(|transport| !transport.is_closed())
    }

    /// Establish a fresh connection after teardown. The session then holds
    /// one reference.
    pub async fn reconnect(&self, config: &ConnectConfig) -> Result<()> {
        if self.is_connected() {
            return Ok(());
        }
        let (transport, credential) = open_transport(config).await?;

        let mut state = self.state();
        state.transport = Some(Arc::new(transport));
        state.refs = state.refs.max(1);
        state.credential = credential.map(Arc::new);
        Ok(())
    }

    fn transport(&self) -> Result<Arc<dyn Transport>> {
        self.state()
            .transport
            .as_ref()
            .map(Arc::clone)
            .ok_or(Error::NotConnected)
    }

    fn credential(&self) -> Option<Arc<SudoPassword>> {
        self.state().credential.clone()
    }

    /// Whether privileged mode has a credential to answer prompts with.
    pub fn has_sudo_credential(&self) -> bool {
        self.state().credential.is_some()
    }

    /// Open an interactive shell channel with a pseudo-terminal.
    pub async fn request_shell(&self, pty: Option<PtyOptions>) -> Result<Box<dyn RemoteStream>> {
        let transport = self.transport()?;
        transport.open_shell(&pty.unwrap_or_default()).await
    }

    pub async fn request_sftp(&self) -> Result<Arc<dyn SftpChannel>> {
        self.transport()?.open_sftp().await
    }

    /// Run `f` with a fresh SFTP channel that is ended afterwards, whatever
    /// `f` returns.
    pub async fn with_sftp<F, Fut, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(Arc<dyn SftpChannel>) -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let sftp = self.request_sftp().await?;
        let result = f(Arc::clone(&sftp)).await;
        if let Err(e) = sftp.end().await {
            tracing::debug!("failed to close sftp channel: {e}");
        }
        result
    }

    /// Drive `commands` through one shell, one per prompt.
    ///
    /// With `use_sudo` and a configured credential, each command runs through
    /// `sudo` and credential prompts are answered. Without a credential the
    /// commands run unprivileged.
    pub async fn run_commands_in_shell<I>(&self, commands: I, use_sudo: bool) -> Result<String>
    where
        I: IntoIterator,
        I::Item: Into<ShellCommand>,
    {
        let credential = if use_sudo { self.credential() } else { None };
        if use_sudo && credential.is_none() {
            tracing::warn!(
                "sudo requested but no sudo password is configured, using a plain shell"
            );
        }

        let commands: Vec<ShellCommand> = commands
            .into_iter()
            .map(Into::into)
            .map(|command| {
                if credential.is_some() {
                    privileged(command)
                } else {
                    command
                }
            })
            .collect();

        let stream = self.request_shell(None).await?;
        shell::run_commands(PromptStream::new(stream), commands, credential.as_deref()).await
    }

    pub async fn exec_command(
        &self,
        command: &str,
        options: &ExecCommandOptions,
    ) -> Result<ExecResult> {
        let transport = self.transport()?;
        let credential = self.credential();
        exec::exec_command(transport.as_ref(), command, options, credential.as_deref()).await
    }

    pub async fn exec<I>(&self, command: &str, args: I, options: &ExecOptions) -> Result<ExecOutput>
    where
        I: IntoIterator,
        I::Item: AsRef<str>,
    {
        let transport = self.transport()?;
        let credential = self.credential();
        exec::exec(transport.as_ref(), command, args, options, credential.as_deref()).await
    }

    /// Create `path` and any missing parents.
    pub async fn mkdir(&self, path: &str, mode: MkdirMode) -> Result<()> {
        validate_remote_path(path)?;
        match mode {
            MkdirMode::Exec => {
                let command = format!("mkdir -p {}", exec::escape(path));
                let result = self
                    .exec_command(&command, &ExecCommandOptions::default())
                    .await?;
                if !result.stderr.is_empty() {
                    return Err(Error::CommandFailure(result.stderr));
                }
                Ok(())
            }
            MkdirMode::Sftp => {
                self.with_sftp(|sftp| async move { transfer::mkdir(sftp.as_ref(), path).await })
                    .await
            }
        }
    }

    /// Download `remote` to `local`.
    pub async fn get_file(&self, local: &Path, remote: &str) -> Result<()> {
        validate_remote_path(remote)?;
        self.with_sftp(|sftp| async move { transfer::get_file(sftp.as_ref(), remote, local).await })
            .await
    }

    /// Upload `local` to `remote`, creating a missing remote parent.
    pub async fn put_file(&self, local: &Path, remote: &str) -> Result<()> {
        validate_remote_path(remote)?;
        self.with_sftp(|sftp| async move { transfer::put_file(sftp.as_ref(), local, remote).await })
            .await
    }

    pub async fn put_files(&self, files: &[FilePair], options: PutFilesOptions) -> Result<()> {
        let transport = self.transport()?;
        transfer::put_files(transport.as_ref(), files, options).await
    }

    pub async fn put_directory(
        &self,
        local_root: &Path,
        remote_root: &str,
        options: PutDirectoryOptions,
    ) -> Result<bool> {
        let transport = self.transport()?;
        transfer::put_directory(transport.as_ref(), local_root, remote_root, options).await
    }

    pub async fn get_directory(
        &self,
        remote_root: &str,
        local_root: &Path,
        options: GetDirectoryOptions,
    ) -> Result<bool> {
        let transport = self.transport()?;
        transfer::get_directory(transport.as_ref(), remote_root, local_root, options).await
    }
}

/// Route a shell command through `sudo` unless it already is.
fn privileged(command: ShellCommand) -> ShellCommand {
    let trimmed = command.cmd.trim_start();
    if trimmed == "sudo" || trimmed.starts_with("sudo ") {
        return command;
    }
    ShellCommand {
        cmd: format!("sudo {}", command.cmd),
        output: command.output,
    }
}

fn label_for(config: &ConnectConfig) -> String {
    format!("{}@{}:{}", config.username, config.host, config.port)
}

async fn open_transport(config: &ConnectConfig) -> Result<(Client, Option<SudoPassword>)> {
    config.validate()?;
    let credential = config.sudo_credential()?;

    tracing::debug!(target_host = %label_for(config), "connecting");
    let client = Client::connect(
        &config.host,
        config.port,
        &config.username,
        &config.auth_methods(),
        config.server_check(),
        config.russh_config(),
        config.connect_timeout(),
    )
    .await?;
    Ok((client, credential))
}

/// Key under which [`SessionRegistry`] shares connections.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SessionKey {
    pub host: String,
    pub port: u16,
    pub username: String,
}

impl From<&ConnectConfig> for SessionKey {
    fn from(config: &ConnectConfig) -> Self {
        Self {
            host: config.host.clone(),
            port: config.port,
            username: config.username.clone(),
        }
    }
}

/// Shares one [`Session`] per `(host, port, username)` among logical clients.
#[derive(Default)]
pub struct SessionRegistry {
    sessions: tokio::sync::Mutex<HashMap<SessionKey, Session>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Acquire the live session for `config`'s target, connecting if needed.
    pub async fn get_or_connect(&self, config: &ConnectConfig) -> Result<Session> {
        let key = SessionKey::from(config);
        let mut sessions = self.sessions.lock().await;

        if let Some(session) = sessions.get(&key) {
            if session.is_connected() {
                return session.acquire();
            }
        }

        let session = Session::connect(config).await?;
        sessions.insert(key, session.clone());
        Ok(session)
    }

    /// Register an existing session under `key`.
    pub async fn insert(&self, key: SessionKey, session: Session) {
        self.sessions.lock().await.insert(key, session);
    }

    /// Release one reference; the entry is dropped once the session closes.
    pub async fn release(&self, key: &SessionKey) -> Result<()> {
        let mut sessions = self.sessions.lock().await;
        let session = sessions.get(key).cloned().ok_or(Error::NotConnected)?;
        let result = session.release().await;
        if session.ref_count() == 0 {
            sessions.remove(key);
        }
        result
    }

    pub async fn len(&self) -> usize {
        self.sessions.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.sessions.lock().await.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_privileged_prefix() {
        assert_eq!(privileged("ls /root".into()).cmd, "sudo ls /root");
        assert_eq!(privileged("sudo ls".into()).cmd, "sudo ls");
        let captured = privileged(ShellCommand::captured("id -u"));
        assert_eq!(captured.cmd, "sudo id -u");
        assert!(captured.output);
    }

    #[test]
    fn test_session_key_from_config() {
        let config = ConnectConfig::new("example.com", "deploy").with_port(2222);
        let key = SessionKey::from(&config);
        assert_eq!(key.host, "example.com");
        assert_eq!(key.port, 2222);
        assert_eq!(key.username, "deploy");
    }
}
