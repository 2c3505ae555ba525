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

//! Configuration loading, validation and conversion to connection parameters.

use anyhow::Context;
use directories::ProjectDirs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::fs;

use super::types::{ConfigFile, ConnectConfig, HostKeyCheck};
use super::utils::expand_tilde;
use crate::error::{Error, Result};
use crate::security::{validate_hostname, validate_username, SudoPassword};
use crate::ssh::tokio_client::{AuthMethod, ServerCheckMethod};

impl ConfigFile {
    /// Load profiles from a YAML file. A missing file is an empty config.
    pub async fn load(path: &Path) -> anyhow::Result<Self> {
        let expanded_path = expand_tilde(path);

        if !expanded_path.exists() {
            tracing::debug!(
                "Config file not found at {:?}, using defaults",
                expanded_path
            );
            return Ok(Self::default());
        }

        let content = fs::read_to_string(&expanded_path)
            .await
            .with_context(|| {
                format!(
                    "Failed to read configuration file at {}",
                    expanded_path.display()
                )
            })?;

        let config: ConfigFile = serde_yaml::from_str(&content).with_context(|| {
            format!(
                "Failed to parse YAML configuration file at {}",
                expanded_path.display()
            )
        })?;

        Ok(config)
    }

    /// `~/.config/ssh-session/config.yaml` on Linux, the platform equivalent
    /// elsewhere.
    pub fn default_path() -> Option<PathBuf> {
        ProjectDirs::from("", "", "ssh-session").map(|dirs| dirs.config_dir().join("config.yaml"))
    }

    pub async fn load_default() -> anyhow::Result<Self> {
        match Self::default_path() {
            Some(path) => Self::load(&path).await,
            None => Ok(Self::default()),
        }
    }

    pub fn profile(&self, name: &str) -> Option<&ConnectConfig> {
        self.profiles.get(name)
    }

    /// Write the profiles back as YAML, creating parent directories.
    pub async fn save(&self, path: &Path) -> anyhow::Result<()> {
        let expanded_path = expand_tilde(path);

        if let Some(parent) = expanded_path.parent() {
            fs::create_dir_all(parent)
                .await
                .with_context(|| format!("Failed to create directory {parent:?}"))?;
        }

        let yaml =
            serde_yaml::to_string(self).context("Failed to serialize configuration to YAML")?;

        fs::write(&expanded_path, yaml)
            .await
            .with_context(|| format!("Failed to write configuration to {expanded_path:?}"))?;

        Ok(())
    }
}

#[cfg(not(target_os = "windows"))]
fn agent_method(enabled: bool) -> Option<AuthMethod> {
    enabled.then(AuthMethod::with_agent)
}

#[cfg(target_os = "windows")]
fn agent_method(_enabled: bool) -> Option<AuthMethod> {
    None
}

impl ConnectConfig {
    /// Check the configuration before any network I/O.
    pub fn validate(&self) -> Result<()> {
        validate_hostname(&self.host)?;
        validate_username(&self.username)?;
        if self.port == 0 {
            return Err(Error::InvalidArgument("port must be non-zero".to_string()));
        }
        if self.private_key.is_some() && self.private_key_path.is_some() {
            return Err(Error::InvalidArgument(
                "private_key and private_key_path are mutually exclusive".to_string(),
            ));
        }
        if let Some(path) = &self.private_key_path {
            let expanded = expand_tilde(path);
            if !expanded.is_file() {
                return Err(Error::InvalidArgument(format!(
                    "private key file does not exist: {}",
                    expanded.display()
                )));
            }
        }
        if matches!(self.sudo_password.as_deref(), Some("")) {
            return Err(Error::InvalidArgument(
                "sudo_password cannot be empty".to_string(),
            ));
        }
        if self.auth_methods().is_empty() {
            return Err(Error::InvalidArgument(
                "no authentication method configured (password, private key or agent)".to_string(),
            ));
        }
        Ok(())
    }

    /// Authentication methods in the order they are tried.
    pub fn auth_methods(&self) -> Vec<AuthMethod> {
        let passphrase = self.passphrase.as_deref();
        let mut methods = Vec::new();

        if let Some(key) = &self.private_key {
            methods.push(AuthMethod::with_key(key, passphrase));
        }
        if let Some(path) = &self.private_key_path {
            methods.push(AuthMethod::with_key_file(expand_tilde(path), passphrase));
        }
        methods.extend(agent_method(self.agent));
        if let Some(password) = &self.password {
            methods.push(AuthMethod::with_password(password));
            methods.push(AuthMethod::with_keyboard_interactive(password));
        }
        methods
    }

    pub fn server_check(&self) -> ServerCheckMethod {
        match &self.host_key_check {
            HostKeyCheck::AcceptAll => ServerCheckMethod::NoCheck,
            HostKeyCheck::DefaultKnownHosts => ServerCheckMethod::DefaultKnownHostsFile,
            HostKeyCheck::KnownHosts(path) => ServerCheckMethod::KnownHostsFile(expand_tilde(path)),
            HostKeyCheck::PublicKey(key) => ServerCheckMethod::PublicKey(key.clone()),
        }
    }

    /// russh client settings derived from this configuration.
    pub fn russh_config(&self) -> russh::client::Config {
        russh::client::Config {
            keepalive_interval: self
                .keepalive_interval_secs
                .filter(|secs| *secs > 0)
                .map(Duration::from_secs),
            ..Default::default()
        }
    }

    pub fn connect_timeout(&self) -> Option<Duration> {
        self.connect_timeout_secs
            .filter(|secs| *secs > 0)
            .map(Duration::from_secs)
    }

    /// The privileged-mode credential: from the config, else from
    /// `SSH_SESSION_SUDO_PASSWORD`.
    pub fn sudo_credential(&self) -> Result<Option<SudoPassword>> {
        match &self.sudo_password {
            Some(password) => Ok(Some(SudoPassword::new(password.clone())?)),
            None => SudoPassword::from_env(),
        }
    }
}
