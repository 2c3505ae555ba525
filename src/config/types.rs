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

//! Configuration type definitions.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;

use super::utils::current_username;

pub const DEFAULT_PORT: u16 = 22;

fn default_port() -> u16 {
    DEFAULT_PORT
}

/// How the server's host key is verified.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HostKeyCheck {
    /// Accept any host key.
    AcceptAll,
    /// Check against `~/.ssh/known_hosts`.
    #[default]
    DefaultKnownHosts,
    /// Check against the given known_hosts file.
    KnownHosts(PathBuf),
    /// Expect exactly this base64-encoded public key.
    PublicKey(String),
}

/// Everything needed to open and authenticate one connection.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectConfig {
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    #[serde(default = "current_username")]
    pub username: String,

    #[serde(default)]
    pub password: Option<String>,

    /// Private key contents (PEM/OpenSSH format).
    #[serde(default)]
    pub private_key: Option<String>,

    #[serde(default)]
    pub private_key_path: Option<PathBuf>,

    /// Passphrase for `private_key` or `private_key_path`.
    #[serde(default)]
    pub passphrase: Option<String>,

    /// Authenticate through the agent at `SSH_AUTH_SOCK`.
    #[serde(default)]
    pub agent: bool,

    /// Credential answered to privilege-elevation prompts.
    #[serde(default)]
    pub sudo_password: Option<String>,

    #[serde(default)]
    pub host_key_check: HostKeyCheck,

    /// Keepalive interval in seconds. Unset disables keepalives.
    #[serde(default)]
    pub keepalive_interval_secs: Option<u64>,

    #[serde(default)]
    pub connect_timeout_secs: Option<u64>,
}

impl ConnectConfig {
    pub fn new(host: impl Into<String>, username: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            port: DEFAULT_PORT,
            username: username.into(),
            password: None,
            private_key: None,
            private_key_path: None,
            passphrase: None,
            agent: false,
            sudo_password: None,
            host_key_check: HostKeyCheck::default(),
            keepalive_interval_secs: None,
            connect_timeout_secs: None,
        }
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    pub fn with_password(mut self, password: impl Into<String>) -> Self {
        self.password = Some(password.into());
        self
    }

    pub fn with_private_key_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.private_key_path = Some(path.into());
        self
    }

    pub fn with_agent(mut self, agent: bool) -> Self {
        self.agent = agent;
        self
    }

    pub fn with_sudo_password(mut self, password: impl Into<String>) -> Self {
        self.sudo_password = Some(password.into());
        self
    }

    pub fn with_host_key_check(mut self, check: HostKeyCheck) -> Self {
        self.host_key_check = check;
        self
    }
}

fn redact(value: &Option<String>) -> Option<&'static str> {
    value.as_ref().map(|_| "[REDACTED]")
}

impl fmt::Debug for ConnectConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("username", &self.username)
            .field("password", &redact(&self.password))
            .field("private_key", &redact(&self.private_key))
            .field("private_key_path", &self.private_key_path)
            .field("passphrase", &redact(&self.passphrase))
            .field("agent", &self.agent)
            .field("sudo_password", &redact(&self.sudo_password))
            .field("host_key_check", &self.host_key_check)
            .field("keepalive_interval_secs", &self.keepalive_interval_secs)
            .field("connect_timeout_secs", &self.connect_timeout_secs)
            .finish()
    }
}

/// Named connection profiles.
///
/// ```yaml
/// profiles:
///   web:
///     host: web1.example.com
///     username: deploy
///     private_key_path: ~/.ssh/id_ed25519
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConfigFile {
    #[serde(default)]
    pub profiles: BTreeMap<String, ConnectConfig>,
}
