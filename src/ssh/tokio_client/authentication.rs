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

//! SSH authentication methods and server verification.
//!
//! Supported methods:
//! - Password authentication
//! - Private key authentication (in-memory key data or key file)
//! - SSH agent authentication
//! - Keyboard-interactive authentication answered with the password
//!
//! Server verification is selected with [`ServerCheckMethod`].

use russh::client::{Handle, Handler, KeyboardInteractiveAuthResponse};
use russh::keys::PrivateKeyWithHashAlg;
use std::path::PathBuf;
use std::sync::Arc;
use zeroize::Zeroizing;

use crate::error::{Error, Result};

/// An authentication token used when connecting a [`super::Client`].
#[derive(Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum AuthMethod {
    Password(Zeroizing<String>),
    PrivateKey {
        /// entire contents of private key file
        key_data: Zeroizing<String>,
        key_pass: Option<Zeroizing<String>>,
    },
    PrivateKeyFile {
        key_file_path: PathBuf,
        key_pass: Option<Zeroizing<String>>,
    },
    #[cfg(not(target_os = "windows"))]
    Agent,
    /// Answer every keyboard-interactive prompt with this password.
    KeyboardInteractive(Zeroizing<String>),
}

impl AuthMethod {
    pub fn with_password(password: &str) -> Self {
        Self::Password(Zeroizing::new(password.to_string()))
    }

    pub fn with_key(key: &str, passphrase: Option<&str>) -> Self {
        Self::PrivateKey {
            key_data: Zeroizing::new(key.to_string()),
            key_pass: passphrase.map(|p| Zeroizing::new(p.to_string())),
        }
    }

    pub fn with_key_file<T: AsRef<std::path::Path>>(
        key_file_path: T,
        passphrase: Option<&str>,
    ) -> Self {
        Self::PrivateKeyFile {
            key_file_path: key_file_path.as_ref().to_path_buf(),
            key_pass: passphrase.map(|p| Zeroizing::new(p.to_string())),
        }
    }

    /// Authenticate with every identity held by the agent at `SSH_AUTH_SOCK`.
    #[cfg(not(target_os = "windows"))]
    pub fn with_agent() -> Self {
        Self::Agent
    }

    pub fn with_keyboard_interactive(password: &str) -> Self {
        Self::KeyboardInteractive(Zeroizing::new(password.to_string()))
    }

    fn name(&self) -> &'static str {
        match self {
            AuthMethod::Password(_) => "password",
            AuthMethod::PrivateKey { .. } => "private key",
            AuthMethod::PrivateKeyFile { .. } => "private key file",
            #[cfg(not(target_os = "windows"))]
            AuthMethod::Agent => "agent",
            AuthMethod::KeyboardInteractive(_) => "keyboard-interactive",
        }
    }
}

/// Server host key verification methods.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum ServerCheckMethod {
    /// Accept any host key (testing only)
    NoCheck,
    /// Verify against a base64 encoded public key
    PublicKey(String),
    /// Use the default known_hosts file (~/.ssh/known_hosts)
    DefaultKnownHostsFile,
    /// Use a specific known_hosts file
    KnownHostsFile(PathBuf),
}

fn auth_failed(method: &AuthMethod, detail: impl std::fmt::Display) -> Error {
    Error::AuthenticationFailed(format!("{} authentication: {detail}", method.name()))
}

/// Run `methods` in order until one is accepted by the server.
pub(super) async fn authenticate<H: Handler>(
    handle: &mut Handle<H>,
    username: &str,
    methods: &[AuthMethod],
) -> Result<()> {
    if methods.is_empty() {
        return Err(Error::InvalidArgument(
            "no authentication method configured".to_string(),
        ));
    }

    let mut last_error = None;
    for method in methods {
        match authenticate_one(handle, username, method).await {
            Ok(()) => {
                tracing::debug!(method = method.name(), "authenticated");
                return Ok(());
            }
            Err(e) => {
                tracing::debug!(
                    method = method.name(),
                    error = %e,
                    "authentication attempt failed"
                );
                last_error = Some(e);
            }
        }
    }

    Err(last_error.unwrap_or_else(|| Error::AuthenticationFailed("no method succeeded".into())))
}

async fn authenticate_one<H: Handler>(
    handle: &mut Handle<H>,
    username: &str,
    method: &AuthMethod,
) -> Result<()> {
    match method {
        AuthMethod::Password(password) => {
            let result = handle
                .authenticate_password(username, password.as_str())
                .await?;
            if !result.success() {
                return Err(auth_failed(method, "password rejected"));
            }
        }
        AuthMethod::PrivateKey { key_data, key_pass } => {
            let key = russh::keys::decode_secret_key(
                key_data,
                key_pass.as_ref().map(|p| p.as_str()),
            )
            .map_err(|e| auth_failed(method, e))?;
            publickey(handle, username, method, key).await?;
        }
        AuthMethod::PrivateKeyFile {
            key_file_path,
            key_pass,
        } => {
            let key = russh::keys::load_secret_key(
                key_file_path,
                key_pass.as_ref().map(|p| p.as_str()),
            )
            .map_err(|e| auth_failed(method, e))?;
            publickey(handle, username, method, key).await?;
        }
        #[cfg(not(target_os = "windows"))]
        AuthMethod::Agent => {
            let mut agent = russh::keys::agent::client::AgentClient::connect_env()
                .await
                .map_err(|e| auth_failed(method, e))?;
            let identities = agent
                .request_identities()
                .await
                .map_err(|e| auth_failed(method, e))?;
            if identities.is_empty() {
                return Err(auth_failed(method, "agent holds no identities"));
            }

            let mut accepted = false;
            for identity in identities {
                let hash = handle.best_supported_rsa_hash().await?.flatten();
                if let Ok(result) = handle
                    .authenticate_publickey_with(username, identity.clone(), hash, &mut agent)
                    .await
                {
                    if result.success() {
                        accepted = true;
                        break;
                    }
                }
            }
            if !accepted {
                return Err(auth_failed(method, "no agent identity accepted"));
            }
        }
        AuthMethod::KeyboardInteractive(password) => {
            let mut response = handle
                .authenticate_keyboard_interactive_start(username, None::<String>)
                .await?;
            loop {
                let prompts = match response {
                    KeyboardInteractiveAuthResponse::Success => break,
                    KeyboardInteractiveAuthResponse::Failure { .. } => {
                        return Err(auth_failed(method, "rejected"));
                    }
                    KeyboardInteractiveAuthResponse::InfoRequest { prompts, .. } => prompts,
                };
                let answers = prompts.iter().map(|_| password.to_string()).collect();
                response = handle
                    .authenticate_keyboard_interactive_respond(answers)
                    .await?;
            }
        }
    }
    Ok(())
}

async fn publickey<H: Handler>(
    handle: &mut Handle<H>,
    username: &str,
    method: &AuthMethod,
    key: russh::keys::PrivateKey,
) -> Result<()> {
    let hash = handle.best_supported_rsa_hash().await?.flatten();
    let result = handle
        .authenticate_publickey(username, PrivateKeyWithHashAlg::new(Arc::new(key), hash))
        .await?;
    if !result.success() {
        return Err(auth_failed(method, "key rejected"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_auth_method_constructors() {
        let auth = AuthMethod::with_password("secret");
        assert!(matches!(auth, AuthMethod::Password(ref p) if p.as_str() == "secret"));

        let auth = AuthMethod::with_key_file("/tmp/id_ed25519", Some("pass"));
        match auth {
            AuthMethod::PrivateKeyFile {
                key_file_path,
                key_pass,
            } => {
                assert_eq!(key_file_path, PathBuf::from("/tmp/id_ed25519"));
                assert_eq!(key_pass.as_deref().map(|s| s.as_str()), Some("pass"));
            }
            other => panic!("unexpected method: {other:?}"),
        }
    }

    #[test]
    fn test_auth_failed_names_method() {
        let err = auth_failed(&AuthMethod::with_keyboard_interactive("x"), "rejected");
        assert_eq!(
            err.to_string(),
            "Authentication failed: keyboard-interactive authentication: rejected"
        );
    }
}
