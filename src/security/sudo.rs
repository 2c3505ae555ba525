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

//! Privileged-mode credential with automatic memory clearing.
//!
//! # Security Considerations
//! - The credential is cleared from memory when dropped
//! - `Debug` output never reveals it
//! - Environment variable usage is discouraged; it is supported for automation

use secrecy::{ExposeSecret, SecretString};
use std::fmt;
use zeroize::Zeroizing;

use crate::error::{Error, Result};

/// Environment variable consulted by [`SudoPassword::from_env`].
pub const SUDO_PASSWORD_ENV: &str = "SSH_SESSION_SUDO_PASSWORD";

/// Credential written to the remote side when a privilege-elevation prompt
/// is detected.
#[derive(Clone)]
pub struct SudoPassword {
    inner: SecretString,
}

impl SudoPassword {
    /// Wrap `password`. Empty passwords are rejected.
    pub fn new(password: String) -> Result<Self> {
        if password.is_empty() {
            return Err(Error::InvalidArgument(
                "sudo password cannot be empty".to_string(),
            ));
        }
        Ok(Self {
            inner: SecretString::new(password.into_boxed_str()),
        })
    }

    /// Read the credential from `SSH_SESSION_SUDO_PASSWORD`.
    ///
    /// Returns `Ok(None)` when the variable is unset and an error when it is
    /// set but empty.
    pub fn from_env() -> Result<Option<Self>> {
        match std::env::var(SUDO_PASSWORD_ENV) {
            Ok(password) if !password.is_empty() => Ok(Some(Self::new(password)?)),
            Ok(_) => Err(Error::InvalidArgument(format!(
                "{SUDO_PASSWORD_ENV} is set but empty"
            ))),
            Err(_) => Ok(None),
        }
    }

    /// The credential followed by a line terminator, as typed into a prompt.
    ///
    /// The copy is zeroized when dropped.
    pub fn with_newline(&self) -> Zeroizing<Vec<u8>> {
        let mut bytes = self.inner.expose_secret().as_bytes().to_vec();
        bytes.push(b'\n');
        Zeroizing::new(bytes)
    }

    pub fn as_bytes(&self) -> &[u8] {
        self.inner.expose_secret().as_bytes()
    }
}

impl fmt::Debug for SudoPassword {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SudoPassword")
            .field("password", &"[REDACTED]")
            .finish()
    }
}
