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

//! Eager argument validation.
//!
//! Every check here runs before any network I/O and reports
//! [`Error::InvalidArgument`].

use crate::error::{Error, Result};

const MAX_HOSTNAME_LENGTH: usize = 253;
const MAX_USERNAME_LENGTH: usize = 32;
const MAX_PATH_LENGTH: usize = 4096;

fn invalid(message: impl Into<String>) -> Error {
    Error::InvalidArgument(message.into())
}

/// Validate a hostname or IP literal (RFC 1123 characters plus IPv6).
pub fn validate_hostname(hostname: &str) -> Result<()> {
    if hostname.is_empty() {
        return Err(invalid("host cannot be empty"));
    }
    if hostname.len() > MAX_HOSTNAME_LENGTH {
        return Err(invalid(format!(
            "host too long (max {MAX_HOSTNAME_LENGTH} characters)"
        )));
    }

    let valid_chars = hostname.chars().all(|c| {
        c.is_ascii_alphanumeric() || c == '.' || c == '-' || c == ':' || c == '[' || c == ']'
    });
    if !valid_chars {
        return Err(invalid(format!("host contains invalid characters: {hostname}")));
    }
    Ok(())
}

/// Validate a POSIX login name.
pub fn validate_username(username: &str) -> Result<()> {
    if username.is_empty() {
        return Err(invalid("username cannot be empty"));
    }
    if username.len() > MAX_USERNAME_LENGTH {
        return Err(invalid(format!(
            "username too long (max {MAX_USERNAME_LENGTH} characters)"
        )));
    }
    if username.starts_with('-') {
        return Err(invalid("username cannot start with a hyphen"));
    }

    let valid_chars = username
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-' || c == '.');
    if !valid_chars {
        return Err(invalid("username contains invalid characters"));
    }
    Ok(())
}

/// Validate a remote path argument.
///
/// Paths are passed to SFTP verbatim or shell-escaped for exec mode, so only
/// structurally unusable values are rejected.
pub fn validate_remote_path(path: &str) -> Result<()> {
    if path.is_empty() {
        return Err(invalid("remote path cannot be empty"));
    }
    if path.len() > MAX_PATH_LENGTH {
        return Err(invalid(format!(
            "remote path too long (max {MAX_PATH_LENGTH} characters)"
        )));
    }
    if path.contains('\0') {
        return Err(invalid("remote path contains a NUL byte"));
    }
    Ok(())
}
