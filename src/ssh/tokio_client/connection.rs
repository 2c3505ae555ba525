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

//! SSH connection establishment.
//!
//! Resolves the target, tries each resolved address until one completes the
//! handshake, then authenticates on that connection.

use russh::client::{Config, Handle, Handler};
use std::fmt::Debug;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use super::authentication::{AuthMethod, ServerCheckMethod};
use crate::error::{Error, Result};

/// An authenticated ssh connection to a remote server.
///
/// `Client` implements [`crate::ssh::Transport`], which is how the session
/// layer opens exec, shell and SFTP channels on it.
#[derive(Clone)]
pub struct Client {
    pub(super) connection_handle: Arc<Handle<ClientHandler>>,
    pub(super) username: String,
    pub(super) address: SocketAddr,
}

impl Client {
    /// Open a ssh connection to `host:port` and authenticate as `username`.
    ///
    /// Every address `host` resolves to is tried in order; authentication
    /// runs on the first connection that completes the handshake.
    pub async fn connect(
        host: &str,
        port: u16,
        username: &str,
        auth: &[AuthMethod],
        server_check: ServerCheckMethod,
        config: Config,
        connect_timeout: Option<Duration>,
    ) -> Result<Self> {
        let config = Arc::new(config);

        let socket_addrs: Vec<SocketAddr> = tokio::net::lookup_host((host, port))
            .await?
            .collect();
        if socket_addrs.is_empty() {
            return Err(Error::InvalidArgument(format!(
                "{host}:{port} did not resolve to any address"
            )));
        }

        let mut connect_res = Err(Error::ChannelFailure(format!(
            "could not connect to {host}:{port}"
        )));
        for socket_addr in socket_addrs {
            let handler = ClientHandler::new(host.to_string(), socket_addr, server_check.clone());
            let attempt = russh::client::connect(config.clone(), socket_addr, handler);
            let result = match connect_timeout {
                Some(limit) => match tokio::time::timeout(limit, attempt).await {
                    Ok(result) => result,
                    Err(_) => Err(Error::ChannelFailure(format!(
                        "connection to {socket_addr} timed out after {}s",
                        limit.as_secs()
                    ))),
                },
                None => attempt.await,
            };
            match result {
                Ok(handle) => {
                    connect_res = Ok((socket_addr, handle));
                    break;
                }
                Err(e) => {
                    tracing::debug!(
                        address = %socket_addr,
                        error = %e,
                        "connection attempt failed"
                    );
                    connect_res = Err(e);
                }
            }
        }
        let (address, mut handle) = connect_res?;

        super::authentication::authenticate(&mut handle, username, auth).await?;
        tracing::debug!(%address, username, "ssh connection established");

        Ok(Self {
            connection_handle: Arc::new(handle),
            username: username.to_string(),
            address,
        })
    }

    pub fn username(&self) -> &str {
        &self.username
    }

    pub fn address(&self) -> &SocketAddr {
        &self.address
    }
}

impl Debug for Client {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Client")
            .field("username", &self.username)
            .field("address", &self.address)
            .field("connection_handle", &"Handle<ClientHandler>")
            .finish()
    }
}

/// SSH client handler performing server key verification.
#[derive(Debug, Clone)]
pub struct ClientHandler {
    hostname: String,
    host: SocketAddr,
    server_check: ServerCheckMethod,
}

impl ClientHandler {
    pub fn new(hostname: String, host: SocketAddr, server_check: ServerCheckMethod) -> Self {
        Self {
            hostname,
            host,
            server_check,
        }
    }
}

impl Handler for ClientHandler {
    type Error = Error;

    async fn check_server_key(
        &mut self,
        server_public_key: &russh::keys::PublicKey,
    ) -> std::result::Result<bool, Self::Error> {
        let accepted = match &self.server_check {
            ServerCheckMethod::NoCheck => true,
            ServerCheckMethod::PublicKey(key) => {
                let pk = russh::keys::parse_public_key_base64(key)
                    .map_err(|_| Error::ServerCheckFailed)?;
                pk == *server_public_key
            }
            ServerCheckMethod::KnownHostsFile(known_hosts_path) => {
                russh::keys::check_known_hosts_path(
                    &self.hostname,
                    self.host.port(),
                    server_public_key,
                    known_hosts_path,
                )
                .map_err(|_| Error::ServerCheckFailed)?
            }
            ServerCheckMethod::DefaultKnownHostsFile => russh::keys::check_known_hosts(
                &self.hostname,
                self.host.port(),
                server_public_key,
            )
            .map_err(|_| Error::ServerCheckFailed)?,
        };

        if !accepted {
            tracing::warn!(host = %self.hostname, "server host key rejected");
        }
        Ok(accepted)
    }
}
