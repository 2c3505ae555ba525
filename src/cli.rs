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

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(
    name = "ssh-session",
    version,
    about = "Run commands, prompt-driven shells and resilient SFTP transfers on one SSH host",
    after_help = "EXAMPLES:\n  Run a command:              ssh-session -t deploy@web1 exec -- uname -a\n  Privileged shell session:   ssh-session -t deploy@web1 shell --sudo 'systemctl restart app'\n  Upload a directory:         ssh-session -p web put-dir ./dist /srv/app/current\n  Download a directory:       ssh-session -p web get-dir /var/log/app ./logs"
)]
pub struct Cli {
    #[command(flatten)]
    pub connection: ConnectionArgs,

    #[arg(
        short = 'v',
        long,
        action = clap::ArgAction::Count,
        global = true,
        help = "Increase verbosity (-v, -vv, -vvv)"
    )]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Args, Debug)]
pub struct ConnectionArgs {
    #[arg(
        short = 't',
        long,
        help = "Target in [user@]hostname[:port] format",
        conflicts_with = "profile"
    )]
    pub target: Option<String>,

    #[arg(short = 'p', long, help = "Profile name from the configuration file")]
    pub profile: Option<String>,

    #[arg(
        long,
        help = "Configuration file path [default: ~/.config/ssh-session/config.yaml]"
    )]
    pub config: Option<PathBuf>,

    #[arg(short = 'i', long, help = "SSH private key file path")]
    pub identity: Option<PathBuf>,

    #[arg(
        long,
        help = "Passphrase for the private key",
        env = "SSH_SESSION_KEY_PASSPHRASE",
        hide_env_values = true
    )]
    pub passphrase: Option<String>,

    #[arg(short = 'A', long, help = "Use SSH agent for authentication")]
    pub use_agent: bool,

    #[arg(
        long,
        help = "Password for authentication",
        env = "SSH_SESSION_PASSWORD",
        hide_env_values = true
    )]
    pub password: Option<String>,

    #[arg(long, help = "Accept any server host key")]
    pub accept_unknown_hosts: bool,

    #[arg(long, help = "known_hosts file to verify the server key against")]
    pub known_hosts: Option<PathBuf>,

    #[arg(long, help = "Connection timeout in seconds")]
    pub connect_timeout: Option<u64>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    #[command(about = "Execute a command on its own channel")]
    Exec {
        #[arg(long, help = "Remote working directory")]
        cwd: Option<String>,

        #[arg(long, help = "Run through sudo, answering with the configured sudo password")]
        sudo: bool,

        #[arg(long, help = "Local file streamed to the command's stdin")]
        stdin_file: Option<PathBuf>,

        #[arg(long, help = "Allocate a pseudo-terminal")]
        pty: bool,

        #[arg(required = true, trailing_var_arg = true, help = "Command and arguments")]
        command: Vec<String>,
    },

    #[command(about = "Run commands one by one in an interactive shell")]
    Shell {
        #[arg(long, help = "Run every command through sudo")]
        sudo: bool,

        #[arg(required = true, help = "Commands, dispatched in order; output of each is captured")]
        commands: Vec<String>,
    },

    #[command(about = "Create a remote directory and any missing parents")]
    Mkdir {
        #[arg(long, help = "Use `mkdir -p` instead of SFTP")]
        exec: bool,

        path: String,
    },

    #[command(about = "Download one file")]
    Get { remote: String, local: PathBuf },

    #[command(about = "Upload one file")]
    Put { local: PathBuf, remote: String },

    #[command(name = "put-dir", about = "Upload a directory tree")]
    PutDir {
        #[command(flatten)]
        tree: TreeArgs,

        local: PathBuf,
        remote: String,
    },

    #[command(name = "get-dir", about = "Download a directory tree")]
    GetDir {
        #[command(flatten)]
        tree: TreeArgs,

        remote: String,
        local: PathBuf,
    },
}

#[derive(Args, Debug)]
pub struct TreeArgs {
    #[arg(long, help = "Only transfer the top-level files")]
    pub no_recursive: bool,

    #[arg(long, help = "Include dot-prefixed files and directories")]
    pub include_hidden: bool,

    #[arg(short = 'c', long, default_value = "5", help = "Files transferred at once")]
    pub concurrency: usize,
}

/// A parsed `[user@]hostname[:port]` target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Target {
    pub user: Option<String>,
    pub host: String,
    pub port: Option<u16>,
}

/// Parse `[user@]hostname[:port]`; IPv6 literals go in brackets.
pub fn parse_target(target: &str) -> anyhow::Result<Target> {
    let (user, rest) = match target.rsplit_once('@') {
        Some((user, rest)) => (Some(user.to_string()), rest),
        None => (None, target),
    };

    let (host, port) = if let Some(stripped) = rest.strip_prefix('[') {
        let (host, after) = stripped
            .split_once(']')
            .ok_or_else(|| anyhow::anyhow!("Unterminated IPv6 literal in target: {target}"))?;
        let port = match after.strip_prefix(':') {
            Some(port) => Some(port.parse()?),
            None if after.is_empty() => None,
            None => anyhow::bail!("Invalid target: {target}"),
        };
        (host.to_string(), port)
    } else {
        match rest.split_once(':') {
            Some((host, port)) => (host.to_string(), Some(port.parse()?)),
            None => (rest.to_string(), None),
        }
    };

    if host.is_empty() {
        anyhow::bail!("Target has no hostname: {target}");
    }
    Ok(Target { user, host, port })
}
