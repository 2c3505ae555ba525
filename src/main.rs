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

use anyhow::{Context, Result};
use clap::Parser;
use std::path::Path;
use std::sync::Arc;

use ssh_session::{
    cli::{parse_target, Cli, Commands, ConnectionArgs, TreeArgs},
    config::{current_username, ConfigFile, ConnectConfig, HostKeyCheck},
    exec::ExecCommandOptions,
    ssh::{ChannelOptions, PtyOptions},
    transfer::{GetDirectoryOptions, PathFilter, PutDirectoryOptions},
    utils::{format_bytes, init_logging, total_size},
    Error, MkdirMode, Session, ShellCommand,
};

/// Build the connection configuration from a profile or a target, with
/// command-line options taking precedence.
async fn resolve_config(args: &ConnectionArgs) -> Result<ConnectConfig> {
    let mut config = match (&args.profile, &args.target) {
        (Some(profile), _) => {
            let file = match &args.config {
                Some(path) => ConfigFile::load(path).await?,
                None => ConfigFile::load_default().await?,
            };
            file.profile(profile)
                .cloned()
                .with_context(|| format!("Profile '{profile}' not found in configuration"))?
        }
        (None, Some(target)) => {
            let target = parse_target(target)?;
            let mut config = ConnectConfig::new(
                target.host,
                target.user.unwrap_or_else(current_username),
            );
            if let Some(port) = target.port {
                config.port = port;
            }
            config
        }
        (None, None) => anyhow::bail!("Either --target or --profile is required"),
    };

    if let Some(identity) = &args.identity {
        config.private_key = None;
        config.private_key_path = Some(identity.clone());
    }
    if let Some(passphrase) = &args.passphrase {
        config.passphrase = Some(passphrase.clone());
    }
    if let Some(password) = &args.password {
        config.password = Some(password.clone());
    }
    if args.use_agent {
        config.agent = true;
    }
    if args.accept_unknown_hosts {
        config.host_key_check = HostKeyCheck::AcceptAll;
    } else if let Some(known_hosts) = &args.known_hosts {
        config.host_key_check = HostKeyCheck::KnownHosts(known_hosts.clone());
    }
    if let Some(timeout) = args.connect_timeout {
        config.connect_timeout_secs = Some(timeout);
    }

    Ok(config)
}

fn tree_filter(tree: &TreeArgs) -> PathFilter {
    if tree.include_hidden {
        Arc::new(|_: &Path| true)
    } else {
        ssh_session::transfer::default_filter()
    }
}

fn print_tick(local: &Path, remote: &str, error: Option<&Error>) {
    match error {
        None => println!("  ok    {} -> {remote}", local.display()),
        Some(e) => eprintln!("  FAIL  {} -> {remote}: {e}", local.display()),
    }
}

/// Run one subcommand; the returned code becomes the process exit status.
async fn run(session: &Session, command: Commands) -> Result<i32> {
    match command {
        Commands::Exec {
            cwd,
            sudo,
            stdin_file,
            pty,
            command,
        } => {
            let stdin = match stdin_file {
                Some(path) => Some(
                    tokio::fs::read(&path)
                        .await
                        .with_context(|| format!("Failed to read stdin file {}", path.display()))?,
                ),
                None => None,
            };
            let options = ExecCommandOptions {
                cwd,
                stdin,
                use_sudo: sudo,
                exec_options: ChannelOptions {
                    pty: pty.then(PtyOptions::default),
                    ..Default::default()
                },
                ..Default::default()
            };

            let result = session.exec_command(&command.join(" "), &options).await?;
            if !result.stdout.is_empty() {
                println!("{}", result.stdout);
            }
            if !result.stderr.is_empty() {
                eprintln!("{}", result.stderr);
            }
            if let Some(signal) = &result.signal {
                eprintln!("Remote command terminated by signal {signal}");
                return Ok(1);
            }
            Ok(result.code.map_or(1, |code| code as i32))
        }

        Commands::Shell { sudo, commands } => {
            let commands: Vec<ShellCommand> =
                commands.into_iter().map(ShellCommand::captured).collect();
            let output = session.run_commands_in_shell(commands, sudo).await?;
            if !output.is_empty() {
                println!("{output}");
            }
            Ok(0)
        }

        Commands::Mkdir { exec, path } => {
            let mode = if exec { MkdirMode::Exec } else { MkdirMode::Sftp };
            session.mkdir(&path, mode).await?;
            Ok(0)
        }

        Commands::Get { remote, local } => {
            session.get_file(&local, &remote).await?;
            println!("Downloaded {remote} -> {}", local.display());
            Ok(0)
        }

        Commands::Put { local, remote } => {
            session.put_file(&local, &remote).await?;
            println!(
                "Uploaded {} ({}) -> {remote}",
                local.display(),
                format_bytes(total_size([local.as_path()]))
            );
            Ok(0)
        }

        Commands::PutDir {
            tree,
            local,
            remote,
        } => {
            let options = PutDirectoryOptions {
                recursive: !tree.no_recursive,
                concurrency: tree.concurrency,
                validate: tree_filter(&tree),
                tick: Arc::new(print_tick),
                sftp: None,
            };
            let all_ok = session.put_directory(&local, &remote, options).await?;
            Ok(if all_ok { 0 } else { 1 })
        }

        Commands::GetDir {
            tree,
            remote,
            local,
        } => {
            let options = GetDirectoryOptions {
                recursive: !tree.no_recursive,
                concurrency: tree.concurrency,
                validate: tree_filter(&tree),
                tick: Arc::new(print_tick),
                sftp: None,
            };
            let all_ok = session.get_directory(&remote, &local, options).await?;
            Ok(if all_ok { 0 } else { 1 })
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let config = resolve_config(&cli.connection).await?;
    let session = Session::connect(&config)
        .await
        .with_context(|| {
            format!(
                "Failed to connect to {}@{}:{}",
                config.username, config.host, config.port
            )
        })?;

    let outcome = run(&session, cli.command).await;
    if let Err(e) = session.release().await {
        tracing::debug!("error while disconnecting: {e}");
    }

    let code = outcome?;
    if code != 0 {
        std::process::exit(code);
    }
    Ok(())
}
