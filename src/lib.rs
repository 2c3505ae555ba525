pub mod cli;
pub mod config;
pub mod error;
pub mod exec;
pub mod security;
pub mod session;
pub mod shell;
pub mod ssh;
pub mod transfer;
pub mod utils;

pub use config::{ConfigFile, ConnectConfig, HostKeyCheck};
pub use error::{Error, FilePair, Result};
pub use exec::{ExecCommandOptions, ExecOptions, ExecOutput, ExecResult, ExecStream};
pub use security::SudoPassword;
pub use session::{MkdirMode, Session, SessionKey, SessionRegistry};
pub use shell::ShellCommand;
pub use ssh::{PtyOptions, SftpChannel, Transport};
pub use transfer::{GetDirectoryOptions, PutDirectoryOptions, PutFilesOptions};
