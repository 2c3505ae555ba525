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

//! In-memory remote side for integration tests.
//!
//! [`FakeTransport`] hands out a shared [`FakeSftp`] backed by a tiny remote
//! filesystem, scripted exec channels and a scripted interactive shell.

#![allow(dead_code)]

use async_trait::async_trait;
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet, VecDeque};
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use ssh_session::error::{Error, Result};
use ssh_session::ssh::{
    ChannelOptions, PtyOptions, RemoteDirEntry, RemoteFileType, RemoteMetadata, RemoteStream,
    SftpChannel, StreamEvent, Transport,
};

pub const PROMPT: &str = "alice@web1:~$ ";

/// How the fake reports a missing parent directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MissingSignal {
    /// Classified error carrying the `ENOENT` code.
    Code,
    /// Unclassified channel failure whose message says "No such file".
    Message,
}

/// One recorded upload boundary, in the order it happened.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PutEvent {
    Start(String),
    End(String),
}

#[derive(Default)]
struct RemoteFs {
    dirs: BTreeSet<String>,
    files: BTreeMap<String, Vec<u8>>,
}

fn parent_of(path: &str) -> String {
    match path.trim_end_matches('/').rfind('/') {
        Some(0) => "/".to_string(),
        Some(idx) => path[..idx].to_string(),
        None => ".".to_string(),
    }
}

/// SFTP fake with a remote filesystem rooted at `/`.
pub struct FakeSftp {
    fs: Mutex<RemoteFs>,
    missing_signal: MissingSignal,
    put_delay: Mutex<Option<Duration>>,
    op_delay: Mutex<Option<Duration>>,
    failing_puts: Mutex<HashSet<String>>,
    failing_mkdirs: Mutex<HashSet<String>>,
    mkdir_calls: Mutex<Vec<String>>,
    created_dirs: Mutex<Vec<String>>,
    put_calls: Mutex<Vec<String>>,
    put_events: Mutex<Vec<PutEvent>>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
    end_calls: AtomicUsize,
}

impl FakeSftp {
    pub fn new() -> Self {
        Self::with_signal(MissingSignal::Code)
    }

    pub fn with_signal(missing_signal: MissingSignal) -> Self {
        let mut fs = RemoteFs::default();
        fs.dirs.insert("/".to_string());
        Self {
            fs: Mutex::new(fs),
            missing_signal,
            put_delay: Mutex::new(None),
            op_delay: Mutex::new(None),
            failing_puts: Mutex::new(HashSet::new()),
            failing_mkdirs: Mutex::new(HashSet::new()),
            mkdir_calls: Mutex::new(Vec::new()),
            created_dirs: Mutex::new(Vec::new()),
            put_calls: Mutex::new(Vec::new()),
            put_events: Mutex::new(Vec::new()),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
            end_calls: AtomicUsize::new(0),
        }
    }

    /// Create `path` and all its ancestors without recording calls.
    pub fn seed_dir(&self, path: &str) {
        let mut fs = self.fs.lock().unwrap();
        let mut current = String::new();
        for part in path.split('/').filter(|p| !p.is_empty()) {
            current = format!("{current}/{part}");
            fs.dirs.insert(current.clone());
        }
    }

    pub fn seed_file(&self, path: &str, contents: &[u8]) {
        self.seed_dir(&parent_of(path));
        self.fs
            .lock()
            .unwrap()
            .files
            .insert(path.to_string(), contents.to_vec());
    }

    pub fn set_put_delay(&self, delay: Duration) {
        *self.put_delay.lock().unwrap() = Some(delay);
    }

    /// Make `stat` and `mkdir` suspend like a round trip to a real server.
    pub fn set_op_delay(&self, delay: Duration) {
        *self.op_delay.lock().unwrap() = Some(delay);
    }

    async fn round_trip(&self) {
        let delay = *self.op_delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
    }

    pub fn fail_put(&self, remote: &str) {
        self.failing_puts.lock().unwrap().insert(remote.to_string());
    }

    pub fn fail_mkdir(&self, remote: &str) {
        self.failing_mkdirs.lock().unwrap().insert(remote.to_string());
    }

    pub fn has_dir(&self, path: &str) -> bool {
        self.fs.lock().unwrap().dirs.contains(path)
    }

    pub fn file(&self, path: &str) -> Option<Vec<u8>> {
        self.fs.lock().unwrap().files.get(path).cloned()
    }

    pub fn file_paths(&self) -> BTreeSet<String> {
        self.fs.lock().unwrap().files.keys().cloned().collect()
    }

    pub fn mkdir_calls(&self) -> Vec<String> {
        self.mkdir_calls.lock().unwrap().clone()
    }

    /// Directories actually created by `mkdir`, in creation order.
    pub fn created_dirs(&self) -> Vec<String> {
        self.created_dirs.lock().unwrap().clone()
    }

    pub fn put_calls(&self) -> Vec<String> {
        self.put_calls.lock().unwrap().clone()
    }

    pub fn put_events(&self) -> Vec<PutEvent> {
        self.put_events.lock().unwrap().clone()
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    pub fn end_calls(&self) -> usize {
        self.end_calls.load(Ordering::SeqCst)
    }

    fn missing(&self, path: &str) -> Error {
        match self.missing_signal {
            MissingSignal::Code => Error::remote(path, Some("ENOENT"), "failure"),
            MissingSignal::Message => {
                Error::ChannelFailure(format!("{path}: No such file or directory"))
            }
        }
    }
}

#[async_trait]
impl SftpChannel for FakeSftp {
    async fn stat(&self, path: &str) -> Result<RemoteMetadata> {
        self.round_trip().await;
        let fs = self.fs.lock().unwrap();
        if fs.dirs.contains(path) {
            return Ok(RemoteMetadata {
                file_type: RemoteFileType::Directory,
                size: None,
            });
        }
        if let Some(contents) = fs.files.get(path) {
            return Ok(RemoteMetadata {
                file_type: RemoteFileType::File,
                size: Some(contents.len() as u64),
            });
        }
        Err(self.missing(path))
    }

    async fn mkdir(&self, path: &str) -> Result<()> {
        self.mkdir_calls.lock().unwrap().push(path.to_string());
        self.round_trip().await;
        if self.failing_mkdirs.lock().unwrap().contains(path) {
            return Err(Error::ChannelFailure(format!("{path}: Permission denied")));
        }

        let mut fs = self.fs.lock().unwrap();
        if fs.dirs.contains(path) || fs.files.contains_key(path) {
            return Err(Error::ChannelFailure(format!("{path}: Failure")));
        }
        if !fs.dirs.contains(&parent_of(path)) {
            return Err(self.missing(path));
        }
        fs.dirs.insert(path.to_string());
        self.created_dirs.lock().unwrap().push(path.to_string());
        Ok(())
    }

    async fn read_dir(&self, path: &str) -> Result<Vec<RemoteDirEntry>> {
        let fs = self.fs.lock().unwrap();
        if !fs.dirs.contains(path) {
            return Err(self.missing(path));
        }

        let mut entries = Vec::new();
        for dir in fs.dirs.iter().filter(|d| *d != path && parent_of(d) == path) {
            entries.push(RemoteDirEntry {
                name: dir.rsplit('/').next().unwrap_or_default().to_string(),
                metadata: RemoteMetadata {
                    file_type: RemoteFileType::Directory,
                    size: None,
                },
            });
        }
        for (file, contents) in fs.files.iter().filter(|(f, _)| parent_of(f) == path) {
            entries.push(RemoteDirEntry {
                name: file.rsplit('/').next().unwrap_or_default().to_string(),
                metadata: RemoteMetadata {
                    file_type: RemoteFileType::File,
                    size: Some(contents.len() as u64),
                },
            });
        }
        // Listing order is not guaranteed by real servers.
        entries.reverse();
        Ok(entries)
    }

    async fn fast_get(&self, remote_path: &str, local_path: &Path) -> Result<()> {
        let contents = self
            .file(remote_path)
            .ok_or_else(|| self.missing(remote_path))?;
        tokio::fs::write(local_path, contents).await?;
        Ok(())
    }

    async fn fast_put(&self, local_path: &Path, remote_path: &str) -> Result<()> {
        self.put_calls.lock().unwrap().push(remote_path.to_string());
        self.put_events
            .lock()
            .unwrap()
            .push(PutEvent::Start(remote_path.to_string()));
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);

        let delay = *self.put_delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let result = self.store(local_path, remote_path).await;

        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        self.put_events
            .lock()
            .unwrap()
            .push(PutEvent::End(remote_path.to_string()));
        result
    }

    async fn end(&self) -> Result<()> {
        self.end_calls.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

impl FakeSftp {
    async fn store(&self, local_path: &Path, remote_path: &str) -> Result<()> {
        if self.failing_puts.lock().unwrap().contains(remote_path) {
            return Err(Error::ChannelFailure(format!(
                "{remote_path}: Permission denied"
            )));
        }
        let contents = tokio::fs::read(local_path).await?;

        let mut fs = self.fs.lock().unwrap();
        if !fs.dirs.contains(&parent_of(remote_path)) {
            return Err(self.missing(remote_path));
        }
        fs.files.insert(remote_path.to_string(), contents);
        Ok(())
    }
}

/// Scripted exec channel replaying fixed events.
pub struct FakeExec {
    events: VecDeque<StreamEvent>,
    writes: Arc<Mutex<Vec<Vec<u8>>>>,
    eof_sent: Arc<AtomicBool>,
}

#[async_trait]
impl RemoteStream for FakeExec {
    async fn recv(&mut self) -> Option<StreamEvent> {
        self.events.pop_front()
    }

    async fn write(&mut self, data: &[u8]) -> Result<()> {
        self.writes.lock().unwrap().push(data.to_vec());
        Ok(())
    }

    async fn send_eof(&mut self) -> Result<()> {
        self.eof_sent.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn close(&mut self) -> Result<()> {
        self.events.clear();
        Ok(())
    }
}

/// Interactive shell that prints [`PROMPT`] and answers written lines from a
/// response table.
///
/// Commands starting with `sudo ` first print a credential prompt and only
/// run once the expected password line is written.
pub struct FakeShell {
    pending: VecDeque<StreamEvent>,
    responses: HashMap<String, Vec<StreamEvent>>,
    sudo_password: Option<String>,
    awaiting_password: Option<String>,
    line: Vec<u8>,
    writes: Arc<Mutex<Vec<Vec<u8>>>>,
    closed: Arc<AtomicBool>,
}

impl FakeShell {
    fn run_line(&mut self, line: &str) {
        if let Some(command) = self.awaiting_password.take() {
            if Some(line) == self.sudo_password.as_deref() {
                self.pending.push_back(StreamEvent::Stdout(b"\r\n".to_vec()));
                self.respond(&command);
            } else {
                self.pending
                    .push_back(StreamEvent::Stderr(b"sudo: incorrect password\r\n".to_vec()));
                self.pending.push_back(StreamEvent::Stdout(PROMPT.as_bytes().to_vec()));
            }
            return;
        }

        if let Some(command) = line.strip_prefix("sudo ") {
            if self.sudo_password.is_some() {
                self.awaiting_password = Some(command.to_string());
                self.pending.push_back(StreamEvent::Stdout(
                    b"[sudo] password for alice: ".to_vec(),
                ));
                return;
            }
        }
        self.respond(line);
    }

    fn respond(&mut self, command: &str) {
        if let Some(events) = self.responses.get(command) {
            self.pending.extend(events.iter().cloned());
        }
        self.pending.push_back(StreamEvent::Stdout(PROMPT.as_bytes().to_vec()));
    }
}

#[async_trait]
impl RemoteStream for FakeShell {
    async fn recv(&mut self) -> Option<StreamEvent> {
        // Nothing scripted is left: behave like a closed channel.
        self.pending.pop_front()
    }

    async fn write(&mut self, data: &[u8]) -> Result<()> {
        self.writes.lock().unwrap().push(data.to_vec());
        for byte in data {
            if *byte == b'\n' {
                let line = String::from_utf8_lossy(&self.line).into_owned();
                self.line.clear();
                self.run_line(&line);
            } else {
                self.line.push(*byte);
            }
        }
        Ok(())
    }

    async fn send_eof(&mut self) -> Result<()> {
        Ok(())
    }

    async fn close(&mut self) -> Result<()> {
        self.closed.store(true, Ordering::SeqCst);
        self.pending.clear();
        Ok(())
    }
}

/// Transport handing out the fakes above.
pub struct FakeTransport {
    pub sftp: Arc<FakeSftp>,
    sftp_opens: AtomicUsize,
    exec_responses: Mutex<HashMap<String, Vec<StreamEvent>>>,
    exec_commands: Mutex<Vec<String>>,
    exec_options: Mutex<Vec<ChannelOptions>>,
    shell_responses: Mutex<HashMap<String, Vec<StreamEvent>>>,
    shell_sudo_password: Mutex<Option<String>>,
    pub writes: Arc<Mutex<Vec<Vec<u8>>>>,
    pub eof_sent: Arc<AtomicBool>,
    pub shell_closed: Arc<AtomicBool>,
    disconnects: AtomicUsize,
}

impl FakeTransport {
    pub fn new() -> Self {
        Self::with_sftp(Arc::new(FakeSftp::new()))
    }

    pub fn with_sftp(sftp: Arc<FakeSftp>) -> Self {
        Self {
            sftp,
            sftp_opens: AtomicUsize::new(0),
            exec_responses: Mutex::new(HashMap::new()),
            exec_commands: Mutex::new(Vec::new()),
            exec_options: Mutex::new(Vec::new()),
            shell_responses: Mutex::new(HashMap::new()),
            shell_sudo_password: Mutex::new(None),
            writes: Arc::new(Mutex::new(Vec::new())),
            eof_sent: Arc::new(AtomicBool::new(false)),
            shell_closed: Arc::new(AtomicBool::new(false)),
            disconnects: AtomicUsize::new(0),
        }
    }

    /// Events replayed when exactly `command` is executed.
    pub fn on_exec(&self, command: &str, events: Vec<StreamEvent>) {
        self.exec_responses
            .lock()
            .unwrap()
            .insert(command.to_string(), events);
    }

    /// Output printed by the shell for `command` before the next prompt.
    pub fn on_shell(&self, command: &str, events: Vec<StreamEvent>) {
        self.shell_responses
            .lock()
            .unwrap()
            .insert(command.to_string(), events);
    }

    pub fn expect_sudo_password(&self, password: &str) {
        *self.shell_sudo_password.lock().unwrap() = Some(password.to_string());
    }

    pub fn exec_commands(&self) -> Vec<String> {
        self.exec_commands.lock().unwrap().clone()
    }

    pub fn exec_options(&self) -> Vec<ChannelOptions> {
        self.exec_options.lock().unwrap().clone()
    }

    pub fn written(&self) -> Vec<Vec<u8>> {
        self.writes.lock().unwrap().clone()
    }

    pub fn written_text(&self) -> Vec<String> {
        self.written()
            .iter()
            .map(|w| String::from_utf8_lossy(w).into_owned())
            .collect()
    }

    pub fn sftp_opens(&self) -> usize {
        self.sftp_opens.load(Ordering::SeqCst)
    }

    pub fn disconnects(&self) -> usize {
        self.disconnects.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Transport for FakeTransport {
    async fn open_exec(
        &self,
        command: &str,
        options: &ChannelOptions,
    ) -> Result<Box<dyn RemoteStream>> {
        self.exec_commands.lock().unwrap().push(command.to_string());
        self.exec_options.lock().unwrap().push(options.clone());
        let events = self
            .exec_responses
            .lock()
            .unwrap()
            .get(command)
            .cloned()
            .unwrap_or_else(|| vec![StreamEvent::ExitStatus(0)]);
        Ok(Box::new(FakeExec {
            events: events.into(),
            writes: Arc::clone(&self.writes),
            eof_sent: Arc::clone(&self.eof_sent),
        }))
    }

    async fn open_shell(&self, _pty: &PtyOptions) -> Result<Box<dyn RemoteStream>> {
        let mut pending = VecDeque::new();
        pending.push_back(StreamEvent::Stdout(
            format!("Welcome to web1\r\n{PROMPT}").into_bytes(),
        ));
        Ok(Box::new(FakeShell {
            pending,
            responses: self.shell_responses.lock().unwrap().clone(),
            sudo_password: self.shell_sudo_password.lock().unwrap().clone(),
            awaiting_password: None,
            line: Vec::new(),
            writes: Arc::clone(&self.writes),
            closed: Arc::clone(&self.shell_closed),
        }))
    }

    async fn open_sftp(&self) -> Result<Arc<dyn SftpChannel>> {
        self.sftp_opens.fetch_add(1, Ordering::SeqCst);
        Ok(self.sftp.clone())
    }

    async fn disconnect(&self) -> Result<()> {
        self.disconnects.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn is_closed(&self) -> bool {
        false
    }
}

pub fn stdout(text: &str) -> StreamEvent {
    StreamEvent::Stdout(text.as_bytes().to_vec())
}

pub fn stderr(text: &str) -> StreamEvent {
    StreamEvent::Stderr(text.as_bytes().to_vec())
}
