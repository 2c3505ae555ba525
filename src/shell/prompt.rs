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

//! Prompt detection on a remote pseudo-terminal byte stream.
//!
//! A remote shell interleaves its prompt and credential requests with
//! ordinary output and gives no framing. Each received chunk is split after
//! every `\r\n` and each piece is classified on its own:
//!
//! - a piece ending in `"$ "` is the shell prompt: [`ShellEvent::Prompt`]
//! - a piece matching `password for <anything>` up to its end is a credential
//!   request: [`ShellEvent::PasswordRequested`]
//! - after a credential request, the next piece that is exactly `"\r\n"` is
//!   swallowed once (the echo of the submitted credential line)
//! - anything else is forwarded unchanged as [`ShellEvent::Data`]
//!
//! Matching is per chunk; a prompt split across two network reads is not
//! reassembled. A genuine empty output line arriving right after a credential
//! request is indistinguishable from the echo and is swallowed as well.

use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::VecDeque;

use crate::error::Result;
use crate::ssh::transport::{RemoteStream, StreamEvent};

/// Line terminator emitted by a pseudo-terminal.
pub const LINE_TERMINATOR: &str = "\r\n";

/// Trailing marker of a ready shell prompt.
pub const PROMPT_MARKER: &str = "$ ";

/// Any line containing `password for` through its end is treated as a
/// credential request, whichever command printed it.
static PASSWORD_PROMPT: Lazy<Regex> = Lazy::new(|| Regex::new(r"password for [^\r\n]*$").unwrap());

/// Which remote stream a piece of output came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputStream {
    Stdout,
    Stderr,
}

/// Structured event recovered from the shell byte stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ShellEvent {
    /// The shell printed its prompt and waits for input.
    Prompt,
    /// A credential prompt was printed.
    PasswordRequested,
    /// Ordinary output, forwarded unchanged.
    Data { stream: OutputStream, text: String },
    /// The channel closed.
    Closed,
    /// Writing to the channel failed; the session cannot continue.
    Errored(String),
}

/// Whether `line` is a credential request.
pub fn is_password_prompt(line: &str) -> bool {
    PASSWORD_PROMPT.is_match(line.trim_end_matches(LINE_TERMINATOR))
}

/// Whether `line` ends with the shell prompt marker.
pub fn is_shell_prompt(line: &str) -> bool {
    line.ends_with(PROMPT_MARKER)
}

/// Splits output chunks into shell events.
#[derive(Debug, Default)]
pub struct PromptDetector {
    /// Piece to swallow once if it is the next one seen.
    ignore_next: Option<&'static str>,
}

impl PromptDetector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Classify one received chunk.
    pub fn feed(&mut self, stream: OutputStream, chunk: &str) -> Vec<ShellEvent> {
        let mut events = Vec::new();

        for piece in chunk.split_inclusive(LINE_TERMINATOR) {
            if let Some(ignored) = self.ignore_next.take() {
                if piece == ignored {
                    tracing::trace!("swallowed credential echo");
                    continue;
                }
            }

            if is_password_prompt(piece) {
                self.ignore_next = Some(LINE_TERMINATOR);
                events.push(ShellEvent::PasswordRequested);
            } else if is_shell_prompt(piece) {
                events.push(ShellEvent::Prompt);
            } else {
                events.push(ShellEvent::Data {
                    stream,
                    text: piece.to_string(),
                });
            }
        }

        events
    }
}

/// A remote shell stream read as a sequence of [`ShellEvent`]s.
pub struct PromptStream {
    inner: Box<dyn RemoteStream>,
    detector: PromptDetector,
    pending: VecDeque<ShellEvent>,
    closed: bool,
}

impl PromptStream {
    pub fn new(inner: Box<dyn RemoteStream>) -> Self {
        Self {
            inner,
            detector: PromptDetector::new(),
            pending: VecDeque::new(),
            closed: false,
        }
    }

    /// Next event; [`ShellEvent::Closed`] once and for all after the channel
    /// has closed.
    pub async fn next_event(&mut self) -> ShellEvent {
        loop {
            if let Some(event) = self.pending.pop_front() {
                return event;
            }
            if self.closed {
                return ShellEvent::Closed;
            }

            match self.inner.recv().await {
                Some(StreamEvent::Stdout(bytes)) => {
                    let text = String::from_utf8_lossy(&bytes);
                    self.pending
                        .extend(self.detector.feed(OutputStream::Stdout, &text));
                }
                Some(StreamEvent::Stderr(bytes)) => {
                    let text = String::from_utf8_lossy(&bytes);
                    self.pending
                        .extend(self.detector.feed(OutputStream::Stderr, &text));
                }
                Some(StreamEvent::ExitStatus(status)) => {
                    tracing::trace!(status, "shell exited");
                }
                Some(StreamEvent::ExitSignal(signal)) => {
                    tracing::debug!(%signal, "shell terminated by signal");
                }
                Some(StreamEvent::Eof) => {}
                None => self.closed = true,
            }
        }
    }

    pub async fn write(&mut self, data: &[u8]) -> Result<()> {
        self.inner.write(data).await
    }

    pub async fn close(&mut self) -> Result<()> {
        self.inner.close().await
    }
}
