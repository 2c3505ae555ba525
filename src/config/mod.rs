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

//! Connection configuration.
//!
//! A [`ConnectConfig`] describes one target and its credentials. It can be
//! built in code or loaded as a named profile from a YAML [`ConfigFile`].

mod loader;
mod types;
mod utils;

pub use types::{ConfigFile, ConnectConfig, HostKeyCheck, DEFAULT_PORT};
pub use utils::{current_username, expand_tilde};
