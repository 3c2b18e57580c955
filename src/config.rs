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

//! Raw credential and endpoint inputs.
//!
//! These structs hold exactly what the embedding agent was given;
//! nothing here performs I/O or validation beyond normalizing empty
//! strings to "unset". How the values are sourced (CLI flags,
//! environment, files) is the embedder's concern.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Coordinates of the control plane that issues git SSH keys and
/// receives streamed build logs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ControlPlaneConfig {
    /// Base URL, e.g. `https://workspaces.example.com`.
    pub url: String,
    /// Session token minted for this workspace build.
    pub token: String,
}

impl ControlPlaneConfig {
    pub fn new(url: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            token: token.into(),
        }
    }
}

/// Everything the auth resolver may consult when picking an
/// authentication method for a git operation.
///
/// All fields besides the repository URL are optional; the resolver
/// degrades through its fallback chain for whatever is missing.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CredentialStore {
    /// Repository URL. Scheme decides the auth family: http(s) means
    /// basic auth or none, anything else is treated as SSH-style.
    pub repo_url: String,

    #[serde(default)]
    pub username: Option<String>,

    #[serde(default)]
    pub password: Option<String>,

    /// Path to an on-disk SSH private key.
    #[serde(default)]
    pub key_path: Option<PathBuf>,

    /// Path to a listening SSH agent socket. Falls back to
    /// `SSH_AUTH_SOCK` when unset.
    #[serde(default)]
    pub agent_socket: Option<PathBuf>,

    /// Known-hosts file for strict host key checking. When unset the
    /// bypass policy is installed and every observed key is logged.
    #[serde(default)]
    pub known_hosts: Option<PathBuf>,

    /// Control plane to fetch a git SSH key from when no local key is
    /// available.
    #[serde(default)]
    pub control_plane: Option<ControlPlaneConfig>,
}

impl CredentialStore {
    pub fn new(repo_url: impl Into<String>) -> Self {
        Self {
            repo_url: repo_url.into(),
            ..Self::default()
        }
    }

    pub fn with_username(mut self, username: impl Into<String>) -> Self {
        self.username = Some(username.into());
        self
    }

    pub fn with_password(mut self, password: impl Into<String>) -> Self {
        self.password = Some(password.into());
        self
    }

    pub fn with_key_path(mut self, key_path: impl Into<PathBuf>) -> Self {
        self.key_path = Some(key_path.into());
        self
    }

    pub fn with_agent_socket(mut self, socket: impl Into<PathBuf>) -> Self {
        self.agent_socket = Some(socket.into());
        self
    }

    pub fn with_known_hosts(mut self, path: impl Into<PathBuf>) -> Self {
        self.known_hosts = Some(path.into());
        self
    }

    pub fn with_control_plane(mut self, control_plane: ControlPlaneConfig) -> Self {
        self.control_plane = Some(control_plane);
        self
    }

    /// Username with empty strings treated as unset.
    pub fn username(&self) -> Option<&str> {
        self.username.as_deref().filter(|s| !s.is_empty())
    }

    /// Password with empty strings treated as unset.
    pub fn password(&self) -> Option<&str> {
        self.password.as_deref().filter(|s| !s.is_empty())
    }

    /// Whether the repository is reached over plain HTTP(S). Scheme
    /// matching is case-insensitive.
    pub fn is_http(&self) -> bool {
        let url = self.repo_url.to_ascii_lowercase();
        url.starts_with("http://") || url.starts_with("https://")
    }
}
