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

use std::path::PathBuf;

use zeroize::Zeroizing;

use super::host_key::HostKeyPolicy;
use super::signer::Signer;

/// One concrete way to authenticate a git operation.
///
/// Selected once per operation by [`super::resolve`] and immutable
/// afterwards. Credentials live in the variant fields and are never
/// embedded into a URL string.
#[derive(Debug)]
pub enum AuthMethod {
    /// Proceed without authentication.
    None,
    /// HTTP basic auth for http(s) remotes.
    Basic {
        username: String,
        password: Zeroizing<String>,
    },
    /// SSH public-key auth with an in-memory signer.
    Key {
        username: String,
        signer: Signer,
        host_key: HostKeyPolicy,
    },
    /// SSH auth delegated to a local agent socket.
    Agent {
        username: String,
        socket: PathBuf,
        host_key: HostKeyPolicy,
    },
}

impl AuthMethod {
    pub fn with_basic(username: impl Into<String>, password: &str) -> Self {
        Self::Basic {
            username: username.into(),
            password: Zeroizing::new(password.to_string()),
        }
    }

    pub fn with_key(username: impl Into<String>, signer: Signer, host_key: HostKeyPolicy) -> Self {
        Self::Key {
            username: username.into(),
            signer,
            host_key,
        }
    }

    pub fn with_agent(
        username: impl Into<String>,
        socket: impl Into<PathBuf>,
        host_key: HostKeyPolicy,
    ) -> Self {
        Self::Agent {
            username: username.into(),
            socket: socket.into(),
            host_key,
        }
    }

    pub fn is_none(&self) -> bool {
        matches!(self, Self::None)
    }

    /// Short name for log lines.
    pub fn label(&self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Basic { .. } => "http-basic",
            Self::Key { .. } => "ssh-key",
            Self::Agent { .. } => "ssh-agent",
        }
    }
}
