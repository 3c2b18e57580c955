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

//! Host key verification policy for SSH remotes.
//!
//! Strict mode delegates to a known-hosts file and can reject the
//! connection. Bypass mode accepts every key but first renders it in
//! known-hosts line format and emits it as an observability event, so a
//! misconfigured remote is still diagnosable after the fact.

use std::collections::HashSet;
use std::path::PathBuf;

use directories::BaseDirs;
use russh::client;
use russh::keys::PublicKey;

use crate::error::UplinkError;

/// Placeholder key some verification libraries present during host key
/// algorithm negotiation. Never a real host key; filtered from events.
const CAPABILITY_PROBE_KEY: &str = "fake-public-key ZmFrZSBwdWJsaWMga2V5";

/// How to treat host keys observed during the SSH handshake.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HostKeyPolicy {
    /// Verify against a known-hosts file; `None` means the user's
    /// default `~/.ssh/known_hosts`.
    Strict { known_hosts: Option<PathBuf> },
    /// Accept every key, logging each unique one.
    Bypass,
}

impl HostKeyPolicy {
    pub fn is_bypass(&self) -> bool {
        matches!(self, Self::Bypass)
    }
}

/// Get the default known_hosts file path
pub fn default_known_hosts_path() -> Option<PathBuf> {
    BaseDirs::new().map(|dirs| dirs.home_dir().join(".ssh").join("known_hosts"))
}

/// A key observed during the handshake, in known-hosts line format.
/// Purely informational; produced once per unique (hostname, key) pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostKeyEvent {
    pub hostname: String,
    pub line: String,
}

/// Per-connection host key callback state.
///
/// Implements [`russh::client::Handler`] so the transport layer invokes
/// it for every server key presented during the handshake.
#[derive(Debug)]
pub struct HostKeyVerifier {
    hostname: String,
    port: u16,
    policy: HostKeyPolicy,
    seen: HashSet<String>,
}

impl HostKeyVerifier {
    pub fn new(hostname: impl Into<String>, port: u16, policy: HostKeyPolicy) -> Self {
        Self {
            hostname: hostname.into(),
            port,
            policy,
            seen: HashSet::new(),
        }
    }

    /// Decide whether to accept `key` under the configured policy.
    pub fn verify(&mut self, key: &PublicKey) -> Result<bool, UplinkError> {
        match &self.policy {
            HostKeyPolicy::Strict {
                known_hosts: Some(path),
            } => russh::keys::check_known_hosts_path(&self.hostname, self.port, key, path)
                .map_err(|e| UplinkError::Protocol(format!("known hosts check: {e}"))),
            HostKeyPolicy::Strict { known_hosts: None } => {
                russh::keys::check_known_hosts(&self.hostname, self.port, key)
                    .map_err(|e| UplinkError::Protocol(format!("known hosts check: {e}")))
            }
            HostKeyPolicy::Bypass => {
                if let Some(event) = self.observe(key) {
                    tracing::info!(
                        hostname = %event.hostname,
                        key = %event.line,
                        "accepting unverified host key"
                    );
                }
                Ok(true)
            }
        }
    }

    /// Render `key` as a known-hosts line and return an event if it is
    /// real and not yet seen for this hostname.
    fn observe(&mut self, key: &PublicKey) -> Option<HostKeyEvent> {
        let openssh = key.to_openssh().ok()?;
        let line = format!("{} {}", self.hostname, openssh.trim());
        if is_capability_probe(&line) {
            return None;
        }
        if !self.seen.insert(line.clone()) {
            return None;
        }
        Some(HostKeyEvent {
            hostname: self.hostname.clone(),
            line,
        })
    }
}

fn is_capability_probe(line: &str) -> bool {
    line.contains(CAPABILITY_PROBE_KEY)
}

impl client::Handler for HostKeyVerifier {
    type Error = UplinkError;

    async fn check_server_key(
        &mut self,
        server_public_key: &PublicKey,
    ) -> Result<bool, Self::Error> {
        self.verify(server_public_key)
    }
}
