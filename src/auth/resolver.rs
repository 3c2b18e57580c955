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

//! The authentication decision tree.
//!
//! Resolution never fails: every sub-step failure is logged and the
//! next fallback attempted. Only when all fallbacks are exhausted does
//! the caller get [`AuthMethod::None`], which means "proceed without
//! authentication", not an error.

use std::path::PathBuf;

use tokio_util::sync::CancellationToken;

use super::fetcher;
use super::host_key::HostKeyPolicy;
use super::method::AuthMethod;
use super::signer::Signer;
use crate::config::CredentialStore;

/// Default user for SSH-style git remotes.
const DEFAULT_SSH_USERNAME: &str = "git";

/// Resolve one [`AuthMethod`] for a git operation.
///
/// Decision order:
/// 1. http(s) URL: no username and no password means no auth at all,
///    anything else is HTTP basic.
/// 2. Everything else is SSH-style, defaulting the username to `git`:
///    a configured key file first, then a key fetched from the control
///    plane (retried while the workspace build is not ready), then the
///    local SSH agent. An unreachable agent is terminal.
///
/// The only network I/O happens through the key fetcher, which honors
/// `cancel` at every blocking point.
pub async fn resolve(store: &CredentialStore, cancel: &CancellationToken) -> AuthMethod {
    if store.repo_url.is_empty() {
        tracing::info!("no git URL supplied, skipping authentication");
        return AuthMethod::None;
    }

    if store.is_http() {
        return match (store.username(), store.password()) {
            (None, None) => {
                tracing::info!("using no authentication");
                AuthMethod::None
            }
            (username, password) => {
                // Credentials travel in the method, never inside the URL.
                tracing::info!("using HTTP basic authentication");
                AuthMethod::with_basic(
                    username.unwrap_or_default(),
                    password.unwrap_or_default(),
                )
            }
        };
    }

    // Git clones over SSH conventionally use the 'git' user; honor an
    // explicit override.
    let username = store
        .username()
        .unwrap_or(DEFAULT_SSH_USERNAME)
        .to_string();
    tracing::info!(username = %username, "using SSH authentication");

    let mut signer: Option<Signer> = None;

    if let Some(path) = &store.key_path {
        match Signer::from_file(path) {
            Ok(s) => {
                tracing::info!(
                    key_type = %s.algorithm(),
                    fingerprint = %s.short_fingerprint(),
                    path = %path.display(),
                    "using local private key"
                );
                signer = Some(s);
            }
            Err(e) => {
                tracing::error!(
                    path = %path.display(),
                    error = %e,
                    "failed to read private key, trying next fallback"
                );
            }
        }
    }

    if signer.is_none() {
        if let Some(cp) = store
            .control_plane
            .as_ref()
            .filter(|cp| !cp.url.is_empty() && !cp.token.is_empty())
        {
            tracing::info!(url = %cp.url, "fetching git ssh key from control plane");
            let http = reqwest::Client::new();
            match fetcher::fetch_git_key(cancel, &http, cp).await {
                Ok(s) => {
                    tracing::info!(
                        key_type = %s.algorithm(),
                        fingerprint = %s.short_fingerprint(),
                        "fetched git ssh key"
                    );
                    signer = Some(s);
                }
                Err(e) => {
                    tracing::warn!(
                        url = %cp.url,
                        error = %e,
                        "failed to fetch git ssh key, trying next fallback"
                    );
                }
            }
        }
    }

    let host_key = match &store.known_hosts {
        Some(path) => HostKeyPolicy::Strict {
            known_hosts: Some(path.clone()),
        },
        None => {
            tracing::warn!("no known-hosts source configured, accepting and logging all host keys");
            HostKeyPolicy::Bypass
        }
    };

    match signer {
        Some(signer) => AuthMethod::with_key(username, signer, host_key),
        None => {
            tracing::warn!("no SSH key available, falling back to agent");
            match reachable_agent_socket(store).await {
                Some(socket) => AuthMethod::with_agent(username, socket, host_key),
                None => {
                    // Terminal: nothing else to fall back to.
                    tracing::error!("failed to reach SSH agent, proceeding unauthenticated");
                    AuthMethod::None
                }
            }
        }
    }
}

/// Probe the agent socket (configured path or `SSH_AUTH_SOCK`) and
/// return it if a connection succeeds.
#[cfg(unix)]
async fn reachable_agent_socket(store: &CredentialStore) -> Option<PathBuf> {
    use russh::keys::agent::client::AgentClient;

    let socket = store
        .agent_socket
        .clone()
        .or_else(|| std::env::var_os("SSH_AUTH_SOCK").map(PathBuf::from))?;
    match AgentClient::connect_uds(&socket).await {
        Ok(_) => Some(socket),
        Err(e) => {
            tracing::error!(socket = %socket.display(), error = %e, "failed to connect to SSH agent");
            None
        }
    }
}

#[cfg(not(unix))]
async fn reachable_agent_socket(_store: &CredentialStore) -> Option<PathBuf> {
    tracing::warn!("SSH agent authentication is not supported on this platform");
    None
}
