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

//! Fetch the workspace's git SSH key from the control plane.
//!
//! A 401 means the workspace session has not been authorized yet (the
//! build may still be running), so the fetch is retried with unbounded
//! backoff until the caller cancels. Every other failure (network,
//! non-401 status, malformed body, unparsable key) is permanent.

use reqwest::StatusCode;
use serde::Deserialize;
use tokio_util::sync::CancellationToken;
use zeroize::Zeroizing;

use super::signer::Signer;
use crate::config::ControlPlaneConfig;
use crate::controlplane::{endpoint, GIT_KEY_PATH, SESSION_TOKEN_HEADER};
use crate::error::UplinkError;
use crate::retry;

#[derive(Deserialize)]
struct GitSshKeyResponse {
    private_key: String,
}

/// One fetch attempt against the git-key endpoint.
async fn fetch_once(
    http: &reqwest::Client,
    control_plane: &ControlPlaneConfig,
) -> Result<Signer, UplinkError> {
    let url = endpoint(&control_plane.url, GIT_KEY_PATH);
    let resp = http
        .get(&url)
        .header(SESSION_TOKEN_HEADER, &control_plane.token)
        .send()
        .await?;

    match resp.status() {
        StatusCode::UNAUTHORIZED => Err(UplinkError::NotReady(
            "git ssh key not yet issued (401)".into(),
        )),
        status if !status.is_success() => Err(UplinkError::Protocol(format!(
            "fetch git ssh key: HTTP {status}"
        ))),
        _ => {
            let body: GitSshKeyResponse = resp
                .json()
                .await
                .map_err(|e| UplinkError::Protocol(format!("decode git ssh key response: {e}")))?;
            let pem = Zeroizing::new(body.private_key);
            Signer::from_openssh(&pem)
        }
    }
}

/// Fetch the git SSH key, retrying while the control plane reports the
/// session is not yet ready. Cancelling the token aborts the backoff
/// loop promptly with [`UplinkError::Cancelled`].
pub async fn fetch_git_key(
    cancel: &CancellationToken,
    http: &reqwest::Client,
    control_plane: &ControlPlaneConfig,
) -> Result<Signer, UplinkError> {
    retry::retry_not_ready(cancel, || fetch_once(http, control_plane)).await
}
