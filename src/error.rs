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

//! Error taxonomy shared by the auth and control-plane layers.
//!
//! The crate distinguishes exactly one transient condition, a remote
//! session that is not yet authorized ([`UplinkError::NotReady`]), which
//! the backoff loop in [`crate::retry`] absorbs. Everything else is
//! either permanent or a caller-initiated cancellation.

use thiserror::Error;

#[derive(Debug, Error)]
#[non_exhaustive]
pub enum UplinkError {
    /// The remote reported the session is not yet authorized (HTTP 401).
    /// Retried with backoff; never surfaced to callers unless the
    /// cancellation fires first.
    #[error("remote not ready: {0}")]
    NotReady(String),

    /// Malformed response, rejected handshake, or an unsupported remote.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// The probed endpoint is not a control plane at all (non-JSON
    /// build-info response, e.g. an HTML error page).
    #[error("{0}: unexpected non-JSON response, endpoint is not a control plane")]
    NotControlPlane(String),

    /// Bad key material, bad URL, or otherwise unusable input.
    #[error("invalid input: {0}")]
    Input(String),

    /// The supplied cancellation token fired.
    #[error("operation cancelled")]
    Cancelled,

    #[error("ssh transport error: {0}")]
    Ssh(#[from] russh::Error),

    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
}

impl UplinkError {
    /// Whether the backoff loop should retry this error.
    pub fn is_not_ready(&self) -> bool {
        matches!(self, UplinkError::NotReady(_))
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, UplinkError::Cancelled)
    }
}
