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

//! Protocol version probe.
//!
//! One unauthenticated request to the build-info endpoint decides which
//! log protocol the control plane speaks. Control planes at 2.9.0 or
//! newer accept the persistent stream; older ones only accept discrete
//! batch requests.

use reqwest::StatusCode;
use semver::Version;
use serde::Deserialize;

use super::{endpoint, BUILD_INFO_PATH};
use crate::error::UplinkError;

/// First control-plane release that accepts the streaming protocol.
const STREAMING_MIN_VERSION: Version = Version::new(2, 9, 0);

/// Log protocol generations, oldest first so `Ord` matches age.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ProtocolVersion {
    /// Discrete batch uploads over plain HTTP requests.
    V1,
    /// One persistent full-duplex stream per session.
    V2,
}

#[derive(Deserialize)]
struct BuildInfoResponse {
    version: String,
}

/// Ask `base_url` which protocol it speaks.
///
/// A 401 is transient (the session may not be authorized yet) and maps
/// to [`UplinkError::NotReady`] so callers can retry. A response that
/// is not JSON at all means the URL points at something other than a
/// control plane, which is a configuration mistake worth its own error.
pub async fn probe(
    http: &reqwest::Client,
    base_url: &str,
) -> Result<ProtocolVersion, UplinkError> {
    let url = endpoint(base_url, BUILD_INFO_PATH);
    let resp = http.get(&url).send().await?;

    match resp.status() {
        StatusCode::UNAUTHORIZED => Err(UplinkError::NotReady(
            "build info not yet authorized (401)".into(),
        )),
        status if !status.is_success() => Err(UplinkError::Protocol(format!(
            "probe build info: HTTP {status}"
        ))),
        _ => {
            let body = resp.text().await?;
            let info: BuildInfoResponse = serde_json::from_str(&body)
                .map_err(|_| UplinkError::NotControlPlane(base_url.to_string()))?;
            select_version(&info.version)
        }
    }
}

/// Map a reported version string to a protocol generation.
///
/// The control plane reports versions with a leading `v` and may append
/// build metadata; both are tolerated.
fn select_version(raw: &str) -> Result<ProtocolVersion, UplinkError> {
    let trimmed = raw.trim().trim_start_matches('v');
    let version = Version::parse(trimmed)
        .map_err(|e| UplinkError::Protocol(format!("parse control plane version {raw:?}: {e}")))?;
    if version >= STREAMING_MIN_VERSION {
        Ok(ProtocolVersion::V2)
    } else {
        Ok(ProtocolVersion::V1)
    }
}
