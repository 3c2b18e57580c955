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

//! Discrete-batch log delivery for pre-2.9.0 control planes.
//!
//! Each batch is one PATCH request. A failed request loses only that
//! batch; the sink stays usable for the next one.

use async_trait::async_trait;

use super::{endpoint, LogBatchBody, LogLine, LogSink, LOGS_PATH, SESSION_TOKEN_HEADER};
use crate::config::ControlPlaneConfig;
use crate::error::UplinkError;

pub(crate) struct V1Sink {
    http: reqwest::Client,
    url: String,
    token: String,
}

impl V1Sink {
    pub(crate) fn new(http: reqwest::Client, control_plane: &ControlPlaneConfig) -> Self {
        Self {
            http,
            url: endpoint(&control_plane.url, LOGS_PATH),
            token: control_plane.token.clone(),
        }
    }
}

#[async_trait]
impl LogSink for V1Sink {
    async fn ship(&mut self, batch: &[LogLine]) -> Result<(), UplinkError> {
        let resp = self
            .http
            .patch(&self.url)
            .header(SESSION_TOKEN_HEADER, &self.token)
            .json(&LogBatchBody { logs: batch })
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            return Err(UplinkError::Protocol(format!(
                "send log batch: HTTP {status}"
            )));
        }
        Ok(())
    }
}
