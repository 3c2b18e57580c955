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

//! Control-plane client: protocol version probing and log shipping.
//!
//! The control plane speaks one of two incompatible wire protocols for
//! log delivery. [`probe`] decides which; [`LogShipper`] owns the
//! background transmitter that batches and ships lines over the
//! selected protocol.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::UplinkError;

pub mod probe;
pub mod shipper;
pub(crate) mod v1;
pub(crate) mod v2;

pub use probe::{probe, ProtocolVersion};
pub use shipper::{DrainReport, LogHandle, LogShipper};

/// Header carrying the workspace session token.
pub const SESSION_TOKEN_HEADER: &str = "X-Session-Token";

pub(crate) const BUILD_INFO_PATH: &str = "/api/v2/buildinfo";
pub(crate) const GIT_KEY_PATH: &str = "/api/v2/agents/me/gitsshkey";
pub(crate) const LOGS_PATH: &str = "/api/v2/agents/me/logs";
pub(crate) const RPC_PATH: &str = "/api/v2/agents/me/rpc";

/// Join a base URL and an endpoint path.
pub(crate) fn endpoint(base: &str, path: &str) -> String {
    format!("{}{}", base.trim_end_matches('/'), path)
}

/// Severity of a shipped log line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Debug,
    Info,
    Warn,
    Error,
}

/// One formatted log line with its emission timestamp.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogLine {
    pub created_at: DateTime<Utc>,
    pub level: LogLevel,
    pub output: String,
}

impl LogLine {
    pub fn new(level: LogLevel, output: impl Into<String>) -> Self {
        Self {
            created_at: Utc::now(),
            level,
            output: output.into(),
        }
    }
}

/// Wire body shared by both protocol versions: V1 sends it as a request
/// body, V2 as a text frame.
#[derive(Serialize)]
pub(crate) struct LogBatchBody<'a> {
    pub logs: &'a [LogLine],
}

/// The transmit seam between the batching worker and the two wire
/// protocols. One sink instance per session, driven only by the
/// background transmitter.
#[async_trait]
pub(crate) trait LogSink: Send {
    /// Deliver one ordered batch.
    async fn ship(&mut self, batch: &[LogLine]) -> Result<(), UplinkError>;

    /// Whether the sink has failed permanently; further batches will be
    /// counted as dropped.
    fn is_broken(&self) -> bool {
        false
    }

    /// Graceful teardown after the final flush.
    async fn shutdown(&mut self) -> Result<(), UplinkError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_endpoint_joins_without_double_slash() {
        assert_eq!(
            endpoint("https://cp.test/", BUILD_INFO_PATH),
            "https://cp.test/api/v2/buildinfo"
        );
        assert_eq!(
            endpoint("https://cp.test", LOGS_PATH),
            "https://cp.test/api/v2/agents/me/logs"
        );
    }

    #[test]
    fn test_log_level_wire_names_are_lowercase() {
        assert_eq!(serde_json::to_string(&LogLevel::Info).unwrap(), r#""info""#);
        assert_eq!(serde_json::to_string(&LogLevel::Error).unwrap(), r#""error""#);
    }

    #[test]
    fn test_batch_body_shape() {
        let lines = vec![LogLine::new(LogLevel::Info, "hello world")];
        let body = serde_json::to_value(&LogBatchBody { logs: &lines }).unwrap();
        assert_eq!(body["logs"][0]["output"], "hello world");
        assert_eq!(body["logs"][0]["level"], "info");
        assert!(body["logs"][0]["created_at"].is_string());
    }
}
