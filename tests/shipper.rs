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

//! End-to-end shipper tests over the discrete-batch protocol.

use tokio_util::sync::CancellationToken;
use uplink::config::ControlPlaneConfig;
use uplink::{LogLevel, LogShipper, ProtocolVersion};
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

async fn mock_v1_control_plane(token: &str) -> MockServer {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/v2/buildinfo"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(serde_json::json!({ "version": "v2.8.9" })),
        )
        .mount(&server)
        .await;
    Mock::given(method("PATCH"))
        .and(path("/api/v2/agents/me/logs"))
        .and(header("X-Session-Token", token))
        .respond_with(ResponseTemplate::new(200))
        .mount(&server)
        .await;
    server
}

/// Collect every log line the server received, in arrival order.
async fn received_outputs(server: &MockServer) -> Vec<String> {
    let mut outputs = Vec::new();
    for req in server.received_requests().await.unwrap() {
        if req.url.path() != "/api/v2/agents/me/logs" {
            continue;
        }
        let body: serde_json::Value = serde_json::from_slice(&req.body).unwrap();
        for line in body["logs"].as_array().unwrap() {
            outputs.push(line["output"].as_str().unwrap().to_string());
        }
    }
    outputs
}

#[tokio::test]
async fn every_line_arrives_in_order() {
    let server = mock_v1_control_plane("tok").await;
    let cp = ControlPlaneConfig::new(server.uri(), "tok");
    let cancel = CancellationToken::new();

    let shipper = LogShipper::connect(&cp, &cancel).await.unwrap();
    assert_eq!(shipper.protocol(), ProtocolVersion::V1);

    let handle = shipper.handle();
    for i in 0..120 {
        handle.log(LogLevel::Info, format!("line {i}"));
    }
    let report = shipper.close().await.unwrap();
    assert_eq!(report.shipped, 120);
    assert_eq!(report.dropped, 0);

    let outputs = received_outputs(&server).await;
    let expected: Vec<String> = (0..120).map(|i| format!("line {i}")).collect();
    assert_eq!(outputs, expected);
}

#[tokio::test]
async fn connect_retries_while_unauthorized() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/v2/buildinfo"))
        .respond_with(ResponseTemplate::new(401))
        .up_to_n_times(2)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/v2/buildinfo"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(serde_json::json!({ "version": "v2.8.9" })),
        )
        .mount(&server)
        .await;
    Mock::given(method("PATCH"))
        .and(path("/api/v2/agents/me/logs"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&server)
        .await;

    let cp = ControlPlaneConfig::new(server.uri(), "tok");
    let cancel = CancellationToken::new();

    let shipper = LogShipper::connect(&cp, &cancel).await.unwrap();
    shipper.handle().log(LogLevel::Info, "made it");
    let report = shipper.close().await.unwrap();
    assert_eq!(report.shipped, 1);

    assert_eq!(received_outputs(&server).await, vec!["made it".to_string()]);
}

#[tokio::test]
async fn failed_batches_do_not_stop_the_shipper() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/v2/buildinfo"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(serde_json::json!({ "version": "v2.8.9" })),
        )
        .mount(&server)
        .await;
    // Batch uploads never succeed, but that only loses lines.
    Mock::given(method("PATCH"))
        .and(path("/api/v2/agents/me/logs"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let cp = ControlPlaneConfig::new(server.uri(), "tok");
    let cancel = CancellationToken::new();

    let shipper = LogShipper::connect(&cp, &cancel).await.unwrap();
    for i in 0..5 {
        shipper.handle().log(LogLevel::Warn, format!("lost {i}"));
    }
    let report = shipper.close().await.unwrap();
    assert_eq!(report.shipped, 0);
    assert_eq!(report.dropped, 5);
}

#[tokio::test]
async fn cancelling_the_parent_token_still_drains() {
    let server = mock_v1_control_plane("tok").await;
    let cp = ControlPlaneConfig::new(server.uri(), "tok");
    let cancel = CancellationToken::new();

    let shipper = LogShipper::connect(&cp, &cancel).await.unwrap();
    let handle = shipper.handle();
    for i in 0..10 {
        handle.log(LogLevel::Info, format!("final {i}"));
    }
    cancel.cancel();

    let report = shipper.close().await.unwrap();
    assert_eq!(report.shipped, 10);
    assert_eq!(received_outputs(&server).await.len(), 10);
}
