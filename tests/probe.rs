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

//! Version probe tests against a mocked control plane.

use uplink::controlplane::probe;
use uplink::{ProtocolVersion, UplinkError};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

async fn mock_build_info(version: &str) -> MockServer {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/v2/buildinfo"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(serde_json::json!({ "version": version })),
        )
        .mount(&server)
        .await;
    server
}

#[tokio::test]
async fn old_control_plane_selects_discrete_batches() {
    let server = mock_build_info("v2.8.9").await;
    let version = probe(&reqwest::Client::new(), &server.uri()).await.unwrap();
    assert_eq!(version, ProtocolVersion::V1);
}

#[tokio::test]
async fn new_control_plane_selects_streaming() {
    for reported in ["v2.9.0", "v2.12.1+deadbeef"] {
        let server = mock_build_info(reported).await;
        let version = probe(&reqwest::Client::new(), &server.uri()).await.unwrap();
        assert_eq!(version, ProtocolVersion::V2, "for {reported}");
    }
}

#[tokio::test]
async fn non_json_body_means_not_a_control_plane() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/v2/buildinfo"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>hi</html>"))
        .mount(&server)
        .await;

    let err = probe(&reqwest::Client::new(), &server.uri())
        .await
        .unwrap_err();
    match err {
        UplinkError::NotControlPlane(url) => assert_eq!(url, server.uri()),
        other => panic!("expected NotControlPlane, got {other}"),
    }
}

#[tokio::test]
async fn unauthorized_probe_is_transient() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/v2/buildinfo"))
        .respond_with(ResponseTemplate::new(401))
        .mount(&server)
        .await;

    let err = probe(&reqwest::Client::new(), &server.uri())
        .await
        .unwrap_err();
    assert!(err.is_not_ready(), "got {err}");
}
