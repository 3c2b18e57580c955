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

//! Streaming log delivery for 2.9.0+ control planes.
//!
//! One persistent full-duplex stream per session. Each batch is a text
//! frame; the control plane acknowledges with a count. Any transport or
//! acknowledgement failure breaks the stream permanently, after which
//! every further batch is dropped.

use async_trait::async_trait;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::header::HeaderValue;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

use super::{LogBatchBody, LogLine, LogSink, RPC_PATH, SESSION_TOKEN_HEADER};
use crate::config::ControlPlaneConfig;
use crate::error::UplinkError;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

#[derive(Deserialize)]
struct LogAck {
    acked: usize,
}

pub(crate) struct V2Sink {
    writer: SplitSink<WsStream, Message>,
    reader: SplitStream<WsStream>,
    broken: bool,
}

/// Derive the stream endpoint from the control plane's HTTP base URL.
fn ws_endpoint(base: &str) -> Result<String, UplinkError> {
    let base = base.trim_end_matches('/');
    let ws_base = if let Some(rest) = base.strip_prefix("https://") {
        format!("wss://{rest}")
    } else if let Some(rest) = base.strip_prefix("http://") {
        format!("ws://{rest}")
    } else {
        return Err(UplinkError::Input(format!(
            "control plane URL must be http(s): {base}"
        )));
    };
    Ok(format!("{ws_base}{RPC_PATH}"))
}

impl V2Sink {
    /// Open the session stream.
    ///
    /// A 401 during the handshake is transient (the session may not be
    /// authorized yet) and maps to [`UplinkError::NotReady`] so the
    /// caller's retry loop keeps going.
    pub(crate) async fn connect(control_plane: &ControlPlaneConfig) -> Result<Self, UplinkError> {
        let url = ws_endpoint(&control_plane.url)?;
        let mut request = url
            .as_str()
            .into_client_request()
            .map_err(|e| UplinkError::Input(format!("build stream request: {e}")))?;
        let token = HeaderValue::from_str(&control_plane.token)
            .map_err(|_| UplinkError::Input("session token is not a valid header value".into()))?;
        request.headers_mut().insert(SESSION_TOKEN_HEADER, token);

        let (stream, _) = connect_async(request).await.map_err(|e| match e {
            tokio_tungstenite::tungstenite::Error::Http(resp)
                if resp.status() == tokio_tungstenite::tungstenite::http::StatusCode::UNAUTHORIZED =>
            {
                UplinkError::NotReady("log stream not yet authorized (401)".into())
            }
            other => UplinkError::Protocol(format!("open log stream: {other}")),
        })?;

        let (writer, reader) = stream.split();
        Ok(Self {
            writer,
            reader,
            broken: false,
        })
    }

    async fn ship_inner(&mut self, batch: &[LogLine]) -> Result<(), UplinkError> {
        let frame = serde_json::to_string(&LogBatchBody { logs: batch })
            .map_err(|e| UplinkError::Protocol(format!("encode log batch: {e}")))?;
        self.writer
            .send(Message::Text(frame))
            .await
            .map_err(|e| UplinkError::Protocol(format!("send log batch: {e}")))?;

        // The control plane acknowledges each batch in order; wait for
        // ours, skipping transport chatter.
        loop {
            let msg = self
                .reader
                .next()
                .await
                .ok_or_else(|| UplinkError::Protocol("log stream closed before ack".into()))?
                .map_err(|e| UplinkError::Protocol(format!("read log stream: {e}")))?;
            match msg {
                Message::Text(text) => {
                    let ack: LogAck = serde_json::from_str(&text)
                        .map_err(|e| UplinkError::Protocol(format!("decode log ack: {e}")))?;
                    if ack.acked != batch.len() {
                        return Err(UplinkError::Protocol(format!(
                            "partial log ack: {} of {}",
                            ack.acked,
                            batch.len()
                        )));
                    }
                    return Ok(());
                }
                Message::Close(frame) => {
                    return Err(UplinkError::Protocol(format!(
                        "log stream closed before ack: {frame:?}"
                    )));
                }
                Message::Ping(_) | Message::Pong(_) | Message::Binary(_) | Message::Frame(_) => {}
            }
        }
    }
}

#[async_trait]
impl LogSink for V2Sink {
    async fn ship(&mut self, batch: &[LogLine]) -> Result<(), UplinkError> {
        if self.broken {
            return Err(UplinkError::Protocol("log stream is broken".into()));
        }
        let result = self.ship_inner(batch).await;
        if result.is_err() {
            self.broken = true;
        }
        result
    }

    fn is_broken(&self) -> bool {
        self.broken
    }

    async fn shutdown(&mut self) -> Result<(), UplinkError> {
        if self.broken {
            return Ok(());
        }
        self.writer
            .send(Message::Close(Some(CloseFrame {
                code: tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode::Normal,
                reason: "".into(),
            })))
            .await
            .map_err(|e| UplinkError::Protocol(format!("close log stream: {e}")))?;
        Ok(())
    }
}
