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

//! Resilient outbound links for a workspace provisioning agent.
//!
//! This crate covers the two network-facing concerns of provisioning a
//! workspace from a git repository:
//!
//! * Resolving a git authentication method from whatever credentials are
//!   available (HTTP basic, an on-disk SSH key, a key fetched from the
//!   control plane, or a local SSH agent), including host key policy.
//! * Shipping build log lines to the control plane over whichever wire
//!   protocol it speaks (discrete V1 batches or a persistent V2 stream),
//!   with a background transmitter that batches, retries the initial
//!   handshake while the remote session is not yet ready, and flushes
//!   everything on shutdown.
//!
//! Both halves share the same backoff policy ([`retry`]) and error
//! taxonomy ([`error`]).

pub mod auth;
pub mod config;
pub mod controlplane;
pub mod error;
pub mod logging;
pub mod retry;

pub use auth::{resolve, AuthMethod, HostKeyPolicy, Signer};
pub use config::{ControlPlaneConfig, CredentialStore};
pub use controlplane::{LogHandle, LogLevel, LogLine, LogShipper, ProtocolVersion};
pub use error::UplinkError;
