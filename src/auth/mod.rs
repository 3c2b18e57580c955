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

//! Git authentication: method resolution, key material, and host key
//! policy.
//!
//! The entry point is [`resolve`], which turns a
//! [`crate::config::CredentialStore`] into exactly one [`AuthMethod`]
//! without ever failing: missing or broken credentials degrade to the
//! next fallback, and exhaustion yields [`AuthMethod::None`].

pub mod fetcher;
pub mod host_key;
pub mod method;
pub mod resolver;
pub mod signer;

pub use fetcher::fetch_git_key;
pub use host_key::{default_known_hosts_path, HostKeyPolicy, HostKeyVerifier};
pub use method::AuthMethod;
pub use resolver::resolve;
pub use signer::Signer;
