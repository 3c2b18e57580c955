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

//! Private key material for SSH public-key authentication.

use std::fmt;
use std::fmt::Write as _;
use std::path::Path;

use md5::{Digest, Md5};
use russh::keys::{Algorithm, PrivateKey, PublicKey};

use crate::error::UplinkError;

/// A parsed SSH private key plus the fingerprint of its public half.
///
/// The fingerprint is the MD5 content hash of the marshaled public key,
/// rendered as lowercase hex. Log lines use the 8-character display
/// form; the key material itself never appears in logs or `Debug`
/// output.
pub struct Signer {
    key: PrivateKey,
    fingerprint: String,
}

impl Signer {
    /// Parse an OpenSSH-format private key from memory.
    pub fn from_openssh(data: &str) -> Result<Self, UplinkError> {
        let key = russh::keys::decode_secret_key(data, None)
            .map_err(|e| UplinkError::Input(format!("parse private key: {e}")))?;
        Self::from_key(key)
    }

    /// Read and parse a private key file.
    pub fn from_file(path: &Path) -> Result<Self, UplinkError> {
        let key = russh::keys::load_secret_key(path, None).map_err(|e| {
            UplinkError::Input(format!("read private key {}: {e}", path.display()))
        })?;
        Self::from_key(key)
    }

    fn from_key(key: PrivateKey) -> Result<Self, UplinkError> {
        let fingerprint = fingerprint_hex(key.public_key())?;
        Ok(Self { key, fingerprint })
    }

    pub fn key(&self) -> &PrivateKey {
        &self.key
    }

    pub fn into_key(self) -> PrivateKey {
        self.key
    }

    pub fn algorithm(&self) -> Algorithm {
        self.key.algorithm()
    }

    /// Full hex fingerprint of the public key.
    pub fn fingerprint(&self) -> &str {
        &self.fingerprint
    }

    /// 8-character fingerprint prefix for log lines.
    pub fn short_fingerprint(&self) -> &str {
        &self.fingerprint[..8]
    }
}

impl fmt::Debug for Signer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Signer")
            .field("algorithm", &self.key.algorithm().to_string())
            .field("fingerprint", &self.fingerprint)
            .finish_non_exhaustive()
    }
}

fn fingerprint_hex(public: &PublicKey) -> Result<String, UplinkError> {
    let marshaled = public
        .to_bytes()
        .map_err(|e| UplinkError::Input(format!("encode public key: {e}")))?;
    let digest = Md5::digest(&marshaled);
    let mut out = String::with_capacity(digest.len() * 2);
    for byte in digest {
        let _ = write!(out, "{byte:02x}");
    }
    Ok(out)
}
