// Copyright (c) 2026 Attestd
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//     http://www.apache.org/licenses/LICENSE-2.0
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

#![forbid(unsafe_code)]
#![deny(missing_docs)]

//! Deterministic core types, canonical encoding helpers and node configuration.

use bincode::Options;
use serde::{de::DeserializeOwned, Deserialize, Deserializer, Serialize, Serializer};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Canonical serialization error.
#[derive(Debug, Error)]
pub enum CodecError {
    /// Value could not be encoded.
    #[error("serialization")]
    Serialize,
    /// Bytes could not be decoded.
    #[error("deserialization")]
    Deserialize,
    /// Input exceeds the decode limit.
    #[error("size limit exceeded")]
    TooLarge,
}

/// Canonical bincode options (deterministic).
fn bincode_opts() -> impl Options {
    // Fixint encoding provides a stable integer representation.
    bincode::DefaultOptions::new()
        .with_fixint_encoding()
        .reject_trailing_bytes()
}

/// Encode with deterministic rules. Requires deterministic container ordering (use BTreeMap/BTreeSet).
pub fn encode_canonical<T: Serialize>(v: &T) -> Result<Vec<u8>, CodecError> {
    bincode_opts()
        .serialize(v)
        .map_err(|_| CodecError::Serialize)
}

/// Decode with a hard size cap.
pub fn decode_canonical_limited<T: DeserializeOwned>(
    bytes: &[u8],
    max: usize,
) -> Result<T, CodecError> {
    if bytes.len() > max {
        return Err(CodecError::TooLarge);
    }
    // The deserializer limit also caps container lengths declared inside the payload.
    bincode_opts()
        .with_limit(max as u64)
        .deserialize(bytes)
        .map_err(|_| CodecError::Deserialize)
}

/// Hex text in human-readable formats (JSON, TOML), raw bytes in bincode.
pub mod hex_bytes {
    use serde::{Deserialize, Deserializer, Serializer};

    /// Serialize a byte buffer.
    pub fn serialize<S: Serializer, T: AsRef<[u8]>>(v: &T, s: S) -> Result<S::Ok, S::Error> {
        if s.is_human_readable() {
            s.serialize_str(&hex::encode(v.as_ref()))
        } else {
            serde::Serialize::serialize(v.as_ref(), s)
        }
    }

    /// Deserialize a byte buffer.
    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Vec<u8>, D::Error> {
        if d.is_human_readable() {
            let s = String::deserialize(d)?;
            hex::decode(s.trim()).map_err(serde::de::Error::custom)
        } else {
            Vec::<u8>::deserialize(d)
        }
    }
}

/// Error parsing a fixed-width hex value.
#[derive(Debug, Error)]
#[error("expected {expected} hex-encoded bytes")]
pub struct HexParseError {
    expected: usize,
}

macro_rules! fixed_bytes {
    ($(#[$meta:meta])* $name:ident, $len:expr) => {
        $(#[$meta])*
        #[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
        pub struct $name([u8; $len]);

        impl $name {
            /// Construct from raw bytes.
            pub fn from_bytes(b: [u8; $len]) -> Self {
                Self(b)
            }
            /// Return bytes.
            pub fn as_bytes(&self) -> &[u8; $len] {
                &self.0
            }
            /// Lowercase hex rendering.
            pub fn to_hex(&self) -> String {
                hex::encode(self.0)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.to_hex())
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}({})", stringify!($name), self.to_hex())
            }
        }

        impl FromStr for $name {
            type Err = HexParseError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                let raw = hex::decode(s.trim()).map_err(|_| HexParseError { expected: $len })?;
                let arr: [u8; $len] = raw
                    .try_into()
                    .map_err(|_| HexParseError { expected: $len })?;
                Ok(Self(arr))
            }
        }

        impl Serialize for $name {
            fn serialize<S: Serializer>(&self, s: S) -> Result<S::Ok, S::Error> {
                if s.is_human_readable() {
                    s.serialize_str(&self.to_hex())
                } else {
                    self.0.serialize(s)
                }
            }
        }

        impl<'de> Deserialize<'de> for $name {
            fn deserialize<D: Deserializer<'de>>(d: D) -> Result<Self, D::Error> {
                if d.is_human_readable() {
                    let s = String::deserialize(d)?;
                    s.parse().map_err(serde::de::Error::custom)
                } else {
                    <[u8; $len]>::deserialize(d).map(Self)
                }
            }
        }
    };
}

fixed_bytes!(
    /// 256-bit hash type (32 bytes). Envelope identifiers and chain identifiers.
    H256,
    32
);

fixed_bytes!(
    /// Signer identity (Ed25519 public key bytes).
    PublicKey,
    32
);

/// Ed25519 signature bytes (expected 64).
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Signature(#[serde(with = "hex_bytes")] pub Vec<u8>);

/// Canonical map type alias.
pub type CanonicalMap<K, V> = BTreeMap<K, V>;

/// Milliseconds since UNIX epoch (0 if the clock is unavailable).
pub fn now_ms() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

/// `host:port` address record.
///
/// Used both for peer addresses and for the node's hidden-service address. `host` may carry
/// a URL scheme (`http://`, `https://`); when it does not, plain `http` is assumed.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ServiceAddress {
    /// Host name, IP address or onion name.
    pub host: String,
    /// TCP port.
    pub port: u16,
}

/// Address parse errors.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum AddressError {
    /// No `:port` suffix.
    #[error("missing port")]
    MissingPort,
    /// Port is not a u16.
    #[error("invalid port")]
    InvalidPort,
    /// Host part is empty.
    #[error("empty host")]
    EmptyHost,
}

impl ServiceAddress {
    /// Construct a new address record.
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self { host: host.into(), port }
    }

    /// Base URL for HTTP requests against this address.
    pub fn base_url(&self) -> String {
        let host = self.host.trim_end_matches('/');
        if host.starts_with("http://") || host.starts_with("https://") {
            format!("{}:{}", host, self.port)
        } else {
            format!("http://{}:{}", host, self.port)
        }
    }

    /// True when the host is an onion service name.
    pub fn is_onion(&self) -> bool {
        self.host.trim_end_matches('/').ends_with(".onion")
    }
}

impl fmt::Display for ServiceAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

impl FromStr for ServiceAddress {
    type Err = AddressError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let (host, port) = s.rsplit_once(':').ok_or(AddressError::MissingPort)?;
        // `http://host` without a port splits on the scheme separator.
        if port.starts_with("//") {
            return Err(AddressError::MissingPort);
        }
        let port: u16 = port.parse().map_err(|_| AddressError::InvalidPort)?;
        if host.is_empty() {
            return Err(AddressError::EmptyHost);
        }
        Ok(Self::new(host, port))
    }
}

/// Peer record as stored in the peer directory and exchanged over the control API.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeerRecord {
    /// Host (optionally with scheme).
    pub service_url: String,
    /// TCP port.
    pub port: u16,
    /// Pull unknown envelopes from this peer.
    #[serde(default)]
    pub fetch_from: bool,
    /// Send local envelopes to this peer.
    #[serde(default)]
    pub push_to: bool,
}

impl PeerRecord {
    /// Address of this peer.
    pub fn address(&self) -> ServiceAddress {
        ServiceAddress::new(self.service_url.clone(), self.port)
    }
}

/// Node configuration root.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeConfig {
    /// Node settings.
    pub node: NodeSettings,
    /// HTTP endpoints.
    pub http: HttpConfig,
    /// Replication settings.
    pub sync: SyncSettings,
    /// Logging settings.
    pub log: LogConfig,
    /// Hidden-service address record (`host:port`) published in `/status`.
    pub hidden_service: Option<String>,
    /// Peers seeded into the directory at startup.
    pub peers: Vec<PeerRecord>,
}

/// Config loading errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Config file exists but could not be read.
    #[error("read config {path}")]
    Read {
        /// Config file path.
        path: String,
    },
    /// TOML does not match the config schema.
    #[error("parse config: {0}")]
    Parse(String),
    /// `hidden_service` is not a valid address.
    #[error("invalid hidden_service address: {0}")]
    HiddenService(AddressError),
}

impl NodeConfig {
    /// Load from a TOML file. A missing file yields defaults.
    pub fn load(path: &str) -> Result<Self, ConfigError> {
        match std::fs::read_to_string(path) {
            Ok(raw) => Self::from_toml(&raw),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Self::default()),
            Err(_) => Err(ConfigError::Read { path: path.to_string() }),
        }
    }

    /// Parse a TOML document.
    pub fn from_toml(raw: &str) -> Result<Self, ConfigError> {
        let cfg: NodeConfig = toml::from_str(raw).map_err(|e| ConfigError::Parse(e.to_string()))?;
        cfg.hidden_service_address()?;
        Ok(cfg)
    }

    /// Apply `ATTESTD_DATA_DIR` / `ATTESTD_LISTEN` overrides.
    pub fn apply_env(&mut self) {
        if let Ok(v) = std::env::var("ATTESTD_DATA_DIR") {
            if !v.trim().is_empty() {
                self.node.data_dir = v;
            }
        }
        if let Ok(v) = std::env::var("ATTESTD_LISTEN") {
            if !v.trim().is_empty() {
                self.http.listen_addr = v;
            }
        }
    }

    /// Parsed hidden-service address, if configured.
    pub fn hidden_service_address(&self) -> Result<Option<ServiceAddress>, ConfigError> {
        match self.hidden_service.as_deref() {
            None => Ok(None),
            Some(s) => s.parse().map(Some).map_err(ConfigError::HiddenService),
        }
    }
}

/// Node settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeSettings {
    /// Human-readable name.
    pub name: String,
    /// Data directory (sled db).
    pub data_dir: String,
}

impl Default for NodeSettings {
    fn default() -> Self {
        Self { name: "attestd".to_string(), data_dir: "./data".to_string() }
    }
}

/// HTTP config.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    /// Listen address, e.g. 0.0.0.0:13329.
    pub listen_addr: String,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self { listen_addr: "127.0.0.1:13329".to_string() }
    }
}

/// Replication settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncSettings {
    /// Delay between successful rounds per peer task.
    pub interval_ms: u64,
    /// Timeout applied to every network call.
    pub request_timeout_ms: u64,
    /// First backoff delay after a transport failure.
    pub backoff_base_ms: u64,
    /// Backoff cap.
    pub backoff_max_ms: u64,
    /// Max envelopes per range request / push batch.
    pub max_batch: usize,
    /// Max orphans held in memory awaiting an ancestor.
    pub max_orphans: usize,
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            interval_ms: 5_000,
            request_timeout_ms: 10_000,
            backoff_base_ms: 1_000,
            backoff_max_ms: 300_000,
            max_batch: 256,
            max_orphans: 10_000,
        }
    }
}

/// Log output format.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Compact human-readable lines.
    #[default]
    Compact,
    /// One JSON object per event.
    Json,
}

/// Logging settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// Max level: trace, debug, info, warn, error.
    pub level: String,
    /// Output format.
    pub format: LogFormat,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self { level: "info".to_string(), format: LogFormat::Compact }
    }
}
