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

//! Peer replication protocol: wire types and the transport seam.
//!
//! Three calls, all JSON over HTTP:
//! - `GET /tips` returns the lane-head manifest,
//! - `POST /envelopes/range` returns one lane from a height,
//! - `POST /envelopes` offers envelopes to the peer's verified admission path.

use crate::core::chain::envelope::Envelope;
use crate::core::chain::index::LaneHead;
use crate::core::types::{PublicKey, ServiceAddress, H256};
use async_trait::async_trait;
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

/// Transport failures. Every variant sends the task into backoff.
#[derive(Debug, Error)]
pub enum TransportError {
    /// No answer within the request timeout.
    #[error("timed out")]
    Timeout,
    /// Peer answered with a non-success status.
    #[error("http status {0}")]
    Http(u16),
    /// Connection or protocol failure.
    #[error("io: {0}")]
    Io(String),
    /// Response body did not decode.
    #[error("decode: {0}")]
    Decode(String),
}

/// Manifest response.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Manifest {
    /// Highest indexed envelope of every lane.
    pub lanes: Vec<LaneHead>,
}

/// Lane range request.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RangeRequest {
    /// Chain.
    pub genesis: H256,
    /// Lane signer.
    pub key: PublicKey,
    /// First height wanted.
    pub from_height: u64,
    /// Max envelopes returned.
    pub limit: usize,
}

/// Lane range response.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RangeResponse {
    /// Envelopes in ascending height.
    pub envelopes: Vec<Envelope>,
}

/// Push request.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PushRequest {
    /// Envelopes offered to the peer.
    pub envelopes: Vec<Envelope>,
}

/// Per-envelope push outcome.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PushStatus {
    /// Entered the index.
    Admitted,
    /// Already indexed.
    Duplicate,
    /// Held as an orphan.
    Pending,
    /// Height conflict.
    Conflict,
    /// Malformed or badly signed.
    Invalid,
    /// Receiver could not store it.
    Failed,
}

/// Push outcome for one envelope.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PushResult {
    /// Envelope hash, when it could be computed.
    pub hash: Option<H256>,
    /// Outcome.
    pub status: PushStatus,
    /// Error text for non-success outcomes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Push response.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PushResponse {
    /// One result per offered envelope, in the order they were admitted.
    pub results: Vec<PushResult>,
}

/// How the scheduler talks to a peer.
#[async_trait]
pub trait PeerTransport: Send + Sync {
    /// Remote lane-head manifest.
    async fn manifest(&self, peer: &ServiceAddress) -> Result<Vec<LaneHead>, TransportError>;

    /// One remote lane from `req.from_height`.
    async fn fetch_range(&self, peer: &ServiceAddress, req: &RangeRequest) -> Result<Vec<Envelope>, TransportError>;

    /// Offer envelopes to the peer.
    async fn push(&self, peer: &ServiceAddress, envelopes: &[Envelope]) -> Result<Vec<PushResult>, TransportError>;
}

/// reqwest-backed transport.
#[derive(Clone)]
pub struct HttpTransport {
    client: Client,
}

fn map_reqwest(e: reqwest::Error) -> TransportError {
    if e.is_timeout() {
        TransportError::Timeout
    } else if e.is_decode() {
        TransportError::Decode(e.to_string())
    } else if let Some(status) = e.status() {
        TransportError::Http(status.as_u16())
    } else {
        TransportError::Io(e.to_string())
    }
}

impl HttpTransport {
    /// Client with a per-request timeout.
    pub fn new(timeout: Duration) -> Result<Self, TransportError> {
        let client = Client::builder()
            .timeout(timeout)
            .connect_timeout(timeout)
            .build()
            .map_err(|e| TransportError::Io(e.to_string()))?;
        Ok(Self { client })
    }

    async fn read<T: DeserializeOwned>(resp: reqwest::Response) -> Result<T, TransportError> {
        let resp = resp.error_for_status().map_err(map_reqwest)?;
        resp.json::<T>().await.map_err(map_reqwest)
    }
}

#[async_trait]
impl PeerTransport for HttpTransport {
    async fn manifest(&self, peer: &ServiceAddress) -> Result<Vec<LaneHead>, TransportError> {
        let url = format!("{}/tips", peer.base_url());
        let resp = self.client.get(url).send().await.map_err(map_reqwest)?;
        Ok(Self::read::<Manifest>(resp).await?.lanes)
    }

    async fn fetch_range(&self, peer: &ServiceAddress, req: &RangeRequest) -> Result<Vec<Envelope>, TransportError> {
        let url = format!("{}/envelopes/range", peer.base_url());
        let resp = self.client.post(url).json(req).send().await.map_err(map_reqwest)?;
        Ok(Self::read::<RangeResponse>(resp).await?.envelopes)
    }

    async fn push(&self, peer: &ServiceAddress, envelopes: &[Envelope]) -> Result<Vec<PushResult>, TransportError> {
        let url = format!("{}/envelopes", peer.base_url());
        let body = PushRequest { envelopes: envelopes.to_vec() };
        let resp = self.client.post(url).json(&body).send().await.map_err(map_reqwest)?;
        Ok(Self::read::<PushResponse>(resp).await?.results)
    }
}
