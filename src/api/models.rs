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

//! Control API request and response bodies.

use crate::core::chain::envelope::Envelope;
use crate::core::chain::groups::CommitGroup;
use crate::core::chain::index::ChainSummary;
use crate::core::security::keystore::UserIdentity;
use crate::core::types::{hex_bytes, CanonicalMap, PeerRecord, PublicKey, ServiceAddress, H256};
use crate::networking::peer_directory::PeerStatus;
use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize, Deserialize)]
pub struct StatusResponse {
    pub success: bool,
    pub version: String,
    pub git_sha: Option<String>,
    pub peers: Vec<PeerStatus>,
    pub tips: Vec<H256>,
    pub all_users: Vec<UserIdentity>,
    pub hidden_service: Option<ServiceAddress>,
    pub chains: usize,
    pub pending_orphans: usize,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct PeersResponse {
    pub success: bool,
    pub peers: Vec<PeerRecord>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct PeerChangeResponse {
    pub success: bool,
    /// Add: a record for the address was replaced. Remove: a record existed.
    pub existed: bool,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct PeerAddressRequest {
    pub service_url: String,
    pub port: u16,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct MakeGenesisRequest {
    pub nickname: String,
    #[serde(default, with = "hex_bytes")]
    pub msg: Vec<u8>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct GenesisResponse {
    pub success: bool,
    pub genesis: H256,
    pub key: PublicKey,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct NewChainRequest {
    pub nickname: String,
    pub group: String,
    #[serde(default, with = "hex_bytes")]
    pub msg: Vec<u8>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct AppendRequest {
    pub genesis: H256,
    pub key: PublicKey,
    #[serde(with = "hex_bytes")]
    pub msg: Vec<u8>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct AppendResponse {
    pub success: bool,
    pub hash: H256,
    pub height: u64,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct GroupNameRequest {
    pub name: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct AddMemberRequest {
    pub group: String,
    pub genesis: H256,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct AddMemberResponse {
    pub success: bool,
    pub added: bool,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ChainsResponse {
    pub success: bool,
    pub chains: Vec<ChainSummary>,
    pub groups: Vec<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct GroupResponse {
    pub success: bool,
    pub group: CommitGroup,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SnapshotResponse {
    pub success: bool,
    pub envelopes: CanonicalMap<H256, Envelope>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct DangerousPushRequest {
    pub envelope: Envelope,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct RegisterUserRequest {
    pub pubkey: PublicKey,
    pub nickname: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct UsersResponse {
    pub success: bool,
    pub users: Vec<UserIdentity>,
}
