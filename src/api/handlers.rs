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
#![allow(missing_docs)]

use crate::api::models::*;
use crate::api::{ApiError, AppState};
use crate::core::chain::groups::GroupError;
use crate::core::chain::ledger::{InjectReport, LedgerError};
use crate::core::types::{PeerRecord, ServiceAddress};
use crate::networking::sync::admit_pushed;
use crate::networking::transport::{Manifest, PushRequest, PushResponse, RangeRequest, RangeResponse};
use axum::extract::State;
use axum::http::header;
use axum::response::IntoResponse;
use axum::Json;
use std::sync::Arc;
use tracing::info;

type ApiResult<T> = Result<Json<T>, ApiError>;

pub async fn status(State(state): State<Arc<AppState>>) -> ApiResult<StatusResponse> {
    let chains = state.ledger.chains()?.len();
    Ok(Json(StatusResponse {
        success: true,
        version: env!("CARGO_PKG_VERSION").to_string(),
        git_sha: option_env!("VERGEN_GIT_SHA").map(str::to_string),
        peers: state.directory.statuses()?,
        tips: state.ledger.tips(None)?,
        all_users: state.identities.all_users()?,
        hidden_service: state.hidden_service.clone(),
        chains,
        pending_orphans: state.ledger.pending_len()?,
    }))
}

pub async fn list_peers(State(state): State<Arc<AppState>>) -> ApiResult<PeersResponse> {
    Ok(Json(PeersResponse { success: true, peers: state.directory.list()? }))
}

pub async fn add_peer(
    State(state): State<Arc<AppState>>,
    Json(record): Json<PeerRecord>,
) -> ApiResult<PeerChangeResponse> {
    let existed = state.directory.add(record)?;
    Ok(Json(PeerChangeResponse { success: true, existed }))
}

pub async fn remove_peer(
    State(state): State<Arc<AppState>>,
    Json(req): Json<PeerAddressRequest>,
) -> ApiResult<PeerChangeResponse> {
    let addr = ServiceAddress::new(req.service_url, req.port);
    if !state.directory.remove(&addr)? {
        return Err(ApiError::NotFound(format!("no peer {addr}")));
    }
    Ok(Json(PeerChangeResponse { success: true, existed: true }))
}

pub async fn make_genesis(
    State(state): State<Arc<AppState>>,
    Json(req): Json<MakeGenesisRequest>,
) -> ApiResult<GenesisResponse> {
    let key = state.identities.create(&req.nickname)?;
    let signer = state.identities.signer(&key)?;
    let report = state.ledger.author_genesis(&signer, req.msg)?;
    info!(genesis = %report.hash, %key, "chain created");
    Ok(Json(GenesisResponse { success: true, genesis: report.hash, key, group: None }))
}

pub async fn new_chain(
    State(state): State<Arc<AppState>>,
    Json(req): Json<NewChainRequest>,
) -> ApiResult<GenesisResponse> {
    let key = state.identities.create(&req.nickname)?;
    let signer = state.identities.signer(&key)?;
    let report = state.ledger.author_genesis(&signer, req.msg)?;
    match state.ledger.create_group(&req.group) {
        Ok(()) | Err(LedgerError::Group(GroupError::Exists(_))) => {}
        Err(e) => return Err(e.into()),
    }
    state.ledger.add_group_member(&req.group, report.hash)?;
    info!(genesis = %report.hash, %key, group = %req.group, "chain created in commit group");
    Ok(Json(GenesisResponse { success: true, genesis: report.hash, key, group: Some(req.group) }))
}

pub async fn append(
    State(state): State<Arc<AppState>>,
    Json(req): Json<AppendRequest>,
) -> ApiResult<AppendResponse> {
    let signer = state.identities.signer(&req.key)?;
    let report = state.ledger.author_next(&signer, req.genesis, req.msg)?;
    let height = state.ledger.get(&report.hash)?.envelope().header.height;
    Ok(Json(AppendResponse { success: true, hash: report.hash, height }))
}

pub async fn new_group(
    State(state): State<Arc<AppState>>,
    Json(req): Json<GroupNameRequest>,
) -> ApiResult<serde_json::Value> {
    state.ledger.create_group(&req.name)?;
    Ok(Json(serde_json::json!({ "success": true, "name": req.name })))
}

pub async fn add_group_member(
    State(state): State<Arc<AppState>>,
    Json(req): Json<AddMemberRequest>,
) -> ApiResult<AddMemberResponse> {
    let added = state.ledger.add_group_member(&req.group, req.genesis)?;
    Ok(Json(AddMemberResponse { success: true, added }))
}

pub async fn list_chains(State(state): State<Arc<AppState>>) -> ApiResult<ChainsResponse> {
    Ok(Json(ChainsResponse {
        success: true,
        chains: state.ledger.chains()?,
        groups: state.ledger.groups()?,
    }))
}

pub async fn query_group(
    State(state): State<Arc<AppState>>,
    Json(req): Json<GroupNameRequest>,
) -> ApiResult<GroupResponse> {
    Ok(Json(GroupResponse { success: true, group: state.ledger.query_group(&req.name)? }))
}

pub async fn snapshot(State(state): State<Arc<AppState>>) -> ApiResult<SnapshotResponse> {
    Ok(Json(SnapshotResponse { success: true, envelopes: state.ledger.snapshot()? }))
}

pub async fn push_dangerous(
    State(state): State<Arc<AppState>>,
    Json(req): Json<DangerousPushRequest>,
) -> ApiResult<InjectReport> {
    Ok(Json(state.ledger.inject_unverified(req.envelope)?))
}

pub async fn list_users(State(state): State<Arc<AppState>>) -> ApiResult<UsersResponse> {
    Ok(Json(UsersResponse { success: true, users: state.identities.all_users()? }))
}

pub async fn register_user(
    State(state): State<Arc<AppState>>,
    Json(req): Json<RegisterUserRequest>,
) -> ApiResult<serde_json::Value> {
    if req.nickname.trim().is_empty() {
        return Err(ApiError::BadRequest("empty nickname".into()));
    }
    state.identities.import(req.pubkey, &req.nickname)?;
    Ok(Json(serde_json::json!({ "success": true, "pubkey": req.pubkey })))
}

pub async fn manifest(State(state): State<Arc<AppState>>) -> ApiResult<Manifest> {
    Ok(Json(Manifest { lanes: state.ledger.lane_heads()? }))
}

pub async fn lane_range(
    State(state): State<Arc<AppState>>,
    Json(req): Json<RangeRequest>,
) -> ApiResult<RangeResponse> {
    let limit = req.limit.min(state.max_batch);
    let envelopes = state.ledger.lane_range(&req.genesis, &req.key, req.from_height, limit)?;
    Ok(Json(RangeResponse { envelopes }))
}

pub async fn receive_envelopes(
    State(state): State<Arc<AppState>>,
    Json(req): Json<PushRequest>,
) -> ApiResult<PushResponse> {
    if req.envelopes.len() > state.max_batch {
        return Err(ApiError::BadRequest(format!("at most {} envelopes per push", state.max_batch)));
    }
    let ledger = state.ledger.clone();
    let results = tokio::task::spawn_blocking(move || admit_pushed(&ledger, req.envelopes))
        .await
        .map_err(|_| ApiError::Admission)??;
    Ok(Json(PushResponse { results }))
}

pub async fn metrics(State(state): State<Arc<AppState>>) -> Result<impl IntoResponse, ApiError> {
    let body = state.metrics.render().map_err(|_| ApiError::Metrics)?;
    Ok(([(header::CONTENT_TYPE, "text/plain; version=0.0.4")], body))
}
