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

//! HTTP surface: the operator control API and the peer replication endpoints.

pub mod handlers;
pub mod models;

use crate::core::chain::groups::GroupError;
use crate::core::chain::index::ChainError;
use crate::core::chain::ledger::{Ledger, LedgerError};
use crate::core::security::keystore::{IdentityStore, KeystoreError};
use crate::core::state::message_store::StoreError;
use crate::core::types::ServiceAddress;
use crate::monitoring::metrics::Metrics;
use crate::networking::peer_directory::{DirectoryError, PeerDirectory};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, warn};

/// Shared handler state.
pub struct AppState {
    pub ledger: Arc<Ledger>,
    pub directory: Arc<PeerDirectory>,
    pub identities: IdentityStore,
    pub metrics: Arc<Metrics>,
    pub hidden_service: Option<ServiceAddress>,
    /// Cap on lane range responses.
    pub max_batch: usize,
}

/// Handler errors, rendered as `{"success": false, "error": ...}`.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error(transparent)]
    Ledger(#[from] LedgerError),
    #[error(transparent)]
    Directory(#[from] DirectoryError),
    #[error(transparent)]
    Keystore(#[from] KeystoreError),
    #[error("{0}")]
    BadRequest(String),
    #[error("{0}")]
    NotFound(String),
    #[error("metrics encoding failed")]
    Metrics,
    #[error("admission task failed")]
    Admission,
}

fn keystore_status(e: &KeystoreError) -> StatusCode {
    match e {
        KeystoreError::UnknownIdentity(_) => StatusCode::NOT_FOUND,
        KeystoreError::NoPrivateKey(_) | KeystoreError::InvalidKey => StatusCode::BAD_REQUEST,
        KeystoreError::Io => StatusCode::SERVICE_UNAVAILABLE,
        KeystoreError::Crypto | KeystoreError::Codec => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::Ledger(e) => match e {
                LedgerError::Malformed(_) | LedgerError::InvalidSignature { .. } => StatusCode::BAD_REQUEST,
                LedgerError::Chain(ChainError::UnknownChain { .. }) => StatusCode::ACCEPTED,
                LedgerError::Chain(ChainError::HeightConflict { .. }) => StatusCode::CONFLICT,
                LedgerError::Store(StoreError::NotFound(_)) => StatusCode::NOT_FOUND,
                LedgerError::Store(_) => StatusCode::SERVICE_UNAVAILABLE,
                LedgerError::Group(GroupError::Exists(_)) => StatusCode::CONFLICT,
                LedgerError::Group(GroupError::NotFound(_)) => StatusCode::NOT_FOUND,
                LedgerError::Group(GroupError::InvalidName) => StatusCode::BAD_REQUEST,
                LedgerError::Group(_) => StatusCode::SERVICE_UNAVAILABLE,
                LedgerError::Keystore(k) => keystore_status(k),
                LedgerError::UnknownGenesis(_) => StatusCode::NOT_FOUND,
                LedgerError::Poisoned => StatusCode::INTERNAL_SERVER_ERROR,
            },
            ApiError::Directory(DirectoryError::Invalid(_)) => StatusCode::BAD_REQUEST,
            ApiError::Directory(_) => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::Keystore(k) => keystore_status(k),
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Metrics | ApiError::Admission => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            warn!(status = status.as_u16(), error = %self, "request failed");
        } else {
            debug!(status = status.as_u16(), error = %self, "request refused");
        }
        let body = Json(serde_json::json!({ "success": false, "error": self.to_string() }));
        (status, body).into_response()
    }
}

/// Control API plus peer protocol.
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/status", get(handlers::status))
        .route("/service", post(handlers::add_peer))
        .route(
            "/peer",
            get(handlers::list_peers).post(handlers::add_peer).delete(handlers::remove_peer),
        )
        .route("/make_genesis", post(handlers::make_genesis))
        .route("/attestation_chain", get(handlers::list_chains))
        .route("/attestation_chain/new", post(handlers::new_chain))
        .route("/attestation_chain/append", post(handlers::append))
        .route("/attestation_chain/commit_group/new", post(handlers::new_group))
        .route("/attestation_chain/commit_group/add_member", post(handlers::add_group_member))
        .route("/chain_commit_groups", post(handlers::query_group))
        .route("/expensive_db_snapshot", get(handlers::snapshot))
        .route("/push_message_dangerous", post(handlers::push_dangerous))
        .route("/users", get(handlers::list_users).post(handlers::register_user))
        .route("/tips", get(handlers::manifest))
        .route("/envelopes/range", post(handlers::lane_range))
        .route("/envelopes", post(handlers::receive_envelopes))
        .route("/metrics", get(handlers::metrics))
        .with_state(state)
}
