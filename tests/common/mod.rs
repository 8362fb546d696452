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

#![allow(dead_code)]

use attestd::core::chain::envelope::{Ancestors, Header, SealedEnvelope};
use attestd::core::chain::ledger::Ledger;
use attestd::core::security::keystore::{sign_envelope, Ed25519Signer, SignerBackend};
use attestd::core::types::{PublicKey, H256};
use attestd::monitoring::metrics::Metrics;
use std::sync::Arc;

pub struct Node {
    pub ledger: Arc<Ledger>,
    pub metrics: Arc<Metrics>,
    pub db: sled::Db,
    pub dir: tempfile::TempDir,
}

pub fn node() -> Node {
    let dir = tempfile::tempdir().unwrap();
    let db = sled::open(dir.path()).unwrap();
    let metrics = Arc::new(Metrics::new().unwrap());
    let ledger = Arc::new(Ledger::open(&db, 10_000, metrics.clone()).unwrap());
    Node { ledger, metrics, db, dir }
}

pub fn signer() -> Ed25519Signer {
    Ed25519Signer::generate().unwrap().0
}

fn seal(signer: &Ed25519Signer, ancestors: Option<Ancestors>, height: u64, msg: &[u8]) -> SealedEnvelope {
    let header = Header { key: PublicKey::from_bytes([0; 32]), ancestors, height, sent_time_ms: 0 };
    SealedEnvelope::seal(sign_envelope(signer, header, msg.to_vec()).unwrap()).unwrap()
}

/// Signed genesis, not admitted anywhere.
pub fn genesis(signer: &Ed25519Signer, msg: &[u8]) -> SealedEnvelope {
    seal(signer, None, 0, msg)
}

/// Signed non-genesis envelope, not admitted anywhere.
pub fn child(signer: &Ed25519Signer, genesis: H256, prev_msg: H256, height: u64, msg: &[u8]) -> SealedEnvelope {
    seal(signer, Some(Ancestors { prev_msg, genesis }), height, msg)
}

/// Genesis plus `len` lane envelopes by the same signer: `[g, h1, h2, ...]`.
pub fn lane(signer: &Ed25519Signer, len: u64) -> Vec<SealedEnvelope> {
    let g = genesis(signer, b"genesis");
    let gh = g.hash();
    let mut out = vec![g];
    for height in 1..=len {
        let prev = out[out.len() - 1].hash();
        out.push(child(signer, gh, prev, height, format!("m{height}").as_bytes()));
    }
    out
}

pub fn key_of(signer: &Ed25519Signer) -> PublicKey {
    signer.public_key()
}
