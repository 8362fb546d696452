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
#![warn(missing_docs)]

//! Content-addressed envelope persistence using sled.
//!
//! Trees:
//! - `envelopes`: hash -> canonical envelope bytes (verified or not)
//! - `validated`: hash -> () for envelopes that passed signature verification
//! - `arrivals`:  seq (u64 BE) -> hash, the order in which the chain index admitted or refused them
//!
//! Writes are not synced individually; callers batch them and call [`MessageStore::flush`].

use crate::core::chain::envelope::{Envelope, SealedEnvelope};
use crate::core::security::verifier::VerifiedEnvelope;
use crate::core::types::{CanonicalMap, H256};
use thiserror::Error;

/// Store errors.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Storage-layer I/O failure.
    #[error("store unavailable during {op}")]
    Unavailable {
        /// Operation that failed.
        op: &'static str,
    },
    /// No envelope with this hash.
    #[error("envelope {0} not found")]
    NotFound(H256),
    /// Stored bytes no longer decode.
    #[error("stored envelope {0} is corrupt")]
    Corrupt(H256),
}

fn unavailable(op: &'static str) -> impl FnOnce(sled::Error) -> StoreError {
    move |_| StoreError::Unavailable { op }
}

fn hash_from_key(k: &[u8]) -> Option<H256> {
    let arr: [u8; 32] = k.try_into().ok()?;
    Some(H256::from_bytes(arr))
}

/// Result of a `put`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PutOutcome {
    /// Content address.
    pub hash: H256,
    /// False if the hash was already stored.
    pub is_new: bool,
}

/// Persistent message store.
#[derive(Clone)]
pub struct MessageStore {
    db: sled::Db,
    envelopes: sled::Tree,
    validated: sled::Tree,
    arrivals: sled::Tree,
}

impl MessageStore {
    /// Open the store trees inside an existing sled DB.
    pub fn open(db: &sled::Db) -> Result<Self, StoreError> {
        Ok(Self {
            db: db.clone(),
            envelopes: db.open_tree("envelopes").map_err(unavailable("open"))?,
            validated: db.open_tree("validated").map_err(unavailable("open"))?,
            arrivals: db.open_tree("arrivals").map_err(unavailable("open"))?,
        })
    }

    fn insert_bytes(&self, sealed: &SealedEnvelope) -> Result<bool, StoreError> {
        let key = sealed.hash();
        let swapped = self
            .envelopes
            .compare_and_swap(key.as_bytes(), None as Option<&[u8]>, Some(sealed.bytes()))
            .map_err(unavailable("put"))?;
        Ok(swapped.is_ok())
    }

    /// Store a verified envelope. Idempotent: a known hash returns `is_new = false`.
    pub fn put(&self, env: &VerifiedEnvelope) -> Result<PutOutcome, StoreError> {
        let is_new = self.insert_bytes(env)?;
        self.validated
            .insert(env.hash().as_bytes(), &[] as &[u8])
            .map_err(unavailable("put"))?;
        Ok(PutOutcome { hash: env.hash(), is_new })
    }

    /// Store raw bytes without marking them validated.
    pub fn put_unverified(&self, sealed: &SealedEnvelope) -> Result<PutOutcome, StoreError> {
        let is_new = self.insert_bytes(sealed)?;
        Ok(PutOutcome { hash: sealed.hash(), is_new })
    }

    /// Sync every tree to disk.
    pub fn flush(&self) -> Result<(), StoreError> {
        self.db.flush().map_err(unavailable("flush"))?;
        Ok(())
    }

    /// Fetch by hash.
    pub fn get(&self, hash: &H256) -> Result<SealedEnvelope, StoreError> {
        let raw = self
            .envelopes
            .get(hash.as_bytes())
            .map_err(unavailable("get"))?
            .ok_or(StoreError::NotFound(*hash))?;
        SealedEnvelope::decode(&raw).map_err(|_| StoreError::Corrupt(*hash))
    }

    /// True if the hash is stored (verified or not).
    pub fn contains(&self, hash: &H256) -> Result<bool, StoreError> {
        self.envelopes.contains_key(hash.as_bytes()).map_err(unavailable("contains"))
    }

    /// True if the hash passed signature verification.
    pub fn is_validated(&self, hash: &H256) -> Result<bool, StoreError> {
        self.validated.contains_key(hash.as_bytes()).map_err(unavailable("contains"))
    }

    /// Number of stored envelopes.
    pub fn len(&self) -> usize {
        self.envelopes.len()
    }

    /// True when nothing is stored.
    pub fn is_empty(&self) -> bool {
        self.envelopes.is_empty()
    }

    /// Full point-in-time read of every stored envelope. O(n); not for the hot path.
    pub fn snapshot(&self) -> Result<CanonicalMap<H256, Envelope>, StoreError> {
        let mut out = CanonicalMap::new();
        for item in self.envelopes.iter() {
            let (k, v) = item.map_err(unavailable("snapshot"))?;
            let Some(hash) = hash_from_key(&k) else {
                continue;
            };
            let sealed = SealedEnvelope::decode(&v).map_err(|_| StoreError::Corrupt(hash))?;
            out.insert(hash, sealed.into_envelope());
        }
        Ok(out)
    }

    /// Hashes that passed signature verification, in key order. Raw injections that
    /// never verified are not listed.
    pub fn validated_hashes(&self) -> Result<Vec<H256>, StoreError> {
        let mut out = Vec::new();
        for item in self.validated.iter() {
            let (k, _) = item.map_err(unavailable("scan"))?;
            if let Some(h) = hash_from_key(&k) {
                out.push(h);
            }
        }
        Ok(out)
    }

    /// Append hashes to the admission log.
    pub fn record_arrivals(&self, hashes: &[H256]) -> Result<(), StoreError> {
        for h in hashes {
            let seq = self.db.generate_id().map_err(unavailable("arrivals"))?;
            self.arrivals
                .insert(seq.to_be_bytes(), h.as_bytes().as_slice())
                .map_err(unavailable("arrivals"))?;
        }
        Ok(())
    }

    /// Admission log in order.
    pub fn arrivals(&self) -> Result<Vec<H256>, StoreError> {
        let mut out = Vec::new();
        for item in self.arrivals.iter() {
            let (_k, v) = item.map_err(unavailable("arrivals"))?;
            if let Some(h) = hash_from_key(&v) {
                out.push(h);
            }
        }
        Ok(out)
    }
}
