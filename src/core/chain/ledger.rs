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

//! Ledger: the admission pipeline (verify -> store -> index) and the read side.
//!
//! Admission is serialized per chain: `put` + `admit` for one genesis run under that chain's
//! lock, so heights on a lane are assigned in a strict order. Different chains admit in
//! parallel. The index itself sits behind a `RwLock` whose write section covers exactly one
//! `admit` call plus the append of its settled hashes to the arrivals log, so readers never
//! observe a half-admitted envelope and a restart replays admissions and refusals in the
//! order they happened. Store syncs happen once per `submit`/`submit_batch` call.

use crate::core::chain::envelope::{Ancestors, Envelope, EnvelopeError, Header, SealedEnvelope};
use crate::core::chain::groups::{CommitGroup, CommitGroupRegistry, GroupError};
use crate::core::chain::index::{Admission, ChainError, ChainIndex, ChainSummary, LaneHead};
use crate::core::security::keystore::{sign_envelope, KeystoreError, SignerBackend};
use crate::core::security::verifier::{verify, VerifiedEnvelope, VerifyError};
use crate::core::state::message_store::{MessageStore, StoreError};
use crate::core::types::{now_ms, CanonicalMap, PublicKey, H256};
use crate::monitoring::metrics::Metrics;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, RwLock};
use thiserror::Error;
use tracing::{debug, info, warn};

/// Ledger errors. Mirrors the node-wide error taxonomy.
#[derive(Debug, Error)]
pub enum LedgerError {
    /// Structurally invalid envelope.
    #[error(transparent)]
    Malformed(#[from] EnvelopeError),
    /// Signature does not match `header.key`.
    #[error("invalid signature on envelope {hash}")]
    InvalidSignature {
        /// Envelope hash.
        hash: H256,
    },
    /// Orphan held or height conflict.
    #[error(transparent)]
    Chain(#[from] ChainError),
    /// Storage failure or missing envelope.
    #[error(transparent)]
    Store(#[from] StoreError),
    /// Commit group failure.
    #[error(transparent)]
    Group(#[from] GroupError),
    /// Identity / signing failure.
    #[error(transparent)]
    Keystore(#[from] KeystoreError),
    /// Chain not indexed.
    #[error("chain {0} not indexed")]
    UnknownGenesis(H256),
    /// A lock was poisoned by a panicking writer.
    #[error("ledger state lock poisoned")]
    Poisoned,
}

impl From<VerifyError> for LedgerError {
    fn from(e: VerifyError) -> Self {
        match e {
            VerifyError::Malformed(m) => LedgerError::Malformed(m),
            VerifyError::InvalidSignature { hash } => LedgerError::InvalidSignature { hash },
        }
    }
}

/// Outcome of a successful submission.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AdmitReport {
    /// Envelope hash.
    pub hash: H256,
    /// False if the store already held these bytes.
    pub is_new: bool,
    /// Index outcome.
    pub admission: Admission,
}

/// One entry of `Ledger::submit_batch`: the envelope hash and its admission result.
pub type BatchOutcome = (H256, Result<AdmitReport, LedgerError>);

/// Outcome of a raw injection.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct InjectReport {
    /// Envelope hash.
    pub hash: H256,
    /// False if the store already held these bytes.
    pub is_new: bool,
    /// Whether the envelope is in the chain index after the injection.
    pub indexed: bool,
    /// Why it is not indexed, if it is not.
    pub detail: Option<String>,
}

/// Shared ledger.
pub struct Ledger {
    store: MessageStore,
    groups: CommitGroupRegistry,
    index: RwLock<ChainIndex>,
    chain_locks: Mutex<HashMap<H256, Arc<Mutex<()>>>>,
    metrics: Arc<Metrics>,
}

impl Ledger {
    /// Open store trees inside `db` and rebuild the chain index from them.
    pub fn open(db: &sled::Db, max_orphans: usize, metrics: Arc<Metrics>) -> Result<Self, LedgerError> {
        let ledger = Self {
            store: MessageStore::open(db)?,
            groups: CommitGroupRegistry::open(db)?,
            index: RwLock::new(ChainIndex::new(max_orphans)),
            chain_locks: Mutex::new(HashMap::new()),
            metrics,
        };
        ledger.rebuild()?;
        Ok(ledger)
    }

    /// Replay the admission log first so admissions and refusals resolve exactly as they did
    /// before the restart, then offer the remaining validated envelopes (orphans).
    fn rebuild(&self) -> Result<(), LedgerError> {
        let mut seen = HashSet::new();
        let mut idx = self.index.write().map_err(|_| LedgerError::Poisoned)?;
        for hash in self.store.arrivals()? {
            if !seen.insert(hash) {
                continue;
            }
            if let Ok(v) = verify(self.store.get(&hash)?) {
                let _ = idx.admit(v);
            }
        }
        // already in the log
        idx.take_settled();

        for hash in self.store.validated_hashes()? {
            if seen.contains(&hash) {
                continue;
            }
            let Ok(v) = verify(self.store.get(&hash)?) else { continue };
            let _ = idx.admit(v);
        }
        self.store.record_arrivals(&idx.take_settled())?;
        self.store.flush()?;
        self.metrics.orphans_pending.set(idx.pending_len() as i64);
        self.metrics.chains_total.set(idx.chain_count() as i64);
        info!(indexed = idx.len(), pending = idx.pending_len(), "chain index rebuilt");
        Ok(())
    }

    fn chain_lock(&self, chain: H256) -> Result<Arc<Mutex<()>>, LedgerError> {
        let mut locks = self.chain_locks.lock().map_err(|_| LedgerError::Poisoned)?;
        Ok(locks.entry(chain).or_default().clone())
    }

    /// Verify, persist and index an envelope. The store is synced before returning.
    pub fn submit(&self, sealed: SealedEnvelope) -> Result<AdmitReport, LedgerError> {
        let result = self.submit_unsynced(sealed);
        self.store.flush()?;
        result
    }

    /// Submit envelopes in the given order and sync the store once at the end.
    /// Per-envelope outcomes are returned in input order; only a failed sync fails the batch.
    pub fn submit_batch(&self, batch: Vec<SealedEnvelope>) -> Result<Vec<BatchOutcome>, LedgerError> {
        let outcomes = batch
            .into_iter()
            .map(|sealed| {
                let hash = sealed.hash();
                (hash, self.submit_unsynced(sealed))
            })
            .collect();
        self.store.flush()?;
        Ok(outcomes)
    }

    fn submit_unsynced(&self, sealed: SealedEnvelope) -> Result<AdmitReport, LedgerError> {
        let verified = verify(sealed).map_err(|e| {
            match &e {
                VerifyError::InvalidSignature { hash } => {
                    self.metrics.invalid_signatures_total.inc();
                    warn!(%hash, "rejected envelope with invalid signature");
                }
                VerifyError::Malformed(_) => self.metrics.malformed_total.inc(),
            }
            LedgerError::from(e)
        })?;
        let lock = self.chain_lock(verified.chain_id())?;
        let _guard = lock.lock().map_err(|_| LedgerError::Poisoned)?;
        self.admit_locked(verified)
    }

    /// Caller holds the chain lock for `env.chain_id()`.
    fn admit_locked(&self, env: VerifiedEnvelope) -> Result<AdmitReport, LedgerError> {
        let hash = env.hash();
        // a failed put leaves the index untouched
        let put = self.store.put(&env)?;

        let (result, repeat, pending, chains) = {
            let mut idx = self.index.write().map_err(|_| LedgerError::Poisoned)?;
            let repeat = idx.is_conflicted(&hash);
            let r = idx.admit(env);
            // logged under the write lock so the log order is the index order across chains
            self.store.record_arrivals(&idx.take_settled())?;
            (r, repeat, idx.pending_len(), idx.chain_count())
        };
        self.metrics.orphans_pending.set(pending as i64);
        self.metrics.chains_total.set(chains as i64);

        match result {
            Ok(admission) => {
                let admitted = admission.admitted_hashes();
                if admitted.is_empty() {
                    self.metrics.envelopes_duplicate_total.inc();
                } else {
                    self.metrics.envelopes_admitted_total.inc_by(admitted.len() as u64);
                }
                if let Admission::Admitted { replayed, rejected, .. } = &admission {
                    if !replayed.is_empty() {
                        debug!(%hash, replayed = replayed.len(), "orphans replayed");
                    }
                    for err in rejected {
                        self.metrics.height_conflicts_total.inc();
                        warn!(%hash, error = %err, "orphan replay rejected");
                    }
                }
                Ok(AdmitReport { hash, is_new: put.is_new, admission })
            }
            Err(err) => {
                match &err {
                    ChainError::UnknownChain { missing, .. } => {
                        debug!(%hash, %missing, "envelope held as orphan");
                    }
                    ChainError::HeightConflict { genesis, kind, .. } if repeat => {
                        debug!(%hash, %genesis, ?kind, "known conflict resubmitted");
                    }
                    ChainError::HeightConflict { genesis, kind, .. } => {
                        self.metrics.height_conflicts_total.inc();
                        warn!(%hash, %genesis, ?kind, "height conflict reported");
                    }
                }
                Err(err.into())
            }
        }
    }

    /// Operator escape hatch: persist an envelope without verifying it first, then try the
    /// normal verified admission. The bytes stay in the store even if verification fails.
    pub fn inject_unverified(&self, envelope: Envelope) -> Result<InjectReport, LedgerError> {
        let sealed = SealedEnvelope::seal(envelope)?;
        let put = self.store.put_unverified(&sealed)?;
        warn!(hash = %put.hash, is_new = put.is_new, "raw envelope injected");
        let (indexed, detail) = match self.submit(sealed) {
            Ok(_) => (true, None),
            Err(e) => (false, Some(e.to_string())),
        };
        Ok(InjectReport { hash: put.hash, is_new: put.is_new, indexed, detail })
    }

    /// Sign and admit a new genesis envelope.
    pub fn author_genesis(&self, signer: &dyn SignerBackend, msg: Vec<u8>) -> Result<AdmitReport, LedgerError> {
        let header = Header { key: signer.public_key(), ancestors: None, height: 0, sent_time_ms: now_ms() };
        let sealed = SealedEnvelope::seal(sign_envelope(signer, header, msg)?)?;
        self.submit(sealed)
    }

    /// Sign and admit the next envelope of the signer's lane on `genesis`.
    pub fn author_next(
        &self,
        signer: &dyn SignerBackend,
        genesis: H256,
        msg: Vec<u8>,
    ) -> Result<AdmitReport, LedgerError> {
        let key = signer.public_key();
        let lock = self.chain_lock(genesis)?;
        let _guard = lock.lock().map_err(|_| LedgerError::Poisoned)?;

        let (prev_msg, height) = {
            let idx = self.index.read().map_err(|_| LedgerError::Poisoned)?;
            if !idx.has_chain(&genesis) {
                return Err(LedgerError::UnknownGenesis(genesis));
            }
            match idx.lane_head(&genesis, &key) {
                Some((h, hash)) => (hash, h + 1),
                None => (genesis, 1),
            }
        };
        let header = Header {
            key,
            ancestors: Some(Ancestors { prev_msg, genesis }),
            height,
            sent_time_ms: now_ms(),
        };
        let sealed = SealedEnvelope::seal(sign_envelope(signer, header, msg)?)?;
        let verified = verify(sealed)?;
        let result = self.admit_locked(verified);
        self.store.flush()?;
        result
    }

    /// Envelope by hash.
    pub fn get(&self, hash: &H256) -> Result<SealedEnvelope, LedgerError> {
        Ok(self.store.get(hash)?)
    }

    /// True if the store holds the hash.
    pub fn contains(&self, hash: &H256) -> Result<bool, LedgerError> {
        Ok(self.store.contains(hash)?)
    }

    /// True if the hash is indexed.
    pub fn is_indexed(&self, hash: &H256) -> Result<bool, LedgerError> {
        Ok(self.index.read().map_err(|_| LedgerError::Poisoned)?.contains(hash))
    }

    /// True if the envelope was refused with a height conflict.
    pub fn is_conflicted(&self, hash: &H256) -> Result<bool, LedgerError> {
        Ok(self.index.read().map_err(|_| LedgerError::Poisoned)?.is_conflicted(hash))
    }

    /// True if the hash is held as an orphan.
    pub fn is_pending(&self, hash: &H256) -> Result<bool, LedgerError> {
        Ok(self.index.read().map_err(|_| LedgerError::Poisoned)?.is_pending(hash))
    }

    /// Number of orphans held.
    pub fn pending_len(&self) -> Result<usize, LedgerError> {
        Ok(self.index.read().map_err(|_| LedgerError::Poisoned)?.pending_len())
    }

    /// Tips, globally or for one chain.
    pub fn tips(&self, genesis: Option<&H256>) -> Result<Vec<H256>, LedgerError> {
        Ok(self.index.read().map_err(|_| LedgerError::Poisoned)?.tips(genesis))
    }

    /// Sync manifest.
    pub fn lane_heads(&self) -> Result<Vec<LaneHead>, LedgerError> {
        Ok(self.index.read().map_err(|_| LedgerError::Poisoned)?.lane_heads())
    }

    /// Lane envelopes from `from_height`, at most `limit`.
    pub fn lane_range(
        &self,
        genesis: &H256,
        key: &PublicKey,
        from_height: u64,
        limit: usize,
    ) -> Result<Vec<Envelope>, LedgerError> {
        let hashes = self
            .index
            .read()
            .map_err(|_| LedgerError::Poisoned)?
            .lane_range(genesis, key, from_height, limit);
        hashes
            .iter()
            .map(|h| Ok(self.store.get(h)?.into_envelope()))
            .collect()
    }

    /// Chain summaries.
    pub fn chains(&self) -> Result<Vec<ChainSummary>, LedgerError> {
        Ok(self.index.read().map_err(|_| LedgerError::Poisoned)?.chains())
    }

    /// Every stored envelope. Expensive.
    pub fn snapshot(&self) -> Result<CanonicalMap<H256, Envelope>, LedgerError> {
        Ok(self.store.snapshot()?)
    }

    /// Create a commit group.
    pub fn create_group(&self, name: &str) -> Result<(), LedgerError> {
        self.groups.create(name)?;
        info!(group = name, "commit group created");
        Ok(())
    }

    /// Add an indexed chain to a group. Returns false if it was already a member.
    pub fn add_group_member(&self, name: &str, genesis: H256) -> Result<bool, LedgerError> {
        if !self.index.read().map_err(|_| LedgerError::Poisoned)?.has_chain(&genesis) {
            return Err(LedgerError::UnknownGenesis(genesis));
        }
        let added = self.groups.add_member(name, genesis)?;
        if added {
            info!(group = name, %genesis, "chain added to commit group");
        }
        Ok(added)
    }

    /// Group names.
    pub fn groups(&self) -> Result<Vec<String>, LedgerError> {
        Ok(self.groups.list()?)
    }

    /// Materialise a group from the current store and index.
    pub fn query_group(&self, name: &str) -> Result<CommitGroup, LedgerError> {
        let rec = self.groups.record(name)?;
        let member_hashes: Vec<(H256, Vec<H256>)> = {
            let idx = self.index.read().map_err(|_| LedgerError::Poisoned)?;
            rec.members
                .iter()
                .map(|g| (*g, idx.chain_hashes(g).unwrap_or_default()))
                .collect()
        };

        let mut members = Vec::with_capacity(member_hashes.len());
        let mut all_msgs = CanonicalMap::new();
        for (genesis, hashes) in member_hashes {
            members.push(self.store.get(&genesis)?.into_envelope());
            for h in hashes {
                all_msgs.insert(h, self.store.get(&h)?.into_envelope());
            }
        }
        Ok(CommitGroup { name: rec.name, members, all_msgs })
    }
}
