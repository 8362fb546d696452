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

//! Chain index: per-genesis lanes, height validation, tips and the orphan pool.
//!
//! A chain is keyed by its genesis hash and holds one lane per signer key. The genesis
//! signer's lane starts at height 0 (the genesis itself), every other lane starts at 1 with
//! the genesis as predecessor. Within a lane heights are unique and contiguous.
//!
//! Envelopes whose genesis or predecessor is not indexed yet are held as orphans keyed by the
//! missing hash and replayed as soon as that hash is admitted.

use crate::core::security::verifier::VerifiedEnvelope;
use crate::core::types::{PublicKey, H256};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet, VecDeque};
use thiserror::Error;
use tracing::warn;

/// Why an envelope conflicts with the indexed chain.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ConflictKind {
    /// Declared height is not predecessor height + 1.
    HeightGap {
        /// Height implied by the predecessor.
        expected: u64,
        /// Declared height.
        got: u64,
    },
    /// Another envelope already occupies this (genesis, key, height) slot.
    HeightReuse {
        /// Envelope already indexed at the slot.
        existing: H256,
    },
    /// Predecessor was signed by a different key and is not the genesis.
    ForeignPredecessor {
        /// Declared predecessor.
        predecessor: H256,
    },
    /// Predecessor belongs to another chain.
    WrongChain {
        /// Chain the predecessor belongs to.
        predecessor_chain: H256,
    },
    /// The lane already diverged; further envelopes on it are refused.
    DivergedLane,
}

/// Chain index errors.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ChainError {
    /// Genesis or predecessor unknown; the envelope is held until `missing` is admitted.
    #[error("envelope {hash} waits for unknown ancestor {missing}")]
    UnknownChain {
        /// Held envelope.
        hash: H256,
        /// Ancestor hash it waits for.
        missing: H256,
    },
    /// Envelope contradicts the indexed lane. Reported, never reconciled.
    #[error("height conflict for envelope {hash} on chain {genesis}: {kind:?}")]
    HeightConflict {
        /// Rejected envelope.
        hash: H256,
        /// Chain it claims.
        genesis: H256,
        /// Signer.
        key: PublicKey,
        /// Details.
        kind: ConflictKind,
    },
}

/// Successful admission.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Admission {
    /// Newly indexed, plus any orphans that became admissible as a result.
    Admitted {
        /// Admitted envelope.
        hash: H256,
        /// Orphans admitted by replay, in admission order.
        replayed: Vec<H256>,
        /// Orphans whose replay hit a conflict.
        rejected: Vec<ChainError>,
    },
    /// Already indexed; nothing changed.
    Duplicate {
        /// Envelope hash.
        hash: H256,
    },
}

impl Admission {
    /// Every hash that entered the index, in order.
    pub fn admitted_hashes(&self) -> Vec<H256> {
        match self {
            Admission::Admitted { hash, replayed, .. } => {
                let mut out = Vec::with_capacity(1 + replayed.len());
                out.push(*hash);
                out.extend_from_slice(replayed);
                out
            }
            Admission::Duplicate { .. } => Vec::new(),
        }
    }
}

/// Indexed metadata for one envelope.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexedEntry {
    /// Envelope hash.
    pub hash: H256,
    /// Chain identifier (own hash for the genesis).
    pub genesis: H256,
    /// Signer.
    pub key: PublicKey,
    /// Lane height.
    pub height: u64,
    /// Direct predecessor (none for the genesis).
    pub prev: Option<H256>,
    /// Local arrival sequence; tie-break for equal heights.
    pub arrival: u64,
}

/// Highest indexed envelope of one lane. The list of lane heads is the sync manifest.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct LaneHead {
    /// Chain.
    pub genesis: H256,
    /// Signer.
    pub key: PublicKey,
    /// Head height.
    pub height: u64,
    /// Head hash.
    pub hash: H256,
}

/// Reported conflict.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConflictRecord {
    /// Rejected envelope.
    pub hash: H256,
    /// Signer.
    pub key: PublicKey,
    /// Declared height.
    pub height: u64,
    /// Details.
    pub kind: ConflictKind,
}

/// Read-only view of one chain.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainSummary {
    /// Chain identifier.
    pub genesis: H256,
    /// Genesis signer.
    pub root_key: PublicKey,
    /// Lane heads.
    pub lanes: Vec<LaneHead>,
    /// Chain frontier.
    pub tips: Vec<H256>,
    /// Number of indexed envelopes.
    pub envelopes: usize,
    /// Conflicts reported on this chain.
    pub conflicts: Vec<ConflictRecord>,
}

#[derive(Clone, Debug)]
struct Lane {
    base: u64,
    hashes: Vec<H256>,
    diverged: bool,
}

impl Lane {
    fn new(base: u64) -> Self {
        Self { base, hashes: Vec::new(), diverged: false }
    }

    fn head(&self) -> Option<(u64, H256)> {
        let last = self.hashes.last()?;
        Some((self.base + self.hashes.len() as u64 - 1, *last))
    }

    fn at(&self, height: u64) -> Option<H256> {
        let idx = height.checked_sub(self.base)?;
        self.hashes.get(usize::try_from(idx).ok()?).copied()
    }
}

#[derive(Clone, Debug)]
struct Chain {
    root_key: PublicKey,
    lanes: BTreeMap<PublicKey, Lane>,
    tips: BTreeSet<H256>,
    conflicts: Vec<ConflictRecord>,
}

enum Reject {
    Missing(H256),
    Conflict(ConflictKind),
}

/// In-memory chain index.
#[derive(Debug)]
pub struct ChainIndex {
    chains: BTreeMap<H256, Chain>,
    entries: HashMap<H256, IndexedEntry>,
    // missing ancestor -> orphans waiting on it, in hold order
    pending: HashMap<H256, Vec<VerifiedEnvelope>>,
    pending_hashes: HashSet<H256>,
    max_pending: usize,
    next_arrival: u64,
    // refused envelopes, reported once each
    conflicted: HashMap<H256, ChainError>,
    // hashes admitted or refused since the last `take_settled`, in order
    settled: Vec<H256>,
}

impl ChainIndex {
    /// Create an empty index holding at most `max_pending` orphans.
    pub fn new(max_pending: usize) -> Self {
        Self {
            chains: BTreeMap::new(),
            entries: HashMap::new(),
            pending: HashMap::new(),
            pending_hashes: HashSet::new(),
            max_pending,
            next_arrival: 0,
            conflicted: HashMap::new(),
            settled: Vec::new(),
        }
    }

    /// Admit a verified envelope, replaying any orphans it unblocks.
    pub fn admit(&mut self, env: VerifiedEnvelope) -> Result<Admission, ChainError> {
        let hash = env.hash();
        if self.entries.contains_key(&hash) {
            return Ok(Admission::Duplicate { hash });
        }
        if let Some(err) = self.conflicted.get(&hash) {
            return Err(err.clone());
        }

        match self.admit_one(&env) {
            Ok(()) => self.settled.push(hash),
            Err(Reject::Missing(missing)) => {
                self.hold(missing, env);
                return Err(ChainError::UnknownChain { hash, missing });
            }
            Err(Reject::Conflict(kind)) => return Err(self.conflict(&env, kind)),
        }

        let mut replayed = Vec::new();
        let mut rejected = Vec::new();
        let mut work = VecDeque::from([hash]);
        while let Some(unblocked) = work.pop_front() {
            let Some(waiting) = self.pending.remove(&unblocked) else {
                continue;
            };
            for orphan in waiting {
                let oh = orphan.hash();
                self.pending_hashes.remove(&oh);
                if self.entries.contains_key(&oh) {
                    continue;
                }
                match self.admit_one(&orphan) {
                    Ok(()) => {
                        self.settled.push(oh);
                        replayed.push(oh);
                        work.push_back(oh);
                    }
                    Err(Reject::Missing(missing)) => self.hold(missing, orphan),
                    Err(Reject::Conflict(kind)) => rejected.push(self.conflict(&orphan, kind)),
                }
            }
        }

        Ok(Admission::Admitted { hash, replayed, rejected })
    }

    fn hold(&mut self, missing: H256, env: VerifiedEnvelope) {
        let hash = env.hash();
        if self.pending_hashes.contains(&hash) {
            return;
        }
        if self.pending_hashes.len() >= self.max_pending {
            warn!(%hash, %missing, limit = self.max_pending, "orphan pool full; dropping orphan from memory");
            return;
        }
        self.pending_hashes.insert(hash);
        self.pending.entry(missing).or_default().push(env);
    }

    fn conflict(&mut self, env: &VerifiedEnvelope, kind: ConflictKind) -> ChainError {
        let header = &env.envelope().header;
        let genesis = env.chain_id();
        let err = ChainError::HeightConflict {
            hash: env.hash(),
            genesis,
            key: header.key,
            kind: kind.clone(),
        };
        self.conflicted.insert(env.hash(), err.clone());
        self.settled.push(env.hash());
        if let Some(chain) = self.chains.get_mut(&genesis) {
            if let ConflictKind::HeightReuse { .. } = kind {
                if let Some(lane) = chain.lanes.get_mut(&header.key) {
                    lane.diverged = true;
                }
            }
            chain.conflicts.push(ConflictRecord {
                hash: env.hash(),
                key: header.key,
                height: header.height,
                kind,
            });
        }
        err
    }

    fn admit_one(&mut self, env: &VerifiedEnvelope) -> Result<(), Reject> {
        let hash = env.hash();
        let header = &env.envelope().header;
        let key = header.key;

        let Some(anc) = header.ancestors else {
            let mut lane = Lane::new(0);
            lane.hashes.push(hash);
            let chain = Chain {
                root_key: key,
                lanes: BTreeMap::from([(key, lane)]),
                tips: BTreeSet::from([hash]),
                conflicts: Vec::new(),
            };
            self.chains.insert(hash, chain);
            self.insert_entry(hash, hash, key, 0, None);
            return Ok(());
        };

        if !self.chains.contains_key(&anc.genesis) {
            return Err(Reject::Missing(anc.genesis));
        }
        let Some(pred) = self.entries.get(&anc.prev_msg) else {
            return Err(Reject::Missing(anc.prev_msg));
        };
        if pred.genesis != anc.genesis {
            return Err(Reject::Conflict(ConflictKind::WrongChain {
                predecessor_chain: pred.genesis,
            }));
        }
        let expected = if pred.key == key {
            pred.height + 1
        } else if pred.prev.is_none() {
            1
        } else {
            return Err(Reject::Conflict(ConflictKind::ForeignPredecessor {
                predecessor: anc.prev_msg,
            }));
        };
        if header.height != expected {
            return Err(Reject::Conflict(ConflictKind::HeightGap {
                expected,
                got: header.height,
            }));
        }

        let chain = self
            .chains
            .get_mut(&anc.genesis)
            .ok_or(Reject::Missing(anc.genesis))?;
        let lane = chain.lanes.entry(key).or_insert_with(|| Lane::new(1));
        if lane.diverged {
            return Err(Reject::Conflict(ConflictKind::DivergedLane));
        }
        if let Some(existing) = lane.at(header.height) {
            return Err(Reject::Conflict(ConflictKind::HeightReuse { existing }));
        }
        lane.hashes.push(hash);
        chain.tips.remove(&anc.prev_msg);
        chain.tips.insert(hash);
        self.insert_entry(hash, anc.genesis, key, header.height, Some(anc.prev_msg));
        Ok(())
    }

    fn insert_entry(&mut self, hash: H256, genesis: H256, key: PublicKey, height: u64, prev: Option<H256>) {
        let arrival = self.next_arrival;
        self.next_arrival += 1;
        self.entries
            .insert(hash, IndexedEntry { hash, genesis, key, height, prev, arrival });
    }

    fn order_key(&self, h: &H256) -> (u64, u64) {
        self.entries.get(h).map(|e| (e.height, e.arrival)).unwrap_or((u64::MAX, u64::MAX))
    }

    fn sorted(&self, mut hashes: Vec<H256>) -> Vec<H256> {
        hashes.sort_by_key(|h| self.order_key(h));
        hashes
    }

    /// Frontier, globally or for one chain, ordered by height then local arrival.
    pub fn tips(&self, genesis: Option<&H256>) -> Vec<H256> {
        let hashes: Vec<H256> = match genesis {
            Some(g) => self
                .chains
                .get(g)
                .map(|c| c.tips.iter().copied().collect())
                .unwrap_or_default(),
            None => self.chains.values().flat_map(|c| c.tips.iter().copied()).collect(),
        };
        self.sorted(hashes)
    }

    /// Head of every non-empty lane.
    pub fn lane_heads(&self) -> Vec<LaneHead> {
        let mut out = Vec::new();
        for (genesis, chain) in self.chains.iter() {
            out.extend(Self::chain_lane_heads(genesis, chain));
        }
        out
    }

    fn chain_lane_heads(genesis: &H256, chain: &Chain) -> Vec<LaneHead> {
        chain
            .lanes
            .iter()
            .filter_map(|(key, lane)| {
                lane.head().map(|(height, hash)| LaneHead { genesis: *genesis, key: *key, height, hash })
            })
            .collect()
    }

    /// Head (height, hash) of one lane.
    pub fn lane_head(&self, genesis: &H256, key: &PublicKey) -> Option<(u64, H256)> {
        self.chains.get(genesis)?.lanes.get(key)?.head()
    }

    /// Lane entries with height >= `from_height`, at most `limit`.
    pub fn lane_range(&self, genesis: &H256, key: &PublicKey, from_height: u64, limit: usize) -> Vec<H256> {
        let Some(lane) = self.chains.get(genesis).and_then(|c| c.lanes.get(key)) else {
            return Vec::new();
        };
        let skip = from_height.saturating_sub(lane.base);
        let skip = usize::try_from(skip).unwrap_or(usize::MAX);
        lane.hashes.iter().skip(skip).take(limit).copied().collect()
    }

    /// Every indexed envelope of a chain, ordered by height then arrival.
    pub fn chain_hashes(&self, genesis: &H256) -> Option<Vec<H256>> {
        let chain = self.chains.get(genesis)?;
        let all = chain.lanes.values().flat_map(|l| l.hashes.iter().copied()).collect();
        Some(self.sorted(all))
    }

    /// Summary of every chain.
    pub fn chains(&self) -> Vec<ChainSummary> {
        self.chains
            .iter()
            .map(|(genesis, chain)| ChainSummary {
                genesis: *genesis,
                root_key: chain.root_key,
                lanes: Self::chain_lane_heads(genesis, chain),
                tips: self.sorted(chain.tips.iter().copied().collect()),
                envelopes: chain.lanes.values().map(|l| l.hashes.len()).sum(),
                conflicts: chain.conflicts.clone(),
            })
            .collect()
    }

    /// Number of chains.
    pub fn chain_count(&self) -> usize {
        self.chains.len()
    }

    /// True if `genesis` roots an indexed chain.
    pub fn has_chain(&self, genesis: &H256) -> bool {
        self.chains.contains_key(genesis)
    }

    /// Metadata for an indexed envelope.
    pub fn entry(&self, hash: &H256) -> Option<&IndexedEntry> {
        self.entries.get(hash)
    }

    /// True if indexed.
    pub fn contains(&self, hash: &H256) -> bool {
        self.entries.contains_key(hash)
    }

    /// True if the envelope was refused with a height conflict.
    pub fn is_conflicted(&self, hash: &H256) -> bool {
        self.conflicted.contains_key(hash)
    }

    /// Drain the hashes that reached a final outcome (indexed or refused) since the last
    /// call, in the order the index settled them. Replaying them in this order through
    /// `admit` rebuilds the same index, conflicts and diverged lanes included.
    pub fn take_settled(&mut self) -> Vec<H256> {
        std::mem::take(&mut self.settled)
    }

    /// True if held as an orphan.
    pub fn is_pending(&self, hash: &H256) -> bool {
        self.pending_hashes.contains(hash)
    }

    /// Number of orphans held.
    pub fn pending_len(&self) -> usize {
        self.pending_hashes.len()
    }

    /// Number of indexed envelopes.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True when nothing is indexed.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
