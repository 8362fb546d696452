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

//! Commit group registry: named, add-only sets of chains.
//!
//! Groups are persisted in the `groups` sled tree (name -> `GroupRecord`). Writers use
//! compare-and-swap so concurrent `add_member` calls never lose an update.

use crate::core::chain::envelope::Envelope;
use crate::core::types::{decode_canonical_limited, encode_canonical, CanonicalMap, H256};
use serde::{Deserialize, Serialize};
use thiserror::Error;

const MAX_GROUP_RECORD_BYTES: usize = 4 * 1024 * 1024;

/// Registry errors.
#[derive(Debug, Error)]
pub enum GroupError {
    /// A group with this name is already registered.
    #[error("commit group {0:?} already exists")]
    Exists(String),
    /// No group with this name.
    #[error("commit group {0:?} not found")]
    NotFound(String),
    /// Name is empty after trimming.
    #[error("invalid group name")]
    InvalidName,
    /// sled failure.
    #[error("group store io")]
    Io,
    /// Stored record does not decode.
    #[error("group record codec")]
    Codec,
}

/// Persisted group: the member chains by genesis hash, in insertion order.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupRecord {
    /// Group name.
    pub name: String,
    /// Member chain identifiers.
    pub members: Vec<H256>,
}

/// Materialised group as returned by `query`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitGroup {
    /// Group name.
    pub name: String,
    /// Representative envelope (genesis) of every member chain.
    pub members: Vec<Envelope>,
    /// Union of every member chain's known envelopes.
    pub all_msgs: CanonicalMap<H256, Envelope>,
}

/// Persistent registry.
#[derive(Clone)]
pub struct CommitGroupRegistry {
    tree: sled::Tree,
}

impl CommitGroupRegistry {
    /// Open the `groups` tree.
    pub fn open(db: &sled::Db) -> Result<Self, GroupError> {
        let tree = db.open_tree("groups").map_err(|_| GroupError::Io)?;
        Ok(Self { tree })
    }

    /// Create an empty group.
    pub fn create(&self, name: &str) -> Result<(), GroupError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(GroupError::InvalidName);
        }
        let rec = GroupRecord { name: name.to_string(), members: Vec::new() };
        let bytes = encode_canonical(&rec).map_err(|_| GroupError::Codec)?;
        let swapped = self
            .tree
            .compare_and_swap(name.as_bytes(), None as Option<&[u8]>, Some(bytes))
            .map_err(|_| GroupError::Io)?;
        if swapped.is_err() {
            return Err(GroupError::Exists(name.to_string()));
        }
        self.tree.flush().map_err(|_| GroupError::Io)?;
        Ok(())
    }

    /// Append a member chain. Returns false if it was already a member.
    pub fn add_member(&self, name: &str, genesis: H256) -> Result<bool, GroupError> {
        let name = name.trim();
        loop {
            let current = self
                .tree
                .get(name.as_bytes())
                .map_err(|_| GroupError::Io)?
                .ok_or_else(|| GroupError::NotFound(name.to_string()))?;
            let mut rec: GroupRecord = decode_canonical_limited(&current, MAX_GROUP_RECORD_BYTES)
                .map_err(|_| GroupError::Codec)?;
            if rec.members.contains(&genesis) {
                return Ok(false);
            }
            rec.members.push(genesis);
            let bytes = encode_canonical(&rec).map_err(|_| GroupError::Codec)?;
            let swapped = self
                .tree
                .compare_and_swap(name.as_bytes(), Some(&current), Some(bytes))
                .map_err(|_| GroupError::Io)?;
            if swapped.is_ok() {
                self.tree.flush().map_err(|_| GroupError::Io)?;
                return Ok(true);
            }
            // lost a race with another writer; re-read
        }
    }

    /// Stored record for a group.
    pub fn record(&self, name: &str) -> Result<GroupRecord, GroupError> {
        let name = name.trim();
        let raw = self
            .tree
            .get(name.as_bytes())
            .map_err(|_| GroupError::Io)?
            .ok_or_else(|| GroupError::NotFound(name.to_string()))?;
        decode_canonical_limited(&raw, MAX_GROUP_RECORD_BYTES).map_err(|_| GroupError::Codec)
    }

    /// All group names in order.
    pub fn list(&self) -> Result<Vec<String>, GroupError> {
        let mut out = Vec::new();
        for item in self.tree.iter() {
            let (k, _v) = item.map_err(|_| GroupError::Io)?;
            out.push(String::from_utf8_lossy(&k).into_owned());
        }
        Ok(out)
    }
}
