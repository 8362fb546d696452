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

//! Peer directory.
//!
//! Peer records are persisted in the sled `peers` tree keyed by `host:port`, so adding a
//! record for an existing address replaces it. Task health is runtime state and lives in
//! memory only.

use crate::core::types::{decode_canonical_limited, encode_canonical, PeerRecord, ServiceAddress};
use crate::monitoring::metrics::Metrics;
use crate::networking::peer_health::{DirectionHealth, TaskKind};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use thiserror::Error;
use tracing::info;

const MAX_RECORD_BYTES: usize = 4096;

/// Peer directory errors.
#[derive(Debug, Error)]
pub enum DirectoryError {
    /// Backing store failure.
    #[error("peer store unavailable during {op}")]
    Unavailable {
        /// Failed operation.
        op: &'static str,
    },
    /// Stored record cannot be decoded.
    #[error("corrupt peer record for {0}")]
    Corrupt(String),
    /// Record rejected before storing.
    #[error("invalid peer record: {0}")]
    Invalid(&'static str),
}

/// One replication task. Never persisted.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PeerTask {
    /// Peer host.
    pub host: String,
    /// Peer port.
    pub port: u16,
    /// Direction.
    pub kind: TaskKind,
}

impl PeerTask {
    /// Peer address.
    pub fn address(&self) -> ServiceAddress {
        ServiceAddress::new(self.host.clone(), self.port)
    }
}

/// A peer record plus the health of its tasks.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeerStatus {
    /// `host:port`.
    pub address: String,
    /// Stored record.
    pub record: PeerRecord,
    /// Fetch task health, if fetching is enabled.
    pub fetch: Option<DirectionHealth>,
    /// Push task health, if pushing is enabled.
    pub push: Option<DirectionHealth>,
}

/// Persistent peer list plus in-memory task health.
pub struct PeerDirectory {
    tree: sled::Tree,
    health: RwLock<HashMap<(ServiceAddress, TaskKind), DirectionHealth>>,
    metrics: Arc<Metrics>,
}

fn key(addr: &ServiceAddress) -> Vec<u8> {
    addr.to_string().into_bytes()
}

impl PeerDirectory {
    /// Open the `peers` tree.
    pub fn open(db: &sled::Db, metrics: Arc<Metrics>) -> Result<Self, DirectoryError> {
        let tree = db
            .open_tree("peers")
            .map_err(|_| DirectoryError::Unavailable { op: "open" })?;
        let dir = Self { tree, health: RwLock::new(HashMap::new()), metrics };
        dir.metrics.peers_configured.set(dir.tree.len() as i64);
        Ok(dir)
    }

    /// Add or replace a record. Returns true if a record for the address existed.
    pub fn add(&self, record: PeerRecord) -> Result<bool, DirectoryError> {
        if record.service_url.trim().is_empty() {
            return Err(DirectoryError::Invalid("empty service_url"));
        }
        if record.port == 0 {
            return Err(DirectoryError::Invalid("port 0"));
        }
        let addr = record.address();
        let bytes = encode_canonical(&record).map_err(|_| DirectoryError::Invalid("unencodable"))?;
        let prev = self
            .tree
            .insert(key(&addr), bytes)
            .map_err(|_| DirectoryError::Unavailable { op: "insert" })?;
        self.tree
            .flush()
            .map_err(|_| DirectoryError::Unavailable { op: "flush" })?;

        // health of a disabled direction is stale
        {
            let mut health = self.health.write().unwrap_or_else(|e| e.into_inner());
            if !record.fetch_from {
                health.remove(&(addr.clone(), TaskKind::Fetch));
            }
            if !record.push_to {
                health.remove(&(addr.clone(), TaskKind::Push));
            }
        }
        self.metrics.peers_configured.set(self.tree.len() as i64);
        info!(peer = %addr, fetch = record.fetch_from, push = record.push_to, "peer record stored");
        Ok(prev.is_some())
    }

    /// Remove a record. Returns false if there was none.
    pub fn remove(&self, addr: &ServiceAddress) -> Result<bool, DirectoryError> {
        let prev = self
            .tree
            .remove(key(addr))
            .map_err(|_| DirectoryError::Unavailable { op: "remove" })?;
        self.tree
            .flush()
            .map_err(|_| DirectoryError::Unavailable { op: "flush" })?;
        {
            let mut health = self.health.write().unwrap_or_else(|e| e.into_inner());
            health.remove(&(addr.clone(), TaskKind::Fetch));
            health.remove(&(addr.clone(), TaskKind::Push));
        }
        self.metrics.peers_configured.set(self.tree.len() as i64);
        if prev.is_some() {
            info!(peer = %addr, "peer record removed");
        }
        Ok(prev.is_some())
    }

    /// Record for `addr`.
    pub fn get(&self, addr: &ServiceAddress) -> Result<Option<PeerRecord>, DirectoryError> {
        let raw = self
            .tree
            .get(key(addr))
            .map_err(|_| DirectoryError::Unavailable { op: "get" })?;
        raw.map(|v| {
            decode_canonical_limited(&v, MAX_RECORD_BYTES).map_err(|_| DirectoryError::Corrupt(addr.to_string()))
        })
        .transpose()
    }

    /// All records, ordered by `host:port`.
    pub fn list(&self) -> Result<Vec<PeerRecord>, DirectoryError> {
        let mut out = Vec::new();
        for item in self.tree.iter() {
            let (k, v) = item.map_err(|_| DirectoryError::Unavailable { op: "iter" })?;
            let rec: PeerRecord = decode_canonical_limited(&v, MAX_RECORD_BYTES)
                .map_err(|_| DirectoryError::Corrupt(String::from_utf8_lossy(&k).into_owned()))?;
            out.push(rec);
        }
        Ok(out)
    }

    /// Tasks implied by the current records: one per enabled direction.
    pub fn tasks(&self) -> Result<Vec<PeerTask>, DirectoryError> {
        let mut out = Vec::new();
        for rec in self.list()? {
            if rec.fetch_from {
                out.push(PeerTask { host: rec.service_url.clone(), port: rec.port, kind: TaskKind::Fetch });
            }
            if rec.push_to {
                out.push(PeerTask { host: rec.service_url.clone(), port: rec.port, kind: TaskKind::Push });
            }
        }
        Ok(out)
    }

    /// Current health of one task.
    pub fn health(&self, addr: &ServiceAddress, kind: TaskKind) -> DirectionHealth {
        let health = self.health.read().unwrap_or_else(|e| e.into_inner());
        health.get(&(addr.clone(), kind)).cloned().unwrap_or_default()
    }

    /// Mutate the health of one task.
    pub fn update_health<R>(
        &self,
        addr: &ServiceAddress,
        kind: TaskKind,
        f: impl FnOnce(&mut DirectionHealth) -> R,
    ) -> R {
        let mut health = self.health.write().unwrap_or_else(|e| e.into_inner());
        f(health.entry((addr.clone(), kind)).or_default())
    }

    /// Records with the health of their enabled directions.
    pub fn statuses(&self) -> Result<Vec<PeerStatus>, DirectoryError> {
        let records = self.list()?;
        let health = self.health.read().unwrap_or_else(|e| e.into_inner());
        Ok(records
            .into_iter()
            .map(|record| {
                let addr = record.address();
                let pick = |kind: TaskKind, enabled: bool| {
                    enabled.then(|| health.get(&(addr.clone(), kind)).cloned().unwrap_or_default())
                };
                PeerStatus {
                    address: addr.to_string(),
                    fetch: pick(TaskKind::Fetch, record.fetch_from),
                    push: pick(TaskKind::Push, record.push_to),
                    record,
                }
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;

    fn dir() -> (tempfile::TempDir, PeerDirectory) {
        let tmp = tempfile::tempdir().unwrap();
        let db = sled::open(tmp.path()).unwrap();
        let metrics = Arc::new(Metrics::new().unwrap());
        (tmp, PeerDirectory::open(&db, metrics).unwrap())
    }

    fn rec(host: &str, port: u16, fetch: bool, push: bool) -> PeerRecord {
        PeerRecord { service_url: host.into(), port, fetch_from: fetch, push_to: push }
    }

    #[test]
    fn add_replaces_by_address() {
        let (_tmp, d) = dir();
        assert!(!d.add(rec("a.example", 80, true, false)).unwrap());
        assert!(d.add(rec("a.example", 80, false, true)).unwrap());
        d.add(rec("b.example", 80, true, true)).unwrap();

        let all = d.list().unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(all[0], rec("a.example", 80, false, true));

        let tasks = d.tasks().unwrap();
        assert_eq!(tasks.len(), 3);
        assert!(tasks.contains(&PeerTask { host: "a.example".into(), port: 80, kind: TaskKind::Push }));
        assert!(!tasks.contains(&PeerTask { host: "a.example".into(), port: 80, kind: TaskKind::Fetch }));
    }

    #[test]
    fn remove_and_reject_invalid() {
        let (_tmp, d) = dir();
        assert!(matches!(d.add(rec("", 80, true, true)), Err(DirectoryError::Invalid(_))));
        assert!(matches!(d.add(rec("x", 0, true, true)), Err(DirectoryError::Invalid(_))));

        d.add(rec("x", 1, true, true)).unwrap();
        let addr = ServiceAddress::new("x", 1);
        assert!(d.get(&addr).unwrap().is_some());
        assert!(d.remove(&addr).unwrap());
        assert!(!d.remove(&addr).unwrap());
        assert!(d.get(&addr).unwrap().is_none());
    }

    #[test]
    fn statuses_expose_enabled_directions_only() {
        let (_tmp, d) = dir();
        d.add(rec("x", 1, true, false)).unwrap();
        let addr = ServiceAddress::new("x", 1);
        d.update_health(&addr, TaskKind::Fetch, |h| {
            h.fail(Default::default(), Instant::now(), "manifest: timeout".into())
        });

        let st = d.statuses().unwrap();
        assert_eq!(st.len(), 1);
        assert_eq!(st[0].address, "x:1");
        assert_eq!(st[0].fetch.as_ref().map(|h| h.consecutive_failures), Some(1));
        assert!(st[0].push.is_none());
    }
}
