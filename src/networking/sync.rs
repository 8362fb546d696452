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

//! Sync scheduler.
//!
//! One tokio task per (peer, direction), each on its own timer:
//! - fetch: diff the peer's manifest against local lane heads, pull the missing lane ranges,
//!   then admit them in ancestor order,
//! - push: diff local lane heads against the peer's manifest and offer what it lacks.
//!
//! A round first does all of its network I/O and only then hands the batch to a blocking
//! admission task. Stopping a task (which cancels at the next `.await`) drops the round but
//! never interrupts an admission that already started. Transport
//! failures put the task into exponential backoff; they never reach the supervisor.

use crate::core::chain::envelope::{Envelope, SealedEnvelope};
use crate::core::chain::index::{Admission, ChainError, LaneHead};
use crate::core::chain::ledger::{Ledger, LedgerError};
use crate::core::types::{now_ms, PublicKey, ServiceAddress, SyncSettings, H256};
use crate::monitoring::metrics::Metrics;
use crate::networking::peer_directory::{PeerDirectory, PeerTask};
use crate::networking::peer_health::{BackoffParams, TaskKind};
use crate::networking::transport::{PeerTransport, PushResult, PushStatus, RangeRequest, TransportError};
use futures::future::join_all;
use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Envelopes offered per push request.
const PUSH_CHUNK: usize = 64;

/// Sync round errors.
#[derive(Debug, Error)]
pub enum SyncError {
    /// Network call failed.
    #[error("{phase} against {peer} failed: {source}")]
    Transport {
        /// Peer.
        peer: ServiceAddress,
        /// Protocol step.
        phase: &'static str,
        /// Cause.
        #[source]
        source: TransportError,
    },
    /// Local ledger failure (store unavailable, poisoned lock).
    #[error("local ledger: {0}")]
    Ledger(#[from] LedgerError),
    /// The blocking admission task panicked.
    #[error("admission task failed: {0}")]
    Admission(String),
}

/// Scheduler timing and batching.
#[derive(Clone, Copy, Debug)]
pub struct SyncConfig {
    /// Delay between successful rounds of one task.
    pub interval: Duration,
    /// Bound on every network call.
    pub request_timeout: Duration,
    /// Failure backoff.
    pub backoff: BackoffParams,
    /// Max envelopes moved per lane per round.
    pub max_batch: usize,
}

impl From<&SyncSettings> for SyncConfig {
    fn from(s: &SyncSettings) -> Self {
        Self {
            interval: Duration::from_millis(s.interval_ms),
            request_timeout: Duration::from_millis(s.request_timeout_ms),
            backoff: BackoffParams { base_ms: s.backoff_base_ms, max_ms: s.backoff_max_ms },
            max_batch: s.max_batch.max(1),
        }
    }
}

/// Outcome of one fetch round.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct FetchReport {
    /// Lane ranges requested.
    pub ranges: usize,
    /// Envelopes received.
    pub received: usize,
    /// Envelopes that entered the index (replayed orphans included).
    pub admitted: usize,
    /// Received envelopes that were already indexed.
    pub known: usize,
    /// Received envelopes rejected as malformed, badly signed or conflicting.
    pub rejected: usize,
    /// Received envelopes still waiting for an ancestor at the end of the round.
    pub abandoned: usize,
}

/// Outcome of one push round.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PushReport {
    /// Envelopes offered.
    pub sent: usize,
    /// Accepted by the peer (admitted, duplicate or held).
    pub accepted: usize,
    /// Refused by the peer.
    pub refused: usize,
}

async fn timed<T>(
    cfg: &SyncConfig,
    peer: &ServiceAddress,
    phase: &'static str,
    fut: impl Future<Output = Result<T, TransportError>>,
) -> Result<T, SyncError> {
    let source = match tokio::time::timeout(cfg.request_timeout, fut).await {
        Ok(Ok(v)) => return Ok(v),
        Ok(Err(e)) => e,
        Err(_) => TransportError::Timeout,
    };
    Err(SyncError::Transport { peer: peer.clone(), phase, source })
}

fn height_map(heads: &[LaneHead]) -> HashMap<(H256, PublicKey), u64> {
    heads.iter().map(|h| ((h.genesis, h.key), h.height)).collect()
}

/// Ranges a holder of `have` needs to reach `want`, at most `per_lane` envelopes each.
fn missing_ranges(want: &[LaneHead], have: &[LaneHead], per_lane: usize) -> Vec<RangeRequest> {
    let have = height_map(have);
    let mut out = Vec::new();
    for head in want {
        let from_height = match have.get(&(head.genesis, head.key)) {
            Some(&h) if h >= head.height => continue,
            Some(&h) => h + 1,
            None => 0,
        };
        let span = head.height.saturating_sub(from_height).saturating_add(1);
        let span = usize::try_from(span).unwrap_or(usize::MAX);
        out.push(RangeRequest { genesis: head.genesis, key: head.key, from_height, limit: span.min(per_lane) });
    }
    out
}

/// Ancestor-respecting order: genesis envelopes first, then ascending height.
pub fn ancestor_order(envelopes: &mut [SealedEnvelope]) {
    envelopes.sort_by_key(|s| (!s.envelope().is_genesis(), s.envelope().header.height));
}

/// Pull what `peer` has and we lack.
pub async fn fetch_round(
    ledger: &Arc<Ledger>,
    transport: &dyn PeerTransport,
    peer: &ServiceAddress,
    cfg: &SyncConfig,
) -> Result<FetchReport, SyncError> {
    let remote = timed(cfg, peer, "manifest", transport.manifest(peer)).await?;
    let ranges = missing_ranges(&remote, &ledger.lane_heads()?, cfg.max_batch);
    let mut report = FetchReport { ranges: ranges.len(), ..Default::default() };

    let mut fetched = Vec::new();
    for req in &ranges {
        let mut envs = timed(cfg, peer, "fetch_range", transport.fetch_range(peer, req)).await?;
        envs.truncate(req.limit);
        fetched.extend(envs);
    }
    report.received = fetched.len();

    // network I/O is done; admission does sled writes and one sync, off the runtime threads
    let ledger = Arc::clone(ledger);
    let peer = peer.clone();
    tokio::task::spawn_blocking(move || admit_fetched(&ledger, &peer, fetched, report))
        .await
        .map_err(|e| SyncError::Admission(e.to_string()))?
}

fn admit_fetched(
    ledger: &Ledger,
    peer: &ServiceAddress,
    fetched: Vec<Envelope>,
    mut report: FetchReport,
) -> Result<FetchReport, SyncError> {
    let mut batch = Vec::with_capacity(fetched.len());
    for env in fetched {
        match SealedEnvelope::seal(env) {
            Ok(s) if ledger.is_indexed(&s.hash())? => report.known += 1,
            // refused before; the verdict does not change
            Ok(s) if ledger.is_conflicted(&s.hash())? => report.rejected += 1,
            Ok(s) => batch.push(s),
            Err(e) => {
                report.rejected += 1;
                warn!(peer = %peer, error = %e, "peer sent malformed envelope");
            }
        }
    }
    ancestor_order(&mut batch);

    let mut held = Vec::new();
    for (hash, result) in ledger.submit_batch(batch)? {
        match result {
            Ok(r) => match r.admission {
                Admission::Duplicate { .. } => report.known += 1,
                adm @ Admission::Admitted { .. } => report.admitted += adm.admitted_hashes().len(),
            },
            Err(LedgerError::Chain(ChainError::UnknownChain { .. })) => held.push(hash),
            Err(e @ (LedgerError::Chain(_) | LedgerError::Malformed(_) | LedgerError::InvalidSignature { .. })) => {
                report.rejected += 1;
                warn!(peer = %peer, %hash, error = %e, "fetched envelope rejected");
            }
            Err(e) => return Err(e.into()),
        }
    }
    for hash in held {
        if ledger.is_pending(&hash)? {
            report.abandoned += 1;
        }
    }
    if report.abandoned > 0 {
        debug!(peer = %peer, abandoned = report.abandoned, "orphans left waiting after fetch round");
    }
    Ok(report)
}

/// Offer `peer` what we have and it lacks.
pub async fn push_round(
    ledger: &Ledger,
    transport: &dyn PeerTransport,
    peer: &ServiceAddress,
    cfg: &SyncConfig,
) -> Result<PushReport, SyncError> {
    let remote = timed(cfg, peer, "manifest", transport.manifest(peer)).await?;
    let ranges = missing_ranges(&ledger.lane_heads()?, &remote, cfg.max_batch);

    let mut outgoing = Vec::new();
    for req in &ranges {
        for env in ledger.lane_range(&req.genesis, &req.key, req.from_height, req.limit)? {
            outgoing.push(SealedEnvelope::seal(env).map_err(LedgerError::from)?);
        }
    }
    ancestor_order(&mut outgoing);
    let outgoing: Vec<Envelope> = outgoing.into_iter().map(SealedEnvelope::into_envelope).collect();

    let mut report = PushReport::default();
    for chunk in outgoing.chunks(PUSH_CHUNK.min(cfg.max_batch).max(1)) {
        let results = timed(cfg, peer, "push", transport.push(peer, chunk)).await?;
        report.sent += chunk.len();
        for r in results {
            match r.status {
                PushStatus::Admitted | PushStatus::Duplicate | PushStatus::Pending => report.accepted += 1,
                PushStatus::Conflict | PushStatus::Invalid | PushStatus::Failed => {
                    report.refused += 1;
                    debug!(peer = %peer, hash = ?r.hash, status = ?r.status, error = ?r.error, "push refused");
                }
            }
        }
    }
    Ok(report)
}

/// Receiver side of a push: admit offered envelopes in ancestor order. Blocking; only a
/// failed store sync fails the whole call.
pub fn admit_pushed(ledger: &Ledger, envelopes: Vec<Envelope>) -> Result<Vec<PushResult>, LedgerError> {
    let mut results = Vec::with_capacity(envelopes.len());
    let mut batch = Vec::with_capacity(envelopes.len());
    for env in envelopes {
        match SealedEnvelope::seal(env) {
            Ok(s) => batch.push(s),
            Err(e) => results.push(PushResult { hash: None, status: PushStatus::Invalid, error: Some(e.to_string()) }),
        }
    }
    ancestor_order(&mut batch);

    for (hash, result) in ledger.submit_batch(batch)? {
        let (status, error) = match result {
            Ok(r) => match r.admission {
                Admission::Admitted { .. } => (PushStatus::Admitted, None),
                Admission::Duplicate { .. } => (PushStatus::Duplicate, None),
            },
            Err(e) => {
                let status = match &e {
                    LedgerError::Chain(ChainError::UnknownChain { .. }) => PushStatus::Pending,
                    LedgerError::Chain(ChainError::HeightConflict { .. }) => PushStatus::Conflict,
                    LedgerError::Malformed(_) | LedgerError::InvalidSignature { .. } => PushStatus::Invalid,
                    _ => PushStatus::Failed,
                };
                (status, Some(e.to_string()))
            }
        };
        results.push(PushResult { hash: Some(hash), status, error });
    }
    Ok(results)
}

struct Shared {
    ledger: Arc<Ledger>,
    directory: Arc<PeerDirectory>,
    transport: Arc<dyn PeerTransport>,
    metrics: Arc<Metrics>,
    cfg: SyncConfig,
}

impl Shared {
    async fn round(&self, peer: &ServiceAddress, kind: TaskKind) -> Result<(), SyncError> {
        match kind {
            TaskKind::Fetch => {
                let r = fetch_round(&self.ledger, self.transport.as_ref(), peer, &self.cfg).await?;
                self.metrics.sync_fetched_total.inc_by(r.received as u64);
                if r.received > 0 {
                    info!(
                        peer = %peer,
                        received = r.received,
                        admitted = r.admitted,
                        rejected = r.rejected,
                        abandoned = r.abandoned,
                        "fetch round"
                    );
                }
            }
            TaskKind::Push => {
                let r = push_round(&self.ledger, self.transport.as_ref(), peer, &self.cfg).await?;
                self.metrics.sync_pushed_total.inc_by(r.sent as u64);
                if r.sent > 0 {
                    info!(peer = %peer, sent = r.sent, refused = r.refused, "push round");
                }
            }
        }
        Ok(())
    }
}

async fn run_task(shared: Arc<Shared>, task: PeerTask, mut stop: watch::Receiver<bool>) {
    let peer = task.address();
    let kind = task.kind;
    debug!(peer = %peer, ?kind, "sync task started");
    loop {
        if *stop.borrow() {
            break;
        }
        shared.directory.update_health(&peer, kind, |h| h.begin(kind));
        let outcome = tokio::select! {
            r = shared.round(&peer, kind) => r,
            _ = stop.changed() => break,
        };
        let delay = match outcome {
            Ok(()) => {
                shared.metrics.sync_rounds_ok_total.inc();
                shared.directory.update_health(&peer, kind, |h| h.succeed(now_ms()));
                shared.cfg.interval
            }
            Err(e) => {
                shared.metrics.sync_rounds_failed_total.inc();
                let delay = shared
                    .directory
                    .update_health(&peer, kind, |h| h.fail(shared.cfg.backoff, Instant::now(), e.to_string()));
                warn!(peer = %peer, ?kind, error = %e, backoff_ms = delay.as_millis() as u64, "sync round failed");
                delay
            }
        };
        tokio::select! {
            _ = tokio::time::sleep(delay) => {}
            _ = stop.changed() => break,
        }
        shared.directory.update_health(&peer, kind, |h| h.resume());
    }
    debug!(peer = %peer, ?kind, "sync task stopped");
}

struct Running {
    stop: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

async fn supervise(shared: Arc<Shared>, mut shutdown: watch::Receiver<bool>) {
    let mut running: HashMap<PeerTask, Running> = HashMap::new();
    loop {
        match shared.directory.tasks() {
            Ok(wanted) => {
                let wanted: HashSet<PeerTask> = wanted.into_iter().collect();
                let gone: Vec<PeerTask> = running
                    .iter()
                    .filter(|(t, r)| !wanted.contains(*t) || r.handle.is_finished())
                    .map(|(t, _)| t.clone())
                    .collect();
                for t in gone {
                    if let Some(r) = running.remove(&t) {
                        let _ = r.stop.send(true);
                    }
                }
                for t in wanted {
                    if running.contains_key(&t) {
                        continue;
                    }
                    let (stop, rx) = watch::channel(false);
                    let handle = tokio::spawn(run_task(shared.clone(), t.clone(), rx));
                    running.insert(t, Running { stop, handle });
                }
            }
            Err(e) => warn!(error = %e, "peer directory unreadable; keeping current tasks"),
        }
        tokio::select! {
            _ = tokio::time::sleep(shared.cfg.interval) => {}
            _ = shutdown.changed() => break,
        }
    }

    for r in running.values() {
        let _ = r.stop.send(true);
    }
    join_all(running.into_values().map(|r| r.handle)).await;
    info!("sync scheduler stopped");
}

/// Owns the sync supervisor.
pub struct SyncScheduler;

/// Running scheduler.
pub struct SchedulerHandle {
    shutdown: watch::Sender<bool>,
    supervisor: JoinHandle<()>,
}

impl SyncScheduler {
    /// Spawn the supervisor. It starts and stops peer tasks to match the directory.
    pub fn start(
        ledger: Arc<Ledger>,
        directory: Arc<PeerDirectory>,
        transport: Arc<dyn PeerTransport>,
        metrics: Arc<Metrics>,
        cfg: SyncConfig,
    ) -> SchedulerHandle {
        let shared = Arc::new(Shared { ledger, directory, transport, metrics, cfg });
        let (shutdown, rx) = watch::channel(false);
        info!(interval_ms = cfg.interval.as_millis() as u64, max_batch = cfg.max_batch, "sync scheduler started");
        let supervisor = tokio::spawn(supervise(shared, rx));
        SchedulerHandle { shutdown, supervisor }
    }
}

impl SchedulerHandle {
    /// Stop every task and wait for them to exit.
    pub async fn stop(self) {
        let _ = self.shutdown.send(true);
        let _ = self.supervisor.await;
    }
}
