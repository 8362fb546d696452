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

//! Prometheus metrics registry and counters.

use prometheus::{Encoder, IntCounter, IntGauge, Registry, TextEncoder};
use thiserror::Error;

/// Metrics errors.
#[derive(Debug, Error)]
pub enum MetricsError {
    /// Registration or text encoding failed.
    #[error("prometheus")]
    Prom,
}

/// Metrics container.
#[derive(Clone)]
pub struct Metrics {
    /// Registry.
    pub registry: Registry,

    /// Envelopes that entered the chain index.
    pub envelopes_admitted_total: IntCounter,
    /// Submissions of already-indexed envelopes.
    pub envelopes_duplicate_total: IntCounter,
    /// Orphans currently held.
    pub orphans_pending: IntGauge,
    /// Indexed chains.
    pub chains_total: IntGauge,
    /// Height conflicts reported.
    pub height_conflicts_total: IntCounter,
    /// Envelopes rejected for a bad signature.
    pub invalid_signatures_total: IntCounter,
    /// Envelopes rejected as malformed.
    pub malformed_total: IntCounter,

    /// Completed sync rounds.
    pub sync_rounds_ok_total: IntCounter,
    /// Sync rounds that ended in a transport failure.
    pub sync_rounds_failed_total: IntCounter,
    /// Envelopes received from peers.
    pub sync_fetched_total: IntCounter,
    /// Envelopes sent to peers.
    pub sync_pushed_total: IntCounter,
    /// Peers in the directory.
    pub peers_configured: IntGauge,
}

fn counter(registry: &Registry, name: &str, help: &str) -> Result<IntCounter, MetricsError> {
    let c = IntCounter::new(name, help).map_err(|_| MetricsError::Prom)?;
    registry
        .register(Box::new(c.clone()))
        .map_err(|_| MetricsError::Prom)?;
    Ok(c)
}

fn gauge(registry: &Registry, name: &str, help: &str) -> Result<IntGauge, MetricsError> {
    let g = IntGauge::new(name, help).map_err(|_| MetricsError::Prom)?;
    registry
        .register(Box::new(g.clone()))
        .map_err(|_| MetricsError::Prom)?;
    Ok(g)
}

impl Metrics {
    /// Create and register metrics.
    pub fn new() -> Result<Self, MetricsError> {
        let registry = Registry::new();
        let r = &registry;

        Ok(Self {
            envelopes_admitted_total: counter(
                r,
                "attestd_envelopes_admitted_total",
                "Envelopes admitted to the chain index",
            )?,
            envelopes_duplicate_total: counter(
                r,
                "attestd_envelopes_duplicate_total",
                "Already-indexed envelopes submitted again",
            )?,
            orphans_pending: gauge(r, "attestd_orphans_pending", "Orphans awaiting an ancestor")?,
            chains_total: gauge(r, "attestd_chains", "Indexed chains")?,
            height_conflicts_total: counter(
                r,
                "attestd_height_conflicts_total",
                "Height conflicts reported",
            )?,
            invalid_signatures_total: counter(
                r,
                "attestd_invalid_signatures_total",
                "Envelopes with invalid signatures",
            )?,
            malformed_total: counter(r, "attestd_malformed_total", "Malformed envelopes")?,
            sync_rounds_ok_total: counter(r, "attestd_sync_rounds_ok_total", "Completed sync rounds")?,
            sync_rounds_failed_total: counter(
                r,
                "attestd_sync_rounds_failed_total",
                "Sync rounds failed on transport",
            )?,
            sync_fetched_total: counter(r, "attestd_sync_fetched_total", "Envelopes fetched from peers")?,
            sync_pushed_total: counter(r, "attestd_sync_pushed_total", "Envelopes pushed to peers")?,
            peers_configured: gauge(r, "attestd_peers_configured", "Peers in the directory")?,
            registry,
        })
    }

    /// Prometheus text exposition.
    pub fn render(&self) -> Result<String, MetricsError> {
        let mut buf = Vec::new();
        TextEncoder::new()
            .encode(&self.registry.gather(), &mut buf)
            .map_err(|_| MetricsError::Prom)?;
        String::from_utf8(buf).map_err(|_| MetricsError::Prom)
    }
}
