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

//! attestd - peer-replicated attestation log.
//!
//! This repository provides:
//! - Canonical, signed, content-addressed envelopes
//! - Per-signer hash-linked chains rooted at a genesis, with tips and commit groups
//! - Persistent sled storage with deterministic index rebuild
//! - Bidirectional HTTP replication with per-peer backoff
//! - Monitoring via Prometheus metrics and structured JSON logging

/// HTTP control API and peer protocol endpoints.
pub mod api;
/// Core primitives (types, envelopes, chains, storage, signing).
pub mod core;
/// Observability (metrics, structured logging).
pub mod monitoring;
/// Peer directory and replication.
pub mod networking;
