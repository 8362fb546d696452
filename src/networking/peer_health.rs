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

//! Per-task sync state and exponential backoff.

use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};

/// Replication direction.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskKind {
    /// Pull from the peer.
    Fetch,
    /// Send to the peer.
    Push,
}

/// Sync state of one peer task.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncState {
    /// Waiting for the next timer tick.
    #[default]
    Idle,
    /// Fetch round in flight.
    Fetching,
    /// Push round in flight.
    Pushing,
    /// Waiting out a failure delay.
    Backoff,
}

/// Backoff parameters.
#[derive(Clone, Copy, Debug)]
pub struct BackoffParams {
    /// First delay.
    pub base_ms: u64,
    /// Max delay.
    pub max_ms: u64,
}

impl Default for BackoffParams {
    fn default() -> Self {
        Self { base_ms: 1_000, max_ms: 300_000 }
    }
}

/// Health of one (peer, direction) task.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirectionHealth {
    /// Current state.
    pub state: SyncState,
    /// Failures since the last successful round.
    pub consecutive_failures: u32,
    /// Last failure, with phase context.
    pub last_error: Option<String>,
    /// Wall-clock ms of the last successful round.
    pub last_success_ms: Option<u64>,
    /// Current backoff delay in ms (0 when not backing off).
    pub backoff_ms: u64,
    /// Successful rounds.
    pub rounds_ok: u64,
    /// Failed rounds.
    pub rounds_failed: u64,
    #[serde(skip)]
    backoff_until: Option<Instant>,
}

impl DirectionHealth {
    /// Round started.
    pub fn begin(&mut self, kind: TaskKind) {
        self.state = match kind {
            TaskKind::Fetch => SyncState::Fetching,
            TaskKind::Push => SyncState::Pushing,
        };
    }

    /// Round completed.
    pub fn succeed(&mut self, now_ms: u64) {
        self.state = SyncState::Idle;
        self.consecutive_failures = 0;
        self.last_success_ms = Some(now_ms);
        self.backoff_ms = 0;
        self.backoff_until = None;
        self.rounds_ok = self.rounds_ok.saturating_add(1);
    }

    /// Round failed on transport. Returns the delay before the next attempt.
    pub fn fail(&mut self, params: BackoffParams, now: Instant, error: String) -> Duration {
        self.consecutive_failures = self.consecutive_failures.saturating_add(1);
        self.rounds_failed = self.rounds_failed.saturating_add(1);
        let ms = backoff_ms(params.base_ms, params.max_ms, self.consecutive_failures);
        let delay = Duration::from_millis(ms);
        self.state = SyncState::Backoff;
        self.backoff_ms = ms;
        self.backoff_until = Some(now + delay);
        self.last_error = Some(error);
        delay
    }

    /// Backoff elapsed.
    pub fn resume(&mut self) {
        if self.state == SyncState::Backoff {
            self.state = SyncState::Idle;
        }
    }

    /// True while the backoff delay has not elapsed.
    pub fn in_backoff(&self, now: Instant) -> bool {
        match self.backoff_until {
            None => false,
            Some(t) => now < t,
        }
    }
}

/// `base * 2^(level-1)`, capped.
pub fn backoff_ms(base: u64, cap: u64, level: u32) -> u64 {
    let pow = level.saturating_sub(1).min(32);
    base.saturating_mul(1u64 << pow).min(cap)
}
