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

//! Structured logging setup.

use crate::core::types::{LogConfig, LogFormat};
use tracing::Level;

fn parse_level(s: &str) -> Level {
    match s.trim().to_ascii_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    }
}

/// Install the global subscriber. Safe to call more than once; later calls are ignored.
pub fn init(cfg: &LogConfig) {
    let level = parse_level(&cfg.level);
    let _ = match cfg.format {
        LogFormat::Json => tracing_subscriber::fmt()
            .with_max_level(level)
            .with_target(false)
            .json()
            .try_init(),
        LogFormat::Compact => tracing_subscriber::fmt()
            .with_max_level(level)
            .with_target(false)
            .with_level(true)
            .compact()
            .try_init(),
    };
}
