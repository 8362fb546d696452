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

//! Create a local signing identity in a node's data directory and print its public key.
//!
//! Usage: `keygen <nickname> [data_dir]`. Run it while the node is stopped; sled holds an
//! exclusive lock on the database.

use anyhow::{bail, Context, Result};
use attestd::core::security::keystore::IdentityStore;
use std::path::PathBuf;

fn main() -> Result<()> {
    let mut args = std::env::args().skip(1);
    let Some(nickname) = args.next() else {
        bail!("usage: keygen <nickname> [data_dir]");
    };
    let data_dir = args
        .next()
        .or_else(|| std::env::var("ATTESTD_DATA_DIR").ok())
        .unwrap_or_else(|| "./data".to_string());

    let db_path = PathBuf::from(data_dir).join("db");
    let db = sled::open(&db_path).with_context(|| format!("opening {}", db_path.display()))?;
    let identities = IdentityStore::open(&db)?;
    let pk = identities.create(&nickname)?;
    db.flush()?;

    println!("{pk}");
    Ok(())
}
