#![forbid(unsafe_code)]
#![allow(missing_docs)]

//! Networking: peer directory, replication transport and the sync scheduler.

pub mod peer_directory;
pub mod peer_health;
pub mod sync;
pub mod transport;
