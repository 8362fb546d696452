#![forbid(unsafe_code)]
#![allow(missing_docs)]

//! Core: canonical types, envelopes, chain index, storage and signing.

pub mod chain;
pub mod security;
pub mod state;
pub mod types;
