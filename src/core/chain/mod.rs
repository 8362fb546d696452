#![forbid(unsafe_code)]
#![allow(missing_docs)]

//! Envelopes, the chain index, commit groups and the admission pipeline.

pub mod envelope;
pub mod groups;
pub mod index;
pub mod ledger;
pub mod signing;
