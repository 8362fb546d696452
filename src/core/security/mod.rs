#![forbid(unsafe_code)]
#![allow(missing_docs)]

//! Signature verification and local signing identities.

pub mod keystore;
pub mod verifier;
