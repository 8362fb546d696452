#![forbid(unsafe_code)]
#![allow(missing_docs)]

//! Content-addressed envelope storage.

pub mod message_store;
