#![forbid(unsafe_code)]
#![allow(missing_docs)]

//! Prometheus metrics and tracing setup.

pub mod logging;
pub mod metrics;
