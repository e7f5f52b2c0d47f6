//! Domain rules for talking-head video generation jobs.
//!
//! This crate has no I/O. It holds the error taxonomy shared by every
//! layer, callback-token handling, the polling backoff schedule, speech
//! source definitions, blob key derivation, and user-facing failure
//! summaries.

pub mod callback;
pub mod error;
pub mod failure;
pub mod polling;
pub mod speech;
pub mod storage;
pub mod types;
