//! Job lifecycle events.
//!
//! - [`EventBus`] -- in-process publish/subscribe hub backed by
//!   `tokio::sync::broadcast`.
//! - [`JobEvent`] -- the event envelope published when a job reaches a
//!   terminal state.

pub mod bus;

pub use bus::{EventBus, JobEvent, EVENT_JOB_COMPLETED, EVENT_JOB_FAILED};
