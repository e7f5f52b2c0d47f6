//! Video-generation provider client library.
//!
//! Provides the [`VideoProvider`](api::VideoProvider) trait the pipeline
//! drives, typed request/response/status definitions, error
//! classification of provider HTTP responses, and the D-ID REST client
//! (with ElevenLabs text-to-speech routed through D-ID).

pub mod api;
pub mod did;
pub mod error;

pub use api::{ProviderStatus, StatusReport, SubmitRequest, SubmitResponse, VideoProvider};
pub use did::{DidClient, DidConfig};
pub use error::ProviderError;
