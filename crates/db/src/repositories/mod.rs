//! Repository layer.
//!
//! Each repository is a zero-sized struct providing async methods
//! that accept `&PgPool` as the first argument.

pub mod video_job_repo;

pub use video_job_repo::VideoJobRepo;
