pub mod callback;
pub mod video_jobs;
