//! Domain model structs and DTOs.
//!
//! - A `FromRow` + `Serialize` entity struct matching the database row
//! - A `Deserialize` create DTO for inserts
//! - Status lookup enums mirroring the seeded `*_statuses` tables

pub mod status;
pub mod video_job;
