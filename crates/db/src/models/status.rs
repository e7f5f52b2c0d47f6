//! Status helper enums mapping to SMALLINT lookup tables.
//!
//! Each enum variant's discriminant matches the seed data in the
//! corresponding `*_statuses` database table.

/// Status ID type matching SMALLINT in the database.
pub type StatusId = i16;

macro_rules! define_status_enum {
    (
        $(#[$meta:meta])*
        $name:ident {
            $( $(#[$vmeta:meta])* $variant:ident = $val:literal => $label:literal ),+ $(,)?
        }
    ) => {
        $(#[$meta])*
        #[repr(i16)]
        #[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
        #[serde(rename_all = "snake_case")]
        pub enum $name {
            $( $(#[$vmeta])* $variant = $val ),+
        }

        impl $name {
            /// Return the database status ID.
            pub fn id(self) -> StatusId {
                self as StatusId
            }

            /// Look up a variant by its database status ID.
            pub fn from_id(id: StatusId) -> Option<Self> {
                match id {
                    $( $val => Some(Self::$variant), )+
                    _ => None,
                }
            }

            /// Seeded `name` column value.
            pub fn name(self) -> &'static str {
                match self {
                    $( Self::$variant => $label, )+
                }
            }
        }

        impl From<$name> for StatusId {
            fn from(value: $name) -> Self {
                value as StatusId
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.name())
            }
        }
    };
}

define_status_enum! {
    /// Video job lifecycle status.
    ///
    /// `Created -> Submitted -> Processing -> {Done | Failed}`.
    VideoJobStatus {
        Created = 1 => "created",
        Submitted = 2 => "submitted",
        Processing = 3 => "processing",
        Done = 4 => "done",
        Failed = 5 => "failed",
    }
}

impl VideoJobStatus {
    /// `Done` and `Failed` admit no further transitions.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Done | Self::Failed)
    }
}

/// Terminal statuses, used by guarded updates.
pub const TERMINAL_STATUSES: [StatusId; 2] = [
    VideoJobStatus::Done as StatusId,
    VideoJobStatus::Failed as StatusId,
];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn video_job_status_ids_match_seed_data() {
        assert_eq!(VideoJobStatus::Created.id(), 1);
        assert_eq!(VideoJobStatus::Submitted.id(), 2);
        assert_eq!(VideoJobStatus::Processing.id(), 3);
        assert_eq!(VideoJobStatus::Done.id(), 4);
        assert_eq!(VideoJobStatus::Failed.id(), 5);
    }

    #[test]
    fn status_into_status_id() {
        let id: StatusId = VideoJobStatus::Submitted.into();
        assert_eq!(id, 2);
    }

    #[test]
    fn from_id_round_trips_and_rejects_unknown() {
        assert_eq!(VideoJobStatus::from_id(3), Some(VideoJobStatus::Processing));
        assert_eq!(VideoJobStatus::from_id(0), None);
        assert_eq!(VideoJobStatus::from_id(6), None);
    }

    #[test]
    fn only_done_and_failed_are_terminal() {
        assert!(!VideoJobStatus::Created.is_terminal());
        assert!(!VideoJobStatus::Submitted.is_terminal());
        assert!(!VideoJobStatus::Processing.is_terminal());
        assert!(VideoJobStatus::Done.is_terminal());
        assert!(VideoJobStatus::Failed.is_terminal());
    }

    #[test]
    fn names_match_seed_data() {
        assert_eq!(VideoJobStatus::Processing.name(), "processing");
        assert_eq!(VideoJobStatus::Done.to_string(), "done");
    }
}
