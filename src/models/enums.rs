use crate::db::DatabaseError;
use serde::{Deserialize, Serialize};

/// Macro to generate enum with as_str + std::str::FromStr pattern.
/// The string form doubles as the JSON and SQLite representation.
macro_rules! str_enum {
    ($name:ident { $($variant:ident => $s:literal),+ $(,)? }) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        pub enum $name {
            $(#[serde(rename = $s)] $variant),+
        }

        impl $name {
            pub const ALL: &'static [$name] = &[$(Self::$variant),+];

            pub fn as_str(&self) -> &'static str {
                match self {
                    $(Self::$variant => $s),+
                }
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl std::str::FromStr for $name {
            type Err = DatabaseError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($s => Ok(Self::$variant)),+,
                    _ => Err(DatabaseError::InvalidEnum {
                        field: stringify!($name).into(),
                        value: s.into(),
                    }),
                }
            }
        }
    };
}

str_enum!(AppointmentStatus {
    Pending => "pending",
    Confirmed => "confirmed",
    InProgress => "in_progress",
    Completed => "completed",
    Cancelled => "cancelled",
});

str_enum!(AuthorType {
    User => "user",
    Staff => "staff",
});

str_enum!(NotificationType {
    Appointment => "appointment",
    System => "system",
    Announcement => "announcement",
});

str_enum!(Role {
    User => "user",
    Staff => "staff",
    Admin => "admin",
});

str_enum!(StaffRole {
    Staff => "staff",
    Supervisor => "supervisor",
});

str_enum!(Permission {
    ManageAppointments => "manage_appointments",
    UpdateStatus => "update_status",
    AddComments => "add_comments",
    UploadDocuments => "upload_documents",
    ManageServices => "manage_services",
    ViewAnalytics => "view_analytics",
    ManageSchedule => "manage_schedule",
    ViewRatings => "view_ratings",
    ManageRatings => "manage_ratings",
    ViewReports => "view_reports",
});
