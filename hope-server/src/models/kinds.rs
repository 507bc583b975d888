//! TEXT-backed enumerations (roles, statuses, actor kinds)
//!
//! Each enum is stored as its lowercase name and matches a CHECK constraint
//! in the migrations.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::ValidationError;

macro_rules! text_enum {
    (
        $(#[$meta:meta])*
        $name:ident, $field:literal {
            $($variant:ident => $text:literal),+ $(,)?
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(rename_all = "snake_case")]
        pub enum $name {
            $($variant),+
        }

        impl $name {
            /// All variants in declaration order.
            pub const ALL: &'static [Self] = &[$(Self::$variant),+];

            /// Get string representation.
            pub fn as_str(&self) -> &'static str {
                match self {
                    $(Self::$variant => $text),+
                }
            }

            /// Parse user input, reporting the field on failure.
            pub fn parse(s: &str) -> Result<Self, ValidationError> {
                s.parse()
            }
        }

        impl FromStr for $name {
            type Err = ValidationError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s.trim().to_ascii_lowercase().as_str() {
                    $($text => Ok(Self::$variant),)+
                    _ => Err(ValidationError::InvalidVariant {
                        field: $field,
                        value: s.to_owned(),
                    }),
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }
    };
}

text_enum! {
    /// Role of a row in `users`
    UserRole, "role" {
        Volunteer => "volunteer",
        Scholar => "scholar",
        Sponsor => "sponsor",
    }
}

text_enum! {
    /// Which account table an actor, author or recipient lives in
    ActorKind, "actor type" {
        User => "user",
        Admin => "admin",
        Staff => "staff",
    }
}

text_enum! {
    EventStatus, "status" {
        Open => "open",
        Closed => "closed",
        Cancelled => "cancelled",
        Completed => "completed",
    }
}

text_enum! {
    ScholarStatus, "status" {
        Active => "active",
        Graduated => "graduated",
        Inactive => "inactive",
    }
}

text_enum! {
    /// Review state of donations and report cards
    VerificationStatus, "verification status" {
        Pending => "pending",
        Verified => "verified",
        Rejected => "rejected",
    }
}

text_enum! {
    /// Admin decision on a pending donation or report card
    VerificationDecision, "decision" {
        Verify => "verify",
        Reject => "reject",
    }
}

impl VerificationDecision {
    /// Status a pending record moves to.
    pub fn resulting_status(&self) -> VerificationStatus {
        match self {
            Self::Verify => VerificationStatus::Verified,
            Self::Reject => VerificationStatus::Rejected,
        }
    }
}

/// SQL list of allowed values for a CHECK constraint, e.g. `'open','closed'`.
pub fn sql_values<T: Copy>(all: &[T], as_str: impl Fn(&T) -> &'static str) -> String {
    all.iter()
        .map(|v| format!("'{}'", as_str(v)))
        .collect::<Vec<_>>()
        .join(",")
}
